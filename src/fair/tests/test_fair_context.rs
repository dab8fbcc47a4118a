use std::sync::{Arc, Mutex};

use super::fixtures::{complement, grid, interior, set_z};
use crate::fair::{
    CancelToken, Continuity, FairContext, FairOptions, FairWarning, Progress, fair_with_context,
};

#[test]
fn repeated_fairing_reuses_symbolic_factorization() {
    let mut mesh = grid(6);
    let free = interior(6, 1);
    let fixed = complement(36, &free);
    let mut ctx = FairContext::new();

    set_z(&mut mesh, &free, 1.0);
    let first = fair_with_context(&mut mesh, &free, &fixed, Continuity::Tan, &FairOptions::default(), &mut ctx).unwrap();
    assert_eq!(first.diagnostics.cache_misses, 1);
    assert_eq!(first.diagnostics.cache_hits, 0);

    set_z(&mut mesh, &free, -1.0);
    let second = fair_with_context(&mut mesh, &free, &fixed, Continuity::Tan, &FairOptions::default(), &mut ctx).unwrap();
    assert_eq!(second.diagnostics.cache_hits, 1);
    assert_eq!(second.diagnostics.cache_misses, 0);
    for &v in &free {
        assert!(mesh.positions[v][2].abs() < 1e-9);
    }
    assert_eq!(ctx.cache.stats().entries, 1);
}

#[test]
fn changing_the_free_set_invalidates_the_cache() {
    let mut mesh = grid(6);
    let free = interior(6, 1);
    let fixed = complement(36, &free);
    let mut ctx = FairContext::new();

    fair_with_context(&mut mesh, &free, &fixed, Continuity::Pos, &FairOptions::default(), &mut ctx).unwrap();
    let smaller = interior(6, 2);
    let result = fair_with_context(
        &mut mesh,
        &smaller,
        &complement(36, &smaller),
        Continuity::Pos,
        &FairOptions::default(),
        &mut ctx,
    )
    .unwrap();

    assert_eq!(result.diagnostics.cache_hits, 0);
    assert_eq!(ctx.cache.stats().invalidations, 1);
    assert_eq!(ctx.cache.stats().entries, 1);
}

#[test]
fn cancelled_request_leaves_mesh_untouched() {
    let mut mesh = grid(5);
    let free = interior(5, 1);
    let fixed = complement(25, &free);
    set_z(&mut mesh, &free, 1.0);
    let before = mesh.clone();

    let cancel = CancelToken::new();
    cancel.cancel();
    let mut ctx = FairContext::new().with_cancel(cancel.clone());

    for continuity in [Continuity::Smooth, Continuity::Tan] {
        let result = fair_with_context(&mut mesh, &free, &fixed, continuity, &FairOptions::default(), &mut ctx).unwrap();
        assert!(result.cancelled);
        assert!(result.updated_positions.is_empty());
        assert!(result.warnings.contains(&FairWarning::Cancelled));
        assert_eq!(mesh, before);
    }

    cancel.reset();
    let result = fair_with_context(&mut mesh, &free, &fixed, Continuity::Pos, &FairOptions::default(), &mut ctx).unwrap();
    assert!(!result.cancelled);
    assert_eq!(result.updated_positions.len(), 9);
}

#[test]
fn progress_reports_stages_in_order() {
    let mut mesh = grid(5);
    let free = interior(5, 1);
    let fixed = complement(25, &free);
    let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let mut ctx = FairContext::new().with_progress(Progress::new(move |_, _, message| {
        sink.lock().unwrap().push(message.to_string());
    }));

    fair_with_context(&mut mesh, &free, &fixed, Continuity::Pos, &FairOptions::default(), &mut ctx).unwrap();

    let seen = seen.lock().unwrap();
    let stages: Vec<&str> = seen
        .iter()
        .map(String::as_str)
        .filter(|m| *m != "solve block")
        .collect();
    assert_eq!(stages, vec!["collect", "assemble", "solve", "writeback", "done"]);
    assert_eq!(seen.iter().filter(|m| *m == "solve block").count(), 1);
}

#[test]
fn timing_is_reported_only_with_metrics() {
    let mut mesh = grid(5);
    let free = interior(5, 1);
    let mut ctx = FairContext::new();
    let result = fair_with_context(&mut mesh, &free, &[], Continuity::Pos, &FairOptions::default(), &mut ctx).unwrap();

    if cfg!(all(feature = "fair_metrics", not(target_arch = "wasm32"))) {
        assert!(result.diagnostics.timing.is_some());
    } else {
        assert!(result.diagnostics.timing.is_none());
    }
}
