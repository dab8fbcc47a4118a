use super::fixtures::{complement, grid, index, interior, positions, set_z};
use crate::fair::{
    AdjacencyModel, Continuity, EdgeWeight, FairOptions, VertexWeight, fair, operator_residual,
};

#[test]
fn flat_boundary_pulls_interior_back_to_plane() {
    let mut mesh = grid(5);
    let free = interior(5, 1);
    let fixed = complement(25, &free);
    set_z(&mut mesh, &free, 1.0);

    let result = fair(&mut mesh, &free, &fixed, Continuity::Pos, &FairOptions::default()).unwrap();

    assert_eq!(result.updated_positions.len(), 9);
    for &v in &free {
        let p = mesh.positions[v];
        assert!(p[2].abs() < 1e-9, "vertex {v} z = {}", p[2]);
        assert!((p[0] - (v % 5) as f64).abs() < 1e-9);
        assert!((p[1] - (v / 5) as f64).abs() < 1e-9);
        assert_eq!(result.updated_positions[&v], p);
    }
    assert!(result.degenerate_blocks.is_empty());
    assert!(result.warnings.is_empty());
    assert!(result.diagnostics.is_clean());
    assert_eq!(result.diagnostics.block_count, 1);
    assert_eq!(result.diagnostics.cholesky_block_count, 1);
    assert_eq!(result.diagnostics.solved_vertex_count, 9);
}

#[test]
fn solution_satisfies_the_laplace_system() {
    let mut mesh = grid(6);
    let free = interior(6, 1);
    let fixed = complement(36, &free);
    // Tilted, bumped boundary so the answer is not trivial.
    for (v, p) in mesh.positions.iter_mut().enumerate() {
        p[2] = if fixed.contains(&v) { 0.3 * p[0] + 0.1 * p[1] * p[1] } else { 2.0 };
    }

    let result = fair(&mut mesh, &free, &fixed, Continuity::Pos, &FairOptions::default()).unwrap();
    assert!(result.diagnostics.max_relative_residual < 1e-9);

    let adj = AdjacencyModel::build(&mesh).unwrap();
    let pos = positions(&mesh);
    for &v in &free {
        let r = operator_residual(&adj, &pos, v, Continuity::Pos, VertexWeight::Uniform, EdgeWeight::Uniform);
        assert!(r < 1e-9, "vertex {v}: {r}");
    }
}

#[test]
fn fixed_vertices_never_move_or_appear() {
    let mut mesh = grid(5);
    let free = interior(5, 1);
    let fixed = complement(25, &free);
    set_z(&mut mesh, &free, -3.0);
    let before = mesh.clone();

    let result = fair(&mut mesh, &free, &fixed, Continuity::Pos, &FairOptions::default()).unwrap();

    for &v in &fixed {
        assert!(!result.updated_positions.contains_key(&v));
        assert_eq!(mesh.positions[v], before.positions[v]);
    }
    assert!(result.updated_positions.keys().all(|v| free.contains(v)));
}

#[test]
fn unlisted_neighbours_act_as_constants() {
    let mut mesh = grid(5);
    let center = index(5, 2, 2);
    set_z(&mut mesh, &[center], 4.0);

    // Nothing fixed explicitly: the one-ring is read as constant.
    let result = fair(&mut mesh, &[center], &[], Continuity::Pos, &FairOptions::default()).unwrap();

    assert!(mesh.positions[center][2].abs() < 1e-12);
    assert_eq!(result.diagnostics.implicit_anchor_count, 4);
}

#[test]
fn cotangent_weights_keep_a_flat_patch_flat() {
    let mut mesh = grid(5);
    let free = interior(5, 1);
    let fixed = complement(25, &free);
    set_z(&mut mesh, &free, 0.5);

    let options = FairOptions::default().with_weights(VertexWeight::Voronoi, EdgeWeight::Cotangent);
    let result = fair(&mut mesh, &free, &fixed, Continuity::Pos, &options).unwrap();

    assert_eq!(result.diagnostics.solved_vertex_count, 9);
    for &v in &free {
        assert!(mesh.positions[v][2].abs() < 1e-9);
    }
}
