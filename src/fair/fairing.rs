//! Fairing entry points.
//!
//! One call runs COLLECT (adjacency and partition), ASSEMBLE (operator rows
//! and per-component systems), SOLVE (one direct solve per block, or the
//! relaxation loop for SMOOTH), WRITEBACK (free vertex positions only) and
//! DONE. All intermediate state is rebuilt per call; only the
//! [`FactorizationCache`] inside a reused [`FairContext`] survives.

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use nalgebra_sparse::factorization::CscSymbolicCholesky;
use serde::{Deserialize, Serialize};

use super::Vec3;
use super::adjacency::AdjacencyModel;
use super::cache::FactorizationCache;
use super::diagnostics::{FairDiagnostics, FairWarning};
use super::mesh::{FairError, MeshAccess, MeshAccessMut};
use super::metrics::{FairMetrics, TimingBucket};
use super::operator::{Continuity, OperatorAssembler};
use super::partition::VertexPartition;
use super::progress::{CancelToken, Progress};
use super::relax::{RelaxOptions, par_map, relax};
use super::solver::{SolveError, SolvePath, SolverSettings, solve_block};
use super::system::{LinearSystem, SystemBlock};
use super::weights::{EdgeWeight, VertexWeight, WeightCache};

const STAGE_COUNT: usize = 5;

/// How SMOOTH continuity is evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SmoothStrategy {
    /// Fixed number of neighbour-averaging iterations, no matrix solve.
    #[default]
    Relaxation,
    /// Solve `L(v) = 0` exactly, like POS.
    Direct,
}

/// Options for [`fair`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FairOptions {
    /// Relaxation iterations for SMOOTH.
    pub max_relaxation_iterations: usize,
    /// Step towards the neighbour mean per iteration, in `[0, 1]`.
    pub relaxation_factor: f64,
    pub smooth_strategy: SmoothStrategy,
    /// Cholesky pivots below `singularity_epsilon * max|diag|` are singular.
    pub singularity_epsilon: f64,
    /// Diagonal shift, relative to the largest diagonal entry, of the
    /// regularized retry.
    pub regularization_scale: f64,
    /// Largest accepted relative residual `|Ax - b| / (|A||x| + |b|)`.
    pub residual_tolerance: f64,
    /// Wall-clock limit per block; an exceeded block is left unchanged.
    pub per_block_time_budget: Option<Duration>,
    pub vertex_weight: VertexWeight,
    pub edge_weight: EdgeWeight,
    /// Run a uniform POS pass before TAN/CURV so geometric weights are read
    /// from a reasonable shape.
    pub pre_fair: bool,
    /// Keep free vertices that lie on an open mesh boundary in place.
    pub pin_mesh_boundary: bool,
    /// Solve blocks without any fixed coupling by regularization instead of
    /// leaving them unchanged.
    pub regularize_unanchored: bool,
    /// Solve blocks on the rayon pool. Ignored without the `parallel` feature.
    pub parallel: bool,
}

impl Default for FairOptions {
    fn default() -> Self {
        let solver = SolverSettings::default();
        Self {
            max_relaxation_iterations: 3,
            relaxation_factor: 0.5,
            smooth_strategy: SmoothStrategy::Relaxation,
            singularity_epsilon: solver.singularity_epsilon,
            regularization_scale: solver.regularization_scale,
            residual_tolerance: solver.residual_tolerance,
            per_block_time_budget: None,
            vertex_weight: VertexWeight::Uniform,
            edge_weight: EdgeWeight::Uniform,
            pre_fair: false,
            pin_mesh_boundary: true,
            regularize_unanchored: false,
            parallel: true,
        }
    }
}

impl FairOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn with_max_relaxation_iterations(mut self, iterations: usize) -> Self {
        self.max_relaxation_iterations = iterations;
        self
    }

    #[must_use]
    pub const fn with_relaxation_factor(mut self, factor: f64) -> Self {
        self.relaxation_factor = factor;
        self
    }

    #[must_use]
    pub const fn with_smooth_strategy(mut self, strategy: SmoothStrategy) -> Self {
        self.smooth_strategy = strategy;
        self
    }

    #[must_use]
    pub const fn with_singularity_epsilon(mut self, epsilon: f64) -> Self {
        self.singularity_epsilon = epsilon;
        self
    }

    #[must_use]
    pub const fn with_regularization_scale(mut self, scale: f64) -> Self {
        self.regularization_scale = scale;
        self
    }

    #[must_use]
    pub const fn with_residual_tolerance(mut self, tolerance: f64) -> Self {
        self.residual_tolerance = tolerance;
        self
    }

    #[must_use]
    pub const fn with_per_block_time_budget(mut self, budget: Option<Duration>) -> Self {
        self.per_block_time_budget = budget;
        self
    }

    #[must_use]
    pub const fn with_weights(mut self, vertex_weight: VertexWeight, edge_weight: EdgeWeight) -> Self {
        self.vertex_weight = vertex_weight;
        self.edge_weight = edge_weight;
        self
    }

    #[must_use]
    pub const fn with_pre_fair(mut self, pre_fair: bool) -> Self {
        self.pre_fair = pre_fair;
        self
    }

    #[must_use]
    pub const fn with_pin_mesh_boundary(mut self, pin: bool) -> Self {
        self.pin_mesh_boundary = pin;
        self
    }

    #[must_use]
    pub const fn with_regularize_unanchored(mut self, regularize: bool) -> Self {
        self.regularize_unanchored = regularize;
        self
    }

    #[must_use]
    pub const fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Replaces out-of-range values with their defaults, reporting each one.
    #[must_use]
    pub fn sanitized(mut self) -> (Self, Vec<FairWarning>) {
        let defaults = Self::default();
        let mut warnings = Vec::new();
        let mut check = |option: &'static str, value: &mut f64, replacement: f64, valid: fn(f64) -> bool| {
            if !valid(*value) {
                let warning = FairWarning::OptionAdjusted {
                    option,
                    value: *value,
                    replacement,
                };
                log::warn!("{warning}");
                warnings.push(warning);
                *value = replacement;
            }
        };

        check(
            "relaxation_factor",
            &mut self.relaxation_factor,
            defaults.relaxation_factor,
            |v| (0.0..=1.0).contains(&v),
        );
        check(
            "singularity_epsilon",
            &mut self.singularity_epsilon,
            defaults.singularity_epsilon,
            |v| v.is_finite() && v >= 0.0,
        );
        check(
            "regularization_scale",
            &mut self.regularization_scale,
            defaults.regularization_scale,
            |v| v.is_finite() && v > 0.0,
        );
        check(
            "residual_tolerance",
            &mut self.residual_tolerance,
            defaults.residual_tolerance,
            |v| v.is_finite() && v > 0.0,
        );

        (self, warnings)
    }

    #[must_use]
    pub fn solver_settings(&self) -> SolverSettings {
        SolverSettings {
            singularity_epsilon: self.singularity_epsilon,
            regularization_scale: self.regularization_scale,
            residual_tolerance: self.residual_tolerance,
            time_budget: self.per_block_time_budget,
            regularize_unanchored: self.regularize_unanchored,
        }
    }
}

/// State that may outlive a single call.
#[derive(Debug, Default)]
pub struct FairContext {
    pub cache: FactorizationCache,
    pub metrics: FairMetrics,
    pub progress: Progress,
    pub cancel: CancelToken,
}

impl FairContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_progress(mut self, progress: Progress) -> Self {
        self.progress = progress;
        self
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct FairingResult {
    /// New position of every free vertex that was moved.
    pub updated_positions: BTreeMap<usize, [f64; 3]>,
    /// Vertex groups left at their original positions.
    pub degenerate_blocks: Vec<Vec<usize>>,
    pub warnings: Vec<FairWarning>,
    pub diagnostics: FairDiagnostics,
    /// Set when the call was cancelled; the mesh is then untouched.
    pub cancelled: bool,
}

/// Builds the adjacency model of `mesh`.
///
/// # Errors
/// Returns [`FairError::FaceIndexOutOfRange`] if a face references a vertex
/// that does not exist.
pub fn build_adjacency<M: MeshAccess + ?Sized>(mesh: &M) -> Result<AdjacencyModel, FairError> {
    AdjacencyModel::build(mesh)
}

/// Fairs `free` against `fixed` with a fresh context.
///
/// # Errors
/// Fails only for a structurally invalid mesh; every other problem is a
/// warning in the result.
pub fn fair<M: MeshAccessMut + ?Sized>(
    mesh: &mut M,
    free: &[usize],
    fixed: &[usize],
    continuity: Continuity,
    options: &FairOptions,
) -> Result<FairingResult, FairError> {
    let mut ctx = FairContext::new();
    fair_with_context(mesh, free, fixed, continuity, options, &mut ctx)
}

/// Fairs `free` against `fixed`, reusing the cache of `ctx`.
///
/// # Errors
/// Fails only for a structurally invalid mesh; every other problem is a
/// warning in the result.
pub fn fair_with_context<M: MeshAccessMut + ?Sized>(
    mesh: &mut M,
    free: &[usize],
    fixed: &[usize],
    continuity: Continuity,
    options: &FairOptions,
    ctx: &mut FairContext,
) -> Result<FairingResult, FairError> {
    ctx.metrics.begin();
    let (options, mut warnings) = options.sanitized();
    let mut result = FairingResult::default();

    // COLLECT
    log::debug!("fair: collect ({} free, {} fixed, {continuity})", free.len(), fixed.len());
    ctx.progress.report(0, STAGE_COUNT, "collect");
    let adjacency = ctx.metrics.time(TimingBucket::Adjacency, || AdjacencyModel::build(&*mesh))?;
    warnings.extend(adjacency.warnings().iter().cloned());

    let (partition, partition_warnings) = ctx.metrics.time(TimingBucket::Partition, || {
        VertexPartition::resolve(&adjacency, free, fixed, options.pin_mesh_boundary)
    });
    warnings.extend(partition_warnings);

    let diagnostics = &mut result.diagnostics;
    diagnostics.requested_free_count = partition.requested_count();
    diagnostics.dropped_vertex_count = partition.dropped().len();
    diagnostics.non_manifold_edge_count = adjacency.non_manifold_edge_count();
    diagnostics.boundary_loop_count = adjacency.boundary_loops().len();

    let mut working = mesh.snapshot_positions();

    if partition.is_empty() {
        log::debug!("fair: nothing to solve");
        return Ok(finish(result, warnings, ctx));
    }
    if ctx.cancel.is_cancelled() {
        return Ok(cancelled(result, warnings, ctx));
    }

    // ASSEMBLE + SOLVE
    let relaxation =
        continuity == Continuity::Smooth && options.smooth_strategy == SmoothStrategy::Relaxation;
    let solved = if relaxation {
        log::debug!("fair: relax {} vertices", partition.free().len());
        ctx.progress.report(2, STAGE_COUNT, "relax");
        let relax_options = RelaxOptions {
            iterations: options.max_relaxation_iterations,
            factor: options.relaxation_factor,
            parallel: options.parallel,
        };
        let outcome = ctx.metrics.time(TimingBucket::Relaxation, || {
            relax(&mut working, &adjacency, partition.free(), &relax_options, &ctx.cancel)
        });
        result.diagnostics.relaxation_iterations = outcome.iterations;
        if outcome.cancelled {
            return Ok(cancelled(result, warnings, ctx));
        }
        result.diagnostics.solved_vertex_count = partition.free().len();
        partition.free().to_vec()
    } else {
        let pass = SolvePass {
            adjacency: &adjacency,
            partition: &partition,
            settings: options.solver_settings(),
            parallel: options.parallel,
        };

        if options.pre_fair && continuity.order() > 1 {
            log::debug!("fair: uniform POS pre-pass");
            let report = pass.run(
                &mut working,
                Continuity::Pos,
                (VertexWeight::Uniform, EdgeWeight::Uniform),
                None,
                &mut ctx.metrics,
                &ctx.progress,
                &ctx.cancel,
            );
            if report.cancelled {
                return Ok(cancelled(result, warnings, ctx));
            }
        }

        let mut hasher = DefaultHasher::new();
        topology_key(&*mesh, &mut hasher);
        partition.hash_into(&mut hasher);
        partition.fixed().hash(&mut hasher);
        continuity.hash(&mut hasher);
        options.vertex_weight.hash(&mut hasher);
        options.edge_weight.hash(&mut hasher);
        ctx.cache.sync_topology(hasher.finish());

        let before = ctx.cache.stats();
        let report = pass.run(
            &mut working,
            continuity,
            (options.vertex_weight, options.edge_weight),
            Some(&mut ctx.cache),
            &mut ctx.metrics,
            &ctx.progress,
            &ctx.cancel,
        );
        let after = ctx.cache.stats();
        result.diagnostics.cache_hits = after.hits - before.hits;
        result.diagnostics.cache_misses = after.misses - before.misses;

        if report.cancelled {
            return Ok(cancelled(result, warnings, ctx));
        }
        result.diagnostics.merge(&report.diagnostics);
        warnings.extend(report.warnings);
        result.degenerate_blocks = report.degenerate_blocks;
        report.solved
    };

    // WRITEBACK
    if ctx.cancel.is_cancelled() {
        return Ok(cancelled(result, warnings, ctx));
    }
    log::debug!("fair: writeback {} vertices", solved.len());
    ctx.progress.report(3, STAGE_COUNT, "writeback");
    let updated = &mut result.updated_positions;
    ctx.metrics.time(TimingBucket::Writeback, || {
        for v in solved {
            let position = working[v].to_array();
            mesh.set_position(v, position);
            updated.insert(v, position);
        }
    });

    Ok(finish(result, warnings, ctx))
}

fn finish(mut result: FairingResult, warnings: Vec<FairWarning>, ctx: &mut FairContext) -> FairingResult {
    result.warnings = warnings;
    result.diagnostics.timing = ctx.metrics.end();
    ctx.progress.report(STAGE_COUNT, STAGE_COUNT, "done");
    log::debug!("fair: done, {}", result.diagnostics.summary());
    result
}

fn cancelled(mut result: FairingResult, mut warnings: Vec<FairWarning>, ctx: &mut FairContext) -> FairingResult {
    log::warn!("fair: cancelled, mesh left unchanged");
    warnings.push(FairWarning::Cancelled);
    result.updated_positions.clear();
    result.degenerate_blocks.clear();
    result.cancelled = true;
    finish(result, warnings, ctx)
}

fn topology_key<M: MeshAccess + ?Sized, H: Hasher>(mesh: &M, state: &mut H) {
    mesh.vertex_count().hash(state);
    for face in 0..mesh.face_count() {
        mesh.face(face).hash(state);
    }
}

/// Assembly and block solves over one working buffer.
struct SolvePass<'a> {
    adjacency: &'a AdjacencyModel,
    partition: &'a VertexPartition,
    settings: SolverSettings,
    parallel: bool,
}

#[derive(Debug, Default)]
struct PassReport {
    solved: Vec<usize>,
    diagnostics: FairDiagnostics,
    warnings: Vec<FairWarning>,
    degenerate_blocks: Vec<Vec<usize>>,
    cancelled: bool,
}

impl SolvePass<'_> {
    #[allow(clippy::too_many_arguments)]
    fn run(
        &self,
        positions: &mut [Vec3],
        continuity: Continuity,
        (vertex_weight, edge_weight): (VertexWeight, EdgeWeight),
        cache: Option<&mut FactorizationCache>,
        metrics: &mut FairMetrics,
        progress: &Progress,
        cancel: &CancelToken,
    ) -> PassReport {
        let mut report = PassReport::default();
        let free = self.partition.free();

        log::debug!("fair: assemble {} rows, order {}", free.len(), continuity.order());
        progress.report(1, STAGE_COUNT, "assemble");
        let system = {
            let mut weights = WeightCache::new(self.adjacency, positions, vertex_weight, edge_weight);
            metrics.time(TimingBucket::Weights, || weights.prefetch(free));
            let rows = metrics.time(TimingBucket::Assembly, || {
                OperatorAssembler::new(&mut weights).rows(free, continuity)
            });
            metrics.time(TimingBucket::Assembly, || {
                LinearSystem::assemble(&rows, self.partition, positions)
            })
        };
        report.diagnostics.block_count = system.blocks.len();
        report.diagnostics.implicit_anchor_count = system.implicit_anchors.len();
        if !system.implicit_anchors.is_empty() {
            log::debug!(
                "fair: {} vertices outside the fixed list held constant",
                system.implicit_anchors.len()
            );
        }

        if cancel.is_cancelled() {
            report.cancelled = true;
            return report;
        }

        log::debug!("fair: solve {} blocks", system.blocks.len());
        progress.report(2, STAGE_COUNT, "solve");
        let symbolics = symbolic_factorizations(&system.blocks, cache);
        let jobs: Vec<(&SystemBlock, Option<Arc<CscSymbolicCholesky>>)> =
            system.blocks.iter().zip(symbolics).collect();
        let total = jobs.len();
        let settings = self.settings;
        let outcomes = metrics.time(TimingBucket::Solve, || {
            par_map(&jobs, self.parallel, |(block, symbolic)| {
                let outcome = solve_block(block, &settings, symbolic.as_deref(), cancel);
                progress.report(block.index + 1, total, "solve block");
                outcome
            })
        });

        for ((block, _), outcome) in jobs.iter().zip(outcomes) {
            match outcome {
                Ok(solution) => {
                    match solution.path {
                        SolvePath::Cholesky => report.diagnostics.cholesky_block_count += 1,
                        SolvePath::Lu => report.diagnostics.lu_block_count += 1,
                    }
                    if let Some(lambda) = solution.lambda {
                        report.diagnostics.regularized_block_count += 1;
                        report.warnings.push(FairWarning::Regularized {
                            block: block.index,
                            lambda,
                        });
                    }
                    report.diagnostics.max_relative_residual =
                        report.diagnostics.max_relative_residual.max(solution.relative_residual);
                    report.diagnostics.solved_vertex_count += block.len();
                    for (row, &v) in block.vertices.iter().enumerate() {
                        positions[v] = Vec3::new(
                            solution.positions[(row, 0)],
                            solution.positions[(row, 1)],
                            solution.positions[(row, 2)],
                        );
                        report.solved.push(v);
                    }
                }
                Err(SolveError::Cancelled) => report.cancelled = true,
                Err(err) => {
                    let warning = FairWarning::SolveDegenerate {
                        block: block.index,
                        vertices: block.vertices.clone(),
                        reason: err.to_string(),
                    };
                    log::warn!("{warning}");
                    report.warnings.push(warning);
                    report.diagnostics.degenerate_block_count += 1;
                    report.degenerate_blocks.push(block.vertices.clone());
                }
            }
        }

        report.solved.sort_unstable();
        report
    }
}

/// Symbolic analyses for the symmetric blocks, from `cache` when given.
fn symbolic_factorizations(
    blocks: &[SystemBlock],
    cache: Option<&mut FactorizationCache>,
) -> Vec<Option<Arc<CscSymbolicCholesky>>> {
    let Some(cache) = cache else {
        return vec![None; blocks.len()];
    };
    blocks
        .iter()
        .map(|block| {
            block
                .symmetric
                .then(|| cache.get_or_insert_symbolic(block.pattern()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fair::FairMesh;

    #[test]
    fn sanitize_replaces_invalid_values() {
        let options = FairOptions::new()
            .with_relaxation_factor(1.5)
            .with_singularity_epsilon(f64::NAN)
            .with_residual_tolerance(-1.0);
        let (clean, warnings) = options.sanitized();
        assert_eq!(warnings.len(), 3);
        assert!((clean.relaxation_factor - 0.5).abs() < 1e-12);
        assert!(clean.singularity_epsilon.is_finite());
        assert!(clean.residual_tolerance > 0.0);
    }

    #[test]
    fn default_options_are_clean() {
        let (_, warnings) = FairOptions::default().sanitized();
        assert!(warnings.is_empty());
    }

    #[test]
    fn empty_free_set_is_a_no_op() {
        let mut mesh = FairMesh::quad_grid(3, 3);
        let before = mesh.clone();
        let result = fair(&mut mesh, &[], &[], Continuity::Pos, &FairOptions::default()).unwrap();
        assert!(result.updated_positions.is_empty());
        assert!(result.warnings.is_empty());
        assert_eq!(mesh, before);
    }

    #[test]
    fn builders_set_fields() {
        let options = FairOptions::new()
            .with_weights(VertexWeight::Voronoi, EdgeWeight::Cotangent)
            .with_smooth_strategy(SmoothStrategy::Direct)
            .with_per_block_time_budget(Some(Duration::from_millis(50)));
        assert_eq!(options.edge_weight, EdgeWeight::Cotangent);
        assert_eq!(options.smooth_strategy, SmoothStrategy::Direct);
        assert_eq!(options.solver_settings().time_budget, Some(Duration::from_millis(50)));
        assert_eq!(options.max_relaxation_iterations, 3);
    }
}
