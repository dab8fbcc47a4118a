//! Structured warnings and run diagnostics for fairing.
//!
//! Nothing in here is fatal. A [`FairWarning`] records a vertex, block or
//! option that was adjusted or skipped; [`FairDiagnostics`] aggregates the
//! counters a host needs to decide how to surface the outcome.
//!
//! # Example
//!
//! ```ignore
//! let result = fair(&mut mesh, &free, &fixed, Continuity::Tan, &FairOptions::default())?;
//! if !result.diagnostics.is_clean() {
//!     for warning in &result.warnings {
//!         eprintln!("{}: {warning}", warning.category());
//!     }
//! }
//! ```

use std::fmt;

use serde::Serialize;

use super::metrics::FairTimingReport;

/// Broad grouping of warnings, matching the error taxonomy hosts report on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum WarningCategory {
    Topology,
    Partition,
    Solve,
    Options,
}

impl fmt::Display for WarningCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Topology => "topology",
            Self::Partition => "partition",
            Self::Solve => "solve",
            Self::Options => "options",
        };
        f.write_str(name)
    }
}

/// Why a requested free vertex was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PartitionIssue {
    /// Index is not a vertex of the mesh.
    OutOfRange,
    /// Listed as both free and fixed; kept fixed.
    Overlap,
    /// Fewer than two neighbours.
    NoNeighbors,
}

impl fmt::Display for PartitionIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::OutOfRange => "index out of range",
            Self::Overlap => "listed as both free and fixed",
            Self::NoNeighbors => "has no usable neighbours",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FairWarning {
    /// Vertex has no incident faces and was excluded from the free set.
    IsolatedVertex { vertex: usize },
    /// Face collapsed to fewer than three distinct vertices and was ignored.
    DegenerateFace { face: usize },
    NonManifoldEdge { a: usize, b: usize, face_count: usize },
    NonManifoldVertex { vertex: usize },
    InvalidPartition { vertex: usize, reason: PartitionIssue },
    /// Free vertex on an open mesh boundary, held in place.
    PinnedBoundaryVertex { vertex: usize },
    /// Block left at its original positions.
    SolveDegenerate {
        block: usize,
        vertices: Vec<usize>,
        reason: String,
    },
    /// Block solved only after adding `lambda` to the diagonal.
    Regularized { block: usize, lambda: f64 },
    OptionAdjusted {
        option: &'static str,
        value: f64,
        replacement: f64,
    },
    Cancelled,
}

impl FairWarning {
    #[must_use]
    pub fn category(&self) -> WarningCategory {
        match self {
            Self::IsolatedVertex { .. }
            | Self::DegenerateFace { .. }
            | Self::NonManifoldEdge { .. }
            | Self::NonManifoldVertex { .. } => WarningCategory::Topology,
            Self::InvalidPartition { .. } | Self::PinnedBoundaryVertex { .. } => {
                WarningCategory::Partition
            }
            Self::SolveDegenerate { .. } | Self::Regularized { .. } | Self::Cancelled => {
                WarningCategory::Solve
            }
            Self::OptionAdjusted { .. } => WarningCategory::Options,
        }
    }

    /// Vertex this warning is about, if it concerns a single vertex.
    #[must_use]
    pub fn vertex(&self) -> Option<usize> {
        match self {
            Self::IsolatedVertex { vertex }
            | Self::NonManifoldVertex { vertex }
            | Self::InvalidPartition { vertex, .. }
            | Self::PinnedBoundaryVertex { vertex } => Some(*vertex),
            _ => None,
        }
    }
}

impl fmt::Display for FairWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IsolatedVertex { vertex } => {
                write!(f, "vertex {vertex} has no incident faces; excluded")
            }
            Self::DegenerateFace { face } => write!(f, "face {face} is degenerate; ignored"),
            Self::NonManifoldEdge { a, b, face_count } => {
                write!(f, "edge {a}-{b} is shared by {face_count} faces")
            }
            Self::NonManifoldVertex { vertex } => {
                write!(f, "vertex {vertex} joins separate fans; treated as boundary")
            }
            Self::InvalidPartition { vertex, reason } => {
                write!(f, "free vertex {vertex} dropped: {reason}")
            }
            Self::PinnedBoundaryVertex { vertex } => {
                write!(f, "free vertex {vertex} lies on the mesh boundary; pinned")
            }
            Self::SolveDegenerate {
                block,
                vertices,
                reason,
            } => write!(
                f,
                "block {block} ({} vertices) left unchanged: {reason}",
                vertices.len()
            ),
            Self::Regularized { block, lambda } => {
                write!(f, "block {block} regularized with lambda {lambda:e}")
            }
            Self::OptionAdjusted {
                option,
                value,
                replacement,
            } => write!(f, "option {option}={value} is invalid; using {replacement}"),
            Self::Cancelled => f.write_str("fairing cancelled; mesh left unchanged"),
        }
    }
}

/// Counters describing one fairing invocation.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FairDiagnostics {
    /// Free vertices requested by the caller (after de-duplication).
    pub requested_free_count: usize,
    /// Vertices actually given new positions.
    pub solved_vertex_count: usize,
    /// Requested vertices removed from the free set.
    pub dropped_vertex_count: usize,
    /// Vertices outside both lists that the operator read as constants.
    pub implicit_anchor_count: usize,

    pub block_count: usize,
    pub cholesky_block_count: usize,
    pub lu_block_count: usize,
    pub regularized_block_count: usize,
    pub degenerate_block_count: usize,

    pub relaxation_iterations: usize,
    /// Largest relative residual `|Ax - b| / (|A||x| + |b|)` over solved blocks.
    pub max_relative_residual: f64,

    pub non_manifold_edge_count: usize,
    pub boundary_loop_count: usize,

    pub cache_hits: usize,
    pub cache_misses: usize,

    /// Only populated when the `fair_metrics` feature is enabled.
    pub timing: Option<FairTimingReport>,
}

impl FairDiagnostics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// True when every requested vertex was solved directly.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.dropped_vertex_count == 0
            && self.regularized_block_count == 0
            && self.degenerate_block_count == 0
            && self.non_manifold_edge_count == 0
    }

    /// Sums counts and keeps the worse residual. Timing is not merged.
    pub fn merge(&mut self, other: &FairDiagnostics) {
        self.requested_free_count += other.requested_free_count;
        self.solved_vertex_count += other.solved_vertex_count;
        self.dropped_vertex_count += other.dropped_vertex_count;
        self.implicit_anchor_count += other.implicit_anchor_count;
        self.block_count += other.block_count;
        self.cholesky_block_count += other.cholesky_block_count;
        self.lu_block_count += other.lu_block_count;
        self.regularized_block_count += other.regularized_block_count;
        self.degenerate_block_count += other.degenerate_block_count;
        self.relaxation_iterations += other.relaxation_iterations;
        self.max_relative_residual = self.max_relative_residual.max(other.max_relative_residual);
        self.non_manifold_edge_count += other.non_manifold_edge_count;
        self.boundary_loop_count += other.boundary_loop_count;
        self.cache_hits += other.cache_hits;
        self.cache_misses += other.cache_misses;
    }

    /// Returns a short summary string suitable for logging.
    ///
    /// Format: `"free:{requested} solved:{solved} blocks:{blocks} [issues...]"`
    #[must_use]
    pub fn summary(&self) -> String {
        let mut parts = vec![format!(
            "free:{} solved:{} blocks:{}",
            self.requested_free_count, self.solved_vertex_count, self.block_count
        )];

        if self.cholesky_block_count > 0 {
            parts.push(format!("cholesky:{}", self.cholesky_block_count));
        }
        if self.lu_block_count > 0 {
            parts.push(format!("lu:{}", self.lu_block_count));
        }
        if self.regularized_block_count > 0 {
            parts.push(format!("regularized:{}", self.regularized_block_count));
        }
        if self.degenerate_block_count > 0 {
            parts.push(format!("degenerate:{}", self.degenerate_block_count));
        }
        if self.dropped_vertex_count > 0 {
            parts.push(format!("dropped:{}", self.dropped_vertex_count));
        }
        if self.relaxation_iterations > 0 {
            parts.push(format!("relax:{}", self.relaxation_iterations));
        }
        if self.non_manifold_edge_count > 0 {
            parts.push(format!("non-manifold:{}", self.non_manifold_edge_count));
        }

        parts.join(" ")
    }
}

impl fmt::Display for FairDiagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Fair Diagnostics:")?;
        writeln!(f, "  Requested free: {}", self.requested_free_count)?;
        writeln!(f, "  Solved: {}", self.solved_vertex_count)?;
        if self.dropped_vertex_count > 0 {
            writeln!(f, "  Dropped: {}", self.dropped_vertex_count)?;
        }
        if self.implicit_anchor_count > 0 {
            writeln!(f, "  Implicit anchors: {}", self.implicit_anchor_count)?;
        }

        if self.block_count > 0 {
            writeln!(f, "  Blocks: {}", self.block_count)?;
            writeln!(f, "    - Cholesky: {}", self.cholesky_block_count)?;
            writeln!(f, "    - LU: {}", self.lu_block_count)?;
            if self.regularized_block_count > 0 {
                writeln!(f, "    - Regularized: {}", self.regularized_block_count)?;
            }
            if self.degenerate_block_count > 0 {
                writeln!(f, "    - Degenerate: {}", self.degenerate_block_count)?;
            }
            writeln!(f, "  Max relative residual: {:e}", self.max_relative_residual)?;
        }

        if self.relaxation_iterations > 0 {
            writeln!(f, "  Relaxation iterations: {}", self.relaxation_iterations)?;
        }

        writeln!(f, "  Boundary loops: {}", self.boundary_loop_count)?;
        if self.non_manifold_edge_count > 0 {
            writeln!(f, "  Non-manifold edges: {}", self.non_manifold_edge_count)?;
        }

        if let Some(ref timing) = self.timing {
            writeln!(f, "  Timing: {} ms total", timing.total_ms())?;
        }

        let status = if self.is_clean() { "CLEAN" } else { "ISSUES DETECTED" };
        writeln!(f, "  Status: {status}")?;

        Ok(())
    }
}
