mod adjacency;
mod cache;
mod core;
mod curvature;
mod diagnostics;
mod fairing;
mod mesh;
mod metrics;
mod operator;
mod partition;
mod progress;
mod region;
mod relax;
mod solver;
mod system;
mod weights;

pub use self::core::{
    Tolerance, Vec3, centroid, corner_angle, corner_cotangent, polygon_area, triangle_area,
};
pub use adjacency::{AdjacencyModel, BoundaryLoop, Corner, VertexAdjacency};
pub use cache::{FactorizationCache, FactorizationCacheStats, pattern_fingerprint};
pub use curvature::{
    angle_deficit, gaussian_curvature, mean_curvature, operator_residual, vertex_normal,
};
pub use diagnostics::{FairDiagnostics, FairWarning, PartitionIssue, WarningCategory};
pub use fairing::{
    FairContext, FairOptions, FairingResult, SmoothStrategy, build_adjacency, fair,
    fair_with_context,
};
pub use mesh::{FairError, FairMesh, MeshAccess, MeshAccessMut};
pub use metrics::{FairMetrics, FairTimingReport, TimingBucket};
pub use operator::{Continuity, OperatorAssembler, OperatorRow};
pub use partition::VertexPartition;
pub use progress::{CancelToken, Progress};
pub use region::{
    RegionSelection, boundary_faces, closed_neighborhood, involved_faces,
    partition_from_selection, select_by_mask,
};
pub use relax::{RelaxOptions, RelaxOutcome, relax};
pub use solver::{BlockSolution, SolveError, SolvePath, SolverSettings, solve_block};
pub use system::{LinearSystem, SystemBlock, diagonal_entries, multiply, relative_residual, shift_diagonal};
pub use weights::{
    DEGENERATE_AREA_WEIGHT, DEGENERATE_COTANGENT, EdgeWeight, VertexWeight, WeightCache,
    mixed_voronoi_area,
};

#[cfg(test)]
mod tests;
