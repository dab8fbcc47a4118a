//! Discrete curvature measures used to judge how fair a region is.

use std::f64::consts::{PI, TAU};

use super::adjacency::AdjacencyModel;
use super::core::corner_angle;
use super::operator::{Continuity, OperatorAssembler};
use super::weights::{EdgeWeight, VertexWeight, WeightCache};
use super::Vec3;

/// Area-weighted vertex normal, `None` when every incident corner is degenerate.
#[must_use]
pub fn vertex_normal(adjacency: &AdjacencyModel, positions: &[Vec3], v: usize) -> Option<Vec3> {
    let p = positions[v];
    adjacency
        .vertex(v)
        .corners
        .iter()
        .fold(Vec3::ZERO, |acc, c| {
            acc + (positions[c.next] - p).cross(positions[c.prev] - p)
        })
        .normalized()
}

/// Signed mean curvature from the weighted Laplace-Beltrami operator.
///
/// Positive where the surface bends away from its normal (a convex,
/// outward-oriented surface). Zero for isolated vertices. Voronoi vertex and
/// cotangent edge weights give the classic discrete estimate; other schemes
/// measure the same quantity the fairing operator sees.
#[must_use]
pub fn mean_curvature(
    adjacency: &AdjacencyModel,
    positions: &[Vec3],
    v: usize,
    vertex_weight: VertexWeight,
    edge_weight: EdgeWeight,
) -> f64 {
    let neighbors = adjacency.neighbors(v);
    if neighbors.is_empty() {
        return 0.0;
    }
    let mut weights = WeightCache::new(adjacency, positions, vertex_weight, edge_weight);
    let w_v = weights.vertex_weight(v);
    let p = positions[v];
    let laplace = neighbors.iter().fold(Vec3::ZERO, |acc, &n| {
        acc + (positions[n] - p) * weights.edge_weight(v, n)
    }) * w_v;

    let magnitude = 0.5 * laplace.length();
    match vertex_normal(adjacency, positions, v) {
        Some(normal) if laplace.dot(normal) > 0.0 => -magnitude,
        _ => magnitude,
    }
}

/// `2π` (or `π` on an open boundary) minus the corner angles around `v`.
#[must_use]
pub fn angle_deficit(adjacency: &AdjacencyModel, positions: &[Vec3], v: usize) -> f64 {
    let vertex = adjacency.vertex(v);
    let full = if vertex.boundary { PI } else { TAU };
    let p = positions[v];
    let total: f64 = vertex
        .corners
        .iter()
        .filter_map(|c| corner_angle(p, positions[c.next], positions[c.prev]))
        .sum();
    full - total
}

/// Angle deficit scaled by the vertex weight (per unit mixed Voronoi area
/// with [`VertexWeight::Voronoi`]).
#[must_use]
pub fn gaussian_curvature(
    adjacency: &AdjacencyModel,
    positions: &[Vec3],
    v: usize,
    vertex_weight: VertexWeight,
) -> f64 {
    if adjacency.vertex(v).is_isolated() {
        return 0.0;
    }
    let mut weights = WeightCache::new(adjacency, positions, vertex_weight, EdgeWeight::Uniform);
    angle_deficit(adjacency, positions, v) * weights.vertex_weight(v)
}

/// Magnitude of `L^k(v)` under the given weighting; zero on a perfectly
/// fair surface.
#[must_use]
pub fn operator_residual(
    adjacency: &AdjacencyModel,
    positions: &[Vec3],
    v: usize,
    continuity: Continuity,
    vertex_weight: VertexWeight,
    edge_weight: EdgeWeight,
) -> f64 {
    let mut weights = WeightCache::new(adjacency, positions, vertex_weight, edge_weight);
    let mut assembler = OperatorAssembler::new(&mut weights);
    assembler.row(v, continuity).apply_unscaled(positions).length()
}
