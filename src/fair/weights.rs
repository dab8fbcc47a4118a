//! Vertex and edge weighting schemes for the discrete Laplacian.
//!
//! The operator at a vertex is `L(v) = w_v * sum_n w_vn * (x_v - x_n)`.
//! With [`VertexWeight::Uniform`] and [`EdgeWeight::Uniform`] this is exactly
//! `x_v - mean(x_n)`. Weights are evaluated lazily from the positions the
//! cache was created with and memoized for the lifetime of the cache.

use std::collections::HashMap;
use std::f64::consts::FRAC_PI_2;

use serde::{Deserialize, Serialize};

use super::adjacency::AdjacencyModel;
use super::core::{Tolerance, corner_angle, corner_cotangent, polygon_area, triangle_area};
use super::Vec3;

/// Weight substituted for a vertex whose surrounding area vanishes.
pub const DEGENERATE_AREA_WEIGHT: f64 = 1e12;

/// Cotangent contribution of a corner whose angle is degenerate.
pub const DEGENERATE_COTANGENT: f64 = 1e-4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VertexWeight {
    /// `1 / valence`.
    #[default]
    Uniform,
    /// Inverse of the vertex's share of its incident face areas.
    Barycentric,
    /// Inverse of the mixed Voronoi area.
    Voronoi,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeWeight {
    #[default]
    Uniform,
    /// Half the sum of cotangents of the angles opposite the edge.
    Cotangent,
    /// Mean-value weights. Not symmetric in `(v, n)`.
    MeanValue,
}

impl EdgeWeight {
    /// True when `w_vn == w_nv` for every edge.
    #[must_use]
    pub const fn is_symmetric(self) -> bool {
        !matches!(self, Self::MeanValue)
    }
}

impl std::str::FromStr for VertexWeight {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uniform" => Ok(Self::Uniform),
            "barycentric" => Ok(Self::Barycentric),
            "voronoi" => Ok(Self::Voronoi),
            other => Err(format!("unknown vertex weight `{other}`")),
        }
    }
}

impl std::str::FromStr for EdgeWeight {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uniform" => Ok(Self::Uniform),
            "cotangent" | "cotan" => Ok(Self::Cotangent),
            "mean_value" | "mvc" => Ok(Self::MeanValue),
            other => Err(format!("unknown edge weight `{other}`")),
        }
    }
}

/// Lazily evaluated weights over one adjacency/positions pair.
#[derive(Debug)]
pub struct WeightCache<'a> {
    adjacency: &'a AdjacencyModel,
    positions: &'a [Vec3],
    vertex_scheme: VertexWeight,
    edge_scheme: EdgeWeight,
    vertex: HashMap<usize, f64>,
    edge: HashMap<(usize, usize), f64>,
}

impl<'a> WeightCache<'a> {
    #[must_use]
    pub fn new(
        adjacency: &'a AdjacencyModel,
        positions: &'a [Vec3],
        vertex_scheme: VertexWeight,
        edge_scheme: EdgeWeight,
    ) -> Self {
        Self {
            adjacency,
            positions,
            vertex_scheme,
            edge_scheme,
            vertex: HashMap::new(),
            edge: HashMap::new(),
        }
    }

    #[must_use]
    pub fn adjacency(&self) -> &'a AdjacencyModel {
        self.adjacency
    }

    #[must_use]
    pub fn positions(&self) -> &'a [Vec3] {
        self.positions
    }

    #[must_use]
    pub fn edge_scheme(&self) -> EdgeWeight {
        self.edge_scheme
    }

    pub fn vertex_weight(&mut self, v: usize) -> f64 {
        if let Some(&w) = self.vertex.get(&v) {
            return w;
        }
        let w = match self.vertex_scheme {
            VertexWeight::Uniform => {
                let valence = self.adjacency.vertex(v).valence();
                if valence == 0 { 0.0 } else { 1.0 / valence as f64 }
            }
            VertexWeight::Barycentric => inverse_area(self.barycentric_area(v)),
            VertexWeight::Voronoi => inverse_area(self.mixed_area(v)),
        };
        self.vertex.insert(v, w);
        w
    }

    /// Weight of the directed edge `v -> n`.
    pub fn edge_weight(&mut self, v: usize, n: usize) -> f64 {
        if let Some(&w) = self.edge.get(&(v, n)) {
            return w;
        }
        let w = match self.edge_scheme {
            EdgeWeight::Uniform => 1.0,
            EdgeWeight::Cotangent => self.cotangent_weight(v, n),
            EdgeWeight::MeanValue => self.mean_value_weight(v, n),
        };
        self.edge.insert((v, n), w);
        if self.edge_scheme.is_symmetric() {
            self.edge.insert((n, v), w);
        }
        w
    }

    /// Evaluates the weights of `vertices` and their outgoing edges up front.
    pub fn prefetch(&mut self, vertices: &[usize]) {
        let adjacency = self.adjacency;
        for &v in vertices {
            self.vertex_weight(v);
            for &n in adjacency.neighbors(v) {
                self.edge_weight(v, n);
            }
        }
    }

    fn face_points(&self, face: usize) -> Vec<Vec3> {
        self.adjacency
            .face(face)
            .iter()
            .map(|&i| self.positions[i])
            .collect()
    }

    fn barycentric_area(&self, v: usize) -> f64 {
        self.adjacency
            .faces_of(v)
            .map(|f| {
                let points = self.face_points(f);
                polygon_area(&points) / points.len() as f64
            })
            .sum()
    }

    fn mixed_area(&self, v: usize) -> f64 {
        let p = self.positions[v];
        self.adjacency
            .vertex(v)
            .corners
            .iter()
            .map(|corner| {
                if self.adjacency.face(corner.face).len() == 3 {
                    mixed_voronoi_area(p, self.positions[corner.next], self.positions[corner.prev])
                } else {
                    let points = self.face_points(corner.face);
                    polygon_area(&points) / points.len() as f64
                }
            })
            .sum()
    }

    /// Half the summed cotangents opposite `(v, n)`. In a polygon face every
    /// other face vertex sees the edge; their cotangents are averaged.
    fn cotangent_weight(&self, v: usize, n: usize) -> f64 {
        let xv = self.positions[v];
        let xn = self.positions[n];
        let sum: f64 = self
            .adjacency
            .edge_faces(v, n)
            .iter()
            .map(|&f| {
                let cotangents: Vec<f64> = self
                    .adjacency
                    .face(f)
                    .iter()
                    .filter(|&&i| i != v && i != n)
                    .map(|&i| corner_cotangent(self.positions[i], xv, xn).unwrap_or(DEGENERATE_COTANGENT))
                    .collect();
                if cotangents.is_empty() {
                    DEGENERATE_COTANGENT
                } else {
                    cotangents.iter().sum::<f64>() / cotangents.len() as f64
                }
            })
            .sum();
        0.5 * sum
    }

    fn mean_value_weight(&self, v: usize, n: usize) -> f64 {
        let xv = self.positions[v];
        let xn = self.positions[n];
        let faces = self.adjacency.edge_faces(v, n);
        let sum: f64 = self
            .adjacency
            .vertex(v)
            .corners
            .iter()
            .filter(|c| faces.contains(&c.face))
            .map(|c| {
                let other = if c.next == n { c.prev } else { c.next };
                corner_angle(xv, xn, self.positions[other]).map_or(0.0, |theta| (theta * 0.5).tan())
            })
            .sum();
        sum / xv.distance(xn).max(Tolerance::ZERO_LENGTH.eps)
    }
}

fn inverse_area(area: f64) -> f64 {
    if area > Tolerance::ZERO_LENGTH.eps {
        1.0 / area
    } else {
        DEGENERATE_AREA_WEIGHT
    }
}

/// Share of triangle `(p, a, b)` attributed to `p`.
///
/// The cell is bounded by the edge midpoints at `p` and a point `d`: the
/// circumcenter when the corner angle at `p` is acute, the midpoint of `ab`
/// otherwise. Only the angle at `p` decides; an obtuse angle elsewhere puts
/// `d` outside the triangle and the cell grows accordingly.
#[must_use]
pub fn mixed_voronoi_area(p: Vec3, a: Vec3, b: Vec3) -> f64 {
    let Some(at_p) = corner_angle(p, a, b) else {
        return 0.0;
    };
    let mid_ab = (a + b) * 0.5;
    let d = if at_p < FRAC_PI_2 {
        circumcenter(p, a, b).unwrap_or(mid_ab)
    } else {
        mid_ab
    };
    triangle_area(p, (p + a) * 0.5, d) + triangle_area(p, d, (p + b) * 0.5)
}

/// Circumcenter of `(p, a, b)`, `None` for collinear points.
fn circumcenter(p: Vec3, a: Vec3, b: Vec3) -> Option<Vec3> {
    let u = a - p;
    let v = b - p;
    let w = u.cross(v);
    let denom = 2.0 * w.length_squared();
    if denom <= Tolerance::ZERO_LENGTH.eps {
        return None;
    }
    Some(p + (v.cross(w) * u.length_squared() + w.cross(u) * v.length_squared()) / denom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fair::FairMesh;

    fn tri_fan() -> (AdjacencyModel, Vec<Vec3>) {
        // Regular hexagon fan around vertex 0.
        let mut positions = vec![[0.0, 0.0, 0.0]];
        for k in 0..6_i32 {
            let t = f64::from(k) * std::f64::consts::PI / 3.0;
            positions.push([t.cos(), t.sin(), 0.0]);
        }
        let faces = (0..6u32).map(|k| vec![0, 1 + k, 1 + (k + 1) % 6]).collect();
        let mesh = FairMesh::new(positions.clone(), faces);
        let adj = AdjacencyModel::build(&mesh).unwrap();
        (adj, positions.into_iter().map(Vec3::from).collect())
    }

    #[test]
    fn uniform_weights_are_inverse_valence() {
        let (adj, pos) = tri_fan();
        let mut cache = WeightCache::new(&adj, &pos, VertexWeight::Uniform, EdgeWeight::Uniform);
        assert!((cache.vertex_weight(0) - 1.0 / 6.0).abs() < 1e-12);
        assert!((cache.edge_weight(0, 1) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn cotangent_weight_of_equilateral_fan() {
        let (adj, pos) = tri_fan();
        let mut cache = WeightCache::new(&adj, &pos, VertexWeight::Voronoi, EdgeWeight::Cotangent);
        // Two 60 degree opposite angles: 0.5 * 2 * cot(60).
        let expected = (std::f64::consts::PI / 3.0).tan().recip();
        assert!((cache.edge_weight(0, 1) - expected).abs() < 1e-12);
        assert!((cache.edge_weight(1, 0) - expected).abs() < 1e-12);
    }

    #[test]
    fn cotangent_weight_on_unit_quads_is_one() {
        let mesh = FairMesh::quad_grid(3, 3);
        let adj = AdjacencyModel::build(&mesh).unwrap();
        let pos: Vec<Vec3> = mesh.positions.iter().copied().map(Vec3::from).collect();
        let mut cache = WeightCache::new(&adj, &pos, VertexWeight::Uniform, EdgeWeight::Cotangent);
        // Both far corners of each square see the edge under 45 degrees.
        assert!((cache.edge_weight(4, 1) - 1.0).abs() < 1e-12);
        assert!((cache.edge_weight(0, 1) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn voronoi_area_of_regular_hexagon_center() {
        let (adj, pos) = tri_fan();
        let mut cache = WeightCache::new(&adj, &pos, VertexWeight::Voronoi, EdgeWeight::Uniform);
        // Each equilateral triangle gives a third of its area.
        let tri = 3f64.sqrt() / 4.0;
        let expected = 1.0 / (6.0 * tri / 3.0);
        assert!((cache.vertex_weight(0) - expected).abs() < 1e-9);
    }

    #[test]
    fn voronoi_cell_follows_angle_at_vertex_only() {
        let p = Vec3::ZERO;
        let a = Vec3::new(1.0, 0.0, 0.0);
        let b = Vec3::new(1.3, 0.2, 0.0);
        // Acute at p, obtuse at a: the circumcenter lies outside the triangle.
        let center = circumcenter(p, a, b).unwrap();
        assert!((center.distance(p) - center.distance(a)).abs() < 1e-12);
        assert!((center.distance(p) - center.distance(b)).abs() < 1e-12);
        assert!((mixed_voronoi_area(p, a, b) - 0.593_125).abs() < 1e-9);

        // Right angle at p: the cell ends at the hypotenuse midpoint.
        let area = mixed_voronoi_area(p, a, Vec3::new(0.0, 1.0, 0.0));
        assert!((area - 0.25).abs() < 1e-12);
    }

    #[test]
    fn mean_value_is_not_symmetric_in_general() {
        let mesh = FairMesh::new(
            vec![[0.0, 0.0, 0.0], [2.0, 0.0, 0.0], [0.2, 1.0, 0.0]],
            vec![vec![0, 1, 2]],
        );
        let adj = AdjacencyModel::build(&mesh).unwrap();
        let pos: Vec<Vec3> = mesh.positions.iter().copied().map(Vec3::from).collect();
        let mut cache = WeightCache::new(&adj, &pos, VertexWeight::Uniform, EdgeWeight::MeanValue);
        let a = cache.edge_weight(0, 1);
        let b = cache.edge_weight(1, 0);
        assert!((a - b).abs() > 1e-3);
        assert!(!EdgeWeight::MeanValue.is_symmetric());
    }
}
