//! Differential operator rows per continuity order.
//!
//! A first-order row is the weighted Laplacian
//! `L(u) = w_u * sum_n w_un * (x_u - x_n)`. Higher orders compose it: the
//! coefficients of `L^k(v)` are obtained by expanding `L` over every vertex
//! that `L^(k-1)(v)` references. Rows are finally divided by `w_v`; the
//! equation `L^k(v) = 0` is unchanged, but for symmetric edge weights the
//! resulting matrix `K W K ...` is symmetric.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use super::Vec3;
use super::weights::WeightCache;

/// Continuity enforced across the fixed boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Continuity {
    /// First order, solved by relaxation unless a direct solve is requested.
    Smooth,
    /// Positional: `L(v) = 0`.
    Pos,
    /// Tangent: `L(L(v)) = 0`.
    #[default]
    Tan,
    /// Curvature: `L(L(L(v))) = 0`.
    Curv,
}

impl Continuity {
    pub const ALL: [Self; 4] = [Self::Smooth, Self::Pos, Self::Tan, Self::Curv];

    /// Number of Laplacian compositions.
    #[must_use]
    pub const fn order(self) -> usize {
        match self {
            Self::Smooth | Self::Pos => 1,
            Self::Tan => 2,
            Self::Curv => 3,
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Smooth => "smooth",
            Self::Pos => "pos",
            Self::Tan => "tan",
            Self::Curv => "curv",
        }
    }
}

impl fmt::Display for Continuity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Continuity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "smooth" | "0" => Ok(Self::Smooth),
            "pos" | "position" | "1" => Ok(Self::Pos),
            "tan" | "tangent" | "2" => Ok(Self::Tan),
            "curv" | "curvature" | "3" => Ok(Self::Curv),
            other => Err(format!("unknown continuity `{other}`")),
        }
    }
}

/// Coefficients of one free vertex's equation, keyed by vertex index.
#[derive(Debug, Clone, PartialEq)]
pub struct OperatorRow {
    pub vertex: usize,
    /// The `w_v` the row was divided by.
    pub scale: f64,
    pub coefficients: BTreeMap<usize, f64>,
}

impl OperatorRow {
    /// Splits coefficients into matrix terms (`is_free`) and constant terms.
    #[must_use]
    pub fn split(&self, is_free: impl Fn(usize) -> bool) -> (Vec<(usize, f64)>, Vec<(usize, f64)>) {
        self.coefficients
            .iter()
            .map(|(&u, &c)| (u, c))
            .partition(|&(u, _)| is_free(u))
    }

    /// Evaluates the normalized row against `positions`.
    #[must_use]
    pub fn apply(&self, positions: &[Vec3]) -> Vec3 {
        self.coefficients
            .iter()
            .fold(Vec3::ZERO, |acc, (&u, &c)| acc + positions[u] * c)
    }

    /// Evaluates `L^k(v)` itself, undoing the normalization.
    #[must_use]
    pub fn apply_unscaled(&self, positions: &[Vec3]) -> Vec3 {
        self.apply(positions) * self.scale
    }
}

/// Builds operator rows, memoizing first-order rows across compositions.
#[derive(Debug)]
pub struct OperatorAssembler<'w, 'a> {
    weights: &'w mut WeightCache<'a>,
    first_order: HashMap<usize, Vec<(usize, f64)>>,
}

impl<'w, 'a> OperatorAssembler<'w, 'a> {
    pub fn new(weights: &'w mut WeightCache<'a>) -> Self {
        Self {
            weights,
            first_order: HashMap::new(),
        }
    }

    /// Coefficients of `L(u)`. Empty for vertices without neighbours.
    pub fn laplacian_row(&mut self, u: usize) -> &[(usize, f64)] {
        if !self.first_order.contains_key(&u) {
            let row = self.compute_laplacian_row(u);
            self.first_order.insert(u, row);
        }
        &self.first_order[&u]
    }

    fn compute_laplacian_row(&mut self, u: usize) -> Vec<(usize, f64)> {
        let adjacency = self.weights.adjacency();
        let neighbors = adjacency.neighbors(u);
        if neighbors.is_empty() {
            return Vec::new();
        }
        let w_u = self.weights.vertex_weight(u);
        let mut row = Vec::with_capacity(neighbors.len() + 1);
        let mut diagonal = 0.0;
        for &n in neighbors {
            let w_un = self.weights.edge_weight(u, n);
            diagonal += w_un;
            row.push((n, -w_u * w_un));
        }
        row.push((u, w_u * diagonal));
        row
    }

    /// Composed row of `L^order(v)`, normalized by `w_v`.
    pub fn row(&mut self, v: usize, continuity: Continuity) -> OperatorRow {
        let mut current: BTreeMap<usize, f64> = BTreeMap::from([(v, 1.0)]);
        for _ in 0..continuity.order() {
            let mut next: BTreeMap<usize, f64> = BTreeMap::new();
            for (&u, &cu) in &current {
                for &(t, w) in self.laplacian_row(u) {
                    *next.entry(t).or_insert(0.0) += cu * w;
                }
            }
            current = next;
        }

        let scale = self.weights.vertex_weight(v);
        if scale != 0.0 && scale.is_finite() {
            for c in current.values_mut() {
                *c /= scale;
            }
        }
        current.retain(|&u, c| u == v || *c != 0.0);
        current.entry(v).or_insert(0.0);

        OperatorRow {
            vertex: v,
            scale,
            coefficients: current,
        }
    }

    /// Rows for `vertices`, in the given order.
    pub fn rows(&mut self, vertices: &[usize], continuity: Continuity) -> Vec<OperatorRow> {
        vertices.iter().map(|&v| self.row(v, continuity)).collect()
    }
}
