//! Assembly of operator rows into independent sparse blocks.
//!
//! Free vertices get columns in ascending vertex order. Terms on free vertices
//! become matrix entries; terms on any other vertex are multiplied by that
//! vertex's current position and moved to the right-hand side. The matrix is
//! then split into connected components, each solved on its own with one
//! coefficient matrix and three right-hand-side columns (x, y, z).

use std::collections::{BTreeMap, BTreeSet, HashMap};

use nalgebra::DMatrix;
use nalgebra_sparse::pattern::SparsityPattern;
use nalgebra_sparse::{CooMatrix, CscMatrix};

use super::Vec3;
use super::core::Tolerance;
use super::operator::OperatorRow;
use super::partition::VertexPartition;

/// One connected component of the free system.
#[derive(Debug, Clone)]
pub struct SystemBlock {
    pub index: usize,
    /// Mesh vertex per local column, ascending.
    pub vertices: Vec<usize>,
    pub matrix: CscMatrix<f64>,
    /// `n x 3` right-hand side.
    pub rhs: DMatrix<f64>,
    /// `n x 3` positions before solving.
    pub initial: DMatrix<f64>,
    /// At least one row folds a constant into the right-hand side.
    pub anchored: bool,
    pub symmetric: bool,
}

impl SystemBlock {
    #[must_use]
    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    #[must_use]
    pub fn pattern(&self) -> &SparsityPattern {
        self.matrix.pattern()
    }

    #[must_use]
    pub fn max_abs_diagonal(&self) -> f64 {
        diagonal_entries(&self.matrix)
            .into_iter()
            .fold(0.0, |acc, d| acc.max(d.abs()))
    }

    /// Computes `A * x` for an `n x k` dense `x`.
    #[must_use]
    pub fn multiply(&self, x: &DMatrix<f64>) -> DMatrix<f64> {
        multiply(&self.matrix, x)
    }

    /// `|A x - b| / (|A| |x| + |b|)`, Frobenius norms and the max absolute
    /// column sum for `|A|`.
    #[must_use]
    pub fn relative_residual(&self, x: &DMatrix<f64>) -> f64 {
        relative_residual(&self.matrix, x, &self.rhs)
    }
}

/// All blocks of one assembled system.
#[derive(Debug, Clone, Default)]
pub struct LinearSystem {
    pub blocks: Vec<SystemBlock>,
    /// Vertices read as constants that are neither free nor fixed.
    pub implicit_anchors: Vec<usize>,
}

impl LinearSystem {
    /// Builds blocks from `rows`, one per free vertex of `partition` in order.
    #[must_use]
    pub fn assemble(rows: &[OperatorRow], partition: &VertexPartition, positions: &[Vec3]) -> Self {
        let free = partition.free();
        debug_assert_eq!(rows.len(), free.len());
        let column: HashMap<usize, usize> = free.iter().enumerate().map(|(i, &v)| (v, i)).collect();

        let mut components = UnionFind::new(free.len());
        let mut split_rows = Vec::with_capacity(rows.len());
        let mut implicit = BTreeSet::new();

        for (i, row) in rows.iter().enumerate() {
            let (free_terms, constant_terms) = row.split(|u| partition.is_free(u));
            for &(u, _) in &free_terms {
                components.union(i, column[&u]);
            }
            for &(u, c) in &constant_terms {
                if c != 0.0 && !partition.is_fixed(u) {
                    implicit.insert(u);
                }
            }
            split_rows.push((free_terms, constant_terms));
        }

        let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for i in 0..free.len() {
            groups.entry(components.find(i)).or_default().push(i);
        }

        let mut ordered: Vec<Vec<usize>> = groups.into_values().collect();
        ordered.sort_by_key(|cols| cols[0]);

        let blocks = ordered
            .into_iter()
            .enumerate()
            .map(|(index, cols)| build_block(index, &cols, free, &column, &split_rows, positions))
            .collect();

        Self {
            blocks,
            implicit_anchors: implicit.into_iter().collect(),
        }
    }

    #[must_use]
    pub fn column_count(&self) -> usize {
        self.blocks.iter().map(SystemBlock::len).sum()
    }
}

type SplitRow = (Vec<(usize, f64)>, Vec<(usize, f64)>);

fn build_block(
    index: usize,
    cols: &[usize],
    free: &[usize],
    column: &HashMap<usize, usize>,
    split_rows: &[SplitRow],
    positions: &[Vec3],
) -> SystemBlock {
    let n = cols.len();
    let local: HashMap<usize, usize> = cols.iter().enumerate().map(|(l, &g)| (g, l)).collect();

    let mut entries: BTreeMap<(usize, usize), f64> = BTreeMap::new();
    let mut rhs = DMatrix::<f64>::zeros(n, 3);
    let mut initial = DMatrix::<f64>::zeros(n, 3);
    let mut anchored = false;

    for (li, &gi) in cols.iter().enumerate() {
        let (free_terms, constant_terms) = &split_rows[gi];
        entries.entry((li, li)).or_insert(0.0);
        for &(u, c) in free_terms {
            let lj = local[&column[&u]];
            *entries.entry((li, lj)).or_insert(0.0) += c;
        }
        for &(u, c) in constant_terms {
            if c == 0.0 {
                continue;
            }
            anchored = true;
            let p = positions[u];
            for axis in 0..3 {
                rhs[(li, axis)] -= c * p.axis(axis);
            }
        }
        let p = positions[free[gi]];
        for axis in 0..3 {
            initial[(li, axis)] = p.axis(axis);
        }
    }

    let symmetric = is_symmetric(&entries);

    let mut coo = CooMatrix::new(n, n);
    for (&(i, j), &v) in &entries {
        coo.push(i, j, v);
    }
    let matrix = CscMatrix::from(&coo);

    SystemBlock {
        index,
        vertices: cols.iter().map(|&g| free[g]).collect(),
        matrix,
        rhs,
        initial,
        anchored,
        symmetric,
    }
}

fn is_symmetric(entries: &BTreeMap<(usize, usize), f64>) -> bool {
    let scale = entries.values().fold(0.0_f64, |acc, v| acc.max(v.abs())).max(1.0);
    let tol = Tolerance::SYMMETRY.eps * scale;
    entries.iter().all(|(&(i, j), &v)| {
        if i == j {
            return true;
        }
        let mirror = entries.get(&(j, i)).copied().unwrap_or(0.0);
        (v - mirror).abs() <= tol
    })
}

/// Diagonal of a square CSC matrix (zero where not stored).
#[must_use]
pub fn diagonal_entries(matrix: &CscMatrix<f64>) -> Vec<f64> {
    let mut diag = vec![0.0; matrix.ncols()];
    for (j, col) in matrix.col_iter().enumerate() {
        for (&i, &v) in col.row_indices().iter().zip(col.values()) {
            if i == j {
                diag[j] += v;
            }
        }
    }
    diag
}

/// Same pattern, `lambda` added to every diagonal entry. The diagonal must be
/// stored explicitly.
#[must_use]
pub fn shift_diagonal(matrix: &CscMatrix<f64>, lambda: f64) -> CscMatrix<f64> {
    let mut shifted = matrix.clone();
    let offsets = shifted.col_offsets().to_vec();
    let rows = shifted.row_indices().to_vec();
    let values = shifted.values_mut();
    for j in 0..offsets.len().saturating_sub(1) {
        for idx in offsets[j]..offsets[j + 1] {
            if rows[idx] == j {
                values[idx] += lambda;
            }
        }
    }
    shifted
}

#[must_use]
pub fn multiply(matrix: &CscMatrix<f64>, x: &DMatrix<f64>) -> DMatrix<f64> {
    let mut out = DMatrix::<f64>::zeros(matrix.nrows(), x.ncols());
    for (j, col) in matrix.col_iter().enumerate() {
        for (&i, &v) in col.row_indices().iter().zip(col.values()) {
            for k in 0..x.ncols() {
                out[(i, k)] += v * x[(j, k)];
            }
        }
    }
    out
}

#[must_use]
pub fn relative_residual(matrix: &CscMatrix<f64>, x: &DMatrix<f64>, rhs: &DMatrix<f64>) -> f64 {
    let residual = (multiply(matrix, x) - rhs).norm();
    let a_norm = matrix
        .col_iter()
        .map(|col| col.values().iter().map(|v| v.abs()).sum::<f64>())
        .fold(0.0, f64::max);
    let denominator = a_norm * x.norm() + rhs.norm();
    if denominator > 0.0 {
        residual / denominator
    } else {
        residual
    }
}

/// Disjoint-set forest over column indices.
#[derive(Debug)]
struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, mut i: usize) -> usize {
        while self.parent[i] != i {
            self.parent[i] = self.parent[self.parent[i]];
            i = self.parent[i];
        }
        i
    }

    fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[hi] = lo;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fair::{
        AdjacencyModel, Continuity, EdgeWeight, FairMesh, OperatorAssembler, VertexWeight,
        WeightCache,
    };

    fn assemble(mesh: &FairMesh, free: &[usize], fixed: &[usize], continuity: Continuity) -> LinearSystem {
        let adj = AdjacencyModel::build(mesh).unwrap();
        let pos: Vec<Vec3> = mesh.positions.iter().copied().map(Vec3::from).collect();
        let (partition, _) = VertexPartition::resolve(&adj, free, fixed, true);
        let mut weights = WeightCache::new(&adj, &pos, VertexWeight::Uniform, EdgeWeight::Uniform);
        let rows = OperatorAssembler::new(&mut weights).rows(partition.free(), continuity);
        LinearSystem::assemble(&rows, &partition, &pos)
    }

    #[test]
    fn interior_block_is_symmetric_and_anchored() {
        let mesh = FairMesh::quad_grid(5, 5);
        let free = [6, 7, 8, 11, 12, 13, 16, 17, 18];
        let fixed = [0, 1, 2, 3, 4, 5, 9, 10, 14, 15, 19, 20, 21, 22, 23, 24];
        let system = assemble(&mesh, &free, &fixed, Continuity::Pos);
        assert_eq!(system.blocks.len(), 1);
        let block = &system.blocks[0];
        assert_eq!(block.vertices, free.to_vec());
        assert!(block.symmetric);
        assert!(block.anchored);
        assert!(system.implicit_anchors.is_empty());
        assert!((block.max_abs_diagonal() - 4.0).abs() < 1e-12);
        // Exact solution is the current flat grid.
        assert!(block.relative_residual(&block.initial) < 1e-14);
    }

    #[test]
    fn separated_regions_form_separate_blocks() {
        let mesh = FairMesh::quad_grid(9, 3);
        let system = assemble(&mesh, &[10, 16], &[], Continuity::Pos);
        assert_eq!(system.blocks.len(), 2);
        assert_eq!(system.blocks[0].vertices, vec![10]);
        assert_eq!(system.blocks[1].vertices, vec![16]);
        // Nothing was listed fixed: the surrounding ring anchors implicitly.
        assert_eq!(system.implicit_anchors.len(), 8);
    }

    #[test]
    fn shift_diagonal_keeps_pattern() {
        let mesh = FairMesh::quad_grid(4, 4);
        let system = assemble(&mesh, &[5, 6, 9, 10], &[], Continuity::Pos);
        let block = &system.blocks[0];
        let shifted = shift_diagonal(&block.matrix, 0.5);
        assert_eq!(shifted.pattern(), block.matrix.pattern());
        let before = diagonal_entries(&block.matrix);
        let after = diagonal_entries(&shifted);
        for (a, b) in before.iter().zip(&after) {
            assert!((b - a - 0.5).abs() < 1e-15);
        }
    }
}
