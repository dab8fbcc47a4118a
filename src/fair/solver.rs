//! Direct sparse solves with a regularization fallback.
//!
//! Per block, in order:
//! 1. Symmetric blocks try a sparse Cholesky factorization (reusing a cached
//!    symbolic analysis when one is supplied) and reject tiny pivots.
//! 2. Asymmetric blocks, or symmetric ones Cholesky rejected, use a general
//!    sparse LU.
//! 3. Any failure (factorization error, non-finite output, residual above
//!    tolerance) retries once on `A + lambda I`, `b + lambda x0`, with
//!    `lambda = regularization_scale * max|diag(A)|`. The result is accepted
//!    only if it also satisfies the unshifted system within tolerance.
//! 4. If that fails too the caller leaves the block unchanged.
//!
//! Blocks without any constant coupling are rank deficient; they skip step 1-2
//! and are only solved (regularized) when explicitly allowed.

use std::time::{Duration, Instant};

use faer::Mat;
use faer::prelude::Solve;
use faer::sparse::{SparseColMat, Triplet};
use nalgebra::DMatrix;
use nalgebra_sparse::CscMatrix;
use nalgebra_sparse::factorization::{CscCholesky, CscSymbolicCholesky};
use serde::Serialize;

use super::progress::CancelToken;
use super::system::{SystemBlock, diagonal_entries, relative_residual, shift_diagonal};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SolvePath {
    Cholesky,
    Lu,
}

#[derive(Debug, Clone)]
pub struct BlockSolution {
    /// `n x 3` new positions, one row per block vertex.
    pub positions: DMatrix<f64>,
    pub path: SolvePath,
    pub relative_residual: f64,
    /// Diagonal shift applied, if the block needed regularization.
    pub lambda: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SolveError {
    #[error("block has no fixed coupling and is rank deficient")]
    Unanchored,
    #[error("{method} factorization failed: {reason}")]
    Factorization { method: &'static str, reason: String },
    #[error("pivot {pivot:e} at column {column} is below the singularity threshold")]
    SingularPivot { column: usize, pivot: f64 },
    #[error("solution contains non-finite values")]
    NonFinite,
    #[error("relative residual {residual:e} exceeds tolerance {tolerance:e}")]
    ResidualTooLarge { residual: f64, tolerance: f64 },
    #[error("time budget of {budget:?} exceeded")]
    TimeBudgetExceeded { budget: Duration },
    #[error("cancelled")]
    Cancelled,
}

impl SolveError {
    /// Errors that must not trigger the regularization retry.
    #[must_use]
    pub fn is_abort(&self) -> bool {
        matches!(self, Self::TimeBudgetExceeded { .. } | Self::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverSettings {
    pub singularity_epsilon: f64,
    pub regularization_scale: f64,
    pub residual_tolerance: f64,
    pub time_budget: Option<Duration>,
    pub regularize_unanchored: bool,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            singularity_epsilon: 1e-12,
            regularization_scale: 1e-8,
            residual_tolerance: 1e-6,
            time_budget: None,
            regularize_unanchored: false,
        }
    }
}

struct Budget {
    start: Instant,
    limit: Option<Duration>,
}

impl Budget {
    fn start(limit: Option<Duration>) -> Self {
        Self {
            start: Instant::now(),
            limit,
        }
    }

    fn check(&self, cancel: &CancelToken) -> Result<(), SolveError> {
        if cancel.is_cancelled() {
            return Err(SolveError::Cancelled);
        }
        match self.limit {
            Some(budget) if self.start.elapsed() > budget => {
                Err(SolveError::TimeBudgetExceeded { budget })
            }
            _ => Ok(()),
        }
    }
}

/// Solves one block.
///
/// # Errors
/// Returns the last [`SolveError`] when neither the direct nor the
/// regularized solve produced an acceptable solution.
pub fn solve_block(
    block: &SystemBlock,
    settings: &SolverSettings,
    symbolic: Option<&CscSymbolicCholesky>,
    cancel: &CancelToken,
) -> Result<BlockSolution, SolveError> {
    let budget = Budget::start(settings.time_budget);
    budget.check(cancel)?;

    if !block.anchored {
        if !settings.regularize_unanchored {
            return Err(SolveError::Unanchored);
        }
        return solve_regularized(block, settings, symbolic, &budget, cancel);
    }

    match solve_direct(&block.matrix, &block.rhs, block.symmetric, settings, symbolic, &budget, cancel) {
        Ok((positions, path, residual)) => {
            budget.check(cancel)?;
            log::debug!(
                "block {} ({} vertices) solved via {:?}, residual {:e}",
                block.index,
                block.len(),
                path,
                residual
            );
            return Ok(BlockSolution {
                positions,
                path,
                relative_residual: residual,
                lambda: None,
            });
        }
        Err(err) if err.is_abort() => return Err(err),
        Err(err) => {
            log::debug!("block {} direct solve failed: {err}; regularizing", block.index);
        }
    }

    budget.check(cancel)?;
    solve_regularized(block, settings, symbolic, &budget, cancel)
}

fn solve_regularized(
    block: &SystemBlock,
    settings: &SolverSettings,
    symbolic: Option<&CscSymbolicCholesky>,
    budget: &Budget,
    cancel: &CancelToken,
) -> Result<BlockSolution, SolveError> {
    let max_diag = block.max_abs_diagonal();
    let lambda = settings.regularization_scale * if max_diag > 0.0 { max_diag } else { 1.0 };
    let shifted = shift_diagonal(&block.matrix, lambda);
    let rhs = &block.rhs + &block.initial * lambda;

    let (positions, path, _) =
        solve_direct(&shifted, &rhs, block.symmetric, settings, symbolic, budget, cancel)?;
    budget.check(cancel)?;
    // The shifted solve must still satisfy the unshifted equations.
    let residual = accept(&block.matrix, &positions, &block.rhs, settings.residual_tolerance)?;
    log::warn!(
        "block {} ({} vertices) solved with regularization lambda {:e}",
        block.index,
        block.len(),
        lambda
    );
    Ok(BlockSolution {
        positions,
        path,
        relative_residual: residual,
        lambda: Some(lambda),
    })
}

fn solve_direct(
    matrix: &CscMatrix<f64>,
    rhs: &DMatrix<f64>,
    symmetric: bool,
    settings: &SolverSettings,
    symbolic: Option<&CscSymbolicCholesky>,
    budget: &Budget,
    cancel: &CancelToken,
) -> Result<(DMatrix<f64>, SolvePath, f64), SolveError> {
    if symmetric {
        let attempt = solve_cholesky(matrix, rhs, settings.singularity_epsilon, symbolic)
            .and_then(|x| accept(matrix, &x, rhs, settings.residual_tolerance).map(|r| (x, r)));
        match attempt {
            Ok((x, residual)) => return Ok((x, SolvePath::Cholesky, residual)),
            Err(err) => log::debug!("cholesky rejected: {err}; trying LU"),
        }
        budget.check(cancel)?;
    }

    let x = solve_lu(matrix, rhs)?;
    let residual = accept(matrix, &x, rhs, settings.residual_tolerance)?;
    Ok((x, SolvePath::Lu, residual))
}

/// Checks finiteness and the relative residual.
fn accept(
    matrix: &CscMatrix<f64>,
    x: &DMatrix<f64>,
    rhs: &DMatrix<f64>,
    tolerance: f64,
) -> Result<f64, SolveError> {
    if x.iter().any(|v| !v.is_finite()) {
        return Err(SolveError::NonFinite);
    }
    let residual = relative_residual(matrix, x, rhs);
    if !residual.is_finite() || residual > tolerance {
        return Err(SolveError::ResidualTooLarge {
            residual,
            tolerance,
        });
    }
    Ok(residual)
}

fn solve_cholesky(
    matrix: &CscMatrix<f64>,
    rhs: &DMatrix<f64>,
    epsilon: f64,
    symbolic: Option<&CscSymbolicCholesky>,
) -> Result<DMatrix<f64>, SolveError> {
    let factor = match symbolic {
        Some(symbolic) => CscCholesky::factor_numerical(symbolic.clone(), matrix.values()),
        None => CscCholesky::factor(matrix),
    }
    .map_err(|err| SolveError::Factorization {
        method: "cholesky",
        reason: format!("{err:?}"),
    })?;

    let max_diag = diagonal_entries(matrix)
        .into_iter()
        .fold(0.0_f64, |acc, d| acc.max(d.abs()));
    let threshold = epsilon * max_diag.max(f64::MIN_POSITIVE);
    for (column, pivot) in diagonal_entries(factor.l()).into_iter().enumerate() {
        let pivot = pivot * pivot;
        if pivot.is_nan() || pivot <= threshold {
            return Err(SolveError::SingularPivot { column, pivot });
        }
    }

    Ok(factor.solve(rhs))
}

fn solve_lu(matrix: &CscMatrix<f64>, rhs: &DMatrix<f64>) -> Result<DMatrix<f64>, SolveError> {
    let n = matrix.nrows();
    let mut triplets = Vec::with_capacity(matrix.nnz());
    for (j, col) in matrix.col_iter().enumerate() {
        for (&i, &v) in col.row_indices().iter().zip(col.values()) {
            triplets.push(Triplet::new(i, j, v));
        }
    }

    let a = SparseColMat::<usize, f64>::try_new_from_triplets(n, n, &triplets).map_err(|err| {
        SolveError::Factorization {
            method: "lu",
            reason: format!("{err:?}"),
        }
    })?;
    let lu = a.as_ref().sp_lu().map_err(|err| SolveError::Factorization {
        method: "lu",
        reason: format!("{err:?}"),
    })?;

    let b = Mat::<f64>::from_fn(n, rhs.ncols(), |i, j| rhs[(i, j)]);
    let x = lu.solve(b.as_ref());
    Ok(DMatrix::from_fn(n, rhs.ncols(), |i, j| *x.get(i, j)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra_sparse::CooMatrix;

    fn block_from(entries: &[(usize, usize, f64)], n: usize, rhs: DMatrix<f64>, symmetric: bool) -> SystemBlock {
        let mut coo = CooMatrix::new(n, n);
        for &(i, j, v) in entries {
            coo.push(i, j, v);
        }
        SystemBlock {
            index: 0,
            vertices: (0..n).collect(),
            matrix: CscMatrix::from(&coo),
            initial: DMatrix::zeros(n, 3),
            rhs,
            anchored: true,
            symmetric,
        }
    }

    #[test]
    fn spd_system_uses_cholesky() {
        let rhs = DMatrix::from_row_slice(2, 3, &[1.0, 0.0, 2.0, 1.0, 3.0, 0.0]);
        let block = block_from(&[(0, 0, 2.0), (0, 1, -1.0), (1, 0, -1.0), (1, 1, 2.0)], 2, rhs.clone(), true);
        let solution = solve_block(&block, &SolverSettings::default(), None, &CancelToken::new()).unwrap();
        assert_eq!(solution.path, SolvePath::Cholesky);
        assert!(solution.lambda.is_none());
        let back = block.multiply(&solution.positions);
        assert!((back - rhs).norm() < 1e-12);
    }

    #[test]
    fn asymmetric_system_uses_lu() {
        let rhs = DMatrix::from_row_slice(2, 3, &[1.0, 1.0, 1.0, 0.0, 2.0, 4.0]);
        let block = block_from(&[(0, 0, 3.0), (0, 1, -1.0), (1, 0, -2.0), (1, 1, 4.0)], 2, rhs.clone(), false);
        let solution = solve_block(&block, &SolverSettings::default(), None, &CancelToken::new()).unwrap();
        assert_eq!(solution.path, SolvePath::Lu);
        assert!((block.multiply(&solution.positions) - rhs).norm() < 1e-12);
    }

    #[test]
    fn indefinite_symmetric_falls_back_to_lu() {
        let rhs = DMatrix::from_row_slice(2, 3, &[1.0, 0.0, 0.0, 0.0, 1.0, 0.0]);
        let block = block_from(&[(0, 0, 1.0), (0, 1, 2.0), (1, 0, 2.0), (1, 1, 1.0)], 2, rhs, true);
        let solution = solve_block(&block, &SolverSettings::default(), None, &CancelToken::new()).unwrap();
        assert_eq!(solution.path, SolvePath::Lu);
    }

    #[test]
    fn unanchored_block_is_rejected_unless_allowed() {
        let mut block = block_from(&[(0, 0, 1.0), (0, 1, -1.0), (1, 0, -1.0), (1, 1, 1.0)], 2, DMatrix::zeros(2, 3), true);
        block.anchored = false;
        block.initial = DMatrix::from_row_slice(2, 3, &[0.0, 0.0, 0.0, 2.0, 0.0, 0.0]);

        let err = solve_block(&block, &SolverSettings::default(), None, &CancelToken::new()).unwrap_err();
        assert_eq!(err, SolveError::Unanchored);

        let settings = SolverSettings {
            regularize_unanchored: true,
            ..SolverSettings::default()
        };
        let solution = solve_block(&block, &settings, None, &CancelToken::new()).unwrap();
        assert!(solution.lambda.is_some());
        // Collapses towards the mean of the initial positions.
        assert!((solution.positions[(0, 0)] - 1.0).abs() < 1e-6);
        assert!((solution.positions[(1, 0)] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn singular_anchored_block_regularizes_or_fails() {
        // Zero row with a nonzero right-hand side: the regularized solve is
        // exact for the shifted system but violates the original one.
        let rhs = DMatrix::from_row_slice(1, 3, &[1.0, 0.0, 0.0]);
        let block = block_from(&[(0, 0, 0.0)], 1, rhs, true);
        let result = solve_block(&block, &SolverSettings::default(), None, &CancelToken::new());
        assert!(result.is_err());
    }

    #[test]
    fn exhausted_budget_rejects_an_otherwise_valid_solution() {
        let rhs = DMatrix::from_row_slice(2, 3, &[1.0, 0.0, 2.0, 1.0, 3.0, 0.0]);
        let block = block_from(&[(0, 0, 2.0), (0, 1, -1.0), (1, 0, -1.0), (1, 1, 2.0)], 2, rhs, true);
        let settings = SolverSettings {
            time_budget: Some(Duration::ZERO),
            ..SolverSettings::default()
        };
        let err = solve_block(&block, &settings, None, &CancelToken::new()).unwrap_err();
        assert_eq!(err, SolveError::TimeBudgetExceeded { budget: Duration::ZERO });
        assert!(err.is_abort());
    }

    #[test]
    fn cancelled_token_aborts_before_work() {
        let rhs = DMatrix::from_row_slice(1, 3, &[1.0, 0.0, 0.0]);
        let block = block_from(&[(0, 0, 1.0)], 1, rhs, true);
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = solve_block(&block, &SolverSettings::default(), None, &cancel).unwrap_err();
        assert_eq!(err, SolveError::Cancelled);
    }
}
