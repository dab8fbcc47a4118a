//! Relaxation smoothing for the SMOOTH continuity order.
//!
//! Each iteration moves every free vertex towards the mean of its neighbours,
//! reading all neighbour positions from the previous iteration's snapshot so
//! the result does not depend on visiting order.

use super::Vec3;
use super::adjacency::AdjacencyModel;
use super::progress::CancelToken;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelaxOptions {
    pub iterations: usize,
    /// Fraction of the way towards the neighbour mean, in `[0, 1]`.
    pub factor: f64,
    pub parallel: bool,
}

impl Default for RelaxOptions {
    fn default() -> Self {
        Self {
            iterations: 3,
            factor: 0.5,
            parallel: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RelaxOutcome {
    pub iterations: usize,
    pub cancelled: bool,
}

/// Relaxes `free` in place inside `positions`.
pub fn relax(
    positions: &mut [Vec3],
    adjacency: &AdjacencyModel,
    free: &[usize],
    options: &RelaxOptions,
    cancel: &CancelToken,
) -> RelaxOutcome {
    let mut outcome = RelaxOutcome::default();
    if free.is_empty() || options.factor == 0.0 {
        return outcome;
    }

    for _ in 0..options.iterations {
        if cancel.is_cancelled() {
            outcome.cancelled = true;
            return outcome;
        }

        let snapshot: &[Vec3] = positions;
        let step = |&v: &usize| relaxed_position(snapshot, adjacency, v, options.factor);

        let updated = par_map(free, options.parallel, step);

        for (&v, p) in free.iter().zip(updated) {
            positions[v] = p;
        }
        outcome.iterations += 1;
    }

    outcome
}

cfg_if::cfg_if! {
    if #[cfg(feature = "parallel")] {
        /// Maps `f` over `items`, on the rayon pool when `parallel` is set.
        pub(crate) fn par_map<I, T, F>(items: &[I], parallel: bool, f: F) -> Vec<T>
        where
            I: Sync,
            T: Send,
            F: Fn(&I) -> T + Sync + Send,
        {
            use rayon::prelude::*;
            if parallel {
                items.par_iter().map(f).collect()
            } else {
                items.iter().map(f).collect()
            }
        }
    } else {
        /// Maps `f` over `items` sequentially.
        pub(crate) fn par_map<I, T, F>(items: &[I], _parallel: bool, f: F) -> Vec<T>
        where
            F: Fn(&I) -> T,
        {
            items.iter().map(f).collect()
        }
    }
}

fn relaxed_position(positions: &[Vec3], adjacency: &AdjacencyModel, v: usize, factor: f64) -> Vec3 {
    let neighbors = adjacency.neighbors(v);
    if neighbors.is_empty() {
        return positions[v];
    }
    let sum = neighbors.iter().fold(Vec3::ZERO, |acc, &n| acc + positions[n]);
    let mean = sum / neighbors.len() as f64;
    positions[v].lerp(mean, factor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fair::FairMesh;

    #[test]
    fn flat_grid_is_a_fixed_point() {
        let mesh = FairMesh::quad_grid(4, 4);
        let adj = AdjacencyModel::build(&mesh).unwrap();
        let mut pos: Vec<Vec3> = mesh.positions.iter().copied().map(Vec3::from).collect();
        let before = pos.clone();
        let outcome = relax(&mut pos, &adj, &[5, 6, 9, 10], &RelaxOptions::default(), &CancelToken::new());
        assert_eq!(outcome.iterations, 3);
        for (a, b) in pos.iter().zip(&before) {
            assert!(a.distance(*b) < 1e-12);
        }
    }

    #[test]
    fn snapshot_update_is_order_independent() {
        let mesh = FairMesh::quad_grid(4, 3);
        let adj = AdjacencyModel::build(&mesh).unwrap();
        let mut base: Vec<Vec3> = mesh.positions.iter().copied().map(Vec3::from).collect();
        base[5].z = 1.0;
        base[6].z = -1.0;

        let options = RelaxOptions {
            iterations: 1,
            factor: 1.0,
            parallel: false,
        };
        let mut forward = base.clone();
        relax(&mut forward, &adj, &[5, 6], &options, &CancelToken::new());
        let mut reverse = base.clone();
        relax(&mut reverse, &adj, &[6, 5], &options, &CancelToken::new());

        // Each vertex sees the other's old height: 5 -> -1/4, 6 -> 1/4.
        assert!((forward[5].z + 0.25).abs() < 1e-12);
        assert!((forward[6].z - 0.25).abs() < 1e-12);
        assert_eq!(forward, reverse);
    }

    #[test]
    fn cancellation_stops_before_first_iteration() {
        let mesh = FairMesh::quad_grid(3, 3);
        let adj = AdjacencyModel::build(&mesh).unwrap();
        let mut pos: Vec<Vec3> = mesh.positions.iter().copied().map(Vec3::from).collect();
        let cancel = CancelToken::new();
        cancel.cancel();
        let outcome = relax(&mut pos, &adj, &[4], &RelaxOptions::default(), &cancel);
        assert!(outcome.cancelled);
        assert_eq!(outcome.iterations, 0);
    }
}
