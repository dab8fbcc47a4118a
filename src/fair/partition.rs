//! Resolution of requested free/fixed lists into a usable partition.

use std::collections::BTreeSet;

use super::adjacency::AdjacencyModel;
use super::diagnostics::{FairWarning, PartitionIssue};

/// Disjoint free and fixed vertex sets, both sorted.
///
/// Vertices in neither set are still read as constants wherever an operator
/// row reaches them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VertexPartition {
    free: Vec<usize>,
    fixed: Vec<usize>,
    free_mask: Vec<bool>,
    fixed_mask: Vec<bool>,
    dropped: Vec<usize>,
    requested: usize,
}

impl VertexPartition {
    /// Validates `free` against `fixed` and the topology.
    ///
    /// A rejected free vertex is dropped with a warning and never aborts the
    /// call: out-of-range or overlapping indices, vertices without faces,
    /// vertices with fewer than two neighbours, and (with
    /// `pin_mesh_boundary`) vertices on an open mesh boundary.
    #[must_use]
    pub fn resolve(
        adjacency: &AdjacencyModel,
        free: &[usize],
        fixed: &[usize],
        pin_mesh_boundary: bool,
    ) -> (Self, Vec<FairWarning>) {
        let vertex_count = adjacency.vertex_count();
        let mut warnings = Vec::new();

        let mut fixed_mask = vec![false; vertex_count];
        let mut fixed_sorted = BTreeSet::new();
        for &v in fixed {
            if v < vertex_count {
                fixed_mask[v] = true;
                fixed_sorted.insert(v);
            } else {
                log::warn!("fixed vertex {v} is out of range ({vertex_count} vertices); ignored");
            }
        }

        let requested: BTreeSet<usize> = free.iter().copied().collect();
        let mut free_mask = vec![false; vertex_count];
        let mut accepted = Vec::with_capacity(requested.len());
        let mut dropped = Vec::new();

        for &v in &requested {
            let rejection = if v >= vertex_count {
                Some(FairWarning::InvalidPartition {
                    vertex: v,
                    reason: PartitionIssue::OutOfRange,
                })
            } else if fixed_mask[v] {
                Some(FairWarning::InvalidPartition {
                    vertex: v,
                    reason: PartitionIssue::Overlap,
                })
            } else {
                let info = adjacency.vertex(v);
                if info.is_isolated() {
                    Some(FairWarning::IsolatedVertex { vertex: v })
                } else if info.is_singular() {
                    Some(FairWarning::InvalidPartition {
                        vertex: v,
                        reason: PartitionIssue::NoNeighbors,
                    })
                } else if pin_mesh_boundary && info.boundary {
                    Some(FairWarning::PinnedBoundaryVertex { vertex: v })
                } else {
                    None
                }
            };

            match rejection {
                Some(warning) => {
                    log::warn!("{warning}");
                    warnings.push(warning);
                    dropped.push(v);
                }
                None => {
                    free_mask[v] = true;
                    accepted.push(v);
                }
            }
        }

        let partition = Self {
            free: accepted,
            fixed: fixed_sorted.into_iter().collect(),
            free_mask,
            fixed_mask,
            dropped,
            requested: requested.len(),
        };
        (partition, warnings)
    }

    #[must_use]
    pub fn free(&self) -> &[usize] {
        &self.free
    }

    #[must_use]
    pub fn fixed(&self) -> &[usize] {
        &self.fixed
    }

    #[must_use]
    pub fn is_free(&self, v: usize) -> bool {
        self.free_mask.get(v).copied().unwrap_or(false)
    }

    #[must_use]
    pub fn is_fixed(&self, v: usize) -> bool {
        self.fixed_mask.get(v).copied().unwrap_or(false)
    }

    #[must_use]
    pub fn dropped(&self) -> &[usize] {
        &self.dropped
    }

    /// Distinct indices the caller asked to free.
    #[must_use]
    pub fn requested_count(&self) -> usize {
        self.requested
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.free.is_empty()
    }

    /// Stable fingerprint input: the free set determines the matrix pattern.
    pub(crate) fn hash_into<H: std::hash::Hasher>(&self, state: &mut H) {
        use std::hash::Hash;
        self.free.hash(state);
    }
}
