//! Helpers for turning a host selection into free/fixed lists.

use std::collections::BTreeSet;

use super::adjacency::AdjacencyModel;
use super::operator::Continuity;

/// Free vertices and the rings of fixed vertices around them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegionSelection {
    pub free: Vec<usize>,
    pub fixed: Vec<usize>,
}

/// `seeds` plus every vertex within `rings` edges of them, sorted.
#[must_use]
pub fn closed_neighborhood(adjacency: &AdjacencyModel, seeds: &[usize], rings: usize) -> Vec<usize> {
    let vertex_count = adjacency.vertex_count();
    let mut visited: BTreeSet<usize> = seeds.iter().copied().filter(|&v| v < vertex_count).collect();
    let mut frontier: Vec<usize> = visited.iter().copied().collect();
    for _ in 0..rings {
        let mut next = Vec::new();
        for &v in &frontier {
            for &n in adjacency.neighbors(v) {
                if visited.insert(n) {
                    next.push(n);
                }
            }
        }
        if next.is_empty() {
            break;
        }
        frontier = next;
    }
    visited.into_iter().collect()
}

/// Free = selected vertices that have faces; Fixed = the `max(order, 1)`
/// rings around them.
#[must_use]
pub fn partition_from_selection(
    adjacency: &AdjacencyModel,
    selected: &[usize],
    continuity: Continuity,
) -> RegionSelection {
    let free: Vec<usize> = selected
        .iter()
        .copied()
        .filter(|&v| v < adjacency.vertex_count() && !adjacency.vertex(v).is_isolated())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let free_set: BTreeSet<usize> = free.iter().copied().collect();
    let fixed = closed_neighborhood(adjacency, &free, continuity.order().max(1))
        .into_iter()
        .filter(|v| !free_set.contains(v))
        .collect();
    RegionSelection { free, fixed }
}

/// Vertices selected by a per-vertex sculpt mask.
///
/// Unmasked vertices (`mask <= 0.5`) are selected; with `invert`, masked
/// ones (`mask >= 0.5`) are.
#[must_use]
pub fn select_by_mask(mask: &[f64], invert: bool) -> Vec<usize> {
    mask.iter()
        .enumerate()
        .filter(|&(_, &m)| if invert { m >= 0.5 } else { m <= 0.5 })
        .map(|(v, _)| v)
        .collect()
}

/// Faces touched by `selected`, grown by `order - 1` face rings from the
/// region's boundary faces. This is the face set a host triangulates before
/// fairing.
#[must_use]
pub fn involved_faces(
    adjacency: &AdjacencyModel,
    selected: &[usize],
    continuity: Continuity,
) -> Vec<usize> {
    let mut faces: BTreeSet<usize> = selected
        .iter()
        .filter(|&&v| v < adjacency.vertex_count())
        .flat_map(|&v| adjacency.faces_of(v))
        .collect();

    for _ in 1..continuity.order() {
        let boundary = boundary_faces(adjacency, &faces.iter().copied().collect::<Vec<_>>());
        let grown: Vec<usize> = boundary
            .iter()
            .flat_map(|&f| adjacency.face(f).iter().copied())
            .flat_map(|v| adjacency.faces_of(v))
            .collect();
        faces.extend(grown);
    }

    faces.into_iter().collect()
}

/// Faces of `faces` that share a vertex with a face outside the set.
#[must_use]
pub fn boundary_faces(adjacency: &AdjacencyModel, faces: &[usize]) -> Vec<usize> {
    let set: BTreeSet<usize> = faces.iter().copied().collect();
    faces
        .iter()
        .copied()
        .filter(|&f| {
            adjacency
                .face(f)
                .iter()
                .any(|&v| adjacency.faces_of(v).any(|g| !set.contains(&g)))
        })
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
