//! Face-derived adjacency: ordered one-rings, boundary flags and boundary loops.
//!
//! The model is built from any [`MeshAccess`] without half-edge structures.
//! Each face contributes one *corner* per vertex (the face's previous and
//! next vertex around it); the corners around a vertex are chained into a
//! fan, which yields a cyclic one-ring for interior vertices and an open one
//! for boundary vertices.
//!
//! Vertices touching an edge shared by more than two faces, or sitting where
//! two separate fans meet, cannot be ordered unambiguously. They are flagged
//! non-manifold, treated as boundary, and given a sorted (unordered) ring.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::diagnostics::FairWarning;
use super::mesh::{FairError, MeshAccess};

/// One face's view of a vertex: the face index and the neighbours before and
/// after the vertex in that face's winding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Corner {
    pub face: usize,
    pub prev: usize,
    pub next: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VertexAdjacency {
    /// One-ring in fan order (cyclic when `cyclic`), or sorted when non-manifold.
    pub neighbors: Vec<usize>,
    pub corners: Vec<Corner>,
    pub boundary: bool,
    pub non_manifold: bool,
    pub cyclic: bool,
}

impl VertexAdjacency {
    #[must_use]
    pub fn face_count(&self) -> usize {
        self.corners.len()
    }

    #[must_use]
    pub fn valence(&self) -> usize {
        self.neighbors.len()
    }

    /// No incident faces at all.
    #[must_use]
    pub fn is_isolated(&self) -> bool {
        self.corners.is_empty()
    }

    /// Fewer than two neighbours; excluded from normal processing.
    #[must_use]
    pub fn is_singular(&self) -> bool {
        self.neighbors.len() <= 1
    }
}

/// A chain of boundary edges in face winding order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundaryLoop {
    pub vertices: Vec<usize>,
    /// False when the chain could not be closed (inconsistent winding or a pinch).
    pub closed: bool,
}

#[derive(Debug, Clone, Default)]
pub struct AdjacencyModel {
    vertices: Vec<VertexAdjacency>,
    faces: Vec<Vec<usize>>,
    edges: BTreeMap<(usize, usize), Vec<usize>>,
    boundary_loops: Vec<BoundaryLoop>,
    warnings: Vec<FairWarning>,
}

impl AdjacencyModel {
    /// Builds the adjacency model for `mesh`.
    ///
    /// Degenerate faces (fewer than three distinct vertices after collapsing
    /// repeats) are skipped with a warning. Topology problems never fail the
    /// build; only structurally invalid indices do.
    ///
    /// # Errors
    /// Returns [`FairError::FaceIndexOutOfRange`] if any face references a
    /// vertex outside the mesh.
    pub fn build<M: MeshAccess + ?Sized>(mesh: &M) -> Result<Self, FairError> {
        mesh.validate_indices()?;

        let vertex_count = mesh.vertex_count();
        let mut model = Self {
            vertices: vec![VertexAdjacency::default(); vertex_count],
            ..Self::default()
        };

        for face in 0..mesh.face_count() {
            match clean_face(mesh.face(face)) {
                Some(cleaned) => model.faces.push(cleaned),
                None => {
                    model.warnings.push(FairWarning::DegenerateFace { face });
                    model.faces.push(Vec::new());
                }
            }
        }

        for (face, verts) in model.faces.iter().enumerate() {
            let n = verts.len();
            for i in 0..n {
                let v = verts[i];
                let prev = verts[(i + n - 1) % n];
                let next = verts[(i + 1) % n];
                model.vertices[v].corners.push(Corner { face, prev, next });
                model
                    .edges
                    .entry(edge_key(v, next))
                    .or_default()
                    .push(face);
            }
        }

        for (&(a, b), faces) in &model.edges {
            if faces.len() > 2 {
                model.warnings.push(FairWarning::NonManifoldEdge {
                    a,
                    b,
                    face_count: faces.len(),
                });
                model.vertices[a].non_manifold = true;
                model.vertices[b].non_manifold = true;
            }
        }

        for v in 0..vertex_count {
            let warn = model.order_vertex(v);
            if warn {
                model.warnings.push(FairWarning::NonManifoldVertex { vertex: v });
            }
        }

        model.boundary_loops = model.trace_boundary_loops();

        log::debug!(
            "adjacency built: {} vertices, {} faces, {} edges, {} boundary loops, {} warnings",
            vertex_count,
            model.faces.len(),
            model.edges.len(),
            model.boundary_loops.len(),
            model.warnings.len()
        );

        Ok(model)
    }

    /// Orders the one-ring of `v`. Returns true when the vertex turned out to
    /// be a non-manifold junction of separate fans.
    fn order_vertex(&mut self, v: usize) -> bool {
        let entry = &mut self.vertices[v];
        if entry.corners.is_empty() {
            return false;
        }

        if entry.non_manifold {
            entry.neighbors = sorted_neighbors(&entry.corners);
            entry.boundary = true;
            return false;
        }

        match chain_fans(&entry.corners) {
            Some(fans) if fans.len() == 1 => {
                let (ring, closed) = fans.into_iter().next().unwrap_or_default();
                entry.neighbors = ring;
                entry.cyclic = closed;
                entry.boundary = !closed;
                false
            }
            Some(fans) => {
                entry.neighbors = fans.into_iter().flat_map(|(ring, _)| ring).collect();
                entry.non_manifold = true;
                entry.boundary = true;
                true
            }
            None => {
                entry.neighbors = sorted_neighbors(&entry.corners);
                entry.non_manifold = true;
                entry.boundary = true;
                true
            }
        }
    }

    fn trace_boundary_loops(&self) -> Vec<BoundaryLoop> {
        // Directed boundary half-edges, oriented by their single face.
        let mut outgoing: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (&(a, b), faces) in &self.edges {
            if faces.len() != 1 {
                continue;
            }
            let face = &self.faces[faces[0]];
            let n = face.len();
            let forward = (0..n).any(|i| face[i] == a && face[(i + 1) % n] == b);
            let (from, to) = if forward { (a, b) } else { (b, a) };
            outgoing.entry(from).or_default().push(to);
        }

        let mut used: BTreeSet<(usize, usize)> = BTreeSet::new();
        let mut loops = Vec::new();
        let starts: Vec<(usize, usize)> = outgoing
            .iter()
            .flat_map(|(&from, tos)| tos.iter().map(move |&to| (from, to)))
            .collect();

        for (start, first) in starts {
            if used.contains(&(start, first)) {
                continue;
            }
            used.insert((start, first));
            let mut vertices = vec![start];
            let mut cur = first;
            let mut closed = false;
            loop {
                if cur == start {
                    closed = true;
                    break;
                }
                vertices.push(cur);
                let next = outgoing
                    .get(&cur)
                    .and_then(|tos| tos.iter().copied().find(|&to| !used.contains(&(cur, to))));
                let Some(next) = next else {
                    break;
                };
                used.insert((cur, next));
                cur = next;
            }
            loops.push(BoundaryLoop { vertices, closed });
        }

        loops
    }

    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    #[must_use]
    pub fn vertex(&self, v: usize) -> &VertexAdjacency {
        &self.vertices[v]
    }

    #[must_use]
    pub fn neighbors(&self, v: usize) -> &[usize] {
        &self.vertices[v].neighbors
    }

    #[must_use]
    pub fn is_boundary(&self, v: usize) -> bool {
        self.vertices[v].boundary
    }

    /// Cleaned vertex list of `face`; empty for faces skipped as degenerate.
    #[must_use]
    pub fn face(&self, face: usize) -> &[usize] {
        &self.faces[face]
    }

    #[must_use]
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// Faces incident to `v`, in corner order.
    pub fn faces_of(&self, v: usize) -> impl Iterator<Item = usize> + '_ {
        self.vertices[v].corners.iter().map(|c| c.face)
    }

    /// Faces sharing the undirected edge `a`-`b`.
    #[must_use]
    pub fn edge_faces(&self, a: usize, b: usize) -> &[usize] {
        self.edges
            .get(&edge_key(a, b))
            .map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    #[must_use]
    pub fn non_manifold_edge_count(&self) -> usize {
        self.edges.values().filter(|f| f.len() > 2).count()
    }

    #[must_use]
    pub fn boundary_loops(&self) -> &[BoundaryLoop] {
        &self.boundary_loops
    }

    /// Topology warnings collected while building.
    #[must_use]
    pub fn warnings(&self) -> &[FairWarning] {
        &self.warnings
    }
}

fn edge_key(a: usize, b: usize) -> (usize, usize) {
    if a < b { (a, b) } else { (b, a) }
}

/// Collapses repeated consecutive indices (including across the wrap).
/// Returns `None` when fewer than three distinct vertices remain or a vertex
/// repeats non-consecutively.
fn clean_face(raw: &[u32]) -> Option<Vec<usize>> {
    let mut cleaned: Vec<usize> = Vec::with_capacity(raw.len());
    for &i in raw {
        let i = i as usize;
        if cleaned.last() != Some(&i) {
            cleaned.push(i);
        }
    }
    while cleaned.len() > 1 && cleaned.first() == cleaned.last() {
        cleaned.pop();
    }
    let distinct: BTreeSet<usize> = cleaned.iter().copied().collect();
    (cleaned.len() >= 3 && distinct.len() == cleaned.len()).then_some(cleaned)
}

fn sorted_neighbors(corners: &[Corner]) -> Vec<usize> {
    let set: BTreeSet<usize> = corners.iter().flat_map(|c| [c.prev, c.next]).collect();
    set.into_iter().collect()
}

/// Chains corners into fans. Each corner links its `prev` and `next`
/// neighbours; a manifold vertex yields exactly one path or cycle.
///
/// Returns `None` if some neighbour is linked by more than two corners.
fn chain_fans(corners: &[Corner]) -> Option<Vec<(Vec<usize>, bool)>> {
    let mut incident: HashMap<usize, Vec<usize>> = HashMap::new();
    for (idx, c) in corners.iter().enumerate() {
        incident.entry(c.prev).or_default().push(idx);
        incident.entry(c.next).or_default().push(idx);
    }
    if incident.values().any(|list| list.len() > 2) {
        return None;
    }

    let mut used = vec![false; corners.len()];
    let mut fans = Vec::new();

    // Open fans first, starting where the winding enters the fan.
    let mut starts: Vec<(usize, usize)> = Vec::new();
    for (idx, c) in corners.iter().enumerate() {
        if incident[&c.prev].len() == 1 {
            starts.push((c.prev, idx));
        }
    }
    for (idx, c) in corners.iter().enumerate() {
        if incident[&c.next].len() == 1 {
            starts.push((c.next, idx));
        }
    }

    for (node, corner) in starts {
        if !used[corner] {
            fans.push(walk_fan(corners, &incident, &mut used, node, corner));
        }
    }

    for idx in 0..corners.len() {
        if !used[idx] {
            fans.push(walk_fan(corners, &incident, &mut used, corners[idx].prev, idx));
        }
    }

    Some(fans)
}

fn walk_fan(
    corners: &[Corner],
    incident: &HashMap<usize, Vec<usize>>,
    used: &mut [bool],
    start: usize,
    first: usize,
) -> (Vec<usize>, bool) {
    let mut ring = vec![start];
    let mut node = start;
    let mut corner = first;
    loop {
        used[corner] = true;
        let c = corners[corner];
        let other = if c.prev == node { c.next } else { c.prev };
        if other == start {
            return (ring, true);
        }
        ring.push(other);
        node = other;
        match incident[&node].iter().copied().find(|&i| !used[i]) {
            Some(next) => corner = next,
            None => return (ring, false),
        }
    }
}
