//! Mesh storage and the accessor traits the fairing core reads and writes through.
//!
//! The core never assumes a concrete layout: it only needs an ordered position
//! sequence and an ordered face-index sequence. [`FairMesh`] is the owned
//! reference implementation; hosts with their own buffers implement
//! [`MeshAccess`] / [`MeshAccessMut`] directly.

use super::Vec3;

/// Structural failures that abort a fairing call before any computation begins.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FairError {
    #[error("face {face} references vertex {index}, but the mesh has {vertex_count} vertices")]
    FaceIndexOutOfRange {
        face: usize,
        index: usize,
        vertex_count: usize,
    },
}

/// Read access to a polygon mesh.
pub trait MeshAccess {
    fn vertex_count(&self) -> usize;

    fn position(&self, vertex: usize) -> [f64; 3];

    fn face_count(&self) -> usize;

    /// Vertex indices of `face` in winding order.
    fn face(&self, face: usize) -> &[u32];

    /// Checks that every face index refers to an existing vertex.
    ///
    /// # Errors
    /// Returns [`FairError::FaceIndexOutOfRange`] for the first offending face.
    fn validate_indices(&self) -> Result<(), FairError> {
        let vertex_count = self.vertex_count();
        for face in 0..self.face_count() {
            if let Some(&index) = self.face(face).iter().find(|&&i| i as usize >= vertex_count) {
                return Err(FairError::FaceIndexOutOfRange {
                    face,
                    index: index as usize,
                    vertex_count,
                });
            }
        }
        Ok(())
    }

    /// Copies all positions into a working buffer.
    fn snapshot_positions(&self) -> Vec<Vec3> {
        (0..self.vertex_count())
            .map(|v| Vec3::from_array(self.position(v)))
            .collect()
    }
}

/// Position write access. Topology is never mutated by the core.
pub trait MeshAccessMut: MeshAccess {
    fn set_position(&mut self, vertex: usize, position: [f64; 3]);
}

/// Owned polygon mesh: positions plus faces of arbitrary arity.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FairMesh {
    pub positions: Vec<[f64; 3]>,
    pub faces: Vec<Vec<u32>>,
}

impl FairMesh {
    #[must_use]
    pub fn new(positions: Vec<[f64; 3]>, faces: Vec<Vec<u32>>) -> Self {
        Self { positions, faces }
    }

    /// Builds a mesh from a flat triangle index list. A trailing partial
    /// triangle is ignored.
    #[must_use]
    pub fn from_triangles(positions: Vec<[f64; 3]>, indices: &[u32]) -> Self {
        let faces = indices.chunks_exact(3).map(<[u32]>::to_vec).collect();
        Self { positions, faces }
    }

    /// Regular `nx` by `ny` grid of unit quads in the XY plane, row-major,
    /// counter-clockwise when seen from +Z.
    #[must_use]
    pub fn quad_grid(nx: usize, ny: usize) -> Self {
        let mut positions = Vec::with_capacity(nx * ny);
        for j in 0..ny {
            for i in 0..nx {
                positions.push([i as f64, j as f64, 0.0]);
            }
        }

        let mut faces = Vec::new();
        for j in 0..ny.saturating_sub(1) {
            for i in 0..nx.saturating_sub(1) {
                let a = (j * nx + i) as u32;
                let b = a + 1;
                let c = a + 1 + nx as u32;
                let d = a + nx as u32;
                faces.push(vec![a, b, c, d]);
            }
        }

        Self { positions, faces }
    }

    #[must_use]
    pub fn triangle_count(&self) -> usize {
        self.faces
            .iter()
            .map(|f| f.len().saturating_sub(2))
            .sum()
    }

    /// Returns true if any vertex position contains NaN or Inf values.
    #[must_use]
    pub fn has_invalid_vertices(&self) -> bool {
        self.positions
            .iter()
            .any(|p| !p[0].is_finite() || !p[1].is_finite() || !p[2].is_finite())
    }
}

impl MeshAccess for FairMesh {
    fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    fn position(&self, vertex: usize) -> [f64; 3] {
        self.positions[vertex]
    }

    fn face_count(&self) -> usize {
        self.faces.len()
    }

    fn face(&self, face: usize) -> &[u32] {
        &self.faces[face]
    }
}

impl MeshAccessMut for FairMesh {
    fn set_position(&mut self, vertex: usize, position: [f64; 3]) {
        self.positions[vertex] = position;
    }
}
