use crate::fair::{FairMesh, Vec3};

/// `n x n` unit grid with vertex `(i, j)` at index `j * n + i`.
pub fn grid(n: usize) -> FairMesh {
    FairMesh::quad_grid(n, n)
}

pub fn index(n: usize, i: usize, j: usize) -> usize {
    j * n + i
}

/// Vertices at least `rings` steps away from the border of an `n x n` grid.
pub fn interior(n: usize, rings: usize) -> Vec<usize> {
    (0..n * n)
        .filter(|&v| {
            let (i, j) = (v % n, v / n);
            i >= rings && j >= rings && i + rings < n && j + rings < n
        })
        .collect()
}

/// Every vertex of `0..count` not listed in `free`.
pub fn complement(count: usize, free: &[usize]) -> Vec<usize> {
    (0..count).filter(|v| !free.contains(v)).collect()
}

pub fn set_z(mesh: &mut FairMesh, vertices: &[usize], z: f64) {
    for &v in vertices {
        mesh.positions[v][2] = z;
    }
}

pub fn positions(mesh: &FairMesh) -> Vec<Vec3> {
    mesh.positions.iter().copied().map(Vec3::from).collect()
}

/// Regular octahedron around `center`, outward winding.
pub fn octahedron(center: [f64; 3]) -> FairMesh {
    let [cx, cy, cz] = center;
    FairMesh::new(
        vec![
            [cx + 1.0, cy, cz],
            [cx - 1.0, cy, cz],
            [cx, cy + 1.0, cz],
            [cx, cy - 1.0, cz],
            [cx, cy, cz + 1.0],
            [cx, cy, cz - 1.0],
        ],
        vec![
            vec![0, 2, 4],
            vec![2, 1, 4],
            vec![1, 3, 4],
            vec![3, 0, 4],
            vec![2, 0, 5],
            vec![1, 2, 5],
            vec![3, 1, 5],
            vec![0, 3, 5],
        ],
    )
}
