use super::fixtures::grid;
use crate::fair::{
    Continuity, FairError, FairMesh, FairOptions, FairWarning, build_adjacency, fair,
};

#[test]
fn grid_one_rings_follow_face_winding() {
    let adj = build_adjacency(&grid(3)).unwrap();

    assert_eq!(adj.neighbors(4), &[1, 3, 7, 5]);
    assert!(adj.vertex(4).cyclic);
    assert!(!adj.is_boundary(4));

    assert_eq!(adj.neighbors(0), &[3, 1]);
    assert_eq!(adj.neighbors(1), &[0, 4, 2]);
    assert!(adj.is_boundary(0));
    assert!(adj.is_boundary(1));
    assert!(!adj.vertex(1).cyclic);
}

#[test]
fn grid_has_one_closed_boundary_loop() {
    let adj = build_adjacency(&grid(3)).unwrap();
    let loops = adj.boundary_loops();
    assert_eq!(loops.len(), 1);
    assert!(loops[0].closed);
    assert_eq!(loops[0].vertices, vec![0, 1, 2, 5, 8, 7, 6, 3]);
    assert_eq!(adj.edge_count(), 12);
    assert_eq!(adj.non_manifold_edge_count(), 0);
}

#[test]
fn out_of_range_face_fails_before_any_work() {
    let mut mesh = FairMesh::new(
        vec![[0.0; 3], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
        vec![vec![0, 1, 5]],
    );
    let before = mesh.clone();
    let err = fair(&mut mesh, &[0], &[], Continuity::Pos, &FairOptions::default()).unwrap_err();
    assert_eq!(
        err,
        FairError::FaceIndexOutOfRange {
            face: 0,
            index: 5,
            vertex_count: 3
        }
    );
    assert_eq!(mesh, before);
    assert!(build_adjacency(&mesh).is_err());
}

#[test]
fn non_manifold_edge_is_reported() {
    // Three triangles hinged on edge (0, 1).
    let mut mesh = FairMesh::new(
        vec![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.5, 1.0, 0.0],
            [0.5, -1.0, 0.0],
            [0.5, 0.0, 1.0],
        ],
        vec![vec![0, 1, 2], vec![1, 0, 3], vec![0, 1, 4]],
    );
    let adj = build_adjacency(&mesh).unwrap();
    assert_eq!(adj.non_manifold_edge_count(), 1);
    assert!(adj.is_boundary(0));
    assert_eq!(adj.edge_faces(1, 0).len(), 3);

    let result = fair(&mut mesh, &[0], &[2, 3, 4], Continuity::Pos, &FairOptions::default()).unwrap();
    assert!(result.warnings.contains(&FairWarning::NonManifoldEdge {
        a: 0,
        b: 1,
        face_count: 3
    }));
    assert_eq!(result.diagnostics.non_manifold_edge_count, 1);
    assert!(!result.diagnostics.is_clean());
}
