#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Mesh fairing: solves for new positions of a free vertex region so that it
//! meets a fixed boundary with positional, tangent or curvature continuity.
//!
//! ```ignore
//! use fairing_engine::{Continuity, FairMesh, FairOptions, fair};
//!
//! let mut mesh = FairMesh::quad_grid(5, 5);
//! let free = [6, 7, 8, 11, 12, 13, 16, 17, 18];
//! let fixed: Vec<usize> = (0..25).filter(|v| !free.contains(v)).collect();
//! let result = fair(&mut mesh, &free, &fixed, Continuity::Tan, &FairOptions::default())?;
//! println!("{}", result.diagnostics);
//! ```

pub mod fair;

pub use fair::{
    AdjacencyModel, CancelToken, Continuity, EdgeWeight, FairContext, FairDiagnostics, FairError,
    FairMesh, FairOptions, FairWarning, FairingResult, MeshAccess, MeshAccessMut, Progress,
    SmoothStrategy, VertexWeight, build_adjacency, fair, fair_with_context,
};
