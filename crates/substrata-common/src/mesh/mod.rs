//! The voxel greedy-mesher: deterministic construction of a
//! render-ready mesh from a voxel set.

pub mod voxel;

pub use voxel::{build_mesh, Mesh, Voxel};
