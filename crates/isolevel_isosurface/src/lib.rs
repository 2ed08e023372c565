//! Isosurface extraction from structured scalar fields.
//!
//! [`marching_cubes`] triangulates a range of cells of an
//! [`ImageData`](isolevel_field::ImageData). [`LocalMarchingCubes`] splits the
//! field into chunks and only re-triangulates the chunks touched by modified
//! voxels.

pub mod config;
pub mod local;
pub mod marching_cubes;
pub mod mesh;

mod tables;

pub use config::IsosurfaceConfig;
pub use local::LocalMarchingCubes;
pub use marching_cubes::CellRange;
pub use mesh::SurfaceMesh;
