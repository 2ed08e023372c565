//! Indexed triangle meshes.

use nalgebra::Point3;

/// A triangle mesh with vertex positions and triples of vertex indices.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SurfaceMesh {
    positions: Vec<Point3<f64>>,
    triangles: Vec<[u32; 3]>,
}

impl SurfaceMesh {
    pub fn new(positions: Vec<Point3<f64>>, triangles: Vec<[u32; 3]>) -> Self {
        debug_assert!(
            triangles
                .iter()
                .flatten()
                .all(|&idx| (idx as usize) < positions.len())
        );
        Self {
            positions,
            triangles,
        }
    }

    /// Creates a mesh without any vertices.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn positions(&self) -> &[Point3<f64>] {
        &self.positions
    }

    pub fn triangles(&self) -> &[[u32; 3]] {
        &self.triangles
    }

    pub fn n_vertices(&self) -> usize {
        self.positions.len()
    }

    pub fn n_triangles(&self) -> usize {
        self.triangles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Returns the three vertex positions of each triangle.
    pub fn triangle_vertices(&self) -> impl Iterator<Item = [&Point3<f64>; 3]> {
        self.triangles
            .iter()
            .map(|triangle| triangle.map(|idx| &self.positions[idx as usize]))
    }
}
