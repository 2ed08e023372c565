//! Marching cubes over a range of cells of a structured field.

use crate::{
    mesh::SurfaceMesh,
    tables::{CORNER_OFFSETS, EDGE_CONNECTIONS, EDGE_TABLE, TRI_TABLE},
};
use isolevel_field::{ImageData, VoxelCoords};
use nalgebra::Point3;
use nohash_hasher::IntMap;

/// A box of cells, from `lower` (inclusive) to `upper` (exclusive) along
/// each axis. Cell `(i, j, k)` spans the voxels from `(i, j, k)` to
/// `(i + 1, j + 1, k + 1)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CellRange {
    pub lower: [usize; 3],
    pub upper: [usize; 3],
}

impl CellRange {
    /// The range covering every cell of the given image.
    pub fn all_cells(image: &ImageData) -> Self {
        Self {
            lower: [0; 3],
            upper: image.dimensions().map(|dim| dim.saturating_sub(1)),
        }
    }

    pub fn contains(&self, cell: [usize; 3]) -> bool {
        (0..3).all(|axis| cell[axis] >= self.lower[axis] && cell[axis] < self.upper[axis])
    }

    pub fn n_cells(&self) -> usize {
        (0..3)
            .map(|axis| self.upper[axis].saturating_sub(self.lower[axis]))
            .product()
    }
}

/// Triangulates the surface where the first component of the image equals
/// `iso_value`, over the given cells. Corners below the iso value count as
/// inside.
///
/// Vertices on edges shared between cells of the range are shared between
/// their triangles.
///
/// # Panics
/// If the cell range extends past the last cell of the image.
pub fn marching_cubes(image: &ImageData, iso_value: f64, cells: &CellRange) -> SurfaceMesh {
    let dimensions = image.dimensions();
    assert!(
        (0..3).all(|axis| cells.upper[axis] < dimensions[axis] || cells.n_cells() == 0),
        "Cell range {cells:?} exceeds image with dimensions {dimensions:?}"
    );

    let mut positions = Vec::new();
    let mut triangles = Vec::new();
    // Keyed by `3 * (linear index of lower edge voxel) + edge axis`
    let mut edge_vertices: IntMap<usize, u32> = IntMap::default();

    for z in cells.lower[2]..cells.upper[2] {
        for y in cells.lower[1]..cells.upper[1] {
            for x in cells.lower[0]..cells.upper[0] {
                let corner_coords = CORNER_OFFSETS
                    .map(|[dx, dy, dz]| VoxelCoords::new((x + dx) as i32, (y + dy) as i32, (z + dz) as i32));
                let corner_values = corner_coords.map(|coords| image.value_at_coords(&coords));

                let configuration = corner_values
                    .iter()
                    .enumerate()
                    .filter(|&(_, &value)| value < iso_value)
                    .fold(0, |configuration, (corner, _)| configuration | (1 << corner));

                let crossed_edges = EDGE_TABLE[configuration];
                if crossed_edges == 0 {
                    continue;
                }

                let mut cell_edge_vertices = [0_u32; 12];
                for (edge, &[c0, c1]) in EDGE_CONNECTIONS.iter().enumerate() {
                    if crossed_edges & (1 << edge) == 0 {
                        continue;
                    }
                    let key = edge_key(image, &corner_coords[c0], &corner_coords[c1]);
                    cell_edge_vertices[edge] = *edge_vertices.entry(key).or_insert_with(|| {
                        positions.push(interpolate_crossing(
                            &image.coords_to_position(&corner_coords[c0]),
                            &image.coords_to_position(&corner_coords[c1]),
                            corner_values[c0],
                            corner_values[c1],
                            iso_value,
                        ));
                        (positions.len() - 1) as u32
                    });
                }

                for triangle in TRI_TABLE[configuration]
                    .chunks_exact(3)
                    .take_while(|triangle| triangle[0] >= 0)
                {
                    triangles.push([0, 1, 2].map(|idx| cell_edge_vertices[triangle[idx] as usize]));
                }
            }
        }
    }

    SurfaceMesh::new(positions, triangles)
}

fn edge_key(image: &ImageData, a: &VoxelCoords, b: &VoxelCoords) -> usize {
    let lower = a.inf(b);
    let axis = (0..3).find(|&axis| a[axis] != b[axis]).unwrap_or(0);
    3 * image.linear_idx(&lower) + axis
}

fn interpolate_crossing(
    p0: &Point3<f64>,
    p1: &Point3<f64>,
    v0: f64,
    v1: f64,
    iso_value: f64,
) -> Point3<f64> {
    let denominator = v1 - v0;
    let t = if denominator.abs() < f64::EPSILON {
        0.5
    } else {
        ((iso_value - v0) / denominator).clamp(0.0, 1.0)
    };
    p0 + (p1 - p0) * t
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use nalgebra::{Vector3, point};

    fn image_from(dimensions: [i32; 3], f: impl FnMut(&Point3<f64>) -> f64) -> ImageData {
        ImageData::from_fn(dimensions, Vector3::repeat(1.0), Point3::origin(), f).unwrap()
    }

    #[test]
    fn field_without_crossing_gives_empty_mesh() {
        let image = image_from([4, 4, 4], |_| 1.0);
        let mesh = marching_cubes(&image, 0.0, &CellRange::all_cells(&image));
        assert!(mesh.is_empty());
        assert_eq!(mesh.n_triangles(), 0);
    }

    #[test]
    fn single_inside_corner_gives_one_triangle() {
        let image = image_from([2, 2, 2], |p| if p == &Point3::origin() { -1.0 } else { 1.0 });
        let mesh = marching_cubes(&image, 0.0, &CellRange::all_cells(&image));

        assert_eq!(mesh.n_triangles(), 1);
        assert_eq!(mesh.n_vertices(), 3);
        for position in mesh.positions() {
            assert_abs_diff_eq!(position.coords.sum(), 0.5, epsilon = 1e-12);
        }
    }

    #[test]
    fn horizontal_plane_shares_edge_vertices() {
        let image = image_from([3, 3, 2], |p| p.z - 0.25);
        let mesh = marching_cubes(&image, 0.0, &CellRange::all_cells(&image));

        assert_eq!(mesh.n_triangles(), 8);
        assert_eq!(mesh.n_vertices(), 9);
        for position in mesh.positions() {
            assert_abs_diff_eq!(position.z, 0.25, epsilon = 1e-12);
        }
    }

    #[test]
    fn sphere_vertices_lie_near_sphere() {
        let center = point![4.0, 4.0, 4.0];
        let image = image_from([9, 9, 9], |p| (p - center).norm() - 2.7);
        let mesh = marching_cubes(&image, 0.0, &CellRange::all_cells(&image));

        assert!(mesh.n_triangles() > 0);
        for position in mesh.positions() {
            assert_abs_diff_eq!((position - center).norm(), 2.7, epsilon = 0.15);
        }
    }

    #[test]
    fn iso_value_offsets_surface() {
        let image = image_from([2, 2, 3], |p| p.z);
        let mesh = marching_cubes(&image, 1.5, &CellRange::all_cells(&image));

        assert_eq!(mesh.n_triangles(), 2);
        for position in mesh.positions() {
            assert_abs_diff_eq!(position.z, 1.5, epsilon = 1e-12);
        }
    }

    #[test]
    fn restricting_cells_restricts_output() {
        let image = image_from([5, 3, 2], |p| p.z - 0.5);
        let half = CellRange {
            lower: [0, 0, 0],
            upper: [2, 2, 1],
        };

        let mesh = marching_cubes(&image, 0.0, &half);

        assert_eq!(mesh.n_triangles(), 8);
        assert!(mesh.positions().iter().all(|position| position.x <= 2.0));
    }

    #[test]
    fn cell_range_counts_cells() {
        let image = image_from([5, 4, 3], |_| 0.0);
        let range = CellRange::all_cells(&image);
        assert_eq!(range.upper, [4, 3, 2]);
        assert_eq!(range.n_cells(), 24);
        assert!(range.contains([3, 2, 1]));
        assert!(!range.contains([4, 0, 0]));
    }
}
