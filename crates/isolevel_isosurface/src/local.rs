//! Chunked isosurface extraction with local updates.

use crate::{
    config::IsosurfaceConfig,
    marching_cubes::{CellRange, marching_cubes},
    mesh::SurfaceMesh,
};
use anyhow::{Result, bail};
use isolevel_field::{ImageData, VoxelCoords};
use isolevel_log::{debug, warn};
use isolevel_thread::RayonThreadPool;
use nalgebra::{Point3, Vector3};
use nohash_hasher::IntSet;

/// Extracts an isosurface from a structured field split into a grid of
/// chunks, each with its own mesh.
///
/// Voxels changed since the last extraction are reported with
/// [`set_modified`](Self::set_modified), and [`update`](Self::update) then
/// re-triangulates only the chunks whose cells use those voxels.
#[derive(Clone, Debug)]
pub struct LocalMarchingCubes {
    iso_value: f64,
    requested_chunk_counts: [usize; 3],
    layout: Option<FieldLayout>,
    chunk_counts: [usize; 3],
    cells_per_chunk: [usize; 3],
    outputs: Vec<SurfaceMesh>,
    modified_chunks: IntSet<usize>,
    all_modified: bool,
}

#[derive(Clone, Debug, PartialEq)]
struct FieldLayout {
    dimensions: [usize; 3],
    spacing: Vector3<f64>,
    origin: Point3<f64>,
}

impl LocalMarchingCubes {
    /// Creates an extractor with an iso value of zero and a single chunk.
    pub fn new() -> Self {
        Self {
            iso_value: 0.0,
            requested_chunk_counts: [1; 3],
            layout: None,
            chunk_counts: [1; 3],
            cells_per_chunk: [0; 3],
            outputs: vec![SurfaceMesh::empty()],
            modified_chunks: IntSet::default(),
            all_modified: true,
        }
    }

    /// Creates an extractor with the given iso value and requested chunk
    /// counts.
    pub fn from_config(config: &IsosurfaceConfig) -> Self {
        let mut extractor = Self::new();
        extractor.set_iso_value(config.iso_value);
        extractor.set_number_of_chunks(config.n_chunks);
        extractor
    }

    /// Uses the layout of the given field for subsequent extractions. All
    /// chunk meshes are cleared and every chunk is marked modified.
    pub fn set_input_image(&mut self, image: &ImageData) {
        self.layout = Some(FieldLayout::of(image));
        self.resolve_chunks();
    }

    pub fn iso_value(&self) -> f64 {
        self.iso_value
    }

    /// Sets the iso value, marking every chunk modified if it changed.
    pub fn set_iso_value(&mut self, iso_value: f64) {
        if iso_value != self.iso_value {
            self.iso_value = iso_value;
            self.all_modified = true;
        }
    }

    /// Requests the given number of chunks along each axis.
    ///
    /// Each count must divide the number of cells (voxels minus one) along
    /// its axis. A count that does not is replaced by the nearest divisor,
    /// preferring the smaller one on ties, and a warning is logged. The
    /// counts are checked again whenever a new input image is set.
    pub fn set_number_of_chunks(&mut self, chunk_counts: [usize; 3]) {
        self.requested_chunk_counts = chunk_counts;
        self.resolve_chunks();
    }

    /// The number of chunks along each axis.
    pub fn chunk_counts(&self) -> [usize; 3] {
        self.chunk_counts
    }

    pub fn n_chunks(&self) -> usize {
        self.chunk_counts.iter().product()
    }

    /// The linear index of the chunk at the given position in the chunk
    /// grid, with `x` varying fastest.
    pub fn chunk_index(&self, cx: usize, cy: usize, cz: usize) -> usize {
        let [nx, ny, _] = self.chunk_counts;
        cx + cy * nx + cz * nx * ny
    }

    /// The cells covered by the chunk with the given linear index.
    pub fn chunk_cell_range(&self, chunk_idx: usize) -> CellRange {
        let [nx, ny, _] = self.chunk_counts;
        let chunk = [chunk_idx % nx, (chunk_idx / nx) % ny, chunk_idx / (nx * ny)];
        let lower = [0, 1, 2].map(|axis| chunk[axis] * self.cells_per_chunk[axis]);
        let upper = [0, 1, 2].map(|axis| lower[axis] + self.cells_per_chunk[axis]);
        CellRange { lower, upper }
    }

    /// The mesh of the chunk with the given linear index. It is empty until
    /// the chunk has been extracted, or if the chunk holds no surface.
    pub fn output(&self, chunk_idx: usize) -> Option<&SurfaceMesh> {
        self.outputs.get(chunk_idx)
    }

    pub fn outputs(&self) -> &[SurfaceMesh] {
        &self.outputs
    }

    /// Whether every chunk will be extracted by the next update.
    pub fn is_all_modified(&self) -> bool {
        self.all_modified
    }

    /// Marks every chunk as modified, so the next update re-extracts the
    /// whole field.
    pub fn set_all_modified(&mut self) {
        self.all_modified = true;
        self.modified_chunks.clear();
    }

    /// The chunks that will be extracted by the next update, unless all are
    /// modified.
    pub fn modified_chunks(&self) -> impl Iterator<Item = usize> + '_ {
        self.modified_chunks.iter().copied()
    }

    /// Marks the chunks containing any cell that uses the given voxel as
    /// modified. Voxels outside the field are ignored.
    pub fn set_modified(&mut self, coords: &VoxelCoords) {
        let Some(layout) = &self.layout else {
            return;
        };
        if self.all_modified
            || (0..3).any(|axis| coords[axis] < 0 || coords[axis] as usize >= layout.dimensions[axis])
        {
            return;
        }

        // The voxel is a corner of the cells one step below it and at it
        let chunk_ranges = [0, 1, 2].map(|axis| {
            let n_cells = layout.dimensions[axis].saturating_sub(1).max(1);
            let voxel = coords[axis] as usize;
            let first_cell = voxel.saturating_sub(1).min(n_cells - 1);
            let last_cell = voxel.min(n_cells - 1);
            let cells_per_chunk = self.cells_per_chunk[axis].max(1);
            (first_cell / cells_per_chunk, last_cell / cells_per_chunk)
        });

        for cz in chunk_ranges[2].0..=chunk_ranges[2].1 {
            for cy in chunk_ranges[1].0..=chunk_ranges[1].1 {
                for cx in chunk_ranges[0].0..=chunk_ranges[0].1 {
                    let chunk_idx = self.chunk_index(cx, cy, cz);
                    self.modified_chunks.insert(chunk_idx);
                }
            }
        }
    }

    /// Re-extracts the mesh of every modified chunk from the given field,
    /// spreading the chunks over the thread pool, and clears the modified
    /// state. Returns the number of extracted chunks.
    ///
    /// # Errors
    /// Returns an error if no input image has been set, or if the given
    /// field does not have the layout of the input image.
    pub fn update(&mut self, image: &ImageData, thread_pool: &RayonThreadPool) -> Result<usize> {
        let Some(layout) = &self.layout else {
            bail!("Tried to update isosurface before setting input image");
        };
        if layout != &FieldLayout::of(image) {
            bail!(
                "Field with dimensions {:?} does not match isosurface input with dimensions {:?}",
                image.dimensions(),
                layout.dimensions
            );
        }

        let mut chunks: Vec<_> = if self.all_modified {
            (0..self.n_chunks()).collect()
        } else {
            self.modified_chunks.iter().copied().collect()
        };
        chunks.sort_unstable();

        let meshes = thread_pool.map_collect(&chunks, |&chunk_idx| {
            marching_cubes(image, self.iso_value, &self.chunk_cell_range(chunk_idx))
        });

        for (chunk_idx, mesh) in chunks.iter().zip(meshes) {
            self.outputs[*chunk_idx] = mesh;
        }

        debug!("Extracted isosurface for {} of {} chunks", chunks.len(), self.n_chunks());

        self.modified_chunks.clear();
        self.all_modified = false;

        Ok(chunks.len())
    }

    fn resolve_chunks(&mut self) {
        let Some(layout) = &self.layout else {
            return;
        };

        let n_cells = layout.dimensions.map(|dim| dim.saturating_sub(1));
        let chunk_counts = [0, 1, 2].map(|axis| {
            let requested = self.requested_chunk_counts[axis];
            let resolved = nearest_divisor(n_cells[axis], requested);
            if resolved != requested {
                warn!(
                    "Number of isosurface chunks {requested} along axis {axis} does not divide \
                     {} cells, using {resolved}",
                    n_cells[axis]
                );
            }
            resolved
        });

        self.chunk_counts = chunk_counts;
        self.cells_per_chunk = [0, 1, 2].map(|axis| n_cells[axis] / chunk_counts[axis]);
        self.outputs = vec![SurfaceMesh::empty(); self.n_chunks()];
        self.modified_chunks.clear();
        self.all_modified = true;
    }
}

impl Default for LocalMarchingCubes {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldLayout {
    fn of(image: &ImageData) -> Self {
        Self {
            dimensions: image.dimensions(),
            spacing: *image.spacing(),
            origin: *image.origin(),
        }
    }
}

/// The divisor of `n` closest to `target`, picking the smaller on ties. A
/// zero `n` has the single divisor one.
fn nearest_divisor(n: usize, target: usize) -> usize {
    if n == 0 {
        return 1;
    }
    (1..=n)
        .filter(|divisor| n % divisor == 0)
        .min_by_key(|&divisor| (divisor.abs_diff(target), divisor))
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{point, vector};
    use std::num::NonZeroUsize;

    fn thread_pool() -> RayonThreadPool {
        RayonThreadPool::new(NonZeroUsize::new(2).unwrap()).unwrap()
    }

    fn sphere_image(dim: i32, radius: f64) -> ImageData {
        let c = f64::from(dim - 1) / 2.0;
        let center = point![c, c, c];
        ImageData::from_fn([dim; 3], Vector3::repeat(1.0), Point3::origin(), |p| {
            (p - center).norm() - radius
        })
        .unwrap()
    }

    #[test]
    fn nearest_divisor_prefers_smaller_on_ties() {
        assert_eq!(nearest_divisor(12, 5), 4);
        assert_eq!(nearest_divisor(12, 6), 6);
        assert_eq!(nearest_divisor(12, 100), 12);
        assert_eq!(nearest_divisor(12, 0), 1);
        assert_eq!(nearest_divisor(7, 3), 1);
        assert_eq!(nearest_divisor(0, 3), 1);
    }

    #[test]
    fn invalid_chunk_counts_fall_back_to_divisors() {
        let mut extractor = LocalMarchingCubes::new();
        extractor.set_input_image(&sphere_image(13, 4.0));

        extractor.set_number_of_chunks([5, 5, 5]);

        for count in extractor.chunk_counts() {
            assert_eq!(12 % count, 0);
        }
        assert_eq!(extractor.chunk_counts(), [4, 4, 4]);
    }

    #[test]
    fn valid_chunk_counts_are_accepted() {
        let mut extractor = LocalMarchingCubes::new();
        extractor.set_input_image(&sphere_image(13, 4.0));

        extractor.set_number_of_chunks([4, 3, 1]);

        assert_eq!(extractor.chunk_counts(), [4, 3, 1]);
        assert_eq!(extractor.n_chunks(), 12);
    }

    #[test]
    fn chunk_counts_requested_before_input_are_checked_against_input() {
        let mut extractor = LocalMarchingCubes::from_config(&IsosurfaceConfig {
            iso_value: 0.0,
            n_chunks: [5, 2, 3],
        });

        extractor.set_input_image(&sphere_image(13, 4.0));

        assert_eq!(extractor.chunk_counts(), [4, 2, 3]);
    }

    #[test]
    fn chunk_index_is_row_major_with_x_fastest() {
        let mut extractor = LocalMarchingCubes::new();
        extractor.set_input_image(&sphere_image(13, 4.0));
        extractor.set_number_of_chunks([4, 3, 2]);

        assert_eq!(extractor.chunk_index(0, 0, 0), 0);
        assert_eq!(extractor.chunk_index(1, 0, 0), 1);
        assert_eq!(extractor.chunk_index(0, 1, 0), 4);
        assert_eq!(extractor.chunk_index(3, 2, 1), 23);
        assert_eq!(
            extractor.chunk_cell_range(23),
            CellRange {
                lower: [9, 8, 6],
                upper: [12, 12, 12],
            }
        );
    }

    #[test]
    fn updating_without_input_fails() {
        let mut extractor = LocalMarchingCubes::new();
        assert!(extractor.update(&sphere_image(5, 1.0), &thread_pool()).is_err());
    }

    #[test]
    fn updating_with_mismatched_field_fails() {
        let mut extractor = LocalMarchingCubes::new();
        extractor.set_input_image(&sphere_image(5, 1.0));
        assert!(extractor.update(&sphere_image(7, 1.0), &thread_pool()).is_err());
    }

    #[test]
    fn first_update_extracts_all_chunks() {
        let image = sphere_image(13, 4.0);
        let mut extractor = LocalMarchingCubes::new();
        extractor.set_input_image(&image);
        extractor.set_number_of_chunks([2, 2, 2]);
        assert!(extractor.is_all_modified());

        let n_extracted = extractor.update(&image, &thread_pool()).unwrap();

        assert_eq!(n_extracted, 8);
        assert!(!extractor.is_all_modified());
        assert!(extractor.outputs().iter().all(|mesh| mesh.n_triangles() > 0));

        let whole = marching_cubes(&image, 0.0, &CellRange::all_cells(&image));
        let chunked_triangles: usize = extractor.outputs().iter().map(SurfaceMesh::n_triangles).sum();
        assert_eq!(chunked_triangles, whole.n_triangles());
    }

    #[test]
    fn updating_only_reextracts_chunks_touching_modified_voxel() {
        let mut image = sphere_image(13, 4.0);
        let pool = thread_pool();

        let mut extractor = LocalMarchingCubes::new();
        extractor.set_input_image(&image);
        extractor.set_number_of_chunks([4, 4, 4]);
        extractor.update(&image, &pool).unwrap();
        let before = extractor.outputs().to_vec();

        let coords = vector![2, 6, 6];
        image.set_scalar(&coords, 0, -1.0);
        extractor.set_modified(&coords);

        let mut expected: Vec<_> = [(0, 1, 1), (0, 2, 1), (0, 1, 2), (0, 2, 2)]
            .map(|(cx, cy, cz)| extractor.chunk_index(cx, cy, cz))
            .to_vec();
        expected.sort_unstable();
        let mut modified: Vec<_> = extractor.modified_chunks().collect();
        modified.sort_unstable();
        assert_eq!(modified, expected);

        let n_extracted = extractor.update(&image, &pool).unwrap();

        assert_eq!(n_extracted, 4);
        for (chunk_idx, (old, new)) in before.iter().zip(extractor.outputs()).enumerate() {
            if !expected.contains(&chunk_idx) {
                assert_eq!(old, new);
            }
        }
        assert!(expected.iter().any(|&chunk_idx| before[chunk_idx] != extractor.outputs()[chunk_idx]));
        assert_eq!(extractor.modified_chunks().count(), 0);
    }

    #[test]
    fn modified_voxel_at_field_corner_marks_single_chunk() {
        let image = sphere_image(13, 4.0);
        let mut extractor = LocalMarchingCubes::new();
        extractor.set_input_image(&image);
        extractor.set_number_of_chunks([4, 4, 4]);
        extractor.update(&image, &thread_pool()).unwrap();

        extractor.set_modified(&vector![12, 12, 12]);

        assert_eq!(extractor.modified_chunks().collect::<Vec<_>>(), [63]);
    }

    #[test]
    fn modified_voxels_outside_field_are_ignored() {
        let image = sphere_image(5, 1.0);
        let mut extractor = LocalMarchingCubes::new();
        extractor.set_input_image(&image);
        extractor.update(&image, &thread_pool()).unwrap();

        extractor.set_modified(&vector![-1, 0, 0]);
        extractor.set_modified(&vector![0, 5, 0]);

        assert_eq!(extractor.modified_chunks().count(), 0);
    }

    #[test]
    fn changing_iso_value_marks_all_modified() {
        let image = sphere_image(5, 1.0);
        let mut extractor = LocalMarchingCubes::new();
        extractor.set_input_image(&image);
        extractor.update(&image, &thread_pool()).unwrap();

        extractor.set_iso_value(0.5);

        assert!(extractor.is_all_modified());
    }

    #[test]
    fn marking_all_modified_extracts_every_chunk() {
        let image = sphere_image(5, 1.0);
        let mut extractor = LocalMarchingCubes::new();
        extractor.set_input_image(&image);
        extractor.set_number_of_chunks([2, 2, 2]);
        let pool = thread_pool();
        extractor.update(&image, &pool).unwrap();

        extractor.set_modified(&vector![0, 0, 0]);
        extractor.set_all_modified();

        assert_eq!(extractor.modified_chunks().count(), 0);
        assert_eq!(extractor.update(&image, &pool).unwrap(), 8);
    }
}
