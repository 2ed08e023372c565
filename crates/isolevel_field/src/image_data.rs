//! Dense 3D arrays of scalar samples on a regular grid.

use anyhow::{Result, bail};
use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

/// Integer coordinates of a voxel in a structured grid. Coordinates are
/// signed so that stencils reaching past the grid can be expressed before
/// they are bounds checked.
pub type VoxelCoords = Vector3<i32>;

/// The floating-point type of the samples in an [`ImageData`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarType {
    F32,
    #[default]
    F64,
}

/// Flat storage for the samples of an [`ImageData`].
#[derive(Clone, Debug, PartialEq)]
pub enum ScalarBuffer {
    F32(Vec<f32>),
    F64(Vec<f64>),
}

/// A dense 3D array of scalar samples with a given spacing and origin.
///
/// The sample for component `c` of the voxel at `(x, y, z)` lives at flat
/// index `(x + y*nx + z*nx*ny)*num_components + c`. The buffer always holds
/// exactly `nx*ny*nz*num_components` samples. Voxel `(x, y, z)` sits at world
/// position `origin + spacing ⊙ (x, y, z)`.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageData {
    scalars: ScalarBuffer,
    num_components: usize,
    dimensions: [usize; 3],
    spacing: Vector3<f64>,
    inverse_spacing: Vector3<f64>,
    origin: Point3<f64>,
}

impl ScalarType {
    /// The size of one sample of this type, in bytes.
    pub const fn size(&self) -> usize {
        match self {
            Self::F32 => 4,
            Self::F64 => 8,
        }
    }
}

impl ScalarBuffer {
    fn zeroed(scalar_type: ScalarType, len: usize) -> Self {
        match scalar_type {
            ScalarType::F32 => Self::F32(vec![0.0; len]),
            ScalarType::F64 => Self::F64(vec![0.0; len]),
        }
    }

    pub fn scalar_type(&self) -> ScalarType {
        match self {
            Self::F32(_) => ScalarType::F32,
            Self::F64(_) => ScalarType::F64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::F32(values) => values.len(),
            Self::F64(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the sample at the given flat index, widened to `f64`.
    ///
    /// # Panics
    /// If the index is out of bounds.
    pub fn get(&self, idx: usize) -> f64 {
        match self {
            Self::F32(values) => f64::from(values[idx]),
            Self::F64(values) => values[idx],
        }
    }

    /// Stores the given value at the given flat index, narrowing it if the
    /// buffer holds `f32` samples.
    ///
    /// # Panics
    /// If the index is out of bounds.
    pub fn set(&mut self, idx: usize, value: f64) {
        match self {
            Self::F32(values) => values[idx] = value as f32,
            Self::F64(values) => values[idx] = value,
        }
    }
}

impl ImageData {
    /// Creates an empty, unallocated image.
    pub fn new() -> Self {
        Self {
            scalars: ScalarBuffer::F64(Vec::new()),
            num_components: 1,
            dimensions: [0; 3],
            spacing: Vector3::repeat(1.0),
            inverse_spacing: Vector3::repeat(1.0),
            origin: Point3::origin(),
        }
    }

    /// Creates an image and allocates it with the given layout. See
    /// [`allocate`](Self::allocate).
    pub fn allocated(
        scalar_type: ScalarType,
        num_components: usize,
        dimensions: [i32; 3],
        spacing: Vector3<f64>,
        origin: Point3<f64>,
    ) -> Result<Self> {
        let mut image = Self::new();
        image.allocate(scalar_type, num_components, dimensions, spacing, origin)?;
        Ok(image)
    }

    /// Creates a single-component `f64` image by evaluating the given
    /// function at the world position of every voxel.
    pub fn from_fn(
        dimensions: [i32; 3],
        spacing: Vector3<f64>,
        origin: Point3<f64>,
        mut f: impl FnMut(&Point3<f64>) -> f64,
    ) -> Result<Self> {
        let mut image = Self::allocated(ScalarType::F64, 1, dimensions, spacing, origin)?;
        for idx in 0..image.n_voxels() {
            let position = image.coords_to_position(&image.coords_from_linear_idx(idx));
            image.scalars.set(idx, f(&position));
        }
        Ok(image)
    }

    /// (Re)allocates the sample buffer for the given layout and fills it
    /// with zeros.
    ///
    /// # Errors
    /// Returns an error if any dimension is not positive, if the number of
    /// components is zero or if any spacing component is not positive.
    pub fn allocate(
        &mut self,
        scalar_type: ScalarType,
        num_components: usize,
        dimensions: [i32; 3],
        spacing: Vector3<f64>,
        origin: Point3<f64>,
    ) -> Result<()> {
        if dimensions.iter().any(|&dim| dim <= 0) {
            bail!("Invalid dimensions {dimensions:?} for image data: all must be positive");
        }
        if num_components == 0 {
            bail!("Invalid number of components for image data: must be at least one");
        }
        if spacing.iter().any(|&extent| extent <= 0.0 || !extent.is_finite()) {
            bail!("Invalid spacing {spacing:?} for image data: all components must be positive");
        }

        let dimensions = dimensions.map(|dim| dim as usize);
        let n_samples = dimensions.iter().product::<usize>() * num_components;

        self.scalars = ScalarBuffer::zeroed(scalar_type, n_samples);
        self.num_components = num_components;
        self.dimensions = dimensions;
        self.spacing = spacing;
        self.inverse_spacing = spacing.map(f64::recip);
        self.origin = origin;

        Ok(())
    }

    pub fn scalar_type(&self) -> ScalarType {
        self.scalars.scalar_type()
    }

    pub fn num_components(&self) -> usize {
        self.num_components
    }

    /// Returns the number of voxels along each axis.
    pub fn dimensions(&self) -> [usize; 3] {
        self.dimensions
    }

    /// Returns the number of voxels in the image.
    pub fn n_voxels(&self) -> usize {
        self.dimensions.iter().product()
    }

    pub fn is_allocated(&self) -> bool {
        !self.scalars.is_empty()
    }

    pub fn spacing(&self) -> &Vector3<f64> {
        &self.spacing
    }

    pub fn inverse_spacing(&self) -> &Vector3<f64> {
        &self.inverse_spacing
    }

    pub fn origin(&self) -> &Point3<f64> {
        &self.origin
    }

    /// Returns the world-space positions of the first and last voxel, which
    /// bound the region where the image has samples.
    pub fn bounds(&self) -> (Point3<f64>, Point3<f64>) {
        let extent = Vector3::from_fn(|axis, _| {
            self.spacing[axis] * self.dimensions[axis].saturating_sub(1) as f64
        });
        (self.origin, self.origin + extent)
    }

    /// Whether the given voxel coordinates lie inside the image.
    pub fn contains_coords(&self, coords: &VoxelCoords) -> bool {
        (0..3).all(|axis| coords[axis] >= 0 && (coords[axis] as usize) < self.dimensions[axis])
    }

    /// Returns the flat voxel index of the given coordinates, which must lie
    /// inside the image.
    pub fn linear_idx(&self, coords: &VoxelCoords) -> usize {
        debug_assert!(self.contains_coords(coords));
        let [nx, ny, _] = self.dimensions;
        coords.x as usize + coords.y as usize * nx + coords.z as usize * nx * ny
    }

    /// Returns the voxel coordinates of the given flat voxel index.
    pub fn coords_from_linear_idx(&self, idx: usize) -> VoxelCoords {
        let [nx, ny, _] = self.dimensions;
        let z = idx / (nx * ny);
        let rem = idx - z * nx * ny;
        let y = rem / nx;
        let x = rem - y * nx;
        VoxelCoords::new(x as i32, y as i32, z as i32)
    }

    /// Returns the world-space position of the given voxel.
    pub fn coords_to_position(&self, coords: &VoxelCoords) -> Point3<f64> {
        self.origin + self.spacing.component_mul(&coords.cast::<f64>())
    }

    /// Converts the given world-space position to continuous voxel
    /// coordinates.
    pub fn position_to_structured(&self, position: &Point3<f64>) -> Vector3<f64> {
        (position - self.origin).component_mul(&self.inverse_spacing)
    }

    /// Returns the given component of the voxel at the given coordinates.
    ///
    /// # Panics
    /// If the coordinates or the component are out of range.
    pub fn scalar(&self, coords: &VoxelCoords, component: usize) -> f64 {
        self.scalars
            .get(self.linear_idx(coords) * self.num_components + component)
    }

    /// Sets the given component of the voxel at the given coordinates.
    ///
    /// # Panics
    /// If the coordinates or the component are out of range.
    pub fn set_scalar(&mut self, coords: &VoxelCoords, component: usize, value: f64) {
        let idx = self.linear_idx(coords) * self.num_components + component;
        self.scalars.set(idx, value);
    }

    /// Returns the first component of the voxel at the given coordinates.
    pub fn value_at_coords(&self, coords: &VoxelCoords) -> f64 {
        self.scalar(coords, 0)
    }

    /// Samples the first component at the given world-space position by
    /// trilinear interpolation between the eight surrounding voxels.
    ///
    /// Positions past the last voxel along an axis are clamped to it, so the
    /// boundary value is returned rather than extrapolated.
    ///
    /// # Panics
    /// If the image has not been allocated.
    pub fn value_at_position(&self, position: &Point3<f64>) -> f64 {
        let structured = self.position_to_structured(position);

        let mut lower = [0; 3];
        let mut upper = [0; 3];
        let mut weights = [0.0; 3];

        for axis in 0..3 {
            let max_coord = self.dimensions[axis] - 1;
            let coord = structured[axis].clamp(0.0, max_coord as f64);
            let lower_coord = (coord.floor() as usize).min(max_coord);
            lower[axis] = lower_coord;
            upper[axis] = (lower_coord + 1).min(max_coord);
            weights[axis] = coord - lower_coord as f64;
        }

        let sample = |x: usize, y: usize, z: usize| {
            let [nx, ny, _] = self.dimensions;
            self.scalars
                .get((x + y * nx + z * nx * ny) * self.num_components)
        };

        let [x0, y0, z0] = lower;
        let [x1, y1, z1] = upper;
        let [wx, wy, wz] = weights;

        let c00 = sample(x0, y0, z0) * (1.0 - wx) + sample(x1, y0, z0) * wx;
        let c10 = sample(x0, y1, z0) * (1.0 - wx) + sample(x1, y1, z0) * wx;
        let c01 = sample(x0, y0, z1) * (1.0 - wx) + sample(x1, y0, z1) * wx;
        let c11 = sample(x0, y1, z1) * (1.0 - wx) + sample(x1, y1, z1) * wx;

        let c0 = c00 * (1.0 - wy) + c10 * wy;
        let c1 = c01 * (1.0 - wy) + c11 * wy;

        c0 * (1.0 - wz) + c1 * wz
    }

    pub fn scalars(&self) -> &ScalarBuffer {
        &self.scalars
    }

    pub fn scalars_mut(&mut self) -> &mut ScalarBuffer {
        &mut self.scalars
    }

    /// Returns the samples as a slice if the image holds `f64` samples.
    pub fn f64_scalars(&self) -> Option<&[f64]> {
        match &self.scalars {
            ScalarBuffer::F64(values) => Some(values),
            ScalarBuffer::F32(_) => None,
        }
    }

    /// Returns the samples as a mutable slice if the image holds `f64`
    /// samples.
    pub fn f64_scalars_mut(&mut self) -> Option<&mut [f64]> {
        match &mut self.scalars {
            ScalarBuffer::F64(values) => Some(values),
            ScalarBuffer::F32(_) => None,
        }
    }

    /// Returns a copy of this image with the samples converted to the given
    /// type.
    pub fn cast_to(&self, scalar_type: ScalarType) -> Self {
        let scalars = match (&self.scalars, scalar_type) {
            (ScalarBuffer::F32(values), ScalarType::F64) => {
                ScalarBuffer::F64(values.iter().copied().map(f64::from).collect())
            }
            (ScalarBuffer::F64(values), ScalarType::F32) => {
                ScalarBuffer::F32(values.iter().map(|&value| value as f32).collect())
            }
            (scalars, _) => scalars.clone(),
        };
        Self {
            scalars,
            ..self.clone()
        }
    }
}

impl Default for ImageData {
    fn default() -> Self {
        Self::new()
    }
}
