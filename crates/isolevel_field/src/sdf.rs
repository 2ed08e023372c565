//! Signed distance fields sampled on a structured grid.

use crate::{
    image_data::{ImageData, VoxelCoords},
    implicit::ImplicitFunction,
};
use nalgebra::{Point3, Vector3};

/// Adapts an [`ImageData`] holding signed distances to the
/// [`ImplicitFunction`] interface.
///
/// Inside the bounds of the image, values are trilinearly interpolated from
/// the samples and multiplied by the scale. Outside the bounds the value is
/// [`Self::OUTSIDE_VALUE`] and the gradient is zero.
#[derive(Clone, Debug, PartialEq)]
pub struct SignedDistanceField {
    image: ImageData,
    scale: f64,
}

impl SignedDistanceField {
    /// Value reported for positions outside the bounds of the field.
    pub const OUTSIDE_VALUE: f64 = f64::MAX;

    pub fn new(image: ImageData) -> Self {
        Self { image, scale: 1.0 }
    }

    /// Uses the given factor to scale the stored distances.
    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    pub fn image(&self) -> &ImageData {
        &self.image
    }

    pub fn image_mut(&mut self) -> &mut ImageData {
        &mut self.image
    }

    pub fn into_image(self) -> ImageData {
        self.image
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Whether the given world-space position lies within the bounds of the
    /// field. An unallocated field contains no positions.
    pub fn contains_position(&self, position: &Point3<f64>) -> bool {
        if !self.image.is_allocated() {
            return false;
        }
        let (lower, upper) = self.image.bounds();
        (0..3).all(|axis| position[axis] >= lower[axis] && position[axis] <= upper[axis])
    }

    /// Returns the scaled sample at the given voxel coordinates. Coordinates
    /// outside the field are clamped to the nearest voxel, so finite
    /// difference stencils see a zero derivative across the border.
    #[inline]
    pub fn value_at_coords(&self, coords: &VoxelCoords) -> f64 {
        let [nx, ny, nz] = self.image.dimensions();
        let clamped = VoxelCoords::new(
            coords.x.clamp(0, nx as i32 - 1),
            coords.y.clamp(0, ny as i32 - 1),
            coords.z.clamp(0, nz as i32 - 1),
        );
        self.image.value_at_coords(&clamped) * self.scale
    }
}

impl ImplicitFunction for SignedDistanceField {
    fn value(&self, position: &Point3<f64>) -> f64 {
        if self.contains_position(position) {
            self.image.value_at_position(position) * self.scale
        } else {
            Self::OUTSIDE_VALUE
        }
    }

    /// Central difference over one voxel spacing of the interpolated field.
    fn gradient(&self, position: &Point3<f64>) -> Vector3<f64> {
        if !self.contains_position(position) {
            return Vector3::zeros();
        }
        let spacing = self.image.spacing();
        Vector3::from_fn(|axis, _| {
            let mut offset = Vector3::zeros();
            offset[axis] = spacing[axis];
            let forward = self.image.value_at_position(&(position + offset));
            let backward = self.image.value_at_position(&(position - offset));
            0.5 * (forward - backward) * self.scale / spacing[axis]
        })
    }
}
