//! Finite difference operators over implicit functions.
//!
//! The continuous operators sample any [`ImplicitFunction`] at offsets given
//! by a step vector. The structured operators read the samples of a
//! [`SignedDistanceField`] directly at integer voxel offsets, which avoids
//! interpolation in the hot loops of the level set evolution. They take
//! coordinates already in voxel space.

use crate::{image_data::VoxelCoords, implicit::ImplicitFunction, sdf::SignedDistanceField};
use nalgebra::{Point3, Vector3};

/// One-sided difference `(f(p + dx) - f(p)) / dx` along each axis.
#[derive(Clone, Debug, PartialEq)]
pub struct ForwardGradient {
    step: Step,
}

/// One-sided difference `(f(p) - f(p - dx)) / dx` along each axis.
#[derive(Clone, Debug, PartialEq)]
pub struct BackwardGradient {
    step: Step,
}

/// Centered difference `(f(p + dx) - f(p - dx)) / 2dx` along each axis.
#[derive(Clone, Debug, PartialEq)]
pub struct CentralGradient {
    step: Step,
}

/// Forward difference at integer voxel offsets of a signed distance field.
#[derive(Clone, Debug, PartialEq)]
pub struct StructuredForwardGradient {
    step: StructuredStep,
}

/// Backward difference at integer voxel offsets of a signed distance field.
#[derive(Clone, Debug, PartialEq)]
pub struct StructuredBackwardGradient {
    step: StructuredStep,
}

/// Central difference at integer voxel offsets of a signed distance field.
#[derive(Clone, Debug, PartialEq)]
pub struct StructuredCentralGradient {
    step: StructuredStep,
}

/// Curvature flow term `κ|∇φ|` of a signed distance field, computed from
/// the 18-neighbour stencil around a voxel:
///
/// ```text
/// (φxx(φy² + φz²) + φyy(φx² + φz²) + φzz(φx² + φy²)
///   - 2φxφyφxy - 2φxφzφxz - 2φyφzφyz) / (φx² + φy² + φz² + ε)
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct StructuredCurvature {
    step: StructuredStep,
}

#[derive(Clone, Debug, PartialEq)]
struct Step {
    dx: Vector3<f64>,
    inverse_dx: Vector3<f64>,
}

#[derive(Clone, Debug, PartialEq)]
struct StructuredStep {
    dxi: VoxelCoords,
    inverse_dx: Vector3<f64>,
}

impl Step {
    fn new(dx: Vector3<f64>) -> Self {
        Self {
            dx,
            inverse_dx: dx.map(f64::recip),
        }
    }

    fn offset(&self, axis: usize) -> Vector3<f64> {
        let mut offset = Vector3::zeros();
        offset[axis] = self.dx[axis];
        offset
    }
}

impl Default for Step {
    fn default() -> Self {
        Self::new(Vector3::repeat(1.0))
    }
}

impl StructuredStep {
    fn new(dxi: VoxelCoords, spacing: &Vector3<f64>) -> Self {
        Self {
            dxi,
            inverse_dx: spacing.component_mul(&dxi.cast::<f64>()).map(f64::recip),
        }
    }

    #[inline]
    fn offset(&self, axis: usize) -> VoxelCoords {
        let mut offset = VoxelCoords::zeros();
        offset[axis] = self.dxi[axis];
        offset
    }
}

impl Default for StructuredStep {
    fn default() -> Self {
        Self::new(VoxelCoords::repeat(1), &Vector3::repeat(1.0))
    }
}

macro_rules! impl_continuous_constructors {
    ($name:ident) => {
        impl $name {
            /// Creates an operator with the given step along each axis.
            pub fn new(dx: Vector3<f64>) -> Self {
                Self { step: Step::new(dx) }
            }

            pub fn dx(&self) -> &Vector3<f64> {
                &self.step.dx
            }

            pub fn set_dx(&mut self, dx: Vector3<f64>) {
                self.step = Step::new(dx);
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self { step: Step::default() }
            }
        }
    };
}

macro_rules! impl_structured_constructors {
    ($name:ident) => {
        impl $name {
            /// Creates an operator stepping `dxi` voxels along each axis of a
            /// grid with the given voxel spacing.
            pub fn new(dxi: VoxelCoords, spacing: &Vector3<f64>) -> Self {
                Self {
                    step: StructuredStep::new(dxi, spacing),
                }
            }

            pub fn dxi(&self) -> &VoxelCoords {
                &self.step.dxi
            }

            pub fn set_dx(&mut self, dxi: VoxelCoords, spacing: &Vector3<f64>) {
                self.step = StructuredStep::new(dxi, spacing);
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self {
                    step: StructuredStep::default(),
                }
            }
        }
    };
}

impl_continuous_constructors!(ForwardGradient);
impl_continuous_constructors!(BackwardGradient);
impl_continuous_constructors!(CentralGradient);
impl_structured_constructors!(StructuredForwardGradient);
impl_structured_constructors!(StructuredBackwardGradient);
impl_structured_constructors!(StructuredCentralGradient);
impl_structured_constructors!(StructuredCurvature);

impl ForwardGradient {
    pub fn evaluate<F>(&self, function: &F, position: &Point3<f64>) -> Vector3<f64>
    where
        F: ImplicitFunction + ?Sized,
    {
        let center = function.value(position);
        Vector3::from_fn(|axis, _| {
            (function.value(&(position + self.step.offset(axis))) - center)
                * self.step.inverse_dx[axis]
        })
    }
}

impl BackwardGradient {
    pub fn evaluate<F>(&self, function: &F, position: &Point3<f64>) -> Vector3<f64>
    where
        F: ImplicitFunction + ?Sized,
    {
        let center = function.value(position);
        Vector3::from_fn(|axis, _| {
            (center - function.value(&(position - self.step.offset(axis))))
                * self.step.inverse_dx[axis]
        })
    }
}

impl CentralGradient {
    pub fn evaluate<F>(&self, function: &F, position: &Point3<f64>) -> Vector3<f64>
    where
        F: ImplicitFunction + ?Sized,
    {
        Vector3::from_fn(|axis, _| {
            let offset = self.step.offset(axis);
            0.5 * (function.value(&(position + offset)) - function.value(&(position - offset)))
                * self.step.inverse_dx[axis]
        })
    }
}

impl StructuredForwardGradient {
    #[inline]
    pub fn evaluate(&self, sdf: &SignedDistanceField, coords: &VoxelCoords) -> Vector3<f64> {
        let center = sdf.value_at_coords(coords);
        Vector3::from_fn(|axis, _| {
            (sdf.value_at_coords(&(coords + self.step.offset(axis))) - center)
                * self.step.inverse_dx[axis]
        })
    }
}

impl StructuredBackwardGradient {
    #[inline]
    pub fn evaluate(&self, sdf: &SignedDistanceField, coords: &VoxelCoords) -> Vector3<f64> {
        let center = sdf.value_at_coords(coords);
        Vector3::from_fn(|axis, _| {
            (center - sdf.value_at_coords(&(coords - self.step.offset(axis))))
                * self.step.inverse_dx[axis]
        })
    }
}

impl StructuredCentralGradient {
    #[inline]
    pub fn evaluate(&self, sdf: &SignedDistanceField, coords: &VoxelCoords) -> Vector3<f64> {
        Vector3::from_fn(|axis, _| {
            let offset = self.step.offset(axis);
            0.5 * (sdf.value_at_coords(&(coords + offset)) - sdf.value_at_coords(&(coords - offset)))
                * self.step.inverse_dx[axis]
        })
    }
}

impl StructuredCurvature {
    pub fn evaluate(&self, sdf: &SignedDistanceField, coords: &VoxelCoords) -> f64 {
        let [ox, oy, oz] = [0, 1, 2].map(|axis| self.step.offset(axis));
        let [ix, iy, iz] = [0, 1, 2].map(|axis| self.step.inverse_dx[axis]);
        let at = |offset: VoxelCoords| sdf.value_at_coords(&(coords + offset));

        let center = at(VoxelCoords::zeros());

        let (min_x, max_x) = (at(-ox), at(ox));
        let (min_y, max_y) = (at(-oy), at(oy));
        let (min_z, max_z) = (at(-oz), at(oz));

        let dx = 0.5 * (max_x - min_x) * ix;
        let dy = 0.5 * (max_y - min_y) * iy;
        let dz = 0.5 * (max_z - min_z) * iz;

        let dxx = (max_x - 2.0 * center + min_x) * ix * ix;
        let dyy = (max_y - 2.0 * center + min_y) * iy * iy;
        let dzz = (max_z - 2.0 * center + min_z) * iz * iz;

        let dxy = 0.25 * (at(ox + oy) + at(-ox - oy) - at(ox - oy) - at(-ox + oy)) * ix * iy;
        let dxz = 0.25 * (at(ox + oz) + at(-ox - oz) - at(ox - oz) - at(-ox + oz)) * ix * iz;
        let dyz = 0.25 * (at(oy + oz) + at(-oy - oz) - at(oy - oz) - at(-oy + oz)) * iy * iz;

        let (dx2, dy2, dz2) = (dx * dx, dy * dy, dz * dz);

        (dxx * (dy2 + dz2) + dyy * (dx2 + dz2) + dzz * (dx2 + dy2)
            - 2.0 * dx * dy * dxy
            - 2.0 * dx * dz * dxz
            - 2.0 * dy * dz * dyz)
            / (dx2 + dy2 + dz2 + f64::EPSILON)
    }
}
