//! Structured scalar fields and the implicit functions defined on them.

pub mod finite_difference;
pub mod image_data;
pub mod implicit;
pub mod sdf;

pub use finite_difference::{
    BackwardGradient, CentralGradient, ForwardGradient, StructuredBackwardGradient,
    StructuredCentralGradient, StructuredCurvature, StructuredForwardGradient,
};
pub use image_data::{ImageData, ScalarBuffer, ScalarType, VoxelCoords};
pub use implicit::{ImplicitFunction, ImplicitGeometry, ImplicitGeometryKind, Plane, Sphere};
pub use sdf::SignedDistanceField;
