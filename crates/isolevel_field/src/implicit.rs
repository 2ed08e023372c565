//! Functions defining a surface implicitly as their zero level set.

use crate::{image_data::ImageData, sdf::SignedDistanceField};
use nalgebra::{Point3, UnitVector3, Vector3};

/// A scalar function over space whose zero level set defines a surface,
/// along with its gradient.
///
/// For signed distance functions the value is negative inside the surface.
pub trait ImplicitFunction {
    /// Evaluates the function at the given position.
    fn value(&self, position: &Point3<f64>) -> f64;

    /// Evaluates the gradient of the function at the given position.
    fn gradient(&self, position: &Point3<f64>) -> Vector3<f64>;
}

/// A plane, represented by a unit normal and a displacement. The function
/// value is the signed distance to the plane, positive in the halfspace the
/// normal points into.
#[derive(Clone, Debug, PartialEq)]
pub struct Plane {
    unit_normal: UnitVector3<f64>,
    displacement: f64,
}

/// A sphere whose function value is the signed distance to its surface.
#[derive(Clone, Debug, PartialEq)]
pub struct Sphere {
    center: Point3<f64>,
    radius: f64,
}

/// The kind of geometry held by an [`ImplicitGeometry`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ImplicitGeometryKind {
    SignedDistanceField,
    Plane,
    Sphere,
}

/// An owned implicit geometry of any supported kind.
#[derive(Clone, Debug)]
pub enum ImplicitGeometry {
    SignedDistanceField(SignedDistanceField),
    Plane(Plane),
    Sphere(Sphere),
}

impl Plane {
    /// Creates a new plane defined by the given unit normal vector and
    /// displacement.
    pub fn new(unit_normal: UnitVector3<f64>, displacement: f64) -> Self {
        Self {
            unit_normal,
            displacement,
        }
    }

    /// Creates a new plane defined by the given unit normal vector and point
    /// in the plane.
    pub fn from_normal_and_point(unit_normal: UnitVector3<f64>, point_in_plane: &Point3<f64>) -> Self {
        let displacement = -unit_normal.dot(&point_in_plane.coords);
        Self::new(unit_normal, displacement)
    }

    pub fn unit_normal(&self) -> &UnitVector3<f64> {
        &self.unit_normal
    }

    pub fn displacement(&self) -> f64 {
        self.displacement
    }
}

impl ImplicitFunction for Plane {
    fn value(&self, position: &Point3<f64>) -> f64 {
        self.unit_normal.dot(&position.coords) + self.displacement
    }

    fn gradient(&self, _position: &Point3<f64>) -> Vector3<f64> {
        self.unit_normal.into_inner()
    }
}

impl Sphere {
    /// Creates a new sphere with the given center and radius.
    ///
    /// # Panics
    /// If `radius` is negative.
    pub fn new(center: Point3<f64>, radius: f64) -> Self {
        assert!(radius >= 0.0, "Tried to create sphere with negative radius");
        Self { center, radius }
    }

    pub fn center(&self) -> &Point3<f64> {
        &self.center
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }
}

impl ImplicitFunction for Sphere {
    fn value(&self, position: &Point3<f64>) -> f64 {
        (position - self.center).norm() - self.radius
    }

    fn gradient(&self, position: &Point3<f64>) -> Vector3<f64> {
        let offset = position - self.center;
        offset
            .try_normalize(f64::EPSILON)
            .unwrap_or_else(Vector3::zeros)
    }
}

impl ImplicitGeometry {
    pub fn kind(&self) -> ImplicitGeometryKind {
        match self {
            Self::SignedDistanceField(_) => ImplicitGeometryKind::SignedDistanceField,
            Self::Plane(_) => ImplicitGeometryKind::Plane,
            Self::Sphere(_) => ImplicitGeometryKind::Sphere,
        }
    }

    pub fn as_signed_distance_field(&self) -> Option<&SignedDistanceField> {
        if let Self::SignedDistanceField(sdf) = self {
            Some(sdf)
        } else {
            None
        }
    }
}

impl ImplicitFunction for ImplicitGeometry {
    fn value(&self, position: &Point3<f64>) -> f64 {
        match self {
            Self::SignedDistanceField(sdf) => sdf.value(position),
            Self::Plane(plane) => plane.value(position),
            Self::Sphere(sphere) => sphere.value(position),
        }
    }

    fn gradient(&self, position: &Point3<f64>) -> Vector3<f64> {
        match self {
            Self::SignedDistanceField(sdf) => sdf.gradient(position),
            Self::Plane(plane) => plane.gradient(position),
            Self::Sphere(sphere) => sphere.gradient(position),
        }
    }
}

impl From<SignedDistanceField> for ImplicitGeometry {
    fn from(sdf: SignedDistanceField) -> Self {
        Self::SignedDistanceField(sdf)
    }
}

impl From<ImageData> for ImplicitGeometry {
    fn from(image: ImageData) -> Self {
        Self::SignedDistanceField(SignedDistanceField::new(image))
    }
}

impl From<Plane> for ImplicitGeometry {
    fn from(plane: Plane) -> Self {
        Self::Plane(plane)
    }
}

impl From<Sphere> for ImplicitGeometry {
    fn from(sphere: Sphere) -> Self {
        Self::Sphere(sphere)
    }
}
