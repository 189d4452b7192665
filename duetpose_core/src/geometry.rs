//! Ray geometry shared by triangulation and cluster splitting.

use duetpose_env::RayRecord;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Direction norms below this are treated as degenerate.
pub const MIN_DIRECTION_NORM: f64 = 1e-12;

/// A sightline from a camera centre through an observed joint.
///
/// The direction is always unit length; construction normalizes it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ray {
    origin: Vector3<f64>,
    direction: Vector3<f64>,
}

impl Ray {
    /// Creates a ray, normalizing `direction`.
    ///
    /// Fails for a zero-length or non-finite direction, or a non-finite origin.
    pub fn new(origin: Vector3<f64>, direction: Vector3<f64>) -> Result<Self, GeometryError> {
        if !origin.iter().all(|v| v.is_finite()) {
            return Err(GeometryError::NonFinite);
        }
        let norm = direction.norm();
        if !norm.is_finite() {
            return Err(GeometryError::NonFinite);
        }
        if norm < MIN_DIRECTION_NORM {
            return Err(GeometryError::DegenerateDirection);
        }
        Ok(Self {
            origin,
            direction: direction / norm,
        })
    }

    /// Ray from `origin` through `target`.
    pub fn through(origin: Vector3<f64>, target: Vector3<f64>) -> Result<Self, GeometryError> {
        Self::new(origin, target - origin)
    }

    pub fn origin(&self) -> Vector3<f64> {
        self.origin
    }

    pub fn direction(&self) -> Vector3<f64> {
        self.direction
    }

    /// Point at parameter `t` along the ray.
    pub fn point_at(&self, t: f64) -> Vector3<f64> {
        self.origin + self.direction * t
    }

    /// Component of `point - origin` perpendicular to the direction.
    pub fn perpendicular(&self, point: &Vector3<f64>) -> Vector3<f64> {
        let w = point - self.origin;
        w - self.direction * w.dot(&self.direction)
    }

    /// Squared distance from `point` to the infinite line of this ray.
    pub fn squared_distance_to_point(&self, point: &Vector3<f64>) -> f64 {
        self.perpendicular(point).norm_squared()
    }

    pub fn distance_to_point(&self, point: &Vector3<f64>) -> f64 {
        self.squared_distance_to_point(point).sqrt()
    }
}

impl TryFrom<&RayRecord> for Ray {
    type Error = GeometryError;

    fn try_from(record: &RayRecord) -> Result<Self, Self::Error> {
        Ray::new(Vector3::from(record.origin), Vector3::from(record.direction))
    }
}

impl From<&Ray> for RayRecord {
    fn from(ray: &Ray) -> Self {
        RayRecord::new(ray.origin.into(), ray.direction.into())
    }
}

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GeometryError {
    #[error("Ray direction has zero length")]
    DegenerateDirection,

    #[error("Ray contains non-finite coordinates")]
    NonFinite,
}
