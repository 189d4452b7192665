//! The "TRIANGULATION" Engine - Least-Squares Ray Intersection
//!
//! Finds the 3D point minimizing the summed squared perpendicular distance to
//! a set of camera rays:
//!
//! ```text
//! f(p) = Σ |(p - oᵢ) - dᵢ((p - oᵢ)·dᵢ)|²
//! ∇f(p) = Σ 2·((p - oᵢ) - dᵢ((p - oᵢ)·dᵢ))
//! ```
//!
//! The solver starts at the centroid of the ray origins and runs fixed-step
//! gradient descent. It always returns a point; running out of iterations is
//! reported through [`Triangulation::converged`], never as an error.

use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

use crate::geometry::Ray;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Configuration for the RaySetTriangulator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriangulationConfig {
    /// Gradient descent step size (default: 0.01)
    pub step_size: f64,

    /// Stop once one step changes the objective by less than this (default: 1e-12)
    pub tolerance: f64,

    /// Hard iteration cap (default: 1000)
    pub max_iterations: usize,

    /// Joints seen by fewer cameras are left undefined by the pipeline (default: 2)
    pub min_rays: usize,
}

impl Default for TriangulationConfig {
    fn default() -> Self {
        Self {
            step_size: 0.01,
            tolerance: 1e-12,
            max_iterations: 1000,
            min_rays: 2,
        }
    }
}

// ============================================================================
// RESULT
// ============================================================================

/// Outcome of one triangulation, with solver diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Triangulation {
    /// Least-squares point
    pub point: Vector3<f64>,

    /// Objective at `point`
    pub objective: f64,

    /// Objective at the origin centroid (starting point)
    pub initial_objective: f64,

    /// Descent steps taken
    pub iterations: usize,

    /// False only when the iteration cap was reached
    pub converged: bool,
}

// ============================================================================
// TRIANGULATOR
// ============================================================================

/// Iterative least-squares intersection of a ray set.
#[derive(Debug, Clone, Default)]
pub struct RaySetTriangulator {
    config: TriangulationConfig,
}

impl RaySetTriangulator {
    pub fn new(config: TriangulationConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(TriangulationConfig::default())
    }

    pub fn config(&self) -> &TriangulationConfig {
        &self.config
    }

    /// Returns the least-squares point of `rays`.
    ///
    /// # Panics
    /// If `rays` is empty. Use [`RaySetTriangulator::triangulate_checked`]
    /// when the ray set may be empty.
    pub fn triangulate(&self, rays: &[Ray]) -> Vector3<f64> {
        self.solve(rays).point
    }

    /// Like [`RaySetTriangulator::triangulate`], returning `None` for an empty set.
    pub fn triangulate_checked(&self, rays: &[Ray]) -> Option<Triangulation> {
        if rays.is_empty() {
            None
        } else {
            Some(self.solve(rays))
        }
    }

    /// Runs the descent and returns the point with diagnostics.
    ///
    /// # Panics
    /// If `rays` is empty.
    pub fn solve(&self, rays: &[Ray]) -> Triangulation {
        assert!(!rays.is_empty(), "triangulation requires at least one ray");

        if rays.len() == 1 {
            return Triangulation {
                point: rays[0].origin(),
                objective: 0.0,
                initial_objective: 0.0,
                iterations: 0,
                converged: true,
            };
        }

        let mut point = centroid(rays);
        let initial_objective = objective(rays, &point);
        let mut current = initial_objective;
        let mut iterations = 0;
        let mut converged = false;

        while iterations < self.config.max_iterations {
            let step = gradient(rays, &point) * self.config.step_size;
            let candidate = point - step;
            let next = objective(rays, &candidate);
            iterations += 1;

            // A step that does not descend means the fixed step size has hit
            // the floating-point floor around the minimum.
            if !(next <= current) {
                converged = true;
                break;
            }

            let delta = current - next;
            point = candidate;
            current = next;

            if delta < self.config.tolerance {
                converged = true;
                break;
            }
        }

        Triangulation {
            point,
            objective: current,
            initial_objective,
            iterations,
            converged,
        }
    }
}

// ============================================================================
// OBJECTIVE & GRADIENT
// ============================================================================

/// Sum of squared perpendicular distances from `point` to every ray.
pub fn objective(rays: &[Ray], point: &Vector3<f64>) -> f64 {
    rays.iter().map(|r| r.squared_distance_to_point(point)).sum()
}

/// Gradient of [`objective`]. A non-finite result is replaced by zero.
pub fn gradient(rays: &[Ray], point: &Vector3<f64>) -> Vector3<f64> {
    let g: Vector3<f64> = rays.iter().map(|r| r.perpendicular(point) * 2.0).sum();
    if g.iter().all(|v| v.is_finite()) {
        g
    } else {
        Vector3::zeros()
    }
}

/// Mean of the ray origins.
///
/// # Panics
/// If `rays` is empty.
pub fn centroid(rays: &[Ray]) -> Vector3<f64> {
    assert!(!rays.is_empty(), "centroid of an empty ray set");
    let sum: Vector3<f64> = rays.iter().map(|r| r.origin()).sum();
    sum / rays.len() as f64
}

/// Direct normal-equation solution `(Σ Pᵢ) p = Σ Pᵢ oᵢ`, with `Pᵢ = I - dᵢdᵢᵀ`.
///
/// Returns `None` when the system is singular (fewer than two non-parallel rays).
pub fn triangulate_closed_form(rays: &[Ray]) -> Option<Vector3<f64>> {
    let mut a = Matrix3::zeros();
    let mut b = Vector3::zeros();
    for ray in rays {
        let d = ray.direction();
        let projector = Matrix3::identity() - d * d.transpose();
        a += projector;
        b += projector * ray.origin();
    }
    let inverse = a.try_inverse()?;
    let p = inverse * b;
    p.iter().all(|v| v.is_finite()).then_some(p)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn rays_through(target: Vector3<f64>, origins: &[Vector3<f64>]) -> Vec<Ray> {
        origins
            .iter()
            .map(|o| Ray::through(*o, target).unwrap())
            .collect()
    }

    #[test]
    fn test_three_rays_meet_at_target() {
        let target = Vector3::new(1.0, 2.0, 3.0);
        let rays = rays_through(
            target,
            &[
                Vector3::new(6.0, 2.0, 3.0),
                Vector3::new(1.0, 7.0, 3.0),
                Vector3::new(1.0, 2.0, 8.0),
            ],
        );

        let result = RaySetTriangulator::with_defaults().solve(&rays);
        assert!((result.point - target).norm() < 1e-3);
        assert!(result.converged);
        assert!(result.objective <= result.initial_objective);
    }

    #[test]
    fn test_single_ray_returns_origin() {
        let ray = Ray::new(Vector3::new(4.0, 5.0, 6.0), Vector3::y()).unwrap();
        let result = RaySetTriangulator::with_defaults().solve(&[ray]);
        assert_eq!(result.point, Vector3::new(4.0, 5.0, 6.0));
        assert_eq!(result.iterations, 0);
    }

    #[test]
    #[should_panic(expected = "at least one ray")]
    fn test_empty_input_panics() {
        RaySetTriangulator::with_defaults().triangulate(&[]);
    }

    #[test]
    fn test_checked_empty() {
        assert!(RaySetTriangulator::with_defaults()
            .triangulate_checked(&[])
            .is_none());
    }

    #[test]
    fn test_descent_never_increases_objective() {
        // Skew rays that do not intersect
        let rays = vec![
            Ray::new(Vector3::new(0.0, 0.0, 0.0), Vector3::x()).unwrap(),
            Ray::new(Vector3::new(0.0, 1.0, 0.0), Vector3::z()).unwrap(),
            Ray::new(Vector3::new(3.0, -2.0, 1.0), Vector3::new(1.0, 1.0, 0.0)).unwrap(),
        ];
        let result = RaySetTriangulator::with_defaults().solve(&rays);
        assert!(result.objective <= objective(&rays, &centroid(&rays)));
    }

    #[test]
    fn test_iteration_cap_respected() {
        let config = TriangulationConfig {
            max_iterations: 3,
            ..Default::default()
        };
        let target = Vector3::new(1.0, 2.0, 3.0);
        let rays = rays_through(
            target,
            &[
                Vector3::new(6.0, 2.0, 3.0),
                Vector3::new(1.0, 7.0, 3.0),
                Vector3::new(1.0, 2.0, 8.0),
            ],
        );
        let result = RaySetTriangulator::new(config).solve(&rays);
        assert_eq!(result.iterations, 3);
        assert!(!result.converged);
        assert!(result.objective < result.initial_objective);
    }

    #[test]
    fn test_gradient_zero_at_intersection() {
        let target = Vector3::new(-1.0, 0.5, 2.0);
        let rays = rays_through(
            target,
            &[Vector3::new(3.0, 0.0, 0.0), Vector3::new(0.0, 4.0, 0.0)],
        );
        assert_relative_eq!(gradient(&rays, &target).norm(), 0.0, epsilon = 1e-12);
        assert_relative_eq!(objective(&rays, &target), 0.0, epsilon = 1e-20);
    }

    #[test]
    fn test_closed_form_matches_iterative() {
        let target = Vector3::new(0.5, 1.5, -0.5);
        let rays = rays_through(
            target,
            &[
                Vector3::new(5.0, 2.0, 0.0),
                Vector3::new(-3.0, 2.0, 4.0),
                Vector3::new(0.0, 6.0, -4.0),
            ],
        );
        let closed = triangulate_closed_form(&rays).unwrap();
        assert_relative_eq!(closed, target, epsilon = 1e-9);

        let iterative = RaySetTriangulator::with_defaults().triangulate(&rays);
        assert!((iterative - closed).norm() < 1e-3);
    }

    #[test]
    fn test_closed_form_parallel_rays_singular() {
        let rays = vec![
            Ray::new(Vector3::zeros(), Vector3::z()).unwrap(),
            Ray::new(Vector3::new(1.0, 0.0, 0.0), Vector3::z()).unwrap(),
        ];
        assert!(triangulate_closed_form(&rays).is_none());
    }
}
