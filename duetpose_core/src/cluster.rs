//! Two-subject ray bundle splitting.
//!
//! When detections carry no identity, the rays of one joint from every camera
//! form a mixed bundle containing both subjects. Each ray is classified by the
//! side of the bundle's provisional centre it passes on, as seen from its own
//! camera:
//!
//! ```text
//! to_ray = origin - target
//! cross  = up × to_ray
//! side   = B if cross · direction > 0, else A
//! ```

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::geometry::Ray;
use crate::triangulation::RaySetTriangulator;

/// Which half of a split a ray landed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    A,
    B,
}

/// The two halves of one split. Together they hold every input ray once.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RaySplit {
    pub group_a: Vec<Ray>,
    pub group_b: Vec<Ray>,
}

impl RaySplit {
    pub fn len(&self) -> usize {
        self.group_a.len() + self.group_b.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Up to two 3D candidates for one joint in one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct JointCandidates {
    pub group_a: Option<Vector3<f64>>,
    pub group_b: Option<Vector3<f64>>,
}

impl JointCandidates {
    pub fn count(&self) -> usize {
        self.group_a.is_some() as usize + self.group_b.is_some() as usize
    }

    pub fn iter(&self) -> impl Iterator<Item = Vector3<f64>> + '_ {
        self.group_a.iter().chain(self.group_b.iter()).copied()
    }
}

/// Partitions a mixed ray bundle into two spatial groups.
#[derive(Debug, Clone)]
pub struct RayClusterSplitter {
    up: Vector3<f64>,
}

impl Default for RayClusterSplitter {
    fn default() -> Self {
        Self::new(Vector3::y())
    }
}

impl RayClusterSplitter {
    /// Creates a splitter for a scene whose vertical axis is `up`.
    pub fn new(up: Vector3<f64>) -> Self {
        Self { up }
    }

    pub fn up(&self) -> Vector3<f64> {
        self.up
    }

    /// Classifies one ray against `target`. An exact zero goes to A.
    pub fn side(&self, ray: &Ray, target: &Vector3<f64>) -> Side {
        let to_ray = ray.origin() - target;
        let cross = self.up.cross(&to_ray);
        if cross.dot(&ray.direction()) > 0.0 {
            Side::B
        } else {
            Side::A
        }
    }

    /// Splits `rays` about `target`, preserving input order within each group.
    pub fn split(&self, rays: &[Ray], target: &Vector3<f64>) -> RaySplit {
        let mut split = RaySplit::default();
        for ray in rays {
            match self.side(ray, target) {
                Side::A => split.group_a.push(*ray),
                Side::B => split.group_b.push(*ray),
            }
        }
        split
    }

    /// Splits about the least-squares point of the whole bundle.
    ///
    /// Returns the split and the point it was taken about, or `None` for an
    /// empty bundle.
    pub fn split_about_naive(
        &self,
        rays: &[Ray],
        triangulator: &RaySetTriangulator,
    ) -> Option<(RaySplit, Vector3<f64>)> {
        let naive = triangulator.triangulate_checked(rays)?.point;
        Some((self.split(rays, &naive), naive))
    }

    /// Splits a mixed bundle and triangulates each group holding at least
    /// `min_rays` rays.
    pub fn triangulate_pair(
        &self,
        rays: &[Ray],
        triangulator: &RaySetTriangulator,
        min_rays: usize,
    ) -> JointCandidates {
        if rays.len() < min_rays {
            return JointCandidates::default();
        }
        let Some((split, _)) = self.split_about_naive(rays, triangulator) else {
            return JointCandidates::default();
        };
        let solve = |group: &[Ray]| {
            if group.len() < min_rays {
                return None;
            }
            triangulator.triangulate_checked(group).map(|t| t.point)
        };
        JointCandidates {
            group_a: solve(&split.group_a),
            group_b: solve(&split.group_b),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn front_cameras() -> Vec<Vector3<f64>> {
        vec![
            Vector3::new(-4.0, 2.0, 6.0),
            Vector3::new(0.0, 2.0, 7.0),
            Vector3::new(4.0, 2.0, 6.0),
        ]
    }

    #[test]
    fn test_side_convention() {
        let splitter = RayClusterSplitter::default();
        let camera = Vector3::new(0.0, 0.0, 5.0);
        let target = Vector3::zeros();

        let left = Ray::through(camera, Vector3::new(-1.0, 0.0, 0.0)).unwrap();
        let right = Ray::through(camera, Vector3::new(1.0, 0.0, 0.0)).unwrap();
        assert_eq!(splitter.side(&left, &target), Side::A);
        assert_eq!(splitter.side(&right, &target), Side::B);
    }

    #[test]
    fn test_exact_zero_goes_to_a() {
        let splitter = RayClusterSplitter::default();
        let ray = Ray::through(Vector3::new(0.0, 0.0, 5.0), Vector3::zeros()).unwrap();
        assert_eq!(splitter.side(&ray, &Vector3::zeros()), Side::A);
    }

    #[test]
    fn test_split_partitions_input() {
        let splitter = RayClusterSplitter::default();
        let mut rays = Vec::new();
        for camera in front_cameras() {
            rays.push(Ray::through(camera, Vector3::new(-1.0, 1.0, 0.0)).unwrap());
            rays.push(Ray::through(camera, Vector3::new(1.0, 1.0, 0.0)).unwrap());
        }
        let split = splitter.split(&rays, &Vector3::new(0.0, 1.0, 0.0));
        assert_eq!(split.len(), rays.len());
        assert_eq!(split.group_a.len(), 3);
        assert_eq!(split.group_b.len(), 3);
    }

    #[test]
    fn test_triangulate_pair_recovers_both_subjects() {
        let splitter = RayClusterSplitter::default();
        let triangulator = RaySetTriangulator::with_defaults();
        let lead = Vector3::new(-1.0, 1.0, 0.0);
        let follow = Vector3::new(1.0, 1.2, 0.0);

        let mut rays = Vec::new();
        for camera in front_cameras() {
            rays.push(Ray::through(camera, lead).unwrap());
            rays.push(Ray::through(camera, follow).unwrap());
        }

        let candidates = splitter.triangulate_pair(&rays, &triangulator, 2);
        assert_eq!(candidates.count(), 2);
        let a = candidates.group_a.unwrap();
        let b = candidates.group_b.unwrap();
        assert!((a - lead).norm() < 1e-2);
        assert!((b - follow).norm() < 1e-2);
    }

    #[test]
    fn test_empty_bundle() {
        let splitter = RayClusterSplitter::default();
        let triangulator = RaySetTriangulator::with_defaults();
        assert!(splitter.split_about_naive(&[], &triangulator).is_none());
        assert_eq!(splitter.triangulate_pair(&[], &triangulator, 2).count(), 0);
    }

    #[test]
    fn test_lone_ray_group_yields_no_candidate() {
        let splitter = RayClusterSplitter::default();
        let triangulator = RaySetTriangulator::with_defaults();
        let lead = Vector3::new(-1.0, 1.0, 0.0);
        let follow = Vector3::new(1.0, 1.2, 0.0);

        // Every camera sees the lead, only one sees the follow
        let cameras = front_cameras();
        let mut rays: Vec<Ray> = cameras
            .iter()
            .map(|c| Ray::through(*c, lead).unwrap())
            .collect();
        rays.push(Ray::through(cameras[1], follow).unwrap());

        let (split, _) = splitter.split_about_naive(&rays, &triangulator).unwrap();
        let lone = if split.group_a.len() == 1 { Side::A } else { Side::B };
        assert_eq!(split.group_a.len().min(split.group_b.len()), 1);

        let candidates = splitter.triangulate_pair(&rays, &triangulator, 2);
        assert_eq!(candidates.count(), 1);
        let kept = match lone {
            Side::A => candidates.group_b,
            Side::B => candidates.group_a,
        };
        assert!(kept.is_some());
        // The lone ray's camera centre never becomes a candidate
        assert!(candidates.iter().all(|p| (p - cameras[1]).norm() > 1.0));

        // With a threshold of one the lone ray collapses onto its origin
        let loose = splitter.triangulate_pair(&rays, &triangulator, 1);
        assert_eq!(loose.count(), 2);
    }
}
