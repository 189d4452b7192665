//! Simulated camera rig: ideal pinhole cameras around the dance floor.
//!
//! Pixel coordinates are centred on the principal point with Y pointing up,
//! so a larger pixel Y means higher in the scene.

use duetpose_env::{CameraId, EnvError, RayProjector, RayRecord};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;

/// Points closer than this in front of the lens are not imaged.
const MIN_DEPTH: f64 = 1e-6;

/// An ideal pinhole camera.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PinholeCamera {
    pub id: CameraId,

    /// Optical centre (meters)
    pub centre: Vector3<f64>,

    /// Unit viewing direction
    pub forward: Vector3<f64>,

    /// Unit image X axis in the scene
    pub right: Vector3<f64>,

    /// Unit image Y axis in the scene
    pub up: Vector3<f64>,

    /// Focal length (pixels)
    pub focal: f64,
}

impl PinholeCamera {
    /// Camera at `centre` aimed at `target`, level with the floor.
    ///
    /// Returns `None` when looking straight up or down.
    pub fn looking_at(id: CameraId, centre: Vector3<f64>, target: Vector3<f64>, focal: f64) -> Option<Self> {
        let forward = (target - centre).try_normalize(MIN_DEPTH)?;
        let right = forward.cross(&Vector3::y()).try_normalize(MIN_DEPTH)?;
        let up = right.cross(&forward);
        Some(Self {
            id,
            centre,
            forward,
            right,
            up,
            focal,
        })
    }

    /// Pixel of a scene point, or `None` behind the camera.
    pub fn project(&self, point: &Vector3<f64>) -> Option<[f64; 2]> {
        let w = point - self.centre;
        let depth = w.dot(&self.forward);
        if depth < MIN_DEPTH {
            return None;
        }
        Some([
            self.focal * w.dot(&self.right) / depth,
            self.focal * w.dot(&self.up) / depth,
        ])
    }

    /// Viewing ray through a pixel.
    pub fn ray(&self, pixel: [f64; 2]) -> RayRecord {
        let direction =
            self.forward + self.right * (pixel[0] / self.focal) + self.up * (pixel[1] / self.focal);
        RayRecord::new(self.centre.into(), direction.into())
    }
}

/// All cameras of one capture.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CameraRig {
    cameras: Vec<PinholeCamera>,
}

impl CameraRig {
    pub fn new(cameras: Vec<PinholeCamera>) -> Self {
        Self { cameras }
    }

    /// `count` cameras evenly spaced on a horizontal ring, all aimed at `target`.
    pub fn ring(count: usize, radius: f64, height: f64, target: Vector3<f64>, focal: f64) -> Self {
        let cameras = (0..count)
            .filter_map(|i| {
                let angle = i as f64 * TAU / count as f64;
                let centre = Vector3::new(radius * angle.cos(), height, radius * angle.sin());
                PinholeCamera::looking_at(CameraId(i as u32), centre, target, focal)
            })
            .collect();
        Self { cameras }
    }

    pub fn cameras(&self) -> &[PinholeCamera] {
        &self.cameras
    }

    pub fn ids(&self) -> Vec<CameraId> {
        self.cameras.iter().map(|c| c.id).collect()
    }

    pub fn camera(&self, id: CameraId) -> Option<&PinholeCamera> {
        self.cameras.iter().find(|c| c.id == id)
    }

    pub fn len(&self) -> usize {
        self.cameras.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cameras.is_empty()
    }
}

impl RayProjector for CameraRig {
    fn pixel_ray(&self, camera: CameraId, pixel: [f64; 2]) -> Result<RayRecord, EnvError> {
        let cam = self.camera(camera).ok_or(EnvError::UnknownCamera(camera))?;
        if !(pixel[0].is_finite() && pixel[1].is_finite()) {
            return Err(EnvError::projection(format!("non-finite pixel {pixel:?} on {camera}")));
        }
        Ok(cam.ray(pixel))
    }
}
