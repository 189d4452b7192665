//! SimWorld - the simulated capture session.
//!
//! Renders the Oracle's dancers and spectators into every camera of the rig
//! once, up front, then serves the result through [`ObservationSource`]. All
//! sensor imperfections (pixel noise, joint dropout, detection order, camera
//! blackouts) are drawn from a sensor RNG seeded separately from the physics.

use duetpose_core::{Pose3D, Role};
use duetpose_env::{CameraId, DetectionRecord, EnvError, ObservationSource};
use nalgebra::Vector3;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use std::collections::HashMap;
use tracing::debug;

use crate::oracle::Oracle;
use crate::rig::{CameraRig, PinholeCamera};

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Configuration for one simulated capture.
#[derive(Debug, Clone, PartialEq)]
pub struct SimConfig {
    /// Master seed for determinism
    pub seed: u64,

    /// Number of frames to render
    pub frames: usize,

    /// Number of cameras on the ring
    pub cameras: usize,

    /// Frames per second
    pub frame_rate: f64,

    /// Gaussian pixel noise standard deviation (default: 0 px)
    pub pixel_noise_std: f64,

    /// Per-joint probability of a missed detection (default: 0)
    pub joint_dropout: f64,

    /// Shuffle detection order every frame
    pub shuffle: bool,

    /// Persist Lead/Follow labels for the first frame (default: true).
    /// Labelled frames are annotated keyframes and never lose joints.
    pub label_first_frame: bool,

    /// Floor-seated spectators around the dance floor
    pub spectators: usize,

    /// Frames each camera goes dark for, staggered over the rig (0 = never)
    pub blackout_frames: usize,

    /// Camera ring radius (meters)
    pub rig_radius: f64,

    /// Camera height (meters)
    pub rig_height: f64,

    /// Focal length (pixels)
    pub focal: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            frames: 90,
            cameras: 6,
            frame_rate: 30.0,
            pixel_noise_std: 0.0,
            joint_dropout: 0.0,
            shuffle: false,
            label_first_frame: true,
            spectators: 0,
            blackout_frames: 0,
            rig_radius: 6.0,
            rig_height: 1.5,
            focal: 800.0,
        }
    }
}

/// Spectators sit on this ring around the floor centre (meters).
const SPECTATOR_RING: f64 = 3.6;

// ============================================================================
// WORLD
// ============================================================================

/// The SimWorld - ground truth plus everything the cameras saw.
pub struct SimWorld {
    /// Configuration
    pub config: SimConfig,

    /// Ground truth oracle
    pub oracle: Oracle,

    /// Camera rig; also the ray projector for reconstruction
    pub rig: CameraRig,

    /// Detections indexed `[camera][frame]`
    detections: Vec<Vec<Vec<DetectionRecord>>>,

    /// Persisted labels per (camera, role)
    labels: HashMap<(CameraId, Role), Vec<Option<DetectionRecord>>>,
}

impl SimWorld {
    /// Builds the scene and renders every frame.
    pub fn new(config: SimConfig) -> Result<Self, SimError> {
        let noise = Normal::new(0.0, config.pixel_noise_std)
            .map_err(|e| SimError::InvalidConfig(format!("pixel_noise_std: {e}")))?;
        if !(0.0..=1.0).contains(&config.joint_dropout) {
            return Err(SimError::InvalidConfig(format!(
                "joint_dropout {} outside [0, 1]",
                config.joint_dropout
            )));
        }
        if config.frame_rate <= 0.0 {
            return Err(SimError::InvalidConfig("frame_rate must be positive".into()));
        }

        // Derive separate seeds for different subsystems
        let physics_seed = config.seed.wrapping_mul(0x9e3779b97f4a7c15);
        let sensor_seed = config.seed.wrapping_mul(0x517cc1b727220a95);

        let mut oracle = Oracle::new(physics_seed).with_frame_rate(config.frame_rate);
        for _ in 0..config.spectators {
            oracle.spawn_spectator(SPECTATOR_RING);
        }

        let rig = CameraRig::ring(
            config.cameras,
            config.rig_radius,
            config.rig_height,
            Vector3::new(0.0, 1.0, 0.0),
            config.focal,
        );

        let mut world = Self {
            config,
            oracle,
            rig,
            detections: Vec::new(),
            labels: HashMap::new(),
        };
        world.render(&mut ChaCha8Rng::seed_from_u64(sensor_seed), &noise);
        Ok(world)
    }

    fn render(&mut self, rng: &mut ChaCha8Rng, noise: &Normal<f64>) {
        let frames = self.config.frames;
        let camera_count = self.rig.len();
        let mut detections = Vec::with_capacity(camera_count);
        let mut labels = HashMap::new();

        for (index, camera) in self.rig.cameras().iter().enumerate() {
            let mut per_frame = Vec::with_capacity(frames);
            let mut lead_labels = vec![None; frames];
            let mut follow_labels = vec![None; frames];

            for frame in 0..frames {
                if self.is_blacked_out(index, frame) {
                    per_frame.push(Vec::new());
                    continue;
                }

                let labelled = self.config.label_first_frame && frame == 0;
                let dropout = if labelled { 0.0 } else { self.config.joint_dropout };

                let mut figures: Vec<(Role, DetectionRecord)> = Vec::new();
                for role in Role::TRACKED {
                    if let Some(pose) = self.oracle.pose(role, frame) {
                        figures.push((role, self.observe(camera, &pose, dropout, rng, noise)));
                    }
                }
                for pose in self.oracle.spectators() {
                    figures.push((Role::Unknown, self.observe(camera, pose, dropout, rng, noise)));
                }

                if labelled {
                    for (role, record) in &figures {
                        match role {
                            Role::Lead => lead_labels[frame] = Some(record.clone()),
                            Role::Follow => follow_labels[frame] = Some(record.clone()),
                            Role::Unknown => {}
                        }
                    }
                }
                if self.config.shuffle {
                    figures.shuffle(rng);
                }
                per_frame.push(figures.into_iter().map(|(_, record)| record).collect());
            }

            if self.config.label_first_frame {
                labels.insert((camera.id, Role::Lead), lead_labels);
                labels.insert((camera.id, Role::Follow), follow_labels);
            }
            detections.push(per_frame);
        }

        debug!(
            cameras = camera_count,
            frames,
            spectators = self.oracle.spectators().len(),
            "Rendered capture"
        );
        self.detections = detections;
        self.labels = labels;
    }

    /// One camera's noisy, incomplete view of a pose.
    fn observe(
        &self,
        camera: &PinholeCamera,
        pose: &Pose3D,
        dropout: f64,
        rng: &mut ChaCha8Rng,
        noise: &Normal<f64>,
    ) -> DetectionRecord {
        let joints = pose
            .joints
            .iter()
            .map(|point| {
                let [u, v] = camera.project(point)?;
                let missed = dropout > 0.0 && rng.gen_bool(dropout);
                if missed {
                    return None;
                }
                Some([u + noise.sample(rng), v + noise.sample(rng)])
            })
            .collect();
        DetectionRecord::new(joints)
    }

    /// Whether camera `index` is dark at `frame`.
    ///
    /// Windows are staggered over the sequence and never cover frame 0.
    pub fn is_blacked_out(&self, index: usize, frame: usize) -> bool {
        let length = self.config.blackout_frames;
        let cameras = self.rig.len();
        if length == 0 || cameras == 0 {
            return false;
        }
        let slot = self.config.frames / cameras;
        let start = index * slot + slot / 2 + 1;
        (start..start + length).contains(&frame)
    }

    /// Ground truth for a dancer at `frame`.
    pub fn ground_truth(&self, role: Role, frame: usize) -> Option<Pose3D> {
        self.oracle.pose(role, frame)
    }

    /// Total detections over all cameras and frames.
    pub fn detection_count(&self) -> usize {
        self.detections.iter().flatten().map(Vec::len).sum()
    }

    fn camera_index(&self, camera: CameraId) -> Result<usize, EnvError> {
        self.rig
            .cameras()
            .iter()
            .position(|c| c.id == camera)
            .ok_or(EnvError::UnknownCamera(camera))
    }
}

impl ObservationSource for SimWorld {
    fn cameras(&self) -> Vec<CameraId> {
        self.rig.ids()
    }

    fn frame_count(&self) -> usize {
        self.config.frames
    }

    fn detections(&self, camera: CameraId, frame: usize) -> Result<Vec<DetectionRecord>, EnvError> {
        let index = self.camera_index(camera)?;
        self.detections[index]
            .get(frame)
            .cloned()
            .ok_or(EnvError::FrameOutOfRange {
                frame,
                frame_count: self.config.frames,
            })
    }

    fn persisted_track(
        &self,
        camera: CameraId,
        role: Role,
    ) -> Result<Option<Vec<Option<DetectionRecord>>>, EnvError> {
        self.camera_index(camera)?;
        Ok(self.labels.get(&(camera, role)).cloned())
    }
}

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error("Invalid simulation config: {0}")]
    InvalidConfig(String),

    #[error("Reconstruction failed: {0}")]
    Reconstruction(#[from] duetpose_core::ReconstructionError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use duetpose_core::Joint;

    fn world(config: SimConfig) -> SimWorld {
        SimWorld::new(config).unwrap()
    }

    #[test]
    fn test_clean_world_renders_both_dancers() {
        let world = world(SimConfig {
            frames: 10,
            ..Default::default()
        });
        assert_eq!(world.frame_count(), 10);
        assert_eq!(world.cameras().len(), 6);
        assert_eq!(world.detection_count(), 6 * 10 * 2);

        let camera = world.rig.cameras()[2].clone();
        let detections = world.detections(camera.id, 4).unwrap();
        let lead = world.ground_truth(Role::Lead, 4).unwrap();
        let nose = camera.project(&lead.get(Joint::Nose)).unwrap();
        assert_eq!(detections[0].joints[Joint::Nose.index()], Some(nose));
        assert!(detections[0].is_well_formed());
    }

    #[test]
    fn test_same_seed_same_capture() {
        let config = SimConfig {
            frames: 8,
            pixel_noise_std: 2.0,
            joint_dropout: 0.1,
            shuffle: true,
            ..Default::default()
        };
        let a = world(config.clone());
        let b = world(config);
        for camera in a.cameras() {
            for frame in 0..8 {
                assert_eq!(a.detections(camera, frame).unwrap(), b.detections(camera, frame).unwrap());
            }
        }
    }

    #[test]
    fn test_dropout_removes_joints() {
        let world = world(SimConfig {
            frames: 20,
            joint_dropout: 0.5,
            ..Default::default()
        });
        let (detected, total) = world
            .cameras()
            .iter()
            .flat_map(|&c| (0..20).map(move |f| (c, f)))
            .flat_map(|(c, f)| world.detections(c, f).unwrap())
            .fold((0, 0), |(d, t), r| (d + r.detected_count(), t + r.joints.len()));
        let ratio = detected as f64 / total as f64;
        assert!(ratio > 0.4 && ratio < 0.6, "ratio {ratio}");
    }

    #[test]
    fn test_spectators_and_labels() {
        let world = world(SimConfig {
            frames: 5,
            spectators: 2,
            shuffle: true,
            label_first_frame: true,
            ..Default::default()
        });
        let camera = world.cameras()[0];
        assert_eq!(world.detections(camera, 3).unwrap().len(), 4);

        let labels = world.persisted_track(camera, Role::Lead).unwrap().unwrap();
        assert_eq!(labels.len(), 5);
        let first = labels[0].as_ref().unwrap();
        assert!(world.detections(camera, 0).unwrap().contains(first));
        assert!(labels[1..].iter().all(Option::is_none));
        assert!(world.persisted_track(camera, Role::Unknown).unwrap().is_none());
    }

    #[test]
    fn test_labelled_frame_is_complete() {
        let labelled = world(SimConfig {
            frames: 4,
            joint_dropout: 0.5,
            ..Default::default()
        });
        for camera in labelled.cameras() {
            let labels = labelled.persisted_track(camera, Role::Follow).unwrap().unwrap();
            let label = labels[0].as_ref().unwrap();
            assert_eq!(label.detected_count(), label.joints.len());
            assert!(labelled
                .detections(camera, 0)
                .unwrap()
                .iter()
                .all(|r| r.detected_count() == r.joints.len()));
        }

        let unlabelled = world(SimConfig {
            frames: 4,
            label_first_frame: false,
            ..Default::default()
        });
        let camera = unlabelled.cameras()[0];
        assert!(unlabelled.persisted_track(camera, Role::Lead).unwrap().is_none());
    }

    #[test]
    fn test_blackouts_are_staggered() {
        let world = world(SimConfig {
            frames: 60,
            blackout_frames: 4,
            ..Default::default()
        });
        for index in 0..6 {
            let dark: Vec<usize> = (0..60).filter(|&f| world.is_blacked_out(index, f)).collect();
            assert_eq!(dark.len(), 4);
            assert!(!dark.contains(&0));
            let camera = world.cameras()[index];
            assert!(world.detections(camera, dark[0]).unwrap().is_empty());
        }
        for frame in 0..60 {
            let dark = (0..6).filter(|&i| world.is_blacked_out(i, frame)).count();
            assert!(dark <= 1);
        }
    }

    #[test]
    fn test_out_of_range_requests() {
        let world = world(SimConfig {
            frames: 3,
            ..Default::default()
        });
        assert!(matches!(
            world.detections(CameraId(99), 0),
            Err(EnvError::UnknownCamera(_))
        ));
        assert!(matches!(
            world.detections(CameraId(0), 3),
            Err(EnvError::FrameOutOfRange { frame: 3, .. })
        ));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = SimWorld::new(SimConfig {
            joint_dropout: 1.5,
            ..Default::default()
        });
        assert!(matches!(result, Err(SimError::InvalidConfig(_))));
        let result = SimWorld::new(SimConfig {
            pixel_noise_std: -1.0,
            ..Default::default()
        });
        assert!(matches!(result, Err(SimError::InvalidConfig(_))));
    }
}
