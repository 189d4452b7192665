//! Ground truth oracle for simulation.
//!
//! The Oracle holds the "God's eye view" of the dance floor:
//! - Two dancers (Lead and Follow) with fixed bone lengths
//! - Deterministic choreography derived from the physics seed
//! - Static floor-seated spectators acting as distractors

use duetpose_core::{Joint, Pose3D, RestLengths, Role};
use duetpose_env::JOINT_COUNT;
use nalgebra::{Rotation3, Vector3};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;

/// Standing template, pelvis centred on the floor, facing +Z, left at +X.
const STANDING: [[f64; 3]; JOINT_COUNT] = [
    [0.0, 1.65, 0.1],
    [0.03, 1.68, 0.08],
    [-0.03, 1.68, 0.08],
    [0.07, 1.66, 0.0],
    [-0.07, 1.66, 0.0],
    [0.18, 1.45, 0.0],
    [-0.18, 1.45, 0.0],
    [0.22, 1.17, -0.02],
    [-0.22, 1.17, -0.02],
    [0.24, 0.92, 0.04],
    [-0.24, 0.92, 0.04],
    [0.1, 0.95, 0.0],
    [-0.1, 0.95, 0.0],
    [0.11, 0.51, 0.04],
    [-0.11, 0.51, 0.04],
    [0.12, 0.07, 0.0],
    [-0.12, 0.07, 0.0],
];

/// Spectator sitting on the floor, knees up.
const SEATED: [[f64; 3]; JOINT_COUNT] = [
    [0.0, 0.5, 0.05],
    [0.03, 0.52, 0.03],
    [-0.03, 0.52, 0.03],
    [0.07, 0.5, -0.03],
    [-0.07, 0.5, -0.03],
    [0.17, 0.38, -0.05],
    [-0.17, 0.38, -0.05],
    [0.22, 0.2, 0.05],
    [-0.22, 0.2, 0.05],
    [0.2, 0.1, 0.25],
    [-0.2, 0.1, 0.25],
    [0.1, 0.05, -0.05],
    [-0.1, 0.05, -0.05],
    [0.12, 0.3, 0.3],
    [-0.12, 0.3, 0.3],
    [0.12, 0.03, 0.5],
    [-0.12, 0.03, 0.5],
];

/// Choreography of one dancer: circling a centre while swinging limbs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dancer {
    pub role: Role,

    /// Centre of the circle on the floor (meters)
    pub centre: Vector3<f64>,

    /// Circle radius (meters)
    pub radius: f64,

    /// Angular speed around the centre (rad/s)
    pub angular_speed: f64,

    /// Starting angle (rad)
    pub phase: f64,

    /// Uniform body scale relative to the template
    pub scale: f64,

    /// Peak arm swing (rad)
    pub arm_amplitude: f64,

    /// Arm swing frequency (Hz)
    pub arm_frequency: f64,
}

impl Dancer {
    /// Ground-truth pose at time `t` seconds.
    pub fn pose_at(&self, t: f64) -> Pose3D {
        let angle = self.phase + self.angular_speed * t;
        let position = self.centre + Vector3::new(angle.cos(), 0.0, angle.sin()) * self.radius;
        let yaw = Rotation3::from_axis_angle(&Vector3::y_axis(), -angle);
        let swing = self.arm_amplitude * (TAU * self.arm_frequency * t + self.phase).sin();

        let mut local = STANDING.map(|[x, y, z]| Vector3::new(x, y, z) * self.scale);
        swing_limb(&mut local, Joint::LeftShoulder, &[Joint::LeftElbow, Joint::LeftWrist], swing);
        swing_limb(&mut local, Joint::RightShoulder, &[Joint::RightElbow, Joint::RightWrist], -swing);
        swing_limb(&mut local, Joint::LeftHip, &[Joint::LeftKnee, Joint::LeftAnkle], -0.3 * swing);
        swing_limb(&mut local, Joint::RightHip, &[Joint::RightKnee, Joint::RightAnkle], 0.3 * swing);

        Pose3D::new(local.map(|p| position + yaw * p))
    }
}

/// Rotates `limb` rigidly about the pivot joint's X axis.
fn swing_limb(joints: &mut [Vector3<f64>; JOINT_COUNT], pivot: Joint, limb: &[Joint], angle: f64) {
    let rotation = Rotation3::from_axis_angle(&Vector3::x_axis(), angle);
    let origin = joints[pivot.index()];
    for joint in limb {
        let offset = joints[joint.index()] - origin;
        joints[joint.index()] = origin + rotation * offset;
    }
}

/// The Oracle - ground truth for both dancers and every spectator.
pub struct Oracle {
    /// Master seed (separate from the sensor seed)
    physics_seed: u64,

    /// RNG for choreography parameters and spectator placement
    physics_rng: ChaCha8Rng,

    /// Frames per second
    frame_rate: f64,

    lead: Dancer,
    follow: Dancer,

    /// Static spectator poses
    spectators: Vec<Pose3D>,
}

impl Oracle {
    /// Creates an Oracle with choreography drawn from `physics_seed`.
    pub fn new(physics_seed: u64) -> Self {
        let mut physics_rng = ChaCha8Rng::seed_from_u64(physics_seed);
        let lead = Self::choreograph(&mut physics_rng, Role::Lead, -0.9, 1.0);
        let follow = Self::choreograph(&mut physics_rng, Role::Follow, 0.9, 0.88);

        Self {
            physics_seed,
            physics_rng,
            frame_rate: 30.0,
            lead,
            follow,
            spectators: Vec::new(),
        }
    }

    fn choreograph(rng: &mut ChaCha8Rng, role: Role, x: f64, scale: f64) -> Dancer {
        Dancer {
            role,
            centre: Vector3::new(x, 0.0, 0.0),
            radius: rng.gen_range(0.25..0.4),
            angular_speed: rng.gen_range(0.4..0.7),
            phase: rng.gen_range(0.0..TAU),
            scale,
            arm_amplitude: rng.gen_range(0.3..0.5),
            arm_frequency: rng.gen_range(0.25..0.4),
        }
    }

    pub fn with_frame_rate(mut self, frame_rate: f64) -> Self {
        self.frame_rate = frame_rate;
        self
    }

    pub fn physics_seed(&self) -> u64 {
        self.physics_seed
    }

    pub fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    /// Time of `frame` in seconds.
    pub fn time_of(&self, frame: usize) -> f64 {
        frame as f64 / self.frame_rate
    }

    pub fn dancer(&self, role: Role) -> Option<&Dancer> {
        match role {
            Role::Lead => Some(&self.lead),
            Role::Follow => Some(&self.follow),
            Role::Unknown => None,
        }
    }

    /// Ground-truth pose of a dancer at `frame`.
    pub fn pose(&self, role: Role, frame: usize) -> Option<Pose3D> {
        self.dancer(role).map(|d| d.pose_at(self.time_of(frame)))
    }

    /// True bone lengths of a dancer; constant over the whole dance.
    pub fn rest_lengths(&self, role: Role) -> Option<RestLengths> {
        RestLengths::from_pose(&self.pose(role, 0)?).ok()
    }

    /// Seats a spectator at a random spot on a ring around the floor.
    pub fn spawn_spectator(&mut self, ring_radius: f64) -> usize {
        let angle = self.physics_rng.gen_range(0.0..TAU);
        let facing = self.physics_rng.gen_range(0.0..TAU);
        let position = Vector3::new(angle.cos(), 0.0, angle.sin()) * ring_radius;
        let yaw = Rotation3::from_axis_angle(&Vector3::y_axis(), facing);

        let joints = SEATED.map(|[x, y, z]| position + yaw * Vector3::new(x, y, z));
        self.spectators.push(Pose3D::new(joints));
        self.spectators.len() - 1
    }

    pub fn spectators(&self) -> &[Pose3D] {
        &self.spectators
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duetpose_core::Bone;

    #[test]
    fn test_choreography_is_deterministic() {
        let a = Oracle::new(42);
        let b = Oracle::new(42);
        let c = Oracle::new(43);

        assert_eq!(a.pose(Role::Lead, 17), b.pose(Role::Lead, 17));
        assert_ne!(a.pose(Role::Lead, 17), c.pose(Role::Lead, 17));
    }

    #[test]
    fn test_bone_lengths_constant() {
        let oracle = Oracle::new(7);
        for role in Role::TRACKED {
            let rest = oracle.rest_lengths(role).unwrap();
            for frame in [0, 13, 45, 90] {
                let pose = oracle.pose(role, frame).unwrap();
                for bone in Bone::ALL {
                    assert!((pose.bone_length(bone) - rest.get(bone)).abs() < 1e-9);
                }
            }
        }
    }

    #[test]
    fn test_dancers_stay_apart() {
        let oracle = Oracle::new(3);
        for frame in 0..300 {
            let lead = oracle.pose(Role::Lead, frame).unwrap();
            let follow = oracle.pose(Role::Follow, frame).unwrap();
            let gap = (lead.get(Joint::Nose) - follow.get(Joint::Nose)).norm();
            assert!(gap > 0.7, "frame {frame}: noses {gap} apart");
        }
        assert!(oracle.pose(Role::Unknown, 0).is_none());
    }

    #[test]
    fn test_follow_is_shorter() {
        let oracle = Oracle::new(1);
        let lead = oracle.rest_lengths(Role::Lead).unwrap();
        let follow = oracle.rest_lengths(Role::Follow).unwrap();
        assert!(follow.get(Bone::LeftThigh) < lead.get(Bone::LeftThigh));
    }

    #[test]
    fn test_spectators_sit_low() {
        let mut oracle = Oracle::new(5);
        oracle.spawn_spectator(3.2);
        oracle.spawn_spectator(3.2);

        assert_eq!(oracle.spectators().len(), 2);
        for pose in oracle.spectators() {
            assert!(pose.get(Joint::Nose).y < 0.6);
            let xz = Vector3::new(pose.get(Joint::LeftHip).x, 0.0, pose.get(Joint::LeftHip).z);
            assert!(xz.norm() > 2.5);
        }
    }
}
