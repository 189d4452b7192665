//! The "SKELETON" Model - Joints, Bones and Poses
//!
//! Fixed 17-landmark body model shared by every stage of the reconstruction:
//! - `Joint`: landmark indices in detector order
//! - `Bone`: the 10 length-constrained joint pairs
//! - `Pose2D` / `Pose3D`: plain point arrays with no scene-graph ties

use duetpose_env::{DetectionRecord, PoseRecord, JOINT_COUNT};
use nalgebra::{Vector2, Vector3};
use serde::{Deserialize, Serialize};

pub use duetpose_env::Role;

// ============================================================================
// JOINTS
// ============================================================================

/// One of the 17 body landmarks, numbered in detector order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Joint {
    Nose = 0,
    LeftEye = 1,
    RightEye = 2,
    LeftEar = 3,
    RightEar = 4,
    LeftShoulder = 5,
    RightShoulder = 6,
    LeftElbow = 7,
    RightElbow = 8,
    LeftWrist = 9,
    RightWrist = 10,
    LeftHip = 11,
    RightHip = 12,
    LeftKnee = 13,
    RightKnee = 14,
    LeftAnkle = 15,
    RightAnkle = 16,
}

impl Joint {
    /// Number of landmarks.
    pub const COUNT: usize = JOINT_COUNT;

    /// All joints in index order.
    pub const ALL: [Joint; JOINT_COUNT] = [
        Joint::Nose,
        Joint::LeftEye,
        Joint::RightEye,
        Joint::LeftEar,
        Joint::RightEar,
        Joint::LeftShoulder,
        Joint::RightShoulder,
        Joint::LeftElbow,
        Joint::RightElbow,
        Joint::LeftWrist,
        Joint::RightWrist,
        Joint::LeftHip,
        Joint::RightHip,
        Joint::LeftKnee,
        Joint::RightKnee,
        Joint::LeftAnkle,
        Joint::RightAnkle,
    ];

    /// Detector index of this joint.
    pub fn index(&self) -> usize {
        *self as usize
    }

    /// Joint for a detector index, if in range.
    pub fn from_index(index: usize) -> Option<Joint> {
        Self::ALL.get(index).copied()
    }

    pub fn name(&self) -> &'static str {
        match self {
            Joint::Nose => "nose",
            Joint::LeftEye => "left_eye",
            Joint::RightEye => "right_eye",
            Joint::LeftEar => "left_ear",
            Joint::RightEar => "right_ear",
            Joint::LeftShoulder => "left_shoulder",
            Joint::RightShoulder => "right_shoulder",
            Joint::LeftElbow => "left_elbow",
            Joint::RightElbow => "right_elbow",
            Joint::LeftWrist => "left_wrist",
            Joint::RightWrist => "right_wrist",
            Joint::LeftHip => "left_hip",
            Joint::RightHip => "right_hip",
            Joint::LeftKnee => "left_knee",
            Joint::RightKnee => "right_knee",
            Joint::LeftAnkle => "left_ankle",
            Joint::RightAnkle => "right_ankle",
        }
    }

    /// The same landmark on the opposite body side. The nose maps to itself.
    pub fn mirrored(&self) -> Joint {
        match self {
            Joint::Nose => Joint::Nose,
            Joint::LeftEye => Joint::RightEye,
            Joint::RightEye => Joint::LeftEye,
            Joint::LeftEar => Joint::RightEar,
            Joint::RightEar => Joint::LeftEar,
            Joint::LeftShoulder => Joint::RightShoulder,
            Joint::RightShoulder => Joint::LeftShoulder,
            Joint::LeftElbow => Joint::RightElbow,
            Joint::RightElbow => Joint::LeftElbow,
            Joint::LeftWrist => Joint::RightWrist,
            Joint::RightWrist => Joint::LeftWrist,
            Joint::LeftHip => Joint::RightHip,
            Joint::RightHip => Joint::LeftHip,
            Joint::LeftKnee => Joint::RightKnee,
            Joint::RightKnee => Joint::LeftKnee,
            Joint::LeftAnkle => Joint::RightAnkle,
            Joint::RightAnkle => Joint::LeftAnkle,
        }
    }

    /// Head landmarks carry no bone constraint.
    pub fn is_head(&self) -> bool {
        self.index() <= Joint::RightEar.index()
    }
}

impl std::fmt::Display for Joint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ============================================================================
// BONES
// ============================================================================

/// A length-constrained pair of joints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Bone {
    LeftCalf,
    RightCalf,
    LeftThigh,
    RightThigh,
    LeftUpperArm,
    RightUpperArm,
    LeftForearm,
    RightForearm,
    Pelvis,
    Shoulders,
}

impl Bone {
    pub const COUNT: usize = 10;

    pub const ALL: [Bone; Bone::COUNT] = [
        Bone::LeftCalf,
        Bone::RightCalf,
        Bone::LeftThigh,
        Bone::RightThigh,
        Bone::LeftUpperArm,
        Bone::RightUpperArm,
        Bone::LeftForearm,
        Bone::RightForearm,
        Bone::Pelvis,
        Bone::Shoulders,
    ];

    /// Position of this bone in [`Bone::ALL`].
    pub fn index(&self) -> usize {
        *self as usize
    }

    /// The two joints this bone connects.
    ///
    /// Limb bones are ordered proximal first (hip before knee, shoulder
    /// before elbow); the two cross bones are ordered left first.
    pub fn endpoints(&self) -> (Joint, Joint) {
        match self {
            Bone::LeftCalf => (Joint::LeftKnee, Joint::LeftAnkle),
            Bone::RightCalf => (Joint::RightKnee, Joint::RightAnkle),
            Bone::LeftThigh => (Joint::LeftHip, Joint::LeftKnee),
            Bone::RightThigh => (Joint::RightHip, Joint::RightKnee),
            Bone::LeftUpperArm => (Joint::LeftShoulder, Joint::LeftElbow),
            Bone::RightUpperArm => (Joint::RightShoulder, Joint::RightElbow),
            Bone::LeftForearm => (Joint::LeftElbow, Joint::LeftWrist),
            Bone::RightForearm => (Joint::RightElbow, Joint::RightWrist),
            Bone::Pelvis => (Joint::LeftHip, Joint::RightHip),
            Bone::Shoulders => (Joint::LeftShoulder, Joint::RightShoulder),
        }
    }

    /// Stable integer id: the Szudzik pairing of the endpoint indices.
    pub fn pair_key(&self) -> u32 {
        let (a, b) = self.endpoints();
        szudzik_pair(a.index() as u32, b.index() as u32)
    }

    /// Inverse of [`Bone::pair_key`].
    pub fn from_pair_key(key: u32) -> Option<Bone> {
        let (a, b) = szudzik_unpair(key);
        Self::ALL.iter().copied().find(|bone| {
            let (x, y) = bone.endpoints();
            x.index() as u32 == a && y.index() as u32 == b
        })
    }

    /// Bone for an unordered joint pair.
    pub fn between(a: Joint, b: Joint) -> Option<Bone> {
        Self::ALL.iter().copied().find(|bone| {
            let (x, y) = bone.endpoints();
            (x == a && y == b) || (x == b && y == a)
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Bone::LeftCalf => "left_calf",
            Bone::RightCalf => "right_calf",
            Bone::LeftThigh => "left_thigh",
            Bone::RightThigh => "right_thigh",
            Bone::LeftUpperArm => "left_upper_arm",
            Bone::RightUpperArm => "right_upper_arm",
            Bone::LeftForearm => "left_forearm",
            Bone::RightForearm => "right_forearm",
            Bone::Pelvis => "pelvis",
            Bone::Shoulders => "shoulders",
        }
    }

    /// Bone for a [`Bone::name`].
    pub fn from_name(name: &str) -> Option<Bone> {
        Self::ALL.iter().copied().find(|bone| bone.name() == name)
    }

    /// The same bone on the opposite side. Cross bones map to themselves.
    pub fn mirrored(&self) -> Bone {
        match self {
            Bone::LeftCalf => Bone::RightCalf,
            Bone::RightCalf => Bone::LeftCalf,
            Bone::LeftThigh => Bone::RightThigh,
            Bone::RightThigh => Bone::LeftThigh,
            Bone::LeftUpperArm => Bone::RightUpperArm,
            Bone::RightUpperArm => Bone::LeftUpperArm,
            Bone::LeftForearm => Bone::RightForearm,
            Bone::RightForearm => Bone::LeftForearm,
            Bone::Pelvis => Bone::Pelvis,
            Bone::Shoulders => Bone::Shoulders,
        }
    }
}

impl std::fmt::Display for Bone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

fn szudzik_pair(a: u32, b: u32) -> u32 {
    if a >= b {
        a * a + a + b
    } else {
        b * b + a
    }
}

fn szudzik_unpair(z: u32) -> (u32, u32) {
    let s = (z as f64).sqrt().floor() as u32;
    let rem = z - s * s;
    if rem < s {
        (rem, s)
    } else {
        (s, rem - s)
    }
}

// ============================================================================
// POSES
// ============================================================================

/// One figure's 2D detection in pixel coordinates (y-up).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose2D {
    pub joints: [Option<Vector2<f64>>; JOINT_COUNT],
}

impl Pose2D {
    pub fn new(joints: [Option<Vector2<f64>>; JOINT_COUNT]) -> Self {
        Self { joints }
    }

    pub fn get(&self, joint: Joint) -> Option<Vector2<f64>> {
        self.joints[joint.index()]
    }

    pub fn set(&mut self, joint: Joint, position: Option<Vector2<f64>>) {
        self.joints[joint.index()] = position;
    }

    pub fn nose(&self) -> Option<Vector2<f64>> {
        self.get(Joint::Nose)
    }

    /// `nose.y - min(left_ankle.y, right_ankle.y)` over the ankles present.
    ///
    /// `None` when the nose or both ankles are missing.
    pub fn standing_height(&self) -> Option<f64> {
        let nose = self.nose()?;
        let lowest = match (self.get(Joint::LeftAnkle), self.get(Joint::RightAnkle)) {
            (Some(l), Some(r)) => l.y.min(r.y),
            (Some(l), None) => l.y,
            (None, Some(r)) => r.y,
            (None, None) => return None,
        };
        Some(nose.y - lowest)
    }

    /// Left/right swapped copy, for detections whose sides were flipped.
    pub fn mirrored(&self) -> Pose2D {
        let mut out = Pose2D::default();
        for joint in Joint::ALL {
            out.set(joint.mirrored(), self.get(joint));
        }
        out
    }

    pub fn detected_count(&self) -> usize {
        self.joints.iter().filter(|j| j.is_some()).count()
    }

    /// Converts an exchange record. Fails if the record is not 17 slots long.
    pub fn from_record(record: &DetectionRecord) -> Result<Pose2D, SkeletonError> {
        if record.joints.len() != JOINT_COUNT {
            return Err(SkeletonError::JointCount(record.joints.len()));
        }
        let mut pose = Pose2D::default();
        for (slot, value) in pose.joints.iter_mut().zip(&record.joints) {
            *slot = value.map(|[x, y]| Vector2::new(x, y));
        }
        Ok(pose)
    }

    pub fn to_record(&self) -> DetectionRecord {
        DetectionRecord::new(self.joints.iter().map(|j| j.map(|p| [p.x, p.y])).collect())
    }
}

/// One subject's 3D skeleton in world coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose3D {
    pub joints: [Vector3<f64>; JOINT_COUNT],
}

impl Default for Pose3D {
    fn default() -> Self {
        Self {
            joints: [Vector3::zeros(); JOINT_COUNT],
        }
    }
}

impl Pose3D {
    pub fn new(joints: [Vector3<f64>; JOINT_COUNT]) -> Self {
        Self { joints }
    }

    pub fn get(&self, joint: Joint) -> Vector3<f64> {
        self.joints[joint.index()]
    }

    pub fn set(&mut self, joint: Joint, position: Vector3<f64>) {
        self.joints[joint.index()] = position;
    }

    /// Euclidean distance between the bone's endpoints.
    pub fn bone_length(&self, bone: Bone) -> f64 {
        let (a, b) = bone.endpoints();
        (self.get(a) - self.get(b)).norm()
    }

    pub fn mirrored(&self) -> Pose3D {
        let mut out = Pose3D::default();
        for joint in Joint::ALL {
            out.set(joint.mirrored(), self.get(joint));
        }
        out
    }

    /// Largest per-joint distance to another pose.
    pub fn max_joint_distance(&self, other: &Pose3D) -> f64 {
        self.joints
            .iter()
            .zip(&other.joints)
            .map(|(a, b)| (a - b).norm())
            .fold(0.0, f64::max)
    }

    pub fn from_record(record: &PoseRecord) -> Result<Pose3D, SkeletonError> {
        if record.joints.len() != JOINT_COUNT {
            return Err(SkeletonError::JointCount(record.joints.len()));
        }
        let mut pose = Pose3D::default();
        for (slot, [x, y, z]) in pose.joints.iter_mut().zip(&record.joints) {
            *slot = Vector3::new(*x, *y, *z);
        }
        Ok(pose)
    }

    pub fn to_record(&self) -> PoseRecord {
        PoseRecord {
            joints: self.joints.iter().map(|p| [p.x, p.y, p.z]).collect(),
        }
    }
}

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SkeletonError {
    #[error("Expected {} joints, found {0}", JOINT_COUNT)]
    JointCount(usize),
}

// ============================================================================
// TESTS
// ============================================================================
