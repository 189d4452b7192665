//! The "KINEMATICS" Engine - Rest-Length Constrained Skeletons
//!
//! Turns smoothed joint trajectories into skeletons whose bones keep one
//! length for the whole sequence. Two phases with a hard barrier:
//!
//! 1. **Rest lengths**: per bone, the mean endpoint distance over every frame
//!    where both endpoints are defined.
//! 2. **Per-frame walk**: the lower ankle is the root. Each constrained joint
//!    is placed at `previous + normalize(raw_next - raw_previous) × rest`:
//!
//! ```text
//! root ankle → root knee → root hip ─pelvis─ other hip → other knee → other ankle
//! shoulders (about their raw midpoint) → elbow → wrist, per side
//! head joints pass through
//! ```
//!
//! The shoulders are the one pair not rooted in a chain: both are moved
//! symmetrically about their raw midpoint so the shoulders bone holds its
//! rest length, and the arms then hang off the moved shoulders. A frame is
//! finalized whenever its twelve bone endpoints are defined; missing head
//! joints are filled by [`TrajectorySet::body_pose`].
//!
//! Phase 2 only accepts a [`RestLengths`], which only Phase 1 (or a stored
//! export) produces, so it cannot run ahead of the estimate.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::geometry::MIN_DIRECTION_NORM;
use crate::skeleton::{Bone, Joint, Pose3D};
use crate::trajectory::TrajectorySet;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// What Phase 2 emits for a frame it cannot finalize.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingFramePolicy {
    /// Emit no skeleton for the frame
    #[default]
    MarkInvalid,

    /// Repeat the last valid finalized skeleton (none before the first)
    HoldLast,
}

/// Configuration for the KinematicFinalizer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KinematicConfig {
    /// Frames with a missing or degenerate required joint (default: MarkInvalid)
    pub missing_frame_policy: MissingFramePolicy,

    /// Share one rest length between left and right limbs (default: false)
    pub symmetric_limbs: bool,
}

// ============================================================================
// REST LENGTHS
// ============================================================================

/// One rest length per bone for one subject. Immutable once estimated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RestLengths {
    lengths: [f64; Bone::COUNT],
}

impl RestLengths {
    /// Builds from explicit lengths. Every length must be finite and positive.
    pub fn new(lengths: [f64; Bone::COUNT]) -> Result<Self, FinalizeError> {
        for bone in Bone::ALL {
            let length = lengths[bone.index()];
            if !(length.is_finite() && length > 0.0) {
                return Err(FinalizeError::InvalidRestLength { bone, length });
            }
        }
        Ok(Self { lengths })
    }

    /// Measures a reference pose.
    pub fn from_pose(pose: &Pose3D) -> Result<Self, FinalizeError> {
        Self::new(Bone::ALL.map(|bone| pose.bone_length(bone)))
    }

    pub fn get(&self, bone: Bone) -> f64 {
        self.lengths[bone.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (Bone, f64)> + '_ {
        Bone::ALL.iter().map(|b| (*b, self.get(*b)))
    }

    /// Left and right limb lengths replaced by their pairwise mean.
    pub fn symmetrized(&self) -> Self {
        let mut lengths = self.lengths;
        for bone in Bone::ALL {
            let mirror = bone.mirrored();
            lengths[bone.index()] = (self.get(bone) + self.get(mirror)) / 2.0;
        }
        Self { lengths }
    }

    /// Bone name → length, for export.
    pub fn to_map(&self) -> BTreeMap<String, f64> {
        self.iter()
            .map(|(bone, length)| (bone.name().to_string(), length))
            .collect()
    }

    /// Inverse of [`RestLengths::to_map`].
    pub fn from_map(map: &BTreeMap<String, f64>) -> Result<Self, FinalizeError> {
        let mut lengths = [0.0; Bone::COUNT];
        for bone in Bone::ALL {
            lengths[bone.index()] = *map
                .get(bone.name())
                .ok_or(FinalizeError::MissingRestLength(bone))?;
        }
        Self::new(lengths)
    }
}

/// Phase 1 and Phase 2 output for one subject.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalizedSequence {
    pub rest_lengths: RestLengths,
    /// One entry per trajectory sample
    pub poses: Vec<Option<Pose3D>>,
}

impl FinalizedSequence {
    pub fn valid_count(&self) -> usize {
        self.poses.iter().filter(|p| p.is_some()).count()
    }
}

// ============================================================================
// FINALIZER
// ============================================================================

#[derive(Debug, Clone)]
pub struct KinematicFinalizer {
    config: KinematicConfig,
    up: Vector3<f64>,
}

impl Default for KinematicFinalizer {
    fn default() -> Self {
        Self::new(KinematicConfig::default(), Vector3::y())
    }
}

impl KinematicFinalizer {
    /// `up` defines elevation for the root-ankle choice.
    pub fn new(config: KinematicConfig, up: Vector3<f64>) -> Self {
        Self { config, up }
    }

    pub fn config(&self) -> &KinematicConfig {
        &self.config
    }

    /// Phase 1: time-averaged endpoint distance per bone.
    ///
    /// Frames where either endpoint is undefined do not contribute. A bone
    /// with no contributing frame is an error.
    pub fn estimate_rest_lengths(&self, set: &TrajectorySet) -> Result<RestLengths, FinalizeError> {
        let mut lengths = [0.0; Bone::COUNT];
        for bone in Bone::ALL {
            let (a, b) = bone.endpoints();
            let (sum, count) = set
                .trajectory(a)
                .samples
                .iter()
                .zip(&set.trajectory(b).samples)
                .filter_map(|(pa, pb)| Some((pa.as_ref()? - pb.as_ref()?).norm()))
                .fold((0.0, 0usize), |(sum, count), d| (sum + d, count + 1));
            if count == 0 {
                return Err(FinalizeError::NoSamples(bone));
            }
            lengths[bone.index()] = sum / count as f64;
        }

        let rest = RestLengths::new(lengths)?;
        let rest = if self.config.symmetric_limbs {
            rest.symmetrized()
        } else {
            rest
        };
        debug!(role = %set.role, lengths = ?rest.to_map(), "Estimated rest lengths");
        Ok(rest)
    }

    /// Phase 2 for one raw skeleton.
    ///
    /// Returns `None` when a constrained bone's raw direction is degenerate.
    pub fn finalize_pose(&self, raw: &Pose3D, rest: &RestLengths) -> Option<Pose3D> {
        let mut out = *raw;

        // Legs, rooted at the lower ankle; a tie roots at the left
        let left_low = raw.get(Joint::LeftAnkle).dot(&self.up)
            <= raw.get(Joint::RightAnkle).dot(&self.up);
        let (root, other) = if left_low {
            (LEFT_LEG, RIGHT_LEG)
        } else {
            (RIGHT_LEG, LEFT_LEG)
        };
        let chain = [root[2], root[1], root[0], other[0], other[1], other[2]];
        for pair in chain.windows(2) {
            place(raw, &mut out, pair[0], pair[1], rest)?;
        }

        // Shoulders keep their raw midpoint and direction
        let left = raw.get(Joint::LeftShoulder);
        let right = raw.get(Joint::RightShoulder);
        let across = unit(right - left)?;
        let half = across * (rest.get(Bone::Shoulders) / 2.0);
        let mid = (left + right) / 2.0;
        out.set(Joint::LeftShoulder, mid - half);
        out.set(Joint::RightShoulder, mid + half);

        for arm in [LEFT_ARM, RIGHT_ARM] {
            for pair in arm.windows(2) {
                place(raw, &mut out, pair[0], pair[1], rest)?;
            }
        }

        Some(out)
    }

    /// Phase 2 for one trajectory sample. `None` if a bone endpoint is missing
    /// or degenerate.
    pub fn finalize_frame(
        &self,
        set: &TrajectorySet,
        index: usize,
        rest: &RestLengths,
    ) -> Option<Pose3D> {
        let raw = set.body_pose(index)?;
        self.finalize_pose(&raw, rest)
    }

    /// Phase 2 over every sample, applying the missing-frame policy.
    pub fn finalize_sequence(&self, set: &TrajectorySet, rest: &RestLengths) -> Vec<Option<Pose3D>> {
        let mut last_valid: Option<Pose3D> = None;
        let mut invalid = 0usize;
        let poses: Vec<Option<Pose3D>> = (0..set.len())
            .map(|index| match self.finalize_frame(set, index, rest) {
                Some(pose) => {
                    last_valid = Some(pose);
                    Some(pose)
                }
                None => {
                    invalid += 1;
                    match self.config.missing_frame_policy {
                        MissingFramePolicy::MarkInvalid => None,
                        MissingFramePolicy::HoldLast => last_valid,
                    }
                }
            })
            .collect();

        if invalid > 0 {
            warn!(
                role = %set.role,
                invalid,
                total = set.len(),
                policy = ?self.config.missing_frame_policy,
                "Frames could not be finalized"
            );
        }
        poses
    }

    /// Phase 1 followed by Phase 2.
    pub fn finalize(&self, set: &TrajectorySet) -> Result<FinalizedSequence, FinalizeError> {
        let rest_lengths = self.estimate_rest_lengths(set)?;
        let poses = self.finalize_sequence(set, &rest_lengths);
        Ok(FinalizedSequence { rest_lengths, poses })
    }
}

/// Hip, knee, ankle.
const LEFT_LEG: [Joint; 3] = [Joint::LeftHip, Joint::LeftKnee, Joint::LeftAnkle];
const RIGHT_LEG: [Joint; 3] = [Joint::RightHip, Joint::RightKnee, Joint::RightAnkle];

/// Shoulder, elbow, wrist.
const LEFT_ARM: [Joint; 3] = [Joint::LeftShoulder, Joint::LeftElbow, Joint::LeftWrist];
const RIGHT_ARM: [Joint; 3] = [Joint::RightShoulder, Joint::RightElbow, Joint::RightWrist];

/// Places `to` from the already finalized `from` along the raw direction.
fn place(raw: &Pose3D, out: &mut Pose3D, from: Joint, to: Joint, rest: &RestLengths) -> Option<()> {
    let bone = Bone::between(from, to)?;
    let direction = unit(raw.get(to) - raw.get(from))?;
    out.set(to, out.get(from) + direction * rest.get(bone));
    Some(())
}

fn unit(v: Vector3<f64>) -> Option<Vector3<f64>> {
    let norm = v.norm();
    (norm.is_finite() && norm >= MIN_DIRECTION_NORM).then(|| v / norm)
}

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FinalizeError {
    #[error("No frame has both endpoints of bone {0}")]
    NoSamples(Bone),

    #[error("Rest length {length} for bone {bone} is not positive and finite")]
    InvalidRestLength { bone: Bone, length: f64 },

    #[error("Missing rest length for bone {0}")]
    MissingRestLength(Bone),
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::Role;
    use approx::assert_relative_eq;

    /// A standing figure with the left foot slightly lower.
    fn standing() -> Pose3D {
        let mut pose = Pose3D::default();
        let at = |x: f64, y: f64, z: f64| Vector3::new(x, y, z);
        pose.set(Joint::Nose, at(0.0, 1.65, 0.1));
        pose.set(Joint::LeftEye, at(0.03, 1.68, 0.08));
        pose.set(Joint::RightEye, at(-0.03, 1.68, 0.08));
        pose.set(Joint::LeftEar, at(0.07, 1.66, 0.0));
        pose.set(Joint::RightEar, at(-0.07, 1.66, 0.0));
        pose.set(Joint::LeftShoulder, at(0.18, 1.45, 0.0));
        pose.set(Joint::RightShoulder, at(-0.18, 1.45, 0.0));
        pose.set(Joint::LeftElbow, at(0.25, 1.18, 0.05));
        pose.set(Joint::RightElbow, at(-0.25, 1.18, 0.05));
        pose.set(Joint::LeftWrist, at(0.28, 0.95, 0.15));
        pose.set(Joint::RightWrist, at(-0.28, 0.95, 0.15));
        pose.set(Joint::LeftHip, at(0.1, 0.95, 0.0));
        pose.set(Joint::RightHip, at(-0.1, 0.95, 0.0));
        pose.set(Joint::LeftKnee, at(0.11, 0.5, 0.05));
        pose.set(Joint::RightKnee, at(-0.11, 0.52, 0.05));
        pose.set(Joint::LeftAnkle, at(0.12, 0.07, 0.0));
        pose.set(Joint::RightAnkle, at(-0.12, 0.09, 0.0));
        pose
    }

    /// Perturbs every joint by a deterministic, frame-dependent offset.
    fn jittered(frame: usize) -> Pose3D {
        let mut pose = standing();
        for joint in Joint::ALL {
            let k = (frame * 17 + joint.index()) as f64;
            let offset = Vector3::new((k * 0.37).sin(), (k * 0.91).cos(), (k * 1.3).sin()) * 0.02;
            pose.set(joint, pose.get(joint) + offset);
        }
        pose
    }

    fn sequence(frames: usize) -> TrajectorySet {
        let poses: Vec<Option<Pose3D>> = (0..frames).map(|f| Some(jittered(f))).collect();
        TrajectorySet::from_poses(Role::Lead, 0, &poses)
    }

    fn assert_lengths(pose: &Pose3D, rest: &RestLengths) {
        for bone in Bone::ALL {
            assert_relative_eq!(pose.bone_length(bone), rest.get(bone), epsilon = 1e-9);
        }
    }

    #[test]
    fn test_rest_lengths_are_time_average() {
        let pose = standing();
        let mut moved = pose;
        moved.set(Joint::LeftAnkle, pose.get(Joint::LeftAnkle) - Vector3::new(0.0, 0.1, 0.0));
        let set = TrajectorySet::from_poses(Role::Lead, 0, &[Some(pose), Some(moved)]);

        let rest = KinematicFinalizer::default().estimate_rest_lengths(&set).unwrap();
        let expected = (pose.bone_length(Bone::LeftCalf) + moved.bone_length(Bone::LeftCalf)) / 2.0;
        assert_relative_eq!(rest.get(Bone::LeftCalf), expected, epsilon = 1e-12);
        assert_relative_eq!(rest.get(Bone::Pelvis), 0.2, epsilon = 1e-12);
    }

    #[test]
    fn test_missing_endpoints_excluded_from_average() {
        let pose = standing();
        let mut set = TrajectorySet::from_poses(Role::Lead, 0, &[Some(pose), Some(pose)]);
        set.set(Joint::LeftKnee, 1, Some(Vector3::new(10.0, 10.0, 10.0)));
        set.set(Joint::LeftAnkle, 1, None);

        let rest = KinematicFinalizer::default().estimate_rest_lengths(&set).unwrap();
        assert_relative_eq!(rest.get(Bone::LeftCalf), pose.bone_length(Bone::LeftCalf), epsilon = 1e-12);
    }

    #[test]
    fn test_no_samples_is_error() {
        let mut set = sequence(3);
        for i in 0..3 {
            set.set(Joint::RightWrist, i, None);
        }
        let result = KinematicFinalizer::default().estimate_rest_lengths(&set);
        assert_eq!(result, Err(FinalizeError::NoSamples(Bone::RightForearm)));
    }

    #[test]
    fn test_every_frame_matches_rest_lengths() {
        let set = sequence(20);
        let finalizer = KinematicFinalizer::default();
        let result = finalizer.finalize(&set).unwrap();

        assert_eq!(result.valid_count(), 20);
        for pose in result.poses.iter().flatten() {
            assert_lengths(pose, &result.rest_lengths);
        }
    }

    #[test]
    fn test_root_ankle_and_head_unchanged() {
        let raw = jittered(3);
        let rest = RestLengths::from_pose(&standing()).unwrap();
        let out = KinematicFinalizer::default().finalize_pose(&raw, &rest).unwrap();

        let left_low = raw.get(Joint::LeftAnkle).y <= raw.get(Joint::RightAnkle).y;
        let root = if left_low { Joint::LeftAnkle } else { Joint::RightAnkle };
        assert_eq!(out.get(root), raw.get(root));
        for joint in Joint::ALL.iter().filter(|j| j.is_head()) {
            assert_eq!(out.get(*joint), raw.get(*joint));
        }
    }

    #[test]
    fn test_right_root_when_right_lower() {
        let mut raw = standing();
        raw.set(Joint::RightAnkle, Vector3::new(-0.12, 0.0, 0.0));
        let rest = RestLengths::from_pose(&jittered(0)).unwrap();
        let out = KinematicFinalizer::default().finalize_pose(&raw, &rest).unwrap();
        assert_eq!(out.get(Joint::RightAnkle), raw.get(Joint::RightAnkle));
        assert_ne!(out.get(Joint::LeftAnkle), raw.get(Joint::LeftAnkle));
    }

    #[test]
    fn test_phase_two_is_fixed_point() {
        let set = sequence(5);
        let finalizer = KinematicFinalizer::default();
        let result = finalizer.finalize(&set).unwrap();

        for pose in result.poses.iter().flatten() {
            let again = finalizer.finalize_pose(pose, &result.rest_lengths).unwrap();
            assert!(again.max_joint_distance(pose) < 1e-9);
        }
    }

    #[test]
    fn test_mark_invalid_policy() {
        let mut set = sequence(4);
        set.set(Joint::LeftKnee, 2, None);
        let result = KinematicFinalizer::default().finalize(&set).unwrap();
        assert!(result.poses[1].is_some());
        assert!(result.poses[2].is_none());
        assert!(result.poses[3].is_some());
    }

    #[test]
    fn test_hold_last_policy() {
        let config = KinematicConfig {
            missing_frame_policy: MissingFramePolicy::HoldLast,
            ..Default::default()
        };
        let finalizer = KinematicFinalizer::new(config, Vector3::y());

        let mut set = sequence(4);
        set.set(Joint::RightElbow, 0, None);
        set.set(Joint::RightElbow, 2, None);
        let result = finalizer.finalize(&set).unwrap();

        assert!(result.poses[0].is_none());
        assert_eq!(result.poses[2], result.poses[1]);
        assert!(result.poses[3].is_some());
    }

    #[test]
    fn test_missing_head_joint_keeps_frame() {
        let mut set = sequence(4);
        set.set(Joint::LeftEar, 2, None);
        set.set(Joint::Nose, 2, None);
        let result = KinematicFinalizer::default().finalize(&set).unwrap();

        assert_eq!(result.valid_count(), 4);
        let pose = result.poses[2].unwrap();
        assert_lengths(&pose, &result.rest_lengths);
        assert_eq!(pose.get(Joint::LeftEar), set.get(Joint::LeftEar, 1).unwrap());
        assert_eq!(pose.get(Joint::Nose), set.get(Joint::Nose, 1).unwrap());
    }

    #[test]
    fn test_degenerate_direction_rejected() {
        let mut raw = standing();
        raw.set(Joint::LeftElbow, raw.get(Joint::LeftShoulder));
        let rest = RestLengths::from_pose(&standing()).unwrap();
        assert!(KinematicFinalizer::default().finalize_pose(&raw, &rest).is_none());
    }

    #[test]
    fn test_symmetric_limbs() {
        let config = KinematicConfig {
            symmetric_limbs: true,
            ..Default::default()
        };
        let finalizer = KinematicFinalizer::new(config, Vector3::y());
        let mut pose = standing();
        pose.set(Joint::RightAnkle, Vector3::new(-0.12, 0.02, 0.0));
        let set = TrajectorySet::from_poses(Role::Follow, 0, &[Some(pose)]);

        let rest = finalizer.estimate_rest_lengths(&set).unwrap();
        assert_eq!(rest.get(Bone::LeftCalf), rest.get(Bone::RightCalf));
        let expected = (pose.bone_length(Bone::LeftCalf) + pose.bone_length(Bone::RightCalf)) / 2.0;
        assert_relative_eq!(rest.get(Bone::LeftCalf), expected, epsilon = 1e-12);
        assert_relative_eq!(rest.get(Bone::Pelvis), pose.bone_length(Bone::Pelvis), epsilon = 1e-12);
    }

    #[test]
    fn test_rest_length_map_round_trip() {
        let rest = RestLengths::from_pose(&standing()).unwrap();
        let map = rest.to_map();
        assert_eq!(map.len(), Bone::COUNT);
        assert_eq!(RestLengths::from_map(&map).unwrap(), rest);

        let mut partial = map.clone();
        partial.remove("pelvis");
        assert_eq!(
            RestLengths::from_map(&partial),
            Err(FinalizeError::MissingRestLength(Bone::Pelvis))
        );
    }

    #[test]
    fn test_invalid_rest_length() {
        let mut lengths = [0.3; Bone::COUNT];
        lengths[Bone::Shoulders.index()] = 0.0;
        assert!(matches!(
            RestLengths::new(lengths),
            Err(FinalizeError::InvalidRestLength { bone: Bone::Shoulders, .. })
        ));
    }
}
