//! Common types for the DuetPose environment abstraction.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Number of landmarks in every pose record.
pub const JOINT_COUNT: usize = 17;

/// Identifier of one fixed camera.
///
/// Cameras are numbered by the capture setup (one directory per camera), so a
/// plain integer is enough; no coordination is needed.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct CameraId(pub u32);

impl CameraId {
    /// Returns the raw camera number.
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl From<u32> for CameraId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for CameraId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cam{:02}", self.0)
    }
}

/// Identity classification of a figure in one camera's view.
///
/// Lead and Follow carry a persistent identity per camera across frames.
/// Unknown figures are recreated every frame and never persist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Lead,
    Follow,
    Unknown,
}

impl Role {
    /// The two roles that carry identity across frames, in tracking order.
    pub const TRACKED: [Role; 2] = [Role::Lead, Role::Follow];

    /// Returns true for Lead and Follow.
    pub fn is_tracked(&self) -> bool {
        !matches!(self, Role::Unknown)
    }

    /// Returns the role name.
    pub fn name(&self) -> &'static str {
        match self {
            Role::Lead => "lead",
            Role::Follow => "follow",
            Role::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "lead" | "0" => Ok(Role::Lead),
            "follow" | "1" => Ok(Role::Follow),
            "unknown" | "-1" => Ok(Role::Unknown),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

/// One camera sightline as exchanged with the projection layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RayRecord {
    /// Camera centre in world coordinates
    pub origin: [f64; 3],

    /// Direction towards the observed joint (need not be normalized)
    pub direction: [f64; 3],
}

impl RayRecord {
    /// Creates a new ray record.
    pub fn new(origin: [f64; 3], direction: [f64; 3]) -> Self {
        Self { origin, direction }
    }
}

/// One 2D pose detection as stored by the detection layer.
///
/// Pixel coordinates are y-up: larger `y` is higher in the scene, so a
/// standing figure has its nose above its ankles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    /// One optional `[x, y]` pixel position per joint, in joint-index order
    pub joints: Vec<Option<[f64; 2]>>,
}

impl DetectionRecord {
    /// Creates a record from per-joint positions.
    pub fn new(joints: Vec<Option<[f64; 2]>>) -> Self {
        Self { joints }
    }

    /// Creates a record with every joint undetected.
    pub fn empty() -> Self {
        Self {
            joints: vec![None; JOINT_COUNT],
        }
    }

    /// Returns the number of detected joints.
    pub fn detected_count(&self) -> usize {
        self.joints.iter().filter(|j| j.is_some()).count()
    }

    /// Returns true if the record has exactly one slot per joint.
    pub fn is_well_formed(&self) -> bool {
        self.joints.len() == JOINT_COUNT
    }
}

/// One finished 3D skeleton.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseRecord {
    /// One `[x, y, z]` position per joint, in joint-index order
    pub joints: Vec<[f64; 3]>,
}

/// A finished per-subject skeleton sequence for export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseSequenceRecord {
    /// Which subject this sequence belongs to
    pub role: Role,

    /// Rest length per bone name
    pub rest_lengths: BTreeMap<String, f64>,

    /// One entry per frame; `None` where no valid skeleton exists
    pub frames: Vec<Option<PoseRecord>>,
}

impl PoseSequenceRecord {
    /// Returns the number of frames carrying a skeleton.
    pub fn valid_frame_count(&self) -> usize {
        self.frames.iter().filter(|f| f.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trip_names() {
        for role in [Role::Lead, Role::Follow, Role::Unknown] {
            let parsed: Role = role.name().parse().unwrap();
            assert_eq!(parsed, role);
        }
        assert!("partner".parse::<Role>().is_err());
    }

    #[test]
    fn test_role_tracked() {
        assert!(Role::Lead.is_tracked());
        assert!(Role::Follow.is_tracked());
        assert!(!Role::Unknown.is_tracked());
    }

    #[test]
    fn test_camera_id_display() {
        assert_eq!(CameraId(3).to_string(), "cam03");
    }

    #[test]
    fn test_detection_record_shape() {
        let mut record = DetectionRecord::empty();
        assert!(record.is_well_formed());
        assert_eq!(record.detected_count(), 0);

        record.joints[0] = Some([10.0, 20.0]);
        assert_eq!(record.detected_count(), 1);

        record.joints.pop();
        assert!(!record.is_well_formed());
    }
}
