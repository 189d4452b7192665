//! Per-joint 3D trajectories over a frame range.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::skeleton::{Joint, Pose3D, Role};
use duetpose_env::JOINT_COUNT;

/// Positions of one joint of one subject, one optional sample per frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    pub samples: Vec<Option<Vector3<f64>>>,
}

impl Trajectory {
    /// An all-missing trajectory of `len` frames.
    pub fn empty(len: usize) -> Self {
        Self {
            samples: vec![None; len],
        }
    }

    pub fn from_samples(samples: Vec<Option<Vector3<f64>>>) -> Self {
        Self { samples }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Vector3<f64>> {
        self.samples.get(index).copied().flatten()
    }

    pub fn defined_count(&self) -> usize {
        self.samples.iter().filter(|s| s.is_some()).count()
    }
}

/// All 17 joint trajectories of one subject, aligned on the same frames.
///
/// Index `i` of every trajectory corresponds to frame `first_frame + i`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectorySet {
    pub role: Role,
    pub first_frame: usize,
    pub joints: Vec<Trajectory>,
}

impl TrajectorySet {
    pub fn new(role: Role, first_frame: usize, len: usize) -> Self {
        Self {
            role,
            first_frame,
            joints: vec![Trajectory::empty(len); JOINT_COUNT],
        }
    }

    /// Number of frames covered.
    pub fn len(&self) -> usize {
        self.joints.first().map_or(0, Trajectory::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn trajectory(&self, joint: Joint) -> &Trajectory {
        &self.joints[joint.index()]
    }

    pub fn trajectory_mut(&mut self, joint: Joint) -> &mut Trajectory {
        &mut self.joints[joint.index()]
    }

    pub fn get(&self, joint: Joint, index: usize) -> Option<Vector3<f64>> {
        self.joints[joint.index()].get(index)
    }

    pub fn set(&mut self, joint: Joint, index: usize, point: Option<Vector3<f64>>) {
        self.joints[joint.index()].samples[index] = point;
    }

    /// The raw skeleton at `index` if every joint is defined there.
    pub fn complete_pose(&self, index: usize) -> Option<Pose3D> {
        let mut pose = Pose3D::default();
        for joint in Joint::ALL {
            pose.set(joint, self.get(joint, index)?);
        }
        Some(pose)
    }

    /// The raw skeleton at `index` if every bone endpoint is defined there.
    ///
    /// Head joints are unconstrained and never invalidate a frame: a missing
    /// one takes its nearest defined sample in time (earlier first), or the
    /// shoulder midpoint if the joint was never seen.
    pub fn body_pose(&self, index: usize) -> Option<Pose3D> {
        let mut pose = Pose3D::default();
        for joint in Joint::ALL.iter().filter(|j| !j.is_head()) {
            pose.set(*joint, self.get(*joint, index)?);
        }

        let shoulders = (pose.get(Joint::LeftShoulder) + pose.get(Joint::RightShoulder)) / 2.0;
        for joint in Joint::ALL.iter().filter(|j| j.is_head()) {
            let point = self
                .get(*joint, index)
                .or_else(|| self.nearest_defined(*joint, index))
                .unwrap_or(shoulders);
            pose.set(*joint, point);
        }
        Some(pose)
    }

    fn nearest_defined(&self, joint: Joint, index: usize) -> Option<Vector3<f64>> {
        let samples = &self.trajectory(joint).samples;
        let split = index.min(samples.len());
        samples[..split]
            .iter()
            .rev()
            .find_map(|s| *s)
            .or_else(|| samples.get(split + 1..)?.iter().find_map(|s| *s))
    }

    /// Frame number of sample `index`.
    pub fn frame_at(&self, index: usize) -> usize {
        self.first_frame + index
    }

    /// Builds a set from complete poses (one per frame).
    pub fn from_poses(role: Role, first_frame: usize, poses: &[Option<Pose3D>]) -> Self {
        let mut set = Self::new(role, first_frame, poses.len());
        for (index, pose) in poses.iter().enumerate() {
            if let Some(pose) = pose {
                for joint in Joint::ALL {
                    set.set(joint, index, Some(pose.get(joint)));
                }
            }
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_complete_pose() {
        let mut set = TrajectorySet::new(Role::Lead, 10, 3);
        assert_eq!(set.len(), 3);
        assert_eq!(set.frame_at(2), 12);
        assert!(set.complete_pose(0).is_none());

        for joint in Joint::ALL {
            set.set(joint, 1, Some(Vector3::new(joint.index() as f64, 0.0, 0.0)));
        }
        let pose = set.complete_pose(1).unwrap();
        assert_eq!(pose.get(Joint::RightAnkle).x, 16.0);

        set.set(Joint::Nose, 1, None);
        assert!(set.complete_pose(1).is_none());
        assert_eq!(set.trajectory(Joint::LeftEye).defined_count(), 1);
    }

    #[test]
    fn test_from_poses() {
        let pose = Pose3D::default();
        let set = TrajectorySet::from_poses(Role::Follow, 0, &[Some(pose), None]);
        assert_eq!(set.complete_pose(0), Some(pose));
        assert!(set.complete_pose(1).is_none());
    }

    #[test]
    fn test_body_pose_fills_head_joints() {
        let pose = Pose3D::new(std::array::from_fn(|i| Vector3::new(i as f64, 1.0, 0.0)));
        let mut set = TrajectorySet::from_poses(Role::Lead, 0, &[Some(pose), Some(pose), Some(pose)]);

        // Earlier sample wins over a later one
        set.set(Joint::LeftEar, 0, Some(Vector3::new(-1.0, 0.0, 0.0)));
        set.set(Joint::LeftEar, 1, None);
        set.set(Joint::LeftEar, 2, Some(Vector3::new(-2.0, 0.0, 0.0)));
        let body = set.body_pose(1).unwrap();
        assert!(set.complete_pose(1).is_none());
        assert_eq!(body.get(Joint::LeftEar), Vector3::new(-1.0, 0.0, 0.0));
        assert_eq!(body.get(Joint::Nose), pose.get(Joint::Nose));

        // Never seen: shoulder midpoint
        for i in 0..3 {
            set.set(Joint::RightEye, i, None);
        }
        let midpoint = (pose.get(Joint::LeftShoulder) + pose.get(Joint::RightShoulder)) / 2.0;
        assert_eq!(set.body_pose(0).unwrap().get(Joint::RightEye), midpoint);

        // A missing bone endpoint still invalidates the frame
        set.set(Joint::RightKnee, 2, None);
        assert!(set.body_pose(2).is_none());
    }
}
