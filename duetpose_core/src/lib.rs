//! DuetPose Core - Multi-Camera Skeleton Reconstruction for Two Subjects
//!
//! Turns per-camera 2D joint detections of a Lead and a Follow into
//! temporally and anatomically consistent 3D skeleton sequences:
//! 1. **Identity**: per-camera nose-proximity tracking of Lead/Follow
//! 2. **Triangulation**: least-squares intersection of camera rays per joint
//! 3. **Splitting**: two-subject separation of unlabelled ray bundles
//! 4. **Smoothing**: moving average over each joint trajectory
//! 5. **Kinematics**: rest-length estimation and length-constrained skeletons
//!
//! I/O stays behind the `duetpose_env` traits; this crate never touches
//! files, databases or camera models directly.

pub mod cluster;
pub mod config;
pub mod context;
pub mod geometry;
pub mod identity;
pub mod kinematics;
pub mod pipeline;
pub mod skeleton;
pub mod smoothing;
pub mod trajectory;
pub mod triangulation;
pub mod validation;

// Re-export key types for convenience
pub use cluster::{JointCandidates, RayClusterSplitter, RaySplit, Side};
pub use config::{ConfigError, ReconstructionConfig};
pub use context::ReconstructionContext;
pub use geometry::{GeometryError, Ray};
pub use identity::{FrameAssignment, IdentityConfig, IdentityTracker, TrackedFigure};
pub use kinematics::{
    FinalizeError, KinematicConfig, KinematicFinalizer, MissingFramePolicy, RestLengths,
};
pub use pipeline::{
    CameraTrack, Reconstruction, ReconstructionError, ReconstructionOutput, SubjectReconstruction,
};
pub use skeleton::{Bone, Joint, Pose2D, Pose3D, Role};
pub use smoothing::{SmoothingConfig, TrajectorySmoother};
pub use trajectory::{Trajectory, TrajectorySet};
pub use triangulation::{RaySetTriangulator, Triangulation, TriangulationConfig};
pub use validation::{ValidationReport, ValidationSession};
