//! DuetPose Environment Abstraction Layer
//!
//! This crate is the boundary between the reconstruction core and the
//! collaborators it does not own: detection storage, camera projection and
//! pose export.
//!
//! # Core Concept: Records In, Records Out
//!
//! Everything crossing the boundary is a plain serde record:
//! - 2D detections (`DetectionRecord`), per camera and frame
//! - camera sightlines (`RayRecord`), produced by a `RayProjector`
//! - finished skeleton sequences (`PoseSequenceRecord`), consumed by a `PoseSink`
//!
//! The core converts these into its strongly typed geometry and never touches
//! files, databases or camera models directly. The simulator and the
//! file-backed `JsonStore` are two implementations of the same traits.
//!
//! # Example
//!
//! ```ignore
//! use duetpose_env::{JsonStore, ObservationSource};
//!
//! let store = JsonStore::open("capture/observations.json", "capture/out")?;
//! for camera in store.cameras() {
//!     let first = store.detections(camera, 0)?;
//!     println!("camera {} sees {} figures", camera, first.len());
//! }
//! ```

mod source;
mod types;
mod error;
mod json_store;

pub use source::{ObservationSource, PoseSink, RayProjector};
pub use types::{
    CameraId, DetectionRecord, PoseRecord, PoseSequenceRecord, RayRecord, Role, JOINT_COUNT,
};
pub use error::EnvError;
pub use json_store::{CameraObservations, JsonStore, ObservationDocument};
