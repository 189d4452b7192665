//! Error types for the DuetPose environment abstraction.

use thiserror::Error;

use crate::types::CameraId;

/// Errors that can occur at the environment boundary.
#[derive(Debug, Error)]
pub enum EnvError {
    /// Reading or writing a backing file failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Record serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The requested camera is not part of this source
    #[error("Unknown camera: {0}")]
    UnknownCamera(CameraId),

    /// The requested frame lies outside the recorded range
    #[error("Frame {frame} out of range (0..{frame_count})")]
    FrameOutOfRange { frame: usize, frame_count: usize },

    /// A record does not have the expected shape
    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    /// The projector cannot build a sightline for this pixel
    #[error("Projection error: {0}")]
    Projection(String),
}

impl EnvError {
    /// Creates a malformed-record error.
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedRecord(msg.into())
    }

    /// Creates a projection error.
    pub fn projection(msg: impl Into<String>) -> Self {
        Self::Projection(msg.into())
    }
}
