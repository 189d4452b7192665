//! Observation, projection and export abstractions for DuetPose.

use crate::error::EnvError;
use crate::types::{CameraId, DetectionRecord, PoseSequenceRecord, RayRecord, Role};

/// Read access to per-camera 2D detections.
///
/// # Implementations
///
/// - **Capture**: `JsonStore` - a serialized observation document
/// - **Simulation**: `SimWorld` - detections projected from a ground-truth oracle
///
/// # Data Flow
///
/// ```text
/// Detector           ObservationSource          Reconstruction
///   |                       |                          |
///   |-- 2D poses ---------->|                          |
///   |                       |<-- detections(cam, f) ---|
///   |                       |--- Vec<DetectionRecord> >|
/// ```
pub trait ObservationSource {
    /// Returns every camera this source holds detections for, in ascending order.
    fn cameras(&self) -> Vec<CameraId>;

    /// Returns the number of recorded frames (shared by all cameras).
    fn frame_count(&self) -> usize;

    /// Returns the unlabelled detections one camera saw in one frame.
    ///
    /// # Returns
    /// * `Ok(records)` - Possibly empty list of figures
    /// * `Err(EnvError::UnknownCamera)` - The camera is not part of this source
    /// * `Err(EnvError::FrameOutOfRange)` - The frame is outside `0..frame_count()`
    fn detections(&self, camera: CameraId, frame: usize)
        -> Result<Vec<DetectionRecord>, EnvError>;

    /// Returns a previously persisted Lead or Follow track for one camera.
    ///
    /// The returned vector has one entry per frame; a `Some` entry overrides
    /// nose-proximity tracking for that frame.
    ///
    /// The default implementation has no persisted labels.
    fn persisted_track(
        &self,
        _camera: CameraId,
        _role: Role,
    ) -> Result<Option<Vec<Option<DetectionRecord>>>, EnvError> {
        Ok(None)
    }
}

/// Converts a pixel position in one camera into a world-space sightline.
///
/// Camera calibration lives entirely behind this trait.
pub trait RayProjector {
    /// Returns the ray from the camera centre through the given pixel.
    ///
    /// # Arguments
    /// * `camera` - Which camera observed the pixel
    /// * `pixel` - `[x, y]` in y-up pixel coordinates
    fn pixel_ray(&self, camera: CameraId, pixel: [f64; 2]) -> Result<RayRecord, EnvError>;
}

/// Consumer of finished skeleton sequences.
pub trait PoseSink {
    /// Persists one subject's sequence.
    fn write_sequence(&mut self, sequence: &PoseSequenceRecord) -> Result<(), EnvError>;
}
