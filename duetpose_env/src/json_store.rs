//! File-backed observation source and pose sink.
//!
//! One JSON document holds the detections of every camera; finished
//! sequences are written as `<role>.json` into an output directory.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::EnvError;
use crate::source::{ObservationSource, PoseSink};
use crate::types::{CameraId, DetectionRecord, PoseSequenceRecord, Role, JOINT_COUNT};

/// Detections recorded by one camera.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CameraObservations {
    /// Camera identifier
    pub id: CameraId,

    /// Unlabelled figures, one list per frame
    pub detections: Vec<Vec<DetectionRecord>>,

    /// Persisted Lead labels, one optional pose per frame
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lead: Option<Vec<Option<DetectionRecord>>>,

    /// Persisted Follow labels, one optional pose per frame
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follow: Option<Vec<Option<DetectionRecord>>>,
}

/// Top-level observation document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObservationDocument {
    /// Number of frames every camera covers
    pub frame_count: usize,

    /// Per-camera observations
    pub cameras: Vec<CameraObservations>,
}

impl ObservationDocument {
    /// Checks that every camera covers `frame_count` frames with 17-slot records.
    pub fn validate(&self) -> Result<(), EnvError> {
        for camera in &self.cameras {
            if camera.detections.len() != self.frame_count {
                return Err(EnvError::malformed(format!(
                    "{} has {} frames, expected {}",
                    camera.id,
                    camera.detections.len(),
                    self.frame_count
                )));
            }
            let labelled = camera.lead.iter().chain(camera.follow.iter());
            for track in labelled {
                if track.len() != self.frame_count {
                    return Err(EnvError::malformed(format!(
                        "{} persisted track has {} frames, expected {}",
                        camera.id,
                        track.len(),
                        self.frame_count
                    )));
                }
            }
            let records = camera
                .detections
                .iter()
                .flatten()
                .chain(camera.lead.iter().flatten().flatten())
                .chain(camera.follow.iter().flatten().flatten());
            for record in records {
                if !record.is_well_formed() {
                    return Err(EnvError::malformed(format!(
                        "{} record has {} joints, expected {}",
                        camera.id,
                        record.joints.len(),
                        JOINT_COUNT
                    )));
                }
            }
        }
        Ok(())
    }
}

/// JSON-file implementation of [`ObservationSource`] and [`PoseSink`].
#[derive(Debug, Clone)]
pub struct JsonStore {
    document: ObservationDocument,
    out_dir: PathBuf,
}

impl JsonStore {
    /// Loads an observation document and prepares the output directory.
    pub fn open(path: impl AsRef<Path>, out_dir: impl AsRef<Path>) -> Result<Self, EnvError> {
        let text = fs::read_to_string(path)?;
        let document: ObservationDocument = serde_json::from_str(&text)?;
        Self::from_document(document, out_dir)
    }

    /// Wraps an in-memory document.
    pub fn from_document(
        mut document: ObservationDocument,
        out_dir: impl AsRef<Path>,
    ) -> Result<Self, EnvError> {
        document.validate()?;
        document.cameras.sort_by_key(|c| c.id);
        Ok(Self {
            document,
            out_dir: out_dir.as_ref().to_path_buf(),
        })
    }

    /// Returns the backing document.
    pub fn document(&self) -> &ObservationDocument {
        &self.document
    }

    /// Returns the path a sequence for `role` is written to.
    pub fn output_path(&self, role: Role) -> PathBuf {
        self.out_dir.join(format!("{}.json", role))
    }

    fn camera(&self, camera: CameraId) -> Result<&CameraObservations, EnvError> {
        self.document
            .cameras
            .iter()
            .find(|c| c.id == camera)
            .ok_or(EnvError::UnknownCamera(camera))
    }
}

impl ObservationSource for JsonStore {
    fn cameras(&self) -> Vec<CameraId> {
        self.document.cameras.iter().map(|c| c.id).collect()
    }

    fn frame_count(&self) -> usize {
        self.document.frame_count
    }

    fn detections(
        &self,
        camera: CameraId,
        frame: usize,
    ) -> Result<Vec<DetectionRecord>, EnvError> {
        let observations = self.camera(camera)?;
        observations
            .detections
            .get(frame)
            .cloned()
            .ok_or(EnvError::FrameOutOfRange {
                frame,
                frame_count: self.document.frame_count,
            })
    }

    fn persisted_track(
        &self,
        camera: CameraId,
        role: Role,
    ) -> Result<Option<Vec<Option<DetectionRecord>>>, EnvError> {
        let observations = self.camera(camera)?;
        Ok(match role {
            Role::Lead => observations.lead.clone(),
            Role::Follow => observations.follow.clone(),
            Role::Unknown => None,
        })
    }
}

impl PoseSink for JsonStore {
    fn write_sequence(&mut self, sequence: &PoseSequenceRecord) -> Result<(), EnvError> {
        fs::create_dir_all(&self.out_dir)?;
        let json = serde_json::to_string_pretty(sequence)?;
        fs::write(self.output_path(sequence.role), json)?;
        Ok(())
    }
}
