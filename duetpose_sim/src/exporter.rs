//! JSON exporter for offline inspection.
//!
//! Exports ground truth, finalized skeletons and unlabeled joint candidates
//! frame by frame, together with the camera rig.

use duetpose_core::{Pose3D, Role};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;

use crate::rig::PinholeCamera;
use crate::runner::Evaluation;
use crate::world::SimWorld;

/// A single frame of simulation data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimFrame {
    pub frame: usize,

    /// Simulation time in seconds
    pub time_sec: f64,

    /// Ground-truth skeletons
    pub ground_truth: Vec<SkeletonFrame>,

    /// Finalized skeletons; a subject is absent when its frame is invalid
    pub reconstructed: Vec<SkeletonFrame>,

    /// Split candidates of unclaimed figures
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub unlabeled: Vec<[f64; 3]>,
}

/// One skeleton in one frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkeletonFrame {
    pub role: Role,
    pub joints: Vec<[f64; 3]>,
}

impl SkeletonFrame {
    pub fn new(role: Role, pose: &Pose3D) -> Self {
        Self {
            role,
            joints: pose.to_record().joints,
        }
    }
}

/// Complete simulation export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimExport {
    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// Frames per second
    pub frame_rate: f64,

    pub cameras: Vec<PinholeCamera>,

    /// All frames
    pub frames: Vec<SimFrame>,

    /// Final results
    pub passed: bool,

    /// Worst per-subject joint RMSE if applicable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_rms_error: Option<f64>,
}

impl SimExport {
    /// Creates a new export container.
    pub fn new(scenario: &str, seed: u64, frame_rate: f64) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            frame_rate,
            cameras: Vec::new(),
            frames: Vec::new(),
            passed: false,
            final_rms_error: None,
        }
    }

    /// Collects every frame of a scored run.
    pub fn from_run(scenario: &str, world: &SimWorld, evaluation: &Evaluation) -> Self {
        let mut export = Self::new(scenario, world.config.seed, world.config.frame_rate);
        export.cameras = world.rig.cameras().to_vec();

        let output = &evaluation.output;
        for (offset, frame) in output.frames.clone().enumerate() {
            let ground_truth = Role::TRACKED
                .iter()
                .filter_map(|&role| world.ground_truth(role, frame).map(|p| SkeletonFrame::new(role, &p)))
                .collect();
            let reconstructed = output
                .subjects
                .iter()
                .filter_map(|s| s.pose_at(frame).map(|p| SkeletonFrame::new(s.role, p)))
                .collect();
            let unlabeled = output
                .unlabeled
                .get(offset)
                .into_iter()
                .flatten()
                .flat_map(|c| c.iter())
                .map(|p| [p.x, p.y, p.z])
                .collect();

            export.add_frame(SimFrame {
                frame,
                time_sec: world.oracle.time_of(frame),
                ground_truth,
                reconstructed,
                unlabeled,
            });
        }
        export
    }

    /// Adds a frame.
    pub fn add_frame(&mut self, frame: SimFrame) {
        self.frames.push(frame);
    }

    /// Finalizes the export.
    pub fn finalize(&mut self, passed: bool, rms_error: Option<f64>) {
        self.passed = passed;
        self.final_rms_error = rms_error;
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: &str) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}
