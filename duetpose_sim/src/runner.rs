//! Scenario runner - renders a capture, reconstructs it, scores it.

use duetpose_core::{
    Reconstruction, ReconstructionConfig, ReconstructionContext, ReconstructionOutput, Role,
    ValidationReport, ValidationSession,
};
use tracing::{debug, info, warn};

use crate::scenarios::ScenarioId;
use crate::world::{SimConfig, SimError, SimWorld};

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether the reconstruction met the scenario's criteria
    pub passed: bool,

    /// Frames rendered
    pub frames: usize,

    /// Cameras on the rig
    pub cameras: usize,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default)]
pub struct ScenarioMetrics {
    /// Detections delivered by all cameras
    pub detections: usize,

    /// Worst per-subject joint RMSE (meters)
    pub worst_rmse: f64,

    /// Lowest per-subject completeness
    pub worst_completeness: f64,

    /// Largest bone length error (meters)
    pub worst_bone_deviation: f64,

    /// Frames whose skeleton matched the other subject
    pub swapped_frames: usize,

    /// Joint candidates triangulated from unclaimed figures
    pub unlabeled_candidates: usize,
}

/// A reconstruction together with its ground-truth score.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub output: ReconstructionOutput,
    pub report: ValidationReport,
}

/// Runs capture scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    /// Frames per capture
    frames: usize,

    /// Cameras on the rig
    cameras: usize,

    /// Pipeline settings
    reconstruction: ReconstructionConfig,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            frames: 90,
            cameras: 6,
            reconstruction: ReconstructionConfig::default(),
        }
    }

    /// Sets the capture length.
    pub fn with_frames(mut self, frames: usize) -> Self {
        self.frames = frames;
        self
    }

    /// Sets the number of cameras.
    pub fn with_cameras(mut self, cameras: usize) -> Self {
        self.cameras = cameras;
        self
    }

    /// Sets the pipeline configuration.
    pub fn with_reconstruction(mut self, config: ReconstructionConfig) -> Self {
        self.reconstruction = config;
        self
    }

    /// Capture settings for `scenario`.
    pub fn sim_config(&self, scenario: ScenarioId) -> SimConfig {
        scenario.configure(SimConfig {
            seed: self.seed,
            frames: self.frames,
            cameras: self.cameras,
            ..Default::default()
        })
    }

    /// Builds the world for `scenario`.
    pub fn world(&self, scenario: ScenarioId) -> Result<SimWorld, SimError> {
        SimWorld::new(self.sim_config(scenario))
    }

    /// Reconstructs every frame of `world` and scores it against the oracle.
    pub fn evaluate(&self, world: &SimWorld) -> Result<Evaluation, SimError> {
        let pipeline = Reconstruction::new(self.reconstruction.clone())?;
        let ctx = ReconstructionContext::from_source(world);
        let output = pipeline.run(&ctx, world, &world.rig)?;

        let mut session = ValidationSession::new();
        for role in Role::TRACKED {
            for frame in ctx.frames.clone() {
                if let Some(truth) = world.ground_truth(role, frame) {
                    session.record_ground_truth(role, frame, truth);
                }
            }
        }
        for subject in &output.subjects {
            session.record_subject(subject);
        }

        Ok(Evaluation {
            report: session.generate_report(),
            output,
        })
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);

        if scenario.is_extreme() {
            warn!("🔥 EXTREME SCENARIO - Everything at once!");
        }

        let mut result = ScenarioResult {
            scenario,
            seed: self.seed,
            passed: false,
            frames: self.frames,
            cameras: self.cameras,
            failure_reason: None,
            metrics: ScenarioMetrics::default(),
        };

        let world = match self.world(scenario) {
            Ok(world) => world,
            Err(e) => {
                result.failure_reason = Some(e.to_string());
                return result;
            }
        };

        match self.evaluate(&world) {
            Ok(evaluation) => self.score(scenario, &world, &evaluation),
            Err(e) => {
                result.failure_reason = Some(e.to_string());
                result
            }
        }
    }

    /// Checks an evaluation against the scenario's criteria.
    pub fn score(&self, scenario: ScenarioId, world: &SimWorld, evaluation: &Evaluation) -> ScenarioResult {
        let report = &evaluation.report;
        let metrics = ScenarioMetrics {
            detections: world.detection_count(),
            worst_rmse: report.worst_rmse(),
            worst_completeness: report.worst_completeness(),
            worst_bone_deviation: report.worst_bone_deviation(),
            swapped_frames: report.total_swapped_frames(),
            unlabeled_candidates: evaluation
                .output
                .unlabeled
                .iter()
                .flatten()
                .map(|c| c.count())
                .sum(),
        };

        debug!(
            rmse = metrics.worst_rmse,
            completeness = metrics.worst_completeness,
            bone_deviation = metrics.worst_bone_deviation,
            swapped = metrics.swapped_frames,
            "Scored reconstruction"
        );

        let failure_reason = Self::check(scenario, &metrics, report);
        ScenarioResult {
            scenario,
            seed: world.config.seed,
            passed: failure_reason.is_none(),
            frames: world.config.frames,
            cameras: world.rig.len(),
            failure_reason,
            metrics,
        }
    }

    /// First violated criterion, if any.
    fn check(scenario: ScenarioId, metrics: &ScenarioMetrics, report: &ValidationReport) -> Option<String> {
        let criteria = scenario.criteria();
        if report.per_role.len() < Role::TRACKED.len() {
            return Some("missing ground truth for a subject".to_string());
        }
        if metrics.worst_rmse > criteria.max_rmse {
            return Some(format!(
                "RMSE {:.4}m exceeds {:.4}m",
                metrics.worst_rmse, criteria.max_rmse
            ));
        }
        if metrics.worst_completeness < criteria.min_completeness {
            return Some(format!(
                "completeness {:.1}% below {:.1}%",
                metrics.worst_completeness * 100.0,
                criteria.min_completeness * 100.0
            ));
        }
        if metrics.worst_bone_deviation > criteria.max_bone_deviation {
            return Some(format!(
                "bone deviation {:.4}m exceeds {:.4}m",
                metrics.worst_bone_deviation, criteria.max_bone_deviation
            ));
        }
        if metrics.swapped_frames > criteria.max_swapped_frames {
            return Some(format!("{} identity-swapped frames", metrics.swapped_frames));
        }
        None
    }
}
