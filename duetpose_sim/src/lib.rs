//! DuetPose Deterministic Simulation Harness
//!
//! A controlled dance floor where the whole reconstruction pipeline runs
//! against known ground truth.
//!
//! # Core Principle: Everything From One Seed
//!
//! All sources of variation are derived from a single 64-bit seed:
//! - **Physics**: choreography of both dancers and spectator placement
//! - **Sensors**: pixel noise, missed joints and detection order
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         SimWorld                            │
//! │  ┌──────────────┐   project   ┌───────────────────────────┐ │
//! │  │    Oracle    │────────────►│  CameraRig (pinhole ring) │ │
//! │  │ Lead, Follow │             └─────────────┬─────────────┘ │
//! │  │  spectators  │                           │ detections    │
//! │  └──────┬───────┘                           ▼               │
//! │         │ ground truth        ObservationSource + RayProjector
//! └─────────┼───────────────────────────────────┼───────────────┘
//!           ▼                                   ▼
//!   ValidationSession ◄──────────────── duetpose_core::Reconstruction
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use duetpose_sim::{ScenarioRunner, scenarios::ScenarioId};
//!
//! let result = ScenarioRunner::new(42).with_frames(120).run(ScenarioId::Distractors);
//! assert!(result.passed);
//! ```

mod exporter;
mod oracle;
mod rig;
mod runner;
mod world;
pub mod scenarios;

pub use exporter::{SimExport, SimFrame, SkeletonFrame};
pub use oracle::{Dancer, Oracle};
pub use rig::{CameraRig, PinholeCamera};
pub use runner::{Evaluation, ScenarioMetrics, ScenarioResult, ScenarioRunner};
pub use world::{SimConfig, SimError, SimWorld};
