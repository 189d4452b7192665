//! Reconstruction configuration, loadable from TOML.
//!
//! ```toml
//! up = [0.0, 1.0, 0.0]
//!
//! [triangulation]
//! step_size = 0.01
//!
//! [identity]
//! jump_threshold = 70.0
//!
//! [kinematics]
//! missing_frame_policy = "hold_last"
//! ```
//!
//! Every section and field is optional and falls back to its default.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::identity::IdentityConfig;
use crate::kinematics::KinematicConfig;
use crate::smoothing::SmoothingConfig;
use crate::triangulation::TriangulationConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconstructionConfig {
    /// Scene vertical axis (default: +Y)
    #[serde(default = "default_up")]
    pub up: Vector3<f64>,

    #[serde(default)]
    pub triangulation: TriangulationConfig,

    #[serde(default)]
    pub identity: IdentityConfig,

    #[serde(default)]
    pub smoothing: SmoothingConfig,

    #[serde(default)]
    pub kinematics: KinematicConfig,
}

fn default_up() -> Vector3<f64> {
    Vector3::y()
}

impl Default for ReconstructionConfig {
    fn default() -> Self {
        Self {
            up: default_up(),
            triangulation: TriangulationConfig::default(),
            identity: IdentityConfig::default(),
            smoothing: SmoothingConfig::default(),
            kinematics: KinematicConfig::default(),
        }
    }
}

impl ReconstructionConfig {
    /// Reads and validates a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: ReconstructionConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the stages cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.triangulation;
        positive("triangulation.step_size", t.step_size)?;
        positive("triangulation.tolerance", t.tolerance)?;
        if t.max_iterations == 0 {
            return Err(ConfigError::invalid("triangulation.max_iterations", "must be at least 1"));
        }
        if t.min_rays == 0 {
            return Err(ConfigError::invalid("triangulation.min_rays", "must be at least 1"));
        }

        positive("identity.jump_threshold", self.identity.jump_threshold)?;
        let h = self.identity.min_standing_height;
        if !(h.is_finite() && h >= 0.0) {
            return Err(ConfigError::invalid(
                "identity.min_standing_height",
                "must be finite and non-negative",
            ));
        }

        if self.smoothing.window == 0 {
            return Err(ConfigError::invalid("smoothing.window", "must be at least 1"));
        }

        let norm = self.up.norm();
        if !(norm.is_finite() && norm > 0.0) {
            return Err(ConfigError::invalid("up", "must be a finite non-zero vector"));
        }
        Ok(())
    }

    /// The unit vertical axis.
    pub fn up_unit(&self) -> Vector3<f64> {
        self.up.normalize()
    }
}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, "must be finite and positive"))
    }
}

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: &'static str },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: &'static str) -> Self {
        Self::Invalid { field, reason }
    }
}
