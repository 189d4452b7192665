//! Capture scenarios for the simulation harness.

use crate::world::SimConfig;

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// SIM-001: Perfect detections, fixed detection order
    Clean,

    /// SIM-002: Gaussian pixel noise on every joint
    SensorNoise,

    /// SIM-003: Randomly missing joint detections
    JointDropout,

    /// SIM-004: Detection order shuffled every frame
    IdentityShuffle,

    /// SIM-005: Seated spectators in every view
    Distractors,

    /// SIM-006: Staggered per-camera blackouts
    Occlusion,

    // ═══════════════════════════════════════════════════
    // EXTREME
    // ═══════════════════════════════════════════════════
    /// SIM-007: Everything at once
    DanceStorm,
}

/// Acceptance thresholds for one scenario.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PassCriteria {
    /// Largest tolerated joint RMSE per subject (meters)
    pub max_rmse: f64,

    /// Smallest tolerated fraction of frames with a skeleton
    pub min_completeness: f64,

    /// Largest tolerated bone length error (meters)
    pub max_bone_deviation: f64,

    /// Largest tolerated number of identity-swapped frames
    pub max_swapped_frames: usize,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::Clean,
            ScenarioId::SensorNoise,
            ScenarioId::JointDropout,
            ScenarioId::IdentityShuffle,
            ScenarioId::Distractors,
            ScenarioId::Occlusion,
            // Extreme
            ScenarioId::DanceStorm,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::Clean => "clean",
            ScenarioId::SensorNoise => "sensor_noise",
            ScenarioId::JointDropout => "joint_dropout",
            ScenarioId::IdentityShuffle => "identity_shuffle",
            ScenarioId::Distractors => "distractors",
            ScenarioId::Occlusion => "occlusion",
            ScenarioId::DanceStorm => "dance_storm",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::Clean => "Noise-free detections from 6 cameras, stable order",
            ScenarioId::SensorNoise => "1.5 px Gaussian noise on every joint",
            ScenarioId::JointDropout => "5% of joint detections missing",
            ScenarioId::IdentityShuffle => "Detection order shuffled, first frame labelled",
            ScenarioId::Distractors => "3 seated spectators, shuffled order, first frame labelled",
            ScenarioId::Occlusion => "Each camera dark for 4 frames, staggered",
            ScenarioId::DanceStorm => "🔥 EVERYTHING AT ONCE: noise + dropout + shuffle + spectators + blackouts",
        }
    }

    /// Returns true if this is an extreme scenario.
    pub fn is_extreme(&self) -> bool {
        matches!(self, ScenarioId::DanceStorm)
    }

    /// Applies the scenario's sensor conditions on top of `base`.
    pub fn configure(&self, base: SimConfig) -> SimConfig {
        match self {
            ScenarioId::Clean => base,
            ScenarioId::SensorNoise => SimConfig {
                pixel_noise_std: 1.5,
                ..base
            },
            ScenarioId::JointDropout => SimConfig {
                joint_dropout: 0.05,
                ..base
            },
            ScenarioId::IdentityShuffle => SimConfig {
                shuffle: true,
                label_first_frame: true,
                ..base
            },
            ScenarioId::Distractors => SimConfig {
                spectators: 3,
                shuffle: true,
                label_first_frame: true,
                ..base
            },
            ScenarioId::Occlusion => SimConfig {
                blackout_frames: 4,
                ..base
            },
            ScenarioId::DanceStorm => SimConfig {
                pixel_noise_std: 1.5,
                joint_dropout: 0.05,
                shuffle: true,
                label_first_frame: true,
                spectators: 3,
                blackout_frames: 4,
                ..base
            },
        }
    }

    /// Returns the acceptance thresholds.
    pub fn criteria(&self) -> PassCriteria {
        match self {
            ScenarioId::Clean | ScenarioId::IdentityShuffle | ScenarioId::Distractors => {
                PassCriteria {
                    max_rmse: 0.05,
                    min_completeness: 1.0,
                    max_bone_deviation: 0.03,
                    max_swapped_frames: 0,
                }
            }
            ScenarioId::SensorNoise | ScenarioId::Occlusion => PassCriteria {
                max_rmse: 0.06,
                min_completeness: 1.0,
                max_bone_deviation: 0.04,
                max_swapped_frames: 0,
            },
            ScenarioId::JointDropout => PassCriteria {
                max_rmse: 0.06,
                min_completeness: 0.9,
                max_bone_deviation: 0.04,
                max_swapped_frames: 0,
            },
            ScenarioId::DanceStorm => PassCriteria {
                max_rmse: 0.1,
                min_completeness: 0.85,
                max_bone_deviation: 0.06,
                max_swapped_frames: 0,
            },
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "clean" | "sim-001" => Ok(ScenarioId::Clean),
            "sensor_noise" | "noise" | "sim-002" => Ok(ScenarioId::SensorNoise),
            "joint_dropout" | "dropout" | "sim-003" => Ok(ScenarioId::JointDropout),
            "identity_shuffle" | "shuffle" | "sim-004" => Ok(ScenarioId::IdentityShuffle),
            "distractors" | "spectators" | "sim-005" => Ok(ScenarioId::Distractors),
            "occlusion" | "blackout" | "sim-006" => Ok(ScenarioId::Occlusion),
            "dance_storm" | "dancestorm" | "sim-007" => Ok(ScenarioId::DanceStorm),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for scenario in ScenarioId::all() {
            assert_eq!(scenario.name().parse::<ScenarioId>(), Ok(scenario));
            assert_eq!(scenario.to_string(), scenario.name());
        }
        assert_eq!("SIM-004".parse::<ScenarioId>(), Ok(ScenarioId::IdentityShuffle));
        assert!("split_brain".parse::<ScenarioId>().is_err());
    }

    #[test]
    fn test_configure_keeps_base_settings() {
        let base = SimConfig {
            seed: 9,
            frames: 33,
            ..Default::default()
        };
        let config = ScenarioId::Distractors.configure(base.clone());
        assert_eq!(config.seed, 9);
        assert_eq!(config.frames, 33);
        assert_eq!(config.spectators, 3);
        assert!(config.shuffle && config.label_first_frame);
        assert_eq!(ScenarioId::Clean.configure(base.clone()), base);
    }

    #[test]
    fn test_only_storm_is_extreme() {
        let extreme: Vec<_> = ScenarioId::all().into_iter().filter(|s| s.is_extreme()).collect();
        assert_eq!(extreme, vec![ScenarioId::DanceStorm]);
    }
}
