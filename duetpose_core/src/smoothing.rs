//! Moving-average smoothing of joint trajectories.
//!
//! Sample `i` becomes the mean of the defined samples in the window
//! `[i - w/2, i + (w-1)/2]`, truncated at the sequence ends. Missing samples
//! stay missing; they never borrow a value from their neighbours.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::trajectory::{Trajectory, TrajectorySet};

/// Configuration for the TrajectorySmoother
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingConfig {
    /// Moving-average window in frames (default: 4)
    pub window: usize,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self { window: 4 }
    }
}

/// Fixed-window moving average. Stateless, so any range can be re-smoothed.
#[derive(Debug, Clone, Default)]
pub struct TrajectorySmoother {
    config: SmoothingConfig,
}

impl TrajectorySmoother {
    /// # Panics
    /// If `config.window` is zero.
    pub fn new(config: SmoothingConfig) -> Self {
        assert!(config.window >= 1, "smoothing window must be at least 1");
        Self { config }
    }

    pub fn window(&self) -> usize {
        self.config.window
    }

    /// Smooths one trajectory. The output has the input's length.
    pub fn smooth(&self, trajectory: &Trajectory) -> Trajectory {
        let samples = &trajectory.samples;
        let len = samples.len();
        let before = self.config.window / 2;
        let after = (self.config.window - 1) / 2;

        let smoothed = (0..len)
            .map(|i| {
                samples[i]?;
                let lo = i.saturating_sub(before);
                let hi = (i + after).min(len - 1);
                let (sum, count) = samples[lo..=hi]
                    .iter()
                    .flatten()
                    .fold((Vector3::<f64>::zeros(), 0usize), |(sum, count), p| (sum + p, count + 1));
                Some(sum / count as f64)
            })
            .collect();

        Trajectory::from_samples(smoothed)
    }

    /// Smooths every joint of a subject independently.
    pub fn smooth_set(&self, set: &TrajectorySet) -> TrajectorySet {
        TrajectorySet {
            role: set.role,
            first_frame: set.first_frame,
            joints: set.joints.iter().map(|t| self.smooth(t)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn line(values: &[Option<f64>]) -> Trajectory {
        Trajectory::from_samples(
            values
                .iter()
                .map(|v| v.map(|x| Vector3::new(x, 0.0, 0.0)))
                .collect(),
        )
    }

    #[test]
    fn test_length_preserved() {
        let smoother = TrajectorySmoother::default();
        let input = line(&[Some(1.0), Some(2.0), Some(3.0)]);
        assert_eq!(smoother.smooth(&input).len(), 3);
        assert!(smoother.smooth(&Trajectory::empty(0)).is_empty());
    }

    #[test]
    fn test_constant_is_fixed_point() {
        let smoother = TrajectorySmoother::default();
        let input = line(&[Some(5.0); 10]);
        assert_eq!(smoother.smooth(&input), input);
    }

    #[test]
    fn test_window_four() {
        let smoother = TrajectorySmoother::default();
        let input = line(&[Some(0.0), Some(4.0), Some(8.0), Some(12.0), Some(16.0)]);
        let out = smoother.smooth(&input);

        // i = 2 averages samples 0..=3
        assert_relative_eq!(out.get(2).unwrap().x, 6.0);
        // i = 0 is truncated to 0..=1
        assert_relative_eq!(out.get(0).unwrap().x, 2.0);
        // i = 4 averages 2..=4
        assert_relative_eq!(out.get(4).unwrap().x, 12.0);
    }

    #[test]
    fn test_gaps_stay_gaps() {
        let smoother = TrajectorySmoother::default();
        let input = line(&[Some(0.0), None, Some(6.0), Some(9.0)]);
        let out = smoother.smooth(&input);
        assert!(out.get(1).is_none());
        // i = 2 averages the defined samples among 0..=3
        assert_relative_eq!(out.get(2).unwrap().x, 5.0);
    }

    #[test]
    fn test_window_one_is_identity() {
        let smoother = TrajectorySmoother::new(SmoothingConfig { window: 1 });
        let input = line(&[Some(1.0), Some(7.0), None, Some(2.0)]);
        assert_eq!(smoother.smooth(&input), input);
    }

    #[test]
    fn test_deterministic() {
        let smoother = TrajectorySmoother::default();
        let input = line(&[Some(1.0), Some(3.0), Some(2.0), Some(8.0)]);
        assert_eq!(smoother.smooth(&input), smoother.smooth(&input));
    }
}
