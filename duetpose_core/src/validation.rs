//! Validation Module - Ground Truth Comparison for Reconstructed Skeletons
//! =======================================================================
//!
//! Compares finalized Lead/Follow skeletons against known poses, e.g. from
//! the simulator's oracle.
//!
//! Key metrics:
//! - Joint position error (RMSE, max error)
//! - Completeness (frames with a skeleton / frames with ground truth)
//! - Bone length deviation from the true skeleton
//! - Identity swaps (frames closer to the other subject's truth)
//!
//! Usage:
//! ```ignore
//! use duetpose_core::validation::ValidationSession;
//!
//! let mut session = ValidationSession::new();
//! session.record_ground_truth(Role::Lead, frame, truth);
//! session.record_reconstruction(Role::Lead, frame, output.subject(Role::Lead)?.pose_at(frame).copied());
//! let report = session.generate_report();
//! ```

use std::collections::{BTreeMap, HashMap};

use crate::pipeline::SubjectReconstruction;
use crate::skeleton::{Bone, Pose3D, Role};

// =============================================================================
// VALIDATION METRICS
// =============================================================================

/// Per-subject validation statistics
#[derive(Debug, Clone, Default)]
pub struct RoleMetrics {
    /// Frames with a ground-truth pose
    pub truth_frames: usize,
    /// Of those, frames with a reconstructed skeleton
    pub reconstructed_frames: usize,
    /// Sum of squared joint errors (for RMSE calculation)
    pub error_sum_squared: f64,
    /// Number of joint errors summed
    pub joint_samples: usize,
    /// Maximum joint error observed
    pub max_error: f64,
    /// Largest |reconstructed bone - true bone| observed
    pub max_bone_deviation: f64,
    /// Frames whose skeleton is closer to the other subject's truth
    pub swapped_frames: usize,
}

impl RoleMetrics {
    /// Calculate joint RMSE (Root Mean Square Error)
    pub fn rmse(&self) -> f64 {
        if self.joint_samples > 0 {
            (self.error_sum_squared / self.joint_samples as f64).sqrt()
        } else {
            0.0
        }
    }

    /// Fraction of ground-truth frames that received a skeleton
    pub fn completeness(&self) -> f64 {
        if self.truth_frames > 0 {
            self.reconstructed_frames as f64 / self.truth_frames as f64
        } else {
            0.0
        }
    }
}

// =============================================================================
// VALIDATION SESSION
// =============================================================================

/// Collects ground truth and reconstructions, then scores them.
#[derive(Debug, Default)]
pub struct ValidationSession {
    ground_truth: HashMap<(Role, usize), Pose3D>,
    reconstructions: HashMap<(Role, usize), Option<Pose3D>>,
}

impl ValidationSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_ground_truth(&mut self, role: Role, frame: usize, pose: Pose3D) {
        self.ground_truth.insert((role, frame), pose);
    }

    /// Records a reconstructed skeleton; `None` for a frame without one.
    pub fn record_reconstruction(&mut self, role: Role, frame: usize, pose: Option<Pose3D>) {
        self.reconstructions.insert((role, frame), pose);
    }

    /// Records every frame of a pipeline subject.
    pub fn record_subject(&mut self, subject: &SubjectReconstruction) {
        for (offset, pose) in subject.poses.iter().enumerate() {
            self.record_reconstruction(subject.role, subject.first_frame() + offset, *pose);
        }
    }

    pub fn generate_report(&self) -> ValidationReport {
        let mut per_role: BTreeMap<Role, RoleMetrics> = BTreeMap::new();

        for (&(role, frame), truth) in &self.ground_truth {
            let metrics = per_role.entry(role).or_default();
            metrics.truth_frames += 1;

            let Some(Some(pose)) = self.reconstructions.get(&(role, frame)) else {
                continue;
            };
            metrics.reconstructed_frames += 1;

            for (a, b) in pose.joints.iter().zip(&truth.joints) {
                let error = (a - b).norm();
                metrics.error_sum_squared += error * error;
                metrics.joint_samples += 1;
                metrics.max_error = metrics.max_error.max(error);
            }
            for bone in Bone::ALL {
                let deviation = (pose.bone_length(bone) - truth.bone_length(bone)).abs();
                metrics.max_bone_deviation = metrics.max_bone_deviation.max(deviation);
            }

            let other = match role {
                Role::Lead => Role::Follow,
                _ => Role::Lead,
            };
            if let Some(other_truth) = self.ground_truth.get(&(other, frame)) {
                if mean_joint_distance(pose, other_truth) < mean_joint_distance(pose, truth) {
                    metrics.swapped_frames += 1;
                }
            }
        }

        ValidationReport { per_role }
    }
}

fn mean_joint_distance(a: &Pose3D, b: &Pose3D) -> f64 {
    let sum: f64 = a.joints.iter().zip(&b.joints).map(|(p, q)| (p - q).norm()).sum();
    sum / a.joints.len() as f64
}

// =============================================================================
// VALIDATION REPORT
// =============================================================================

/// Final validation report with all metrics
#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub per_role: BTreeMap<Role, RoleMetrics>,
}

impl ValidationReport {
    pub fn role(&self, role: Role) -> Option<&RoleMetrics> {
        self.per_role.get(&role)
    }

    /// Worst RMSE over all subjects
    pub fn worst_rmse(&self) -> f64 {
        self.per_role.values().map(RoleMetrics::rmse).fold(0.0, f64::max)
    }

    /// Lowest completeness over all subjects
    pub fn worst_completeness(&self) -> f64 {
        self.per_role
            .values()
            .map(RoleMetrics::completeness)
            .fold(1.0, f64::min)
    }

    pub fn worst_bone_deviation(&self) -> f64 {
        self.per_role
            .values()
            .map(|m| m.max_bone_deviation)
            .fold(0.0, f64::max)
    }

    pub fn total_swapped_frames(&self) -> usize {
        self.per_role.values().map(|m| m.swapped_frames).sum()
    }

    /// Print formatted report to console
    pub fn print(&self) {
        println!();
        println!("╔══════════════════════════════════════════════════════════════╗");
        println!("║               DUETPOSE VALIDATION REPORT                     ║");
        println!("╠══════════════════════════════════════════════════════════════╣");
        for (role, m) in &self.per_role {
            println!("║ {:<61}║", role.name().to_uppercase());
            println!("║   Frames (GT / recon):   {:>6} / {:<6}                     ║",
                m.truth_frames, m.reconstructed_frames);
            println!("║   Completeness:          {:>10.1}%                         ║",
                m.completeness() * 100.0);
            println!("║   Joint RMSE:            {:>10.4} m                        ║", m.rmse());
            println!("║   Max Joint Error:       {:>10.4} m                        ║", m.max_error);
            println!("║   Max Bone Deviation:    {:>10.4} m                        ║",
                m.max_bone_deviation);
            println!("║   Swapped Frames:        {:>10}                           ║",
                m.swapped_frames);
        }
        println!("╚══════════════════════════════════════════════════════════════╝");
    }

    /// Check if validation passes acceptance criteria
    pub fn passes_criteria(
        &self,
        max_rmse: f64,
        min_completeness: f64,
        max_bone_deviation: f64,
    ) -> bool {
        !self.per_role.is_empty()
            && self.worst_rmse() <= max_rmse
            && self.worst_completeness() >= min_completeness
            && self.worst_bone_deviation() <= max_bone_deviation
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    fn pose_at(offset: f64) -> Pose3D {
        let mut pose = Pose3D::default();
        for (i, joint) in pose.joints.iter_mut().enumerate() {
            *joint = Vector3::new(offset, i as f64 * 0.1, 0.0);
        }
        pose
    }

    #[test]
    fn test_validation_session() {
        let mut session = ValidationSession::new();
        session.record_ground_truth(Role::Lead, 0, pose_at(0.0));
        session.record_ground_truth(Role::Lead, 1, pose_at(0.0));
        session.record_reconstruction(Role::Lead, 0, Some(pose_at(0.01)));
        session.record_reconstruction(Role::Lead, 1, None);

        let report = session.generate_report();
        let lead = report.role(Role::Lead).unwrap();

        assert_eq!(lead.truth_frames, 2);
        assert_eq!(lead.reconstructed_frames, 1);
        assert!((lead.completeness() - 0.5).abs() < 1e-12);
        assert!((lead.rmse() - 0.01).abs() < 1e-9);
        assert!(lead.max_bone_deviation < 1e-9);
        assert!(report.passes_criteria(0.02, 0.5, 0.001));
        assert!(!report.passes_criteria(0.02, 0.9, 0.001));
    }

    #[test]
    fn test_swapped_identity_detected() {
        let mut session = ValidationSession::new();
        session.record_ground_truth(Role::Lead, 0, pose_at(0.0));
        session.record_ground_truth(Role::Follow, 0, pose_at(2.0));
        session.record_reconstruction(Role::Lead, 0, Some(pose_at(2.0)));
        session.record_reconstruction(Role::Follow, 0, Some(pose_at(0.0)));

        let report = session.generate_report();
        assert_eq!(report.total_swapped_frames(), 2);
    }

    #[test]
    fn test_empty_report_fails() {
        let report = ValidationSession::new().generate_report();
        assert!(!report.passes_criteria(1.0, 0.0, 1.0));
        assert_eq!(report.worst_rmse(), 0.0);
    }
}
