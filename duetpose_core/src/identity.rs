//! The "IDENTITY" Engine - Per-Camera Lead/Follow Continuity
//!
//! Detections arrive without identity. For every camera the tracker keeps the
//! last known nose position of each tracked subject and, frame by frame,
//! hands each subject the unclaimed standing figure whose nose is nearest:
//!
//! 1. Standing filter: drop figures shorter than `min_standing_height`
//! 2. Nearest nose: pick the closest remaining figure; a subject never seen
//!    before measures from the pixel origin
//! 3. Jump gate: accept if closer than `jump_threshold`, or on first sighting
//!
//! Lead is resolved before Follow. Figures claimed by neither become Unknown
//! for that frame only.

use duetpose_env::CameraId;
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::skeleton::{Pose2D, Role};

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Configuration for the IdentityTracker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Largest accepted nose displacement between frames (default: 70 px)
    pub jump_threshold: f64,

    /// Figures with `nose.y - lowest ankle.y` below this are ignored (default: 50 px)
    pub min_standing_height: f64,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            jump_threshold: 70.0,
            min_standing_height: 50.0,
        }
    }
}

// ============================================================================
// TRACK STATE
// ============================================================================

/// Continuity state of one subject in one camera.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackState {
    /// Nose position at the last accepted frame; `None` until first sighting
    pub last_nose: Option<Vector2<f64>>,

    /// Whether the subject was accepted in the most recent frame
    pub visible: bool,
}

impl TrackState {
    fn accept(&mut self, pose: &Pose2D) {
        if let Some(nose) = pose.nose() {
            self.last_nose = Some(nose);
        }
        self.visible = true;
    }
}

/// A 2D figure with its resolved role and the camera that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedFigure {
    pub role: Role,
    pub camera: CameraId,
    pub pose: Pose2D,
}

/// Result of tracking one frame of one camera.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameAssignment {
    pub camera: CameraId,
    pub frame: usize,
    pub lead: Option<TrackedFigure>,
    pub follow: Option<TrackedFigure>,
    /// Figures claimed by neither subject; rebuilt every frame
    pub unknown: Vec<TrackedFigure>,
}

impl FrameAssignment {
    pub fn get(&self, role: Role) -> Option<&TrackedFigure> {
        match role {
            Role::Lead => self.lead.as_ref(),
            Role::Follow => self.follow.as_ref(),
            Role::Unknown => None,
        }
    }

    fn slot(&mut self, role: Role) -> &mut Option<TrackedFigure> {
        match role {
            Role::Follow => &mut self.follow,
            _ => &mut self.lead,
        }
    }
}

// ============================================================================
// TRACKER
// ============================================================================

/// Sequential identity tracker for one camera.
///
/// State lives for one tracking pass and mutates once per frame per subject.
#[derive(Debug, Clone)]
pub struct IdentityTracker {
    camera: CameraId,
    config: IdentityConfig,
    lead: TrackState,
    follow: TrackState,
}

impl IdentityTracker {
    pub fn new(camera: CameraId, config: IdentityConfig) -> Self {
        Self {
            camera,
            config,
            lead: TrackState::default(),
            follow: TrackState::default(),
        }
    }

    pub fn camera(&self) -> CameraId {
        self.camera
    }

    /// Sets a subject's last known nose, e.g. from a persisted track.
    pub fn seed(&mut self, role: Role, nose: Vector2<f64>) {
        if let Some(state) = self.state_mut(role) {
            state.last_nose = Some(nose);
        }
    }

    pub fn state(&self, role: Role) -> Option<&TrackState> {
        match role {
            Role::Lead => Some(&self.lead),
            Role::Follow => Some(&self.follow),
            Role::Unknown => None,
        }
    }

    fn state_mut(&mut self, role: Role) -> Option<&mut TrackState> {
        match role {
            Role::Lead => Some(&mut self.lead),
            Role::Follow => Some(&mut self.follow),
            Role::Unknown => None,
        }
    }

    pub fn last_nose(&self, role: Role) -> Option<Vector2<f64>> {
        self.state(role).and_then(|s| s.last_nose)
    }

    pub fn is_visible(&self, role: Role) -> bool {
        self.state(role).is_some_and(|s| s.visible)
    }

    /// Resolves one frame of unlabelled detections.
    pub fn track_frame(&mut self, frame: usize, candidates: &[Pose2D]) -> FrameAssignment {
        self.track_frame_with_labels(frame, candidates, None, None)
    }

    /// Resolves one frame, letting persisted Lead/Follow poses take precedence.
    ///
    /// A persisted pose is used as-is for its subject and updates continuity.
    /// The candidate whose nose matches it (within the jump threshold) is
    /// treated as the same figure and not reported as Unknown.
    pub fn track_frame_with_labels(
        &mut self,
        frame: usize,
        candidates: &[Pose2D],
        lead_label: Option<&Pose2D>,
        follow_label: Option<&Pose2D>,
    ) -> FrameAssignment {
        let mut claimed = vec![false; candidates.len()];
        let mut assignment = FrameAssignment {
            camera: self.camera,
            frame,
            lead: None,
            follow: None,
            unknown: Vec::new(),
        };

        for (role, label) in [(Role::Lead, lead_label), (Role::Follow, follow_label)] {
            let picked = match label {
                Some(pose) => {
                    if let Some(index) = self.nearest_within(pose.nose(), candidates, &claimed, false)
                    {
                        claimed[index] = true;
                    }
                    Some(*pose)
                }
                None => self.select(role, candidates, &claimed).map(|index| {
                    claimed[index] = true;
                    candidates[index]
                }),
            };

            let camera = self.camera;
            let Some(state) = self.state_mut(role) else {
                continue;
            };
            match picked {
                Some(pose) => {
                    state.accept(&pose);
                    *assignment.slot(role) = Some(TrackedFigure { role, camera, pose });
                }
                None => state.visible = false,
            }
        }

        assignment.unknown = candidates
            .iter()
            .zip(&claimed)
            .filter(|(_, taken)| !**taken)
            .map(|(pose, _)| TrackedFigure {
                role: Role::Unknown,
                camera: self.camera,
                pose: *pose,
            })
            .collect();

        trace!(
            camera = %self.camera,
            frame,
            lead = assignment.lead.is_some(),
            follow = assignment.follow.is_some(),
            unknown = assignment.unknown.len(),
            "Tracked frame"
        );

        assignment
    }

    /// Tracks a whole sequence in frame order, starting at frame `first`.
    pub fn track_sequence(&mut self, first: usize, frames: &[Vec<Pose2D>]) -> Vec<FrameAssignment> {
        frames
            .iter()
            .enumerate()
            .map(|(offset, candidates)| self.track_frame(first + offset, candidates))
            .collect()
    }

    /// Picks the candidate that continues `role`, if any.
    fn select(&self, role: Role, candidates: &[Pose2D], claimed: &[bool]) -> Option<usize> {
        match self.last_nose(role) {
            Some(last) => self.nearest_within(Some(last), candidates, claimed, true),
            // First sighting: nearest to the origin, no jump gate
            None => self
                .nearest(Vector2::zeros(), candidates, claimed, true)
                .map(|(index, _)| index),
        }
    }

    /// Index of the unclaimed candidate nearest to `nose`, if closer than the
    /// jump threshold.
    fn nearest_within(
        &self,
        nose: Option<Vector2<f64>>,
        candidates: &[Pose2D],
        claimed: &[bool],
        require_standing: bool,
    ) -> Option<usize> {
        let (index, distance) = self.nearest(nose?, candidates, claimed, require_standing)?;
        (distance < self.config.jump_threshold).then_some(index)
    }

    /// Unclaimed candidate with the nose nearest to `target`, and its distance.
    fn nearest(
        &self,
        target: Vector2<f64>,
        candidates: &[Pose2D],
        claimed: &[bool],
        require_standing: bool,
    ) -> Option<(usize, f64)> {
        candidates
            .iter()
            .enumerate()
            .filter(|(i, pose)| !claimed[*i] && (!require_standing || self.is_standing(pose)))
            .filter_map(|(i, pose)| pose.nose().map(|n| (i, (n - target).norm())))
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }

    fn is_standing(&self, pose: &Pose2D) -> bool {
        pose.standing_height()
            .is_some_and(|h| h >= self.config.min_standing_height)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::Joint;

    fn figure(nose_x: f64, nose_y: f64) -> Pose2D {
        let mut pose = Pose2D::default();
        pose.set(Joint::Nose, Some(Vector2::new(nose_x, nose_y)));
        pose.set(Joint::LeftAnkle, Some(Vector2::new(nose_x - 5.0, nose_y - 150.0)));
        pose.set(Joint::RightAnkle, Some(Vector2::new(nose_x + 5.0, nose_y - 148.0)));
        pose
    }

    fn seated(nose_x: f64, nose_y: f64) -> Pose2D {
        let mut pose = figure(nose_x, nose_y);
        pose.set(Joint::LeftAnkle, Some(Vector2::new(nose_x, nose_y - 30.0)));
        pose.set(Joint::RightAnkle, None);
        pose
    }

    fn tracker() -> IdentityTracker {
        IdentityTracker::new(CameraId(0), IdentityConfig::default())
    }

    #[test]
    fn test_nearest_candidate_selected() {
        let mut tracker = tracker();
        tracker.seed(Role::Lead, Vector2::new(100.0, 100.0));

        let candidates = [figure(500.0, 500.0), figure(102.0, 101.0)];
        let result = tracker.track_frame(0, &candidates);

        let lead = result.lead.unwrap();
        assert_eq!(lead.pose.nose(), Some(Vector2::new(102.0, 101.0)));
        assert_eq!(lead.camera, CameraId(0));
        assert_eq!(tracker.last_nose(Role::Lead), Some(Vector2::new(102.0, 101.0)));
        assert!(tracker.is_visible(Role::Lead));
    }

    #[test]
    fn test_large_jump_rejected() {
        let mut tracker = tracker();
        tracker.seed(Role::Lead, Vector2::new(100.0, 100.0));
        tracker.seed(Role::Follow, Vector2::new(900.0, 900.0));

        let result = tracker.track_frame(0, &[figure(500.0, 500.0)]);
        assert!(result.lead.is_none());
        assert!(!tracker.is_visible(Role::Lead));
        assert_eq!(tracker.last_nose(Role::Lead), Some(Vector2::new(100.0, 100.0)));
        assert_eq!(result.unknown.len(), 1);
        assert_eq!(result.unknown[0].role, Role::Unknown);
    }

    #[test]
    fn test_threshold_is_strict() {
        let mut tracker = tracker();
        tracker.seed(Role::Lead, Vector2::new(0.0, 200.0));
        let result = tracker.track_frame(0, &[figure(70.0, 200.0)]);
        assert!(result.lead.is_none());
    }

    #[test]
    fn test_first_sighting_nearest_to_origin() {
        let mut tracker = tracker();
        let result = tracker.track_frame(0, &[figure(800.0, 600.0), figure(200.0, 600.0)]);

        // Far beyond the jump threshold, accepted anyway
        assert_eq!(result.lead.unwrap().pose.nose(), Some(Vector2::new(200.0, 600.0)));
        assert_eq!(result.follow.unwrap().pose.nose(), Some(Vector2::new(800.0, 600.0)));
        assert!(result.unknown.is_empty());
    }

    #[test]
    fn test_first_sighting_ignores_detection_order() {
        let a = figure(800.0, 600.0);
        let b = figure(200.0, 600.0);
        let forward = tracker().track_frame(0, &[a, b]);
        let reversed = tracker().track_frame(0, &[b, a]);
        assert_eq!(forward.lead.unwrap().pose, reversed.lead.unwrap().pose);
        assert_eq!(forward.follow.unwrap().pose, reversed.follow.unwrap().pose);
    }

    #[test]
    fn test_first_sighting_skips_seated() {
        let mut tracker = tracker();
        let result = tracker.track_frame(0, &[seated(10.0, 60.0), figure(300.0, 400.0)]);
        assert_eq!(result.lead.unwrap().pose.nose(), Some(Vector2::new(300.0, 400.0)));
        assert!(result.follow.is_none());
        assert_eq!(result.unknown.len(), 1);
    }

    #[test]
    fn test_seated_figures_ignored() {
        let mut tracker = tracker();
        tracker.seed(Role::Lead, Vector2::new(100.0, 300.0));
        let result = tracker.track_frame(0, &[seated(101.0, 300.0)]);
        assert!(result.lead.is_none());
        assert_eq!(result.unknown.len(), 1);
    }

    #[test]
    fn test_lead_claims_before_follow() {
        let mut tracker = tracker();
        tracker.seed(Role::Lead, Vector2::new(100.0, 300.0));
        tracker.seed(Role::Follow, Vector2::new(110.0, 300.0));

        // Only one figure near both: Lead wins, Follow is absent
        let result = tracker.track_frame(0, &[figure(105.0, 300.0)]);
        assert!(result.lead.is_some());
        assert!(result.follow.is_none());
        assert!(!tracker.is_visible(Role::Follow));
    }

    #[test]
    fn test_persisted_label_takes_precedence() {
        let mut tracker = tracker();
        tracker.seed(Role::Lead, Vector2::new(100.0, 300.0));

        let label = figure(400.0, 300.0);
        let candidates = [figure(101.0, 300.0), figure(402.0, 301.0)];
        let result = tracker.track_frame_with_labels(0, &candidates, Some(&label), None);

        assert_eq!(result.lead.unwrap().pose, label);
        assert_eq!(tracker.last_nose(Role::Lead), Some(Vector2::new(400.0, 300.0)));
        // (402, 301) is the labelled figure; (101, 300) is free for Follow
        assert_eq!(result.follow.unwrap().pose.nose(), Some(Vector2::new(101.0, 300.0)));
        assert!(result.unknown.is_empty());
    }

    #[test]
    fn test_track_sequence_follows_motion() {
        let mut tracker = tracker();
        let frames: Vec<Vec<Pose2D>> = (0..10)
            .map(|i| {
                let step = i as f64 * 20.0;
                vec![figure(900.0 - step, 400.0), figure(100.0 + step, 400.0)]
            })
            .collect();

        let results = tracker.track_sequence(5, &frames);
        assert_eq!(results.len(), 10);
        assert_eq!(results[0].frame, 5);
        for (i, result) in results.iter().enumerate() {
            let step = i as f64 * 20.0;
            assert_eq!(
                result.lead.as_ref().unwrap().pose.nose().unwrap().x,
                100.0 + step
            );
            assert_eq!(
                result.follow.as_ref().unwrap().pose.nose().unwrap().x,
                900.0 - step
            );
        }
    }
}
