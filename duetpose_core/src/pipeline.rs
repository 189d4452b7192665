//! The "RECONSTRUCTION" Pipeline - Detections to Finished Skeletons
//!
//! Runs the five stages over one [`ReconstructionContext`]:
//! 1. Identity tracking per camera (sequential in frame order)
//! 2. Per-subject triangulation per joint and frame
//! 3. Unlabelled bundle splitting for figures no subject claimed
//! 4. Moving-average smoothing per (subject, joint)
//! 5. Rest-length estimation and per-frame finalization per subject
//!
//! Stages 2 and 3 collect rays first and solve afterwards, so the solve step
//! only touches plain data. With the `parallel` feature it runs on rayon.

use duetpose_env::{
    CameraId, DetectionRecord, EnvError, ObservationSource, PoseSequenceRecord, PoseSink,
    RayProjector,
};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use tracing::{debug, info, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::cluster::{JointCandidates, RayClusterSplitter};
use crate::config::{ConfigError, ReconstructionConfig};
use crate::context::ReconstructionContext;
use crate::geometry::Ray;
use crate::identity::{FrameAssignment, IdentityTracker, TrackedFigure};
use crate::kinematics::{FinalizeError, KinematicFinalizer, RestLengths};
use crate::skeleton::{Joint, Pose2D, Pose3D, Role, SkeletonError};
use crate::smoothing::TrajectorySmoother;
use crate::trajectory::TrajectorySet;
use crate::triangulation::RaySetTriangulator;

/// Rays per joint for one frame.
type JointRays = Vec<Vec<Ray>>;

// ============================================================================
// OUTPUT
// ============================================================================

/// Identity assignments of one camera over the context's frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraTrack {
    pub camera: CameraId,
    pub assignments: Vec<FrameAssignment>,
}

/// Everything reconstructed for one subject.
#[derive(Debug, Clone, PartialEq)]
pub struct SubjectReconstruction {
    pub role: Role,
    /// Triangulated trajectories before smoothing
    pub raw: TrajectorySet,
    pub smoothed: TrajectorySet,
    /// `None` when the subject never showed every bone in any frame
    pub rest_lengths: Option<RestLengths>,
    /// Finalized skeleton per frame of the context
    pub poses: Vec<Option<Pose3D>>,
}

impl SubjectReconstruction {
    pub fn first_frame(&self) -> usize {
        self.raw.first_frame
    }

    /// Finalized skeleton at an absolute frame number.
    pub fn pose_at(&self, frame: usize) -> Option<&Pose3D> {
        let index = frame.checked_sub(self.first_frame())?;
        self.poses.get(index)?.as_ref()
    }

    pub fn valid_count(&self) -> usize {
        self.poses.iter().filter(|p| p.is_some()).count()
    }

    /// Whether rest lengths could be estimated at all.
    pub fn is_observed(&self) -> bool {
        self.rest_lengths.is_some()
    }

    /// Converts for a [`PoseSink`]. An absent subject exports no rest lengths
    /// and no skeletons.
    pub fn to_record(&self) -> PoseSequenceRecord {
        PoseSequenceRecord {
            role: self.role,
            rest_lengths: self
                .rest_lengths
                .as_ref()
                .map(RestLengths::to_map)
                .unwrap_or_default(),
            frames: self
                .poses
                .iter()
                .map(|p| p.as_ref().map(Pose3D::to_record))
                .collect(),
        }
    }
}

/// Result of one pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconstructionOutput {
    pub frames: Range<usize>,
    pub tracks: Vec<CameraTrack>,
    /// Lead then Follow
    pub subjects: Vec<SubjectReconstruction>,
    /// Split candidates of unclaimed figures, indexed `[frame offset][joint]`
    pub unlabeled: Vec<Vec<JointCandidates>>,
}

impl ReconstructionOutput {
    pub fn subject(&self, role: Role) -> Option<&SubjectReconstruction> {
        self.subjects.iter().find(|s| s.role == role)
    }

    /// Writes every subject's sequence to `sink`.
    pub fn export<K: PoseSink + ?Sized>(&self, sink: &mut K) -> Result<(), EnvError> {
        for subject in &self.subjects {
            sink.write_sequence(&subject.to_record())?;
        }
        Ok(())
    }
}

// ============================================================================
// PIPELINE
// ============================================================================

/// Batch reconstruction of Lead and Follow.
#[derive(Debug, Clone)]
pub struct Reconstruction {
    config: ReconstructionConfig,
    triangulator: RaySetTriangulator,
    splitter: RayClusterSplitter,
    smoother: TrajectorySmoother,
    finalizer: KinematicFinalizer,
}

impl Reconstruction {
    /// Validates `config` and builds every stage from it.
    pub fn new(config: ReconstructionConfig) -> Result<Self, ReconstructionError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    pub fn with_defaults() -> Self {
        Self::build(ReconstructionConfig::default())
    }

    fn build(config: ReconstructionConfig) -> Self {
        let up = config.up_unit();
        Self {
            triangulator: RaySetTriangulator::new(config.triangulation.clone()),
            splitter: RayClusterSplitter::new(up),
            smoother: TrajectorySmoother::new(config.smoothing.clone()),
            finalizer: KinematicFinalizer::new(config.kinematics.clone(), up),
            config,
        }
    }

    pub fn config(&self) -> &ReconstructionConfig {
        &self.config
    }

    /// Runs all five stages.
    pub fn run<S, P>(
        &self,
        ctx: &ReconstructionContext,
        source: &S,
        projector: &P,
    ) -> Result<ReconstructionOutput, ReconstructionError>
    where
        S: ObservationSource + ?Sized,
        P: RayProjector + ?Sized,
    {
        let frame_count = source.frame_count();
        if ctx.frames.start > ctx.frames.end || ctx.frames.end > frame_count {
            return Err(ReconstructionError::FrameRange {
                frames: ctx.frames.clone(),
                frame_count,
            });
        }
        info!(
            frames = ctx.frame_count(),
            cameras = ctx.cameras.len(),
            "Starting reconstruction"
        );

        let tracks = self.track_identities(ctx, source)?;

        let mut subjects = Vec::with_capacity(Role::TRACKED.len());
        for role in Role::TRACKED {
            let raw = self.triangulate_subject(ctx, role, &tracks, projector)?;
            let smoothed = self.smoother.smooth_set(&raw);
            let (rest_lengths, poses) = match self.finalizer.finalize(&smoothed) {
                Ok(finalized) => {
                    info!(
                        %role,
                        valid = finalized.valid_count(),
                        total = finalized.poses.len(),
                        "Finalized subject"
                    );
                    (Some(finalized.rest_lengths), finalized.poses)
                }
                // Absence is a normal outcome; the other subject still finishes
                Err(FinalizeError::NoSamples(bone)) => {
                    warn!(%role, %bone, "Subject never fully observed, no skeletons");
                    (None, vec![None; smoothed.len()])
                }
                Err(source) => return Err(ReconstructionError::Finalize { role, source }),
            };
            subjects.push(SubjectReconstruction {
                role,
                raw,
                smoothed,
                rest_lengths,
                poses,
            });
        }

        let unlabeled = self.triangulate_unlabeled(ctx, &tracks, projector)?;

        Ok(ReconstructionOutput {
            frames: ctx.frames.clone(),
            tracks,
            subjects,
            unlabeled,
        })
    }

    /// Stage 1: identity tracking, one independent pass per camera.
    ///
    /// A persisted Lead/Follow pose for a frame takes precedence over nose
    /// tracking. The last persisted pose before the range seeds continuity.
    pub fn track_identities<S: ObservationSource + ?Sized>(
        &self,
        ctx: &ReconstructionContext,
        source: &S,
    ) -> Result<Vec<CameraTrack>, ReconstructionError> {
        let mut tracks = Vec::with_capacity(ctx.cameras.len());

        for &camera in &ctx.cameras {
            let mut tracker = IdentityTracker::new(camera, self.config.identity.clone());
            let lead = self.persisted(source, camera, Role::Lead)?;
            let follow = self.persisted(source, camera, Role::Follow)?;

            for (role, track) in [(Role::Lead, &lead), (Role::Follow, &follow)] {
                let seed = track.as_ref().and_then(|t| {
                    t.iter()
                        .take(ctx.frames.start)
                        .rev()
                        .find_map(|p| p.as_ref().and_then(Pose2D::nose))
                });
                if let Some(nose) = seed {
                    tracker.seed(role, nose);
                }
            }

            let mut assignments = Vec::with_capacity(ctx.frame_count());
            for frame in ctx.frames.clone() {
                let candidates = source
                    .detections(camera, frame)?
                    .iter()
                    .map(|record| to_pose(record, camera, frame))
                    .collect::<Result<Vec<_>, _>>()?;
                let label = |track: &Option<Vec<Option<Pose2D>>>| {
                    track.as_ref().and_then(|t| t.get(frame).copied().flatten())
                };
                let lead_label = label(&lead);
                let follow_label = label(&follow);
                assignments.push(tracker.track_frame_with_labels(
                    frame,
                    &candidates,
                    lead_label.as_ref(),
                    follow_label.as_ref(),
                ));
            }

            let seen = |role: Role| assignments.iter().filter(|a| a.get(role).is_some()).count();
            debug!(
                %camera,
                lead = seen(Role::Lead),
                follow = seen(Role::Follow),
                "Tracked camera"
            );
            tracks.push(CameraTrack { camera, assignments });
        }

        Ok(tracks)
    }

    /// Stage 2: raw trajectories of one subject.
    ///
    /// A joint seen by fewer than `min_rays` cameras in a frame stays undefined.
    pub fn triangulate_subject<P: RayProjector + ?Sized>(
        &self,
        ctx: &ReconstructionContext,
        role: Role,
        tracks: &[CameraTrack],
        projector: &P,
    ) -> Result<TrajectorySet, ReconstructionError> {
        let mut frames: Vec<JointRays> = Vec::with_capacity(ctx.frame_count());
        for offset in 0..ctx.frame_count() {
            let mut rays = vec![Vec::new(); Joint::COUNT];
            for track in tracks {
                if let Some(figure) = track.assignments.get(offset).and_then(|a| a.get(role)) {
                    collect_rays(figure, projector, &mut rays)?;
                }
            }
            frames.push(rays);
        }

        let min_rays = self.config.triangulation.min_rays;
        let solve = |rays: &JointRays| -> Vec<Option<Vector3<f64>>> {
            rays.iter()
                .map(|joint_rays| {
                    if joint_rays.len() < min_rays {
                        return None;
                    }
                    let result = self.triangulator.triangulate_checked(joint_rays)?;
                    if !result.converged {
                        debug!(rays = joint_rays.len(), "Triangulation hit the iteration cap");
                    }
                    Some(result.point)
                })
                .collect()
        };

        #[cfg(feature = "parallel")]
        let solved: Vec<Vec<Option<Vector3<f64>>>> = frames.par_iter().map(solve).collect();
        #[cfg(not(feature = "parallel"))]
        let solved: Vec<Vec<Option<Vector3<f64>>>> = frames.iter().map(solve).collect();

        let mut set = TrajectorySet::new(role, ctx.first_frame(), ctx.frame_count());
        for (offset, points) in solved.into_iter().enumerate() {
            for (joint, point) in Joint::ALL.iter().zip(points) {
                set.set(*joint, offset, point);
            }
        }

        let missing = (0..set.len()).filter(|&i| set.body_pose(i).is_none()).count();
        if missing > 0 {
            warn!(%role, missing, "Frames with incomplete triangulation");
        }
        Ok(set)
    }

    /// Stage 3: split candidates for the figures no subject claimed.
    pub fn triangulate_unlabeled<P: RayProjector + ?Sized>(
        &self,
        ctx: &ReconstructionContext,
        tracks: &[CameraTrack],
        projector: &P,
    ) -> Result<Vec<Vec<JointCandidates>>, ReconstructionError> {
        let mut frames: Vec<JointRays> = Vec::with_capacity(ctx.frame_count());
        for offset in 0..ctx.frame_count() {
            let mut rays = vec![Vec::new(); Joint::COUNT];
            for track in tracks {
                if let Some(assignment) = track.assignments.get(offset) {
                    for figure in &assignment.unknown {
                        collect_rays(figure, projector, &mut rays)?;
                    }
                }
            }
            frames.push(rays);
        }

        let min_rays = self.config.triangulation.min_rays;
        let solve = |rays: &JointRays| -> Vec<JointCandidates> {
            rays.iter()
                .map(|joint_rays| {
                    self.splitter
                        .triangulate_pair(joint_rays, &self.triangulator, min_rays)
                })
                .collect()
        };

        #[cfg(feature = "parallel")]
        let candidates = frames.par_iter().map(solve).collect();
        #[cfg(not(feature = "parallel"))]
        let candidates = frames.iter().map(solve).collect();

        Ok(candidates)
    }

    fn persisted<S: ObservationSource + ?Sized>(
        &self,
        source: &S,
        camera: CameraId,
        role: Role,
    ) -> Result<Option<Vec<Option<Pose2D>>>, ReconstructionError> {
        let Some(track) = source.persisted_track(camera, role)? else {
            return Ok(None);
        };
        let poses = track
            .iter()
            .enumerate()
            .map(|(frame, record)| record.as_ref().map(|r| to_pose(r, camera, frame)).transpose())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Some(poses))
    }
}

fn to_pose(record: &DetectionRecord, camera: CameraId, frame: usize) -> Result<Pose2D, ReconstructionError> {
    Pose2D::from_record(record).map_err(|source| ReconstructionError::Detection {
        camera,
        frame,
        source,
    })
}

/// Projects every detected joint of `figure` and appends the rays per joint.
fn collect_rays<P: RayProjector + ?Sized>(
    figure: &TrackedFigure,
    projector: &P,
    rays: &mut JointRays,
) -> Result<(), ReconstructionError> {
    for joint in Joint::ALL {
        let Some(pixel) = figure.pose.get(joint) else {
            continue;
        };
        let record = projector.pixel_ray(figure.camera, [pixel.x, pixel.y])?;
        match Ray::try_from(&record) {
            Ok(ray) => rays[joint.index()].push(ray),
            Err(err) => debug!(camera = %figure.camera, %joint, %err, "Skipping ray"),
        }
    }
    Ok(())
}

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ReconstructionError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Env(#[from] EnvError),

    #[error("Frame range {frames:?} exceeds the {frame_count} recorded frames")]
    FrameRange { frames: Range<usize>, frame_count: usize },

    #[error("Malformed detection from {camera} at frame {frame}: {source}")]
    Detection {
        camera: CameraId,
        frame: usize,
        source: SkeletonError,
    },

    #[error("Cannot finalize {role}: {source}")]
    Finalize { role: Role, source: FinalizeError },
}

// ============================================================================
// TESTS
// ============================================================================
