//! Explicit reconstruction context: which frames, which cameras.

use duetpose_env::{CameraId, ObservationSource};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Frame range and active camera set passed to every pipeline entry point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconstructionContext {
    pub frames: Range<usize>,
    pub cameras: Vec<CameraId>,
}

impl ReconstructionContext {
    pub fn new(frames: Range<usize>, cameras: Vec<CameraId>) -> Self {
        Self { frames, cameras }
    }

    /// Every frame and camera the source holds.
    pub fn from_source<S: ObservationSource + ?Sized>(source: &S) -> Self {
        Self::new(0..source.frame_count(), source.cameras())
    }

    /// Same cameras, different frame range.
    pub fn with_frames(mut self, frames: Range<usize>) -> Self {
        self.frames = frames;
        self
    }

    pub fn first_frame(&self) -> usize {
        self.frames.start
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Index of `frame` within the range.
    pub fn offset_of(&self, frame: usize) -> Option<usize> {
        self.frames.contains(&frame).then(|| frame - self.frames.start)
    }
}
