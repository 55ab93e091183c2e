//! Temporal tracking of detections across video frames.
//!
//! Detection runs on a subset of frames; the tracker carries each object's
//! region across the frames in between and across short detector misses so
//! that redaction coverage stays continuous.

mod assignment;
mod tracker;

pub use tracker::Tracker;

use redact_models::{DetectorId, Region};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Track/detection assignment algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MatchingStrategy {
    /// Highest IoU pairs first.
    #[default]
    Greedy,
    /// Kuhn-Munkres over IoU, maximising total overlap.
    Optimal,
}

/// Identifier of a track. Never reused within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TrackId(pub u64);

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle state of a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackState {
    /// Created on the current detection frame
    New,
    /// Matched on the current detection frame
    Active,
    /// Unmatched but within the grace period
    Lost,
    /// Unmatched past the grace period; removed
    Reaped,
}

/// Per-frame bounding-box motion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Velocity {
    pub dx: f64,
    pub dy: f64,
    pub dw: f64,
    pub dh: f64,
}

impl Velocity {
    fn blend(&self, measured: &Velocity, smoothing: f64) -> Velocity {
        let mix = |old: f64, new: f64| smoothing * old + (1.0 - smoothing) * new;
        Velocity {
            dx: mix(self.dx, measured.dx),
            dy: mix(self.dy, measured.dy),
            dw: mix(self.dw, measured.dw),
            dh: mix(self.dh, measured.dh),
        }
    }
}

/// One tracked object.
#[derive(Debug, Clone)]
pub struct Track {
    pub id: TrackId,
    pub class_label: String,
    /// Detector that produced the latest match
    pub source: DetectorId,
    pub confidence: f64,
    /// Region estimate at the latest detection step
    pub region: Region,
    pub velocity: Velocity,
    pub last_matched_frame: u64,
    pub last_matched_region: Region,
    /// Frames since the track was created
    pub age_in_frames: u64,
    pub frames_since_last_match: u64,
    pub state: TrackState,
    created_frame: u64,
    velocity_measured: bool,
}

impl Track {
    /// Linear extrapolation of the last matched region to frame `t`.
    pub fn predict(&self, t: u64) -> Region {
        let dt = t.saturating_sub(self.last_matched_frame) as f64;
        let v = &self.velocity;
        let moved = self
            .last_matched_region
            .bounding_box()
            .offset(v.dx * dt, v.dy * dt, v.dw * dt, v.dh * dt);
        self.last_matched_region.fit_to(&moved)
    }
}

/// A track's region on one frame, ready for rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedRegion {
    pub track_id: TrackId,
    pub class_label: String,
    pub region: Region,
    pub state: TrackState,
}

/// Result of one detection step.
#[derive(Debug, Clone, Default)]
pub struct TrackerStep {
    pub frame_index: u64,
    /// Regions on the detection frame itself
    pub current: Vec<TrackedRegion>,
    /// Regions for each skipped frame since the previous step
    pub interpolated: BTreeMap<u64, Vec<TrackedRegion>>,
}

impl TrackerStep {
    /// Regions for frame `t`, which is the step's frame or a skipped frame
    /// before it.
    pub fn regions_at(&self, t: u64) -> &[TrackedRegion] {
        if t == self.frame_index {
            return &self.current;
        }
        self.interpolated.get(&t).map(Vec::as_slice).unwrap_or(&[])
    }
}
