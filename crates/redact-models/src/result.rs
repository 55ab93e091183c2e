//! Run identifiers and the summary returned to callers.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

/// Unique identifier for a processing run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct RunId(pub String);

impl RunId {
    /// Generate a new random run ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of media a run processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Wall time spent per stage, in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StageTimings {
    pub decode_ms: u64,
    pub detect_ms: u64,
    pub track_ms: u64,
    pub render_ms: u64,
    pub encode_ms: u64,
    pub total_ms: u64,
}

/// Outcome of one `process` call.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ProcessingResult {
    pub run_id: RunId,
    pub media_kind: MediaKind,
    /// Distinct redacted regions: surviving detections for an image,
    /// tracks created for a video
    pub detections_count: u64,
    /// Frames written to the output
    pub frames_processed: u64,
    /// Frames that ran full detection
    pub frames_detected: u64,
    /// Where the redacted artifact was written
    pub output_reference: PathBuf,
    /// False when the run was cancelled before the input was exhausted
    pub complete: bool,
    /// Redacted regions per class label
    #[serde(default)]
    pub class_counts: BTreeMap<String, u64>,
    /// Transient failures per detector
    #[serde(default)]
    pub detector_failures: BTreeMap<String, u64>,
    #[serde(default)]
    pub timings: StageTimings,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ProcessingResult {
    /// Processing throughput in frames per second.
    pub fn frames_per_second(&self) -> f64 {
        if self.timings.total_ms == 0 {
            return 0.0;
        }
        self.frames_processed as f64 * 1000.0 / self.timings.total_ms as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_id_unique() {
        assert_ne!(RunId::new(), RunId::new());
        assert_eq!(RunId::from_string("abc").to_string(), "abc");
    }

    #[test]
    fn test_result_json_shape() {
        let now = Utc::now();
        let result = ProcessingResult {
            run_id: RunId::from_string("run-1"),
            media_kind: MediaKind::Video,
            detections_count: 2,
            frames_processed: 30,
            frames_detected: 10,
            output_reference: PathBuf::from("/tmp/out.mp4"),
            complete: true,
            class_counts: BTreeMap::from([("face".to_string(), 2)]),
            detector_failures: BTreeMap::new(),
            timings: StageTimings {
                total_ms: 1500,
                ..Default::default()
            },
            started_at: now,
            finished_at: now,
        };

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["run_id"], "run-1");
        assert_eq!(json["media_kind"], "video");
        assert_eq!(json["class_counts"]["face"], 2);
        assert!((result.frames_per_second() - 20.0).abs() < 1e-9);
    }
}
