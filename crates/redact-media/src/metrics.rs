//! Pipeline metrics.
//!
//! Recorded through the `metrics` facade. Nothing is exported unless the
//! embedding application installs a recorder.

use metrics::{counter, histogram};
use redact_models::MediaKind;

/// Metric names as constants for consistency.
pub mod names {
    pub const FRAMES_TOTAL: &str = "redact_frames_total";
    pub const DETECTIONS_TOTAL: &str = "redact_detections_total";
    pub const DETECTOR_FAILURES_TOTAL: &str = "redact_detector_failures_total";
    pub const TRACKS_CREATED_TOTAL: &str = "redact_tracks_created_total";
    pub const FRAME_RENDER_MS: &str = "redact_frame_render_ms";
    pub const RUNS_TOTAL: &str = "redact_runs_total";
    pub const RUN_DURATION_SECONDS: &str = "redact_run_duration_seconds";
}

/// Record a frame written to the output. `detected` is false for frames
/// that were only interpolated or extrapolated.
pub fn record_frame(media_kind: MediaKind, detected: bool) {
    let labels = [
        ("media_kind", media_kind.as_str().to_string()),
        ("detected", detected.to_string()),
    ];
    counter!(names::FRAMES_TOTAL, &labels).increment(1);
}

/// Record detections an adapter admitted on one frame.
pub fn record_detections(detector: &str, count: usize) {
    let labels = [("detector", detector.to_string())];
    counter!(names::DETECTIONS_TOTAL, &labels).increment(count as u64);
}

/// Record a failed backend call.
pub fn record_detector_failure(detector: &str) {
    let labels = [("detector", detector.to_string())];
    counter!(names::DETECTOR_FAILURES_TOTAL, &labels).increment(1);
}

/// Record a new track.
pub fn record_track_created(class_label: &str) {
    let labels = [("class", class_label.to_string())];
    counter!(names::TRACKS_CREATED_TOTAL, &labels).increment(1);
}

/// Record time spent rendering redactions onto one frame.
pub fn record_render_ms(media_kind: MediaKind, millis: f64) {
    let labels = [("media_kind", media_kind.as_str().to_string())];
    histogram!(names::FRAME_RENDER_MS, &labels).record(millis);
}

/// Record the end of a run. `outcome` is "completed", "cancelled" or an
/// error kind.
pub fn record_run(media_kind: MediaKind, outcome: &str, duration_secs: f64) {
    let labels = [
        ("media_kind", media_kind.as_str().to_string()),
        ("outcome", outcome.to_string()),
    ];
    counter!(names::RUNS_TOTAL, &labels).increment(1);
    histogram!(names::RUN_DURATION_SECONDS, &labels).record(duration_secs);
}
