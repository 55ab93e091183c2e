//! Per-frame detections and the identifiers attached to them.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::geometry::{BoundingBox, Region};

/// Identifier of the detector adapter that produced a detection.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct DetectorId(pub String);

impl DetectorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DetectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Canonical form of a class label: trimmed, lower-case, words joined by `_`.
///
/// `"Credit Card"`, `"credit-card"` and `"credit_card"` all map to
/// `"credit_card"`.
pub fn normalize_label(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    let mut pending_sep = false;
    for c in label.trim().chars() {
        if c.is_whitespace() || c == '-' || c == '_' {
            pending_sep = !out.is_empty();
            continue;
        }
        if pending_sep {
            out.push('_');
            pending_sep = false;
        }
        out.extend(c.to_lowercase());
    }
    out
}

/// One candidate sensitive region found by one detector on one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Detection {
    /// Normalized class label (see [`normalize_label`])
    pub class_label: String,
    /// Detector confidence in [0, 1]
    pub confidence: f64,
    /// Region in frame pixel coordinates
    pub region: Region,
    /// Zero-based index of the frame this was found on
    pub frame_index: u64,
    /// Adapter that produced it
    pub source: DetectorId,
}

impl Detection {
    /// Create a detection. The label is normalized and the confidence
    /// clamped to [0, 1].
    pub fn new(
        class_label: &str,
        confidence: f64,
        region: impl Into<Region>,
        frame_index: u64,
        source: DetectorId,
    ) -> Self {
        Self {
            class_label: normalize_label(class_label),
            confidence: confidence.clamp(0.0, 1.0),
            region: region.into(),
            frame_index,
            source,
        }
    }

    #[inline]
    pub fn bounding_box(&self) -> BoundingBox {
        self.region.bounding_box()
    }

    #[inline]
    pub fn area(&self) -> f64 {
        self.region.area()
    }
}

/// Detections for one frame.
pub type FrameDetections = Vec<Detection>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_label() {
        assert_eq!(normalize_label("Credit Card"), "credit_card");
        assert_eq!(normalize_label("  driver-license "), "driver_license");
        assert_eq!(normalize_label("on_screen__text"), "on_screen_text");
        assert_eq!(normalize_label("face"), "face");
    }

    #[test]
    fn test_detection_new_normalizes() {
        let d = Detection::new(
            "ID Card",
            1.4,
            BoundingBox::new(0.0, 0.0, 10.0, 10.0),
            3,
            DetectorId::new("objects"),
        );
        assert_eq!(d.class_label, "id_card");
        assert_eq!(d.confidence, 1.0);
        assert_eq!(d.area(), 100.0);
    }
}
