//! Shared data models for the visual PII redaction pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Frame geometry (boxes, polygons, regions)
//! - Detections and detector identifiers
//! - Sensitivity profiles and levels
//! - Redaction modes
//! - Run results

pub mod detection;
pub mod geometry;
pub mod redaction;
pub mod result;
pub mod sensitivity;

// Re-export common types
pub use detection::{normalize_label, Detection, DetectorId, FrameDetections};
pub use geometry::{BoundingBox, Point, Polygon, Region};
pub use redaction::{BlurStrength, ModeParseError, RedactionMode};
pub use result::{MediaKind, ProcessingResult, RunId, StageTimings};
pub use sensitivity::{
    ProfileError, SensitivityLevel, SensitivityLevelParseError, SensitivityProfile,
};
