#![deny(unreachable_patterns)]
//! Visual PII redaction for images and video.
//!
//! This crate provides:
//! - Detector adapters over object and text detectors, with failure accounting
//! - Per-frame detection combining and cross-frame tracking
//! - Pixelate, blur and blackout rendering with overlap-safe masks
//! - FFmpeg frame pipes and an orchestrator tying it all together

pub mod combine;
pub mod config;
pub mod detection;
pub mod error;
pub mod io;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod redact;
pub mod tracking;

pub use combine::{DetectionCombiner, MergePolicy};
pub use config::{
    CombinerConfig, DetectorPolicy, PipelineConfig, RedactionSettings, TrackerConfig,
};
pub use detection::{
    AdapterCore, CommandBackend, CommandBackendConfig, DetectorAdapter, DetectorRegistry,
    ObjectDetectionBackend, ObjectDetectorAdapter, RawObject, RawText, TextClassifier,
    TextDetectionBackend, TextDetectorAdapter,
};
#[cfg(feature = "onnx")]
pub use detection::{OnnxObjectBackend, OnnxObjectConfig};
pub use error::{ErrorKind, MediaError, MediaResult, PartialOutput};
pub use io::{FrameSink, FrameSource, MemorySink, MemorySource};
pub use logging::RunLogger;
pub use pipeline::{
    FrameRunSummary, MediaInput, PipelineState, ProcessingRequest, RedactionPipeline,
};
pub use redact::{RedactionEngine, RedactionRegion};
pub use tracking::{MatchingStrategy, Track, TrackId, TrackState, TrackedRegion, Tracker, TrackerStep};
