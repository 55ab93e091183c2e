//! Configuration for the redaction pipeline.
//!
//! Every component reads its settings from a section of [`PipelineConfig`];
//! the orchestrator threads the sections through at construction.

use redact_models::BlurStrength;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use validator::Validate;

use crate::combine::MergePolicy;
use crate::error::MediaResult;
use crate::tracking::MatchingStrategy;

/// Configuration for the redaction pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct PipelineConfig {
    // === Detectors ===
    #[validate(nested)]
    pub detectors: DetectorPolicy,

    // === Combining ===
    #[validate(nested)]
    pub combiner: CombinerConfig,

    // === Tracking ===
    #[validate(nested)]
    pub tracker: TrackerConfig,

    // === Rendering ===
    #[validate(nested)]
    pub redaction: RedactionSettings,

    // === Video I/O ===
    /// Decoded frames buffered ahead of the processing loop (default: 8)
    #[validate(range(min = 1, max = 1024))]
    pub decode_buffer_frames: usize,

    /// Skipped frames held while waiting for the next detection frame
    /// (default: 120). Bounds memory for large frame-skip factors.
    #[validate(range(min = 1))]
    pub max_buffered_frames: usize,

    /// Largest accepted frame, in pixels (default: 8K UHD)
    #[validate(range(min = 1))]
    pub max_frame_pixels: u64,

    /// Directory for outputs without an explicit path and for spooled inputs
    pub work_dir: PathBuf,

    /// FFmpeg x264 preset for re-encoding (default: "veryfast")
    pub encode_preset: String,

    /// FFmpeg CRF quality (default: 20)
    #[validate(range(max = 51))]
    pub encode_crf: u8,

    /// Copy the source audio stream into the output (default: true)
    pub keep_audio: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            detectors: DetectorPolicy::default(),
            combiner: CombinerConfig::default(),
            tracker: TrackerConfig::default(),
            redaction: RedactionSettings::default(),
            decode_buffer_frames: 8,
            max_buffered_frames: 120,
            max_frame_pixels: 7680 * 4320,
            work_dir: std::env::temp_dir().join("redact"),
            encode_preset: "veryfast".to_string(),
            encode_crf: 20,
            keep_audio: true,
        }
    }
}

impl PipelineConfig {
    /// Preset tuned for throughput.
    pub fn fast() -> Self {
        Self {
            tracker: TrackerConfig {
                grace_period: 8,
                strategy: MatchingStrategy::Greedy,
                ..Default::default()
            },
            redaction: RedactionSettings {
                video_block_size: 20,
                ..Default::default()
            },
            decode_buffer_frames: 16,
            encode_preset: "ultrafast".to_string(),
            encode_crf: 23,
            ..Default::default()
        }
    }

    /// Preset tuned for coverage.
    pub fn thorough() -> Self {
        Self {
            combiner: CombinerConfig {
                merge_iou_threshold: 0.4,
                ..Default::default()
            },
            tracker: TrackerConfig {
                strategy: MatchingStrategy::Optimal,
                iou_threshold: 0.2,
                ..Default::default()
            },
            redaction: RedactionSettings {
                padding_ratio: 0.1,
                ..Default::default()
            },
            encode_preset: "medium".to_string(),
            encode_crf: 18,
            ..Default::default()
        }
    }

    /// Validate every section.
    pub fn check(&self) -> MediaResult<()> {
        self.validate()?;
        Ok(())
    }
}

/// How detector failures are handled.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct DetectorPolicy {
    /// Consecutive failures before a detector is declared unavailable (default: 5)
    #[validate(range(min = 1))]
    pub max_consecutive_failures: u32,

    /// Run adapters concurrently per frame (default: true)
    pub parallel: bool,
}

impl Default for DetectorPolicy {
    fn default() -> Self {
        Self {
            max_consecutive_failures: 5,
            parallel: true,
        }
    }
}

/// Detection combiner settings.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct CombinerConfig {
    /// Same-class overlap above which detections are duplicates (default: 0.5)
    #[validate(range(min = 0.0, max = 1.0))]
    pub merge_iou_threshold: f64,

    /// Which duplicate survives
    pub policy: MergePolicy,
}

impl Default for CombinerConfig {
    fn default() -> Self {
        Self {
            merge_iou_threshold: 0.5,
            policy: MergePolicy::HighestConfidence,
        }
    }
}

/// Tracker settings.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct TrackerConfig {
    /// Minimum IoU between a prediction and a detection to match (default: 0.3)
    #[validate(range(min = 0.0, max = 1.0))]
    pub iou_threshold: f64,

    /// Consecutive unmatched frames a track survives (default: 5)
    pub grace_period: u64,

    /// Track/detection assignment algorithm
    pub strategy: MatchingStrategy,

    /// Weight of the previous velocity when a new one is measured (default: 0.5)
    #[validate(range(min = 0.0, max = 1.0))]
    pub velocity_smoothing: f64,

    /// Weight of the previous region when a track is matched, damping box
    /// jitter between detections (default: 0.0, raw detections)
    #[validate(range(min = 0.0, max = 0.95))]
    pub region_smoothing: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            iou_threshold: 0.3,
            grace_period: 5,
            strategy: MatchingStrategy::Greedy,
            velocity_smoothing: 0.5,
            region_smoothing: 0.0,
        }
    }
}

/// Redaction engine settings.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct RedactionSettings {
    /// Padding as a fraction of region size, per side (default: 0.05)
    #[validate(range(min = 0.0, max = 1.0))]
    pub padding_ratio: f64,

    /// Extra padding in pixels, per side (default: 0)
    #[validate(range(min = 0.0))]
    pub padding_px: f64,

    /// Pixelation block edge for still images (default: 10)
    #[validate(range(min = 1))]
    pub image_block_size: u32,

    /// Pixelation block edge for video frames (default: 16)
    #[validate(range(min = 1))]
    pub video_block_size: u32,

    /// Adaptive blur strength
    pub blur_strength: BlurStrength,

    /// Fixed blur kernel size; overrides the adaptive size when set
    pub blur_kernel: Option<u32>,

    /// Blackout fill colour (default: black)
    pub fill_color: [u8; 3],
}

impl Default for RedactionSettings {
    fn default() -> Self {
        Self {
            padding_ratio: 0.05,
            padding_px: 0.0,
            image_block_size: 10,
            video_block_size: 16,
            blur_strength: BlurStrength::Medium,
            blur_kernel: None,
            fill_color: [0, 0, 0],
        }
    }
}
