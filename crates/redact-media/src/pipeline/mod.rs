//! Pipeline orchestration.
//!
//! [`RedactionPipeline`] owns the detector registry and drives one input at a
//! time through detection, combining, tracking (video only) and rendering.

mod still;
mod video;

pub use video::FrameRunSummary;

use chrono::Utc;
use redact_models::{
    MediaKind, ProcessingResult, RedactionMode, RunId, SensitivityProfile,
};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::sync::watch;
use tracing::debug;

use crate::combine::DetectionCombiner;
use crate::config::PipelineConfig;
use crate::detection::DetectorRegistry;
use crate::error::{MediaError, MediaResult};
use crate::io::sniff::{sniff_media_kind, SNIFF_LEN};
use crate::logging::RunLogger;
use crate::metrics;

/// Where the input comes from.
#[derive(Debug, Clone)]
pub enum MediaInput {
    Path(PathBuf),
    /// Raw file contents. `name_hint` is an original file name used for
    /// format detection.
    Bytes {
        data: Vec<u8>,
        name_hint: Option<String>,
    },
}

impl MediaInput {
    fn name_hint(&self) -> Option<&Path> {
        match self {
            MediaInput::Path(p) => Some(p.as_path()),
            MediaInput::Bytes { name_hint, .. } => name_hint.as_deref().map(Path::new),
        }
    }
}

/// One call to [`RedactionPipeline::process`].
#[derive(Debug, Clone)]
pub struct ProcessingRequest {
    pub input: MediaInput,
    /// Output location; defaults to `work_dir/<run_id>.<ext>`
    pub output: Option<PathBuf>,
    pub profile: SensitivityProfile,
    pub mode: RedactionMode,
    /// Run detection on every Nth video frame (default: 1)
    pub frame_skip: u32,
}

impl ProcessingRequest {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self::new(MediaInput::Path(path.into()))
    }

    pub fn from_bytes(data: Vec<u8>, name_hint: Option<String>) -> Self {
        Self::new(MediaInput::Bytes { data, name_hint })
    }

    fn new(input: MediaInput) -> Self {
        Self {
            input,
            output: None,
            profile: SensitivityProfile::default(),
            mode: RedactionMode::default(),
            frame_skip: 1,
        }
    }

    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = Some(output.into());
        self
    }

    pub fn with_profile(mut self, profile: SensitivityProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_mode(mut self, mode: RedactionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_frame_skip(mut self, frame_skip: u32) -> Self {
        self.frame_skip = frame_skip;
        self
    }
}

/// Lifecycle of a pipeline's most recent run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Init,
    Running,
    Completed,
    Failed,
}

/// What a media-specific run produced, before it is wrapped in a
/// [`ProcessingResult`].
pub(crate) struct RunOutcome {
    pub output: PathBuf,
    pub detections_count: u64,
    pub summary: FrameRunSummary,
}

/// Orchestrates redaction of images and videos.
pub struct RedactionPipeline {
    config: PipelineConfig,
    registry: DetectorRegistry,
    combiner: DetectionCombiner,
    state: PipelineState,
    cancel: Option<watch::Receiver<bool>>,
}

impl RedactionPipeline {
    /// Build a pipeline. Fails on invalid configuration or when no detector
    /// is registered.
    pub fn new(config: PipelineConfig, registry: DetectorRegistry) -> MediaResult<Self> {
        config.check()?;
        if registry.is_empty() {
            return Err(MediaError::invalid_config("at least one detector must be registered"));
        }
        debug!(detectors = ?registry.ids(), "Pipeline created");
        Ok(Self {
            combiner: DetectionCombiner::new(&config.combiner),
            config,
            registry,
            state: PipelineState::Init,
            cancel: None,
        })
    }

    /// Stop pulling frames once the receiver reads `true`.
    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn registry(&self) -> &DetectorRegistry {
        &self.registry
    }

    fn cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Redact one image or video.
    pub fn process(&mut self, request: &ProcessingRequest) -> MediaResult<ProcessingResult> {
        let run_id = RunId::new();
        let started_at = Utc::now();
        let timer = Instant::now();
        self.state = PipelineState::Running;

        let kind = match self.prepare(request) {
            Ok(kind) => kind,
            Err(e) => {
                self.state = PipelineState::Failed;
                return Err(e);
            }
        };

        let logger = RunLogger::new(&run_id, kind);
        let span = logger.create_span();
        let _enter = span.enter();
        logger.log_start(&format!(
            "mode={} profile={} frame_skip={}",
            request.mode, request.profile.name, request.frame_skip
        ));

        let outcome = match kind {
            MediaKind::Image => self.process_image(request, &run_id),
            MediaKind::Video => self.process_video(request, &run_id),
        };
        let elapsed = timer.elapsed();

        match outcome {
            Ok(outcome) => {
                self.state = PipelineState::Completed;
                let mut timings = outcome.summary.timings;
                timings.total_ms = elapsed.as_millis() as u64;
                let result = ProcessingResult {
                    run_id,
                    media_kind: kind,
                    detections_count: outcome.detections_count,
                    frames_processed: outcome.summary.frames_written,
                    frames_detected: outcome.summary.frames_detected,
                    output_reference: outcome.output,
                    complete: outcome.summary.complete,
                    class_counts: outcome.summary.class_counts,
                    detector_failures: self.registry.failure_counts(),
                    timings,
                    started_at,
                    finished_at: Utc::now(),
                };
                let status = if result.complete { "completed" } else { "cancelled" };
                metrics::record_run(kind, status, elapsed.as_secs_f64());
                logger.log_completion(&format!(
                    "{} regions, {} frames in {} ms -> {}",
                    result.detections_count,
                    result.frames_processed,
                    result.timings.total_ms,
                    result.output_reference.display()
                ));
                Ok(result)
            }
            Err(e) => {
                self.state = PipelineState::Failed;
                metrics::record_run(kind, e.kind().as_str(), elapsed.as_secs_f64());
                logger.log_error(&e.to_string());
                Err(e)
            }
        }
    }

    /// Validate the request and classify the input. Touches no detector.
    fn prepare(&self, request: &ProcessingRequest) -> MediaResult<MediaKind> {
        request.profile.validate()?;
        if request.frame_skip == 0 {
            return Err(MediaError::invalid_config("frame_skip must be at least 1"));
        }
        let buffered = (request.frame_skip - 1) as usize;
        if buffered > self.config.max_buffered_frames {
            return Err(MediaError::resource_limit(format!(
                "frame_skip {} would buffer {} frames, limit is {}",
                request.frame_skip, buffered, self.config.max_buffered_frames
            )));
        }

        match &request.input {
            MediaInput::Path(path) => {
                if !path.is_file() {
                    return Err(MediaError::FileNotFound(path.clone()));
                }
                let mut head = Vec::with_capacity(SNIFF_LEN);
                std::fs::File::open(path)?
                    .take(SNIFF_LEN as u64 * 4)
                    .read_to_end(&mut head)?;
                sniff_media_kind(Some(path), &head)
            }
            MediaInput::Bytes { data, .. } => {
                if data.is_empty() {
                    return Err(MediaError::InvalidImage("empty input".to_string()));
                }
                sniff_media_kind(request.input.name_hint(), data)
            }
        }
    }

    /// Caller-chosen output, or `work_dir/<run_id>.<ext>`.
    fn output_path(&self, request: &ProcessingRequest, run_id: &RunId, ext: &str) -> MediaResult<PathBuf> {
        let path = match &request.output {
            Some(path) => path.clone(),
            None => self.config.work_dir.join(format!("{run_id}.{ext}")),
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Ok(path)
    }
}

pub(crate) fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}

impl std::fmt::Debug for RedactionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedactionPipeline")
            .field("registry", &self.registry)
            .field("state", &self.state)
            .finish()
    }
}
