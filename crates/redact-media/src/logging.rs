//! Structured run logging.
//!
//! Every event of a run carries its run id and media kind, so interleaved
//! batch output can be split per input.

use redact_models::{MediaKind, RunId};
use tracing::{error, info, warn, Span};

/// Logger for one pipeline run.
#[derive(Debug, Clone)]
pub struct RunLogger {
    run_id: String,
    media_kind: MediaKind,
}

impl RunLogger {
    pub fn new(run_id: &RunId, media_kind: MediaKind) -> Self {
        Self {
            run_id: run_id.to_string(),
            media_kind,
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            run_id = %self.run_id,
            media_kind = %self.media_kind,
            "Run started: {}", message
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(
            run_id = %self.run_id,
            media_kind = %self.media_kind,
            "Run progress: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            run_id = %self.run_id,
            media_kind = %self.media_kind,
            "Run warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            run_id = %self.run_id,
            media_kind = %self.media_kind,
            "Run failed: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            run_id = %self.run_id,
            media_kind = %self.media_kind,
            "Run completed: {}", message
        );
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn media_kind(&self) -> MediaKind {
        self.media_kind
    }

    /// Span covering the whole run; enter it around per-frame work.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "redaction_run",
            run_id = %self.run_id,
            media_kind = %self.media_kind
        )
    }
}
