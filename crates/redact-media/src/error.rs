//! Error types for media operations.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Coarse error taxonomy exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Unreadable, missing or unsupported input. Raised before detection.
    Input,
    /// A detector failed persistently.
    DetectorUnavailable,
    /// Frame or buffer limits exceeded.
    ResourceExhausted,
    /// Decoder or encoder failure.
    Codec,
    /// Invalid configuration or request.
    Config,
    /// The run was cancelled.
    Cancelled,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Input => "input",
            ErrorKind::DetectorUnavailable => "detector_unavailable",
            ErrorKind::ResourceExhausted => "resource_exhausted",
            ErrorKind::Codec => "codec",
            ErrorKind::Config => "config",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Output flushed before a fatal failure.
#[derive(Debug, Clone, PartialEq)]
pub struct PartialOutput {
    pub output: PathBuf,
    pub frames_written: u64,
}

impl fmt::Display for PartialOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} frames written to {}", self.frames_written, self.output.display())
    }
}

/// Errors that can occur during media processing.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    #[error("FFmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("FFprobe command failed: {message}")]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("Invalid video file: {0}")]
    InvalidVideo(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Detector '{detector}' unavailable after {consecutive_failures} consecutive failures{}",
        .partial.as_ref().map(|p| format!(" (partial output: {p})")).unwrap_or_default())]
    DetectorUnavailable {
        detector: String,
        consecutive_failures: u32,
        partial: Option<Box<PartialOutput>>,
    },

    #[error("Resource limit exceeded: {0}")]
    ResourceLimit(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    /// Taxonomy bucket of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            // FFprobe only ever reads the input, so its failure means the
            // input is unreadable.
            MediaError::FileNotFound(_)
            | MediaError::UnsupportedFormat(_)
            | MediaError::InvalidImage(_)
            | MediaError::InvalidVideo(_)
            | MediaError::FfprobeFailed { .. } => ErrorKind::Input,
            MediaError::FfmpegNotFound
            | MediaError::FfprobeNotFound
            | MediaError::FfmpegFailed { .. } => ErrorKind::Codec,
            MediaError::InvalidConfig(_) | MediaError::ModelNotFound(_) => ErrorKind::Config,
            MediaError::DetectorUnavailable { .. } => ErrorKind::DetectorUnavailable,
            MediaError::ResourceLimit(_) => ErrorKind::ResourceExhausted,
            MediaError::Cancelled => ErrorKind::Cancelled,
            MediaError::Image(e) => match e {
                image::ImageError::Limits(_) => ErrorKind::ResourceExhausted,
                image::ImageError::Decoding(_) | image::ImageError::Unsupported(_) => {
                    ErrorKind::Input
                }
                _ => ErrorKind::Codec,
            },
            MediaError::Io(_) | MediaError::JsonParse(_) | MediaError::Internal(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Whether the error was raised before any frame was touched.
    pub fn is_input_error(&self) -> bool {
        self.kind() == ErrorKind::Input
    }

    /// Create an FFmpeg failure error.
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    /// Create a detector-unavailable error without partial output.
    pub fn detector_unavailable(detector: impl Into<String>, consecutive_failures: u32) -> Self {
        Self::DetectorUnavailable {
            detector: detector.into(),
            consecutive_failures,
            partial: None,
        }
    }

    /// Attach the partial output reference to a detector failure.
    /// Other variants pass through unchanged.
    pub fn with_partial(self, partial: PartialOutput) -> Self {
        match self {
            Self::DetectorUnavailable {
                detector,
                consecutive_failures,
                ..
            } => Self::DetectorUnavailable {
                detector,
                consecutive_failures,
                partial: Some(Box::new(partial)),
            },
            other => other,
        }
    }

    /// Partial output reference, if any was flushed.
    pub fn partial_output(&self) -> Option<&PartialOutput> {
        match self {
            Self::DetectorUnavailable { partial, .. } => partial.as_deref(),
            _ => None,
        }
    }

    /// Create an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Create a resource limit error.
    pub fn resource_limit(message: impl Into<String>) -> Self {
        Self::ResourceLimit(message.into())
    }

    /// Create a model not found error.
    pub fn model_not_found(path: impl Into<String>) -> Self {
        Self::ModelNotFound(path.into())
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

impl From<redact_models::ProfileError> for MediaError {
    fn from(e: redact_models::ProfileError) -> Self {
        MediaError::InvalidConfig(e.to_string())
    }
}

impl From<validator::ValidationErrors> for MediaError {
    fn from(e: validator::ValidationErrors) -> Self {
        MediaError::InvalidConfig(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(MediaError::FileNotFound("x".into()).kind(), ErrorKind::Input);
        assert_eq!(MediaError::FfmpegNotFound.kind(), ErrorKind::Codec);
        assert_eq!(
            MediaError::FfprobeFailed {
                message: "FFprobe failed on clip.mp4".to_string(),
                stderr: Some("moov atom not found".to_string()),
            }
            .kind(),
            ErrorKind::Input
        );
        assert_eq!(MediaError::InvalidVideo("no stream".into()).kind(), ErrorKind::Input);
        assert_eq!(MediaError::resource_limit("big").kind(), ErrorKind::ResourceExhausted);
        assert_eq!(
            MediaError::detector_unavailable("objects", 5).kind(),
            ErrorKind::DetectorUnavailable
        );
    }

    #[test]
    fn test_with_partial() {
        let err = MediaError::detector_unavailable("objects", 5).with_partial(PartialOutput {
            output: PathBuf::from("/tmp/out.mp4"),
            frames_written: 42,
        });
        assert_eq!(err.partial_output().map(|p| p.frames_written), Some(42));
        assert!(err.to_string().contains("42 frames written"));

        let untouched = MediaError::Cancelled.with_partial(PartialOutput {
            output: PathBuf::from("/tmp/out.mp4"),
            frames_written: 1,
        });
        assert!(untouched.partial_output().is_none());
    }
}
