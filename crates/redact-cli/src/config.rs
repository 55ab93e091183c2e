//! Environment configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Settings read from `REDACT_*` variables. Command-line flags win.
#[derive(Debug, Clone)]
pub struct CliConfig {
    /// Default object detector process
    pub detector_cmd: Option<String>,
    /// Default text detector process
    pub text_detector_cmd: Option<String>,
    /// Default ONNX object model
    pub object_model: Option<PathBuf>,
    /// Labels reported by command detectors
    pub detector_labels: Vec<String>,
    /// Per-frame deadline for command detectors
    pub detector_timeout: Duration,
    /// Consecutive failures before a detector is given up on
    pub max_consecutive_failures: Option<u32>,
    /// Scratch directory for spooled inputs
    pub work_dir: Option<PathBuf>,
    /// Pipeline configuration file
    pub config_file: Option<PathBuf>,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            detector_cmd: None,
            text_detector_cmd: None,
            object_model: None,
            detector_labels: Vec::new(),
            detector_timeout: Duration::from_secs(30),
            max_consecutive_failures: None,
            work_dir: None,
            config_file: None,
        }
    }
}

impl CliConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| var(key).filter(|v| !v.trim().is_empty());
        Self {
            detector_cmd: non_empty("REDACT_DETECTOR_CMD"),
            text_detector_cmd: non_empty("REDACT_TEXT_DETECTOR_CMD"),
            object_model: non_empty("REDACT_OBJECT_MODEL").map(PathBuf::from),
            detector_labels: non_empty("REDACT_DETECTOR_LABELS")
                .map(|s| {
                    s.split(',')
                        .map(|l| l.trim().to_string())
                        .filter(|l| !l.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            detector_timeout: Duration::from_secs(
                non_empty("REDACT_DETECTOR_TIMEOUT_SECS")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            max_consecutive_failures: non_empty("REDACT_MAX_DETECTOR_FAILURES")
                .and_then(|s| s.parse().ok()),
            work_dir: non_empty("REDACT_WORK_DIR").map(PathBuf::from),
            config_file: non_empty("REDACT_CONFIG").map(PathBuf::from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("REDACT_DETECTOR_CMD", "python detect.py --fast"),
            ("REDACT_DETECTOR_LABELS", "face, id_card,,screen"),
            ("REDACT_DETECTOR_TIMEOUT_SECS", "5"),
            ("REDACT_MAX_DETECTOR_FAILURES", "not a number"),
            ("REDACT_WORK_DIR", "  "),
        ]
        .into_iter()
        .collect();
        let config = CliConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.detector_cmd.as_deref(), Some("python detect.py --fast"));
        assert_eq!(config.detector_labels, vec!["face", "id_card", "screen"]);
        assert_eq!(config.detector_timeout, Duration::from_secs(5));
        assert_eq!(config.max_consecutive_failures, None);
        assert_eq!(config.work_dir, None);
        assert_eq!(config.text_detector_cmd, None);
    }
}
