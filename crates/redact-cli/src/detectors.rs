//! Detector registry assembly from flags and environment.

use anyhow::{bail, Context, Result};
use redact_media::detection::SENSITIVE_CLASSES;
use redact_media::{
    CommandBackend, CommandBackendConfig, DetectorRegistry, ObjectDetectorAdapter,
    TextDetectorAdapter,
};
use tracing::info;

use crate::args::RedactOptions;
use crate::config::CliConfig;

/// Build the registry. At least one detector must be configured.
pub fn build_registry(
    options: &RedactOptions,
    env: &CliConfig,
    max_consecutive_failures: u32,
) -> Result<DetectorRegistry> {
    let mut registry = DetectorRegistry::new();

    let object_model = options.object_model.clone().or_else(|| env.object_model.clone());
    if let Some(model) = object_model {
        registry.register(onnx_adapter(model, max_consecutive_failures)?)?;
    }

    let labels: Vec<String> = if env.detector_labels.is_empty() {
        SENSITIVE_CLASSES.iter().map(|s| s.to_string()).collect()
    } else {
        env.detector_labels.clone()
    };

    if let Some(cmd) = options.detector_cmd.as_ref().or(env.detector_cmd.as_ref()) {
        let backend = command_backend(cmd, &labels, env)?;
        info!(command = %cmd, "Object detector process configured");
        registry.register(Box::new(ObjectDetectorAdapter::new(
            "objects",
            Box::new(backend),
            max_consecutive_failures,
        )))?;
    }

    if let Some(cmd) = options
        .text_detector_cmd
        .as_ref()
        .or(env.text_detector_cmd.as_ref())
    {
        let backend = command_backend(cmd, &labels, env)?;
        info!(command = %cmd, redact_all_text = options.redact_all_text, "Text detector process configured");
        registry.register(Box::new(
            TextDetectorAdapter::new("text", Box::new(backend), max_consecutive_failures)
                .with_redact_all_text(options.redact_all_text),
        ))?;
    }

    if registry.is_empty() {
        bail!(
            "no detector configured; pass --detector-cmd, --text-detector-cmd or --object-model \
             (or set REDACT_DETECTOR_CMD, REDACT_TEXT_DETECTOR_CMD or REDACT_OBJECT_MODEL)"
        );
    }
    Ok(registry)
}

fn command_backend(cmd: &str, labels: &[String], env: &CliConfig) -> Result<CommandBackend> {
    let config = CommandBackendConfig::from_command_line(cmd)?
        .with_labels(labels.iter().cloned())
        .with_timeout(env.detector_timeout);
    CommandBackend::new(config).with_context(|| format!("detector command '{cmd}'"))
}

#[cfg(feature = "onnx")]
fn onnx_adapter(
    model: std::path::PathBuf,
    max_consecutive_failures: u32,
) -> Result<Box<dyn redact_media::DetectorAdapter>> {
    use redact_media::{OnnxObjectBackend, OnnxObjectConfig};

    let backend = OnnxObjectBackend::new(OnnxObjectConfig {
        model_path: model.clone(),
        ..Default::default()
    })
    .with_context(|| format!("loading {}", model.display()))?;
    Ok(Box::new(
        ObjectDetectorAdapter::new("onnx", Box::new(backend), max_consecutive_failures)
            .with_alias("cell phone", "screen")
            .with_alias("laptop", "screen")
            .with_alias("tv", "screen"),
    ))
}

#[cfg(not(feature = "onnx"))]
fn onnx_adapter(
    model: std::path::PathBuf,
    _max_consecutive_failures: u32,
) -> Result<Box<dyn redact_media::DetectorAdapter>> {
    bail!(
        "--object-model {} needs a build with the `onnx` feature",
        model.display()
    )
}
