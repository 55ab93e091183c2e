//! Subcommand execution.

use anyhow::{Context, Result};
use redact_media::{MediaError, PipelineConfig, ProcessingRequest, RedactionPipeline};
use redact_models::{ProcessingResult, RedactionMode, SensitivityProfile};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::args::{Cli, Commands, RedactOptions};
use crate::config::CliConfig;
use crate::detectors::build_registry;

/// Exit code when some files of a batch failed.
const EXIT_PARTIAL: u8 = 2;

/// Everything a subcommand needs to process files.
pub struct Session {
    pipeline: RedactionPipeline,
    profile: SensitivityProfile,
    mode: RedactionMode,
    json: bool,
    cancel: watch::Receiver<bool>,
}

impl Session {
    pub fn new(options: &RedactOptions, env: &CliConfig, cancel: watch::Receiver<bool>) -> Result<Self> {
        let config = pipeline_config(options, env)?;
        let registry = build_registry(options, env, config.detectors.max_consecutive_failures)?;
        let pipeline = RedactionPipeline::new(config, registry)
            .context("invalid pipeline configuration")?
            .with_cancel(cancel.clone());
        Ok(Self {
            pipeline,
            profile: profile(options)?,
            mode: options.mode.unwrap_or_default(),
            json: options.json,
            cancel,
        })
    }

    fn request(&self, input: &Path, output: &Path) -> ProcessingRequest {
        ProcessingRequest::from_path(input)
            .with_output(output)
            .with_profile(self.profile.clone())
            .with_mode(self.mode)
    }
}

/// Load `--config` (or `REDACT_CONFIG`) and apply flag overrides.
pub fn pipeline_config(options: &RedactOptions, env: &CliConfig) -> Result<PipelineConfig> {
    let mut config: PipelineConfig = match options.config.as_ref().or(env.config_file.as_ref()) {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            serde_json::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))?
        }
        None => PipelineConfig::default(),
    };

    if let Some(dir) = &env.work_dir {
        config.work_dir = dir.clone();
    }
    if let Some(n) = env.max_consecutive_failures {
        config.detectors.max_consecutive_failures = n;
    }
    if let Some(block) = options.block_size {
        config.redaction.image_block_size = block;
        config.redaction.video_block_size = block;
    }
    if let Some(strength) = options.blur_strength {
        config.redaction.blur_strength = strength;
    }
    if let Some(kernel) = options.blur_kernel {
        config.redaction.blur_kernel = Some(kernel);
    }
    if let Some(padding) = options.padding {
        config.redaction.padding_ratio = padding;
    }
    config.check().context("invalid pipeline configuration")?;
    Ok(config)
}

/// Sensitivity preset plus `--threshold` overrides.
pub fn profile(options: &RedactOptions) -> Result<SensitivityProfile> {
    let mut profile = options.sensitivity.unwrap_or_default().profile();
    for spec in &options.thresholds {
        profile.apply_override(spec)?;
    }
    Ok(profile)
}

/// Run the parsed command to completion.
pub fn run(cli: Cli, env: CliConfig, cancel: watch::Receiver<bool>) -> Result<ExitCode> {
    let mut session = Session::new(&cli.options, &env, cancel)?;
    match cli.command {
        Commands::Image { input, output } => {
            let request = session.request(&input, &output);
            let result = session
                .pipeline
                .process(&request)
                .with_context(|| format!("redacting {}", input.display()))?;
            report(&session, &result)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Video {
            input,
            output,
            frame_skip,
        } => {
            let request = session.request(&input, &output).with_frame_skip(frame_skip);
            let result = match session.pipeline.process(&request) {
                Ok(result) => result,
                Err(e) => {
                    if let Some(partial) = e.partial_output() {
                        warn!(%partial, "Output is incomplete");
                    }
                    return Err(anyhow::Error::new(e).context(format!("redacting {}", input.display())));
                }
            };
            report(&session, &result)?;
            Ok(if result.complete {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(EXIT_PARTIAL)
            })
        }
        Commands::Batch {
            input_dir,
            output_dir,
            extensions,
        } => run_batch(&mut session, &input_dir, &output_dir, &extensions),
    }
}

/// One file's outcome in a batch.
#[derive(Debug, Serialize)]
struct BatchEntry {
    file: PathBuf,
    output: Option<PathBuf>,
    detections: u64,
    error: Option<String>,
}

fn run_batch(
    session: &mut Session,
    input_dir: &Path,
    output_dir: &Path,
    extensions: &[String],
) -> Result<ExitCode> {
    let files = batch_inputs(input_dir, extensions)?;
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("creating {}", output_dir.display()))?;
    info!(files = files.len(), input_dir = %input_dir.display(), "Batch started");

    let mut entries = Vec::with_capacity(files.len());
    for file in files {
        if *session.cancel.borrow() {
            warn!("Batch cancelled");
            break;
        }
        let output = output_dir.join(redacted_name(&file));
        let request = session.request(&file, &output);
        let entry = match session.pipeline.process(&request) {
            Ok(result) => BatchEntry {
                file,
                output: Some(result.output_reference),
                detections: result.detections_count,
                error: None,
            },
            Err(e) => {
                warn!(file = %file.display(), error = %e, "File failed, continuing");
                BatchEntry {
                    file,
                    output: None,
                    detections: 0,
                    error: Some(describe(&e)),
                }
            }
        };
        entries.push(entry);
    }

    let failed = entries.iter().filter(|e| e.error.is_some()).count();
    if session.json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else {
        let total: u64 = entries.iter().map(|e| e.detections).sum();
        println!("Batch complete: {} files, {} detections, {} failed", entries.len(), total, failed);
        for entry in &entries {
            let name = entry.file.file_name().unwrap_or_default().to_string_lossy();
            match &entry.error {
                None => println!("  ok    {name}: {} detections", entry.detections),
                Some(error) => println!("  FAIL  {name}: {error}"),
            }
        }
    }

    Ok(if failed > 0 {
        ExitCode::from(EXIT_PARTIAL)
    } else {
        ExitCode::SUCCESS
    })
}

/// Files directly under `dir` whose extension matches, sorted by name.
fn batch_inputs(dir: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
    let wanted: Vec<String> = extensions
        .iter()
        .map(|e| e.trim_start_matches('.').to_lowercase())
        .collect();
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))? {
        let path = entry?.path();
        let matches = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| wanted.contains(&e.to_lowercase()));
        if path.is_file() && matches {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn redacted_name(file: &Path) -> String {
    format!("redacted_{}", file.file_name().unwrap_or_default().to_string_lossy())
}

fn describe(error: &MediaError) -> String {
    format!("{} ({})", error, error.kind().as_str())
}

fn report(session: &Session, result: &ProcessingResult) -> Result<()> {
    if session.json {
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(());
    }
    println!("Redacted {} -> {}", result.media_kind, result.output_reference.display());
    println!("  regions:  {}", result.detections_count);
    println!("  frames:   {} ({} detected)", result.frames_processed, result.frames_detected);
    for (class, count) in &result.class_counts {
        println!("    {class}: {count}");
    }
    for (detector, failures) in result.detector_failures.iter().filter(|(_, n)| **n > 0) {
        println!("  detector {detector}: {failures} failed frames");
    }
    println!("  time:     {} ms", result.timings.total_ms);
    if !result.complete {
        println!("  cancelled before the end of the input");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_overrides() {
        let options = RedactOptions {
            sensitivity: Some(redact_models::SensitivityLevel::Low),
            thresholds: vec!["Face=0.2".to_string()],
            ..Default::default()
        };
        let profile = profile(&options).unwrap();
        assert_eq!(profile.threshold_for("face"), 0.2);
        assert_eq!(profile.threshold_for("screen"), 0.7);

        let bad = RedactOptions {
            thresholds: vec!["face".to_string()],
            ..Default::default()
        };
        assert!(super::profile(&bad).is_err());
    }

    #[test]
    fn test_config_file_with_flag_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");
        std::fs::write(&path, r#"{"tracker": {"grace_period": 9}, "redaction": {"padding_ratio": 0.2}}"#)
            .unwrap();
        let options = RedactOptions {
            config: Some(path),
            block_size: Some(12),
            padding: Some(0.0),
            ..Default::default()
        };

        let config = pipeline_config(&options, &CliConfig::default()).unwrap();
        assert_eq!(config.tracker.grace_period, 9);
        assert_eq!(config.redaction.padding_ratio, 0.0);
        assert_eq!(config.redaction.image_block_size, 12);
        assert_eq!(config.redaction.video_block_size, 12);
    }

    #[test]
    fn test_invalid_override_rejected() {
        let options = RedactOptions {
            padding: Some(3.0),
            ..Default::default()
        };
        assert!(pipeline_config(&options, &CliConfig::default()).is_err());
    }

    #[test]
    fn test_batch_inputs_filter_and_naming() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.PNG", "a.jpg", "notes.txt", "c.jpeg"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("sub.png")).unwrap();

        let files = batch_inputs(dir.path(), &["png".to_string(), ".jpg".to_string()]).unwrap();
        let names: Vec<String> = files.iter().map(|f| redacted_name(f)).collect();
        assert_eq!(names, vec!["redacted_a.jpg", "redacted_b.PNG"]);
    }
}
