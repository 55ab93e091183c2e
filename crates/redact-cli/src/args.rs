//! Command-line argument definitions.

use clap::{Args, Parser, Subcommand};
use redact_models::{BlurStrength, RedactionMode, SensitivityLevel};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "redact",
    author,
    version,
    about = "Redact: find and obscure sensitive regions in images and video",
    long_about = "Detects faces, documents, screens and sensitive text with the configured \
                  detectors, tracks them across video frames and pixelates, blurs or blacks \
                  them out."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub options: RedactOptions,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Redact a single image
    Image {
        #[arg(value_name = "INPUT")]
        input: PathBuf,
        #[arg(value_name = "OUTPUT")]
        output: PathBuf,
    },
    /// Redact a video file
    Video {
        #[arg(value_name = "INPUT")]
        input: PathBuf,
        #[arg(value_name = "OUTPUT")]
        output: PathBuf,
        /// Run detection on every Nth frame; the frames in between are interpolated
        #[arg(short = 'f', long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
        frame_skip: u32,
    },
    /// Redact every matching image in a directory into `redacted_<name>` files
    Batch {
        #[arg(value_name = "INPUT_DIR")]
        input_dir: PathBuf,
        #[arg(value_name = "OUTPUT_DIR")]
        output_dir: PathBuf,
        /// File extensions to process
        #[arg(short = 'e', long, num_args = 1.., default_values = ["jpg", "jpeg", "png"])]
        extensions: Vec<String>,
    },
}

/// Options shared by all subcommands.
#[derive(Args, Debug, Clone, Default)]
pub struct RedactOptions {
    // --- Detection ---
    /// Sensitivity preset
    #[arg(short, long, global = true, value_name = "LEVEL")]
    pub sensitivity: Option<SensitivityLevel>,

    /// Per-class threshold override, e.g. `face=0.4` (repeatable)
    #[arg(short = 't', long = "threshold", global = true, value_name = "CLASS=VALUE")]
    pub thresholds: Vec<String>,

    /// Object detector process; reads a PNG on stdin, prints JSON hits
    #[arg(long, global = true, value_name = "COMMAND")]
    pub detector_cmd: Option<String>,

    /// Text detector process; same protocol, hits carry `text`
    #[arg(long, global = true, value_name = "COMMAND")]
    pub text_detector_cmd: Option<String>,

    /// YOLO-family ONNX model for object detection
    #[arg(long, global = true, value_name = "MODEL")]
    pub object_model: Option<PathBuf>,

    /// Redact all detected text, not only text that looks sensitive
    #[arg(long, global = true)]
    pub redact_all_text: bool,

    // --- Rendering ---
    /// Redaction mode
    #[arg(short, long, global = true, value_name = "MODE")]
    pub mode: Option<RedactionMode>,

    /// Pixelation block size, applied to images and video alike
    #[arg(long, global = true, value_name = "PIXELS", value_parser = clap::value_parser!(u32).range(1..))]
    pub block_size: Option<u32>,

    /// Adaptive blur strength: light, medium or heavy
    #[arg(long, global = true, value_name = "STRENGTH")]
    pub blur_strength: Option<BlurStrength>,

    /// Fixed blur kernel size, overriding the adaptive size
    #[arg(long, global = true, value_name = "PIXELS")]
    pub blur_kernel: Option<u32>,

    /// Padding around each region as a fraction of its size
    #[arg(long, global = true, value_name = "RATIO")]
    pub padding: Option<f64>,

    // --- Configuration and output ---
    /// Pipeline configuration as JSON; missing fields keep their defaults
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Print results as JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    /// Write Prometheus metrics to this file after the run
    #[arg(long, global = true, value_name = "FILE")]
    pub metrics_out: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_video_with_global_options() {
        let cli = Cli::parse_from([
            "redact",
            "video",
            "in.mp4",
            "out.mp4",
            "--frame-skip",
            "3",
            "--mode",
            "blackout",
            "-t",
            "face=0.4",
            "--threshold",
            "id_card=0.9",
        ]);
        match cli.command {
            Commands::Video { frame_skip, .. } => assert_eq!(frame_skip, 3),
            other => panic!("unexpected command {other:?}"),
        }
        assert_eq!(cli.options.mode, Some(RedactionMode::Blackout));
        assert_eq!(cli.options.thresholds, vec!["face=0.4", "id_card=0.9"]);
    }

    #[test]
    fn test_zero_frame_skip_rejected() {
        assert!(Cli::try_parse_from(["redact", "video", "a.mp4", "b.mp4", "--frame-skip", "0"]).is_err());
    }

    #[test]
    fn test_batch_extension_defaults() {
        let cli = Cli::parse_from(["redact", "batch", "in", "out"]);
        match cli.command {
            Commands::Batch { extensions, .. } => assert_eq!(extensions, vec!["jpg", "jpeg", "png"]),
            other => panic!("unexpected command {other:?}"),
        }
    }
}
