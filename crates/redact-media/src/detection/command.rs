//! External-process detector backend.
//!
//! Any model that can run as a command line tool can be plugged in: the
//! frame is written to the child's stdin as PNG and the child prints a JSON
//! array of hits on stdout.
//!
//! ```json
//! [
//!   {"label": "face", "confidence": 0.91, "box": [x, y, w, h]},
//!   {"text": "4111 1111 1111 1111", "confidence": 0.8,
//!    "polygon": [[x, y], [x, y], [x, y], [x, y]]}
//! ]
//! ```

use anyhow::{anyhow, bail, Context};
use image::{ImageOutputFormat, RgbImage};
use redact_models::{BoundingBox, Point, Polygon, Region};
use serde::Deserialize;
use std::io::{Cursor, Read, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use tracing::debug;

use super::object::{ObjectDetectionBackend, RawObject};
use super::text::{RawText, TextDetectionBackend};
use crate::error::{MediaError, MediaResult};
use crate::io::ffmpeg::{drain_stderr, join_stderr};

/// How to launch the detector process.
#[derive(Debug, Clone)]
pub struct CommandBackendConfig {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Labels the process can emit, reported as the adapter's class space
    pub labels: Vec<String>,
    /// Per-frame deadline
    pub timeout: Duration,
}

impl CommandBackendConfig {
    /// Parse a whitespace-separated command line.
    pub fn from_command_line(command_line: &str) -> MediaResult<Self> {
        let mut parts = command_line.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| MediaError::invalid_config("empty detector command"))?;
        Ok(Self {
            program: PathBuf::from(program),
            args: parts.map(str::to_string).collect(),
            labels: Vec::new(),
            timeout: Duration::from_secs(30),
        })
    }

    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels = labels.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// One hit as printed by the detector process.
#[derive(Debug, Deserialize)]
struct Record {
    label: Option<String>,
    text: Option<String>,
    confidence: f64,
    #[serde(rename = "box")]
    bbox: Option<[f64; 4]>,
    polygon: Option<Vec<[f64; 2]>>,
}

impl Record {
    fn region(&self) -> anyhow::Result<Region> {
        match (&self.bbox, &self.polygon) {
            (Some([x, y, w, h]), _) => Ok(Region::Box(BoundingBox::new(*x, *y, *w, *h))),
            (None, Some(points)) => Ok(Region::Polygon(Polygon::new(
                points.iter().map(|[x, y]| Point::new(*x, *y)).collect(),
            ))),
            (None, None) => Err(anyhow!("record has neither box nor polygon")),
        }
    }
}

/// Runs one child process per frame.
#[derive(Debug, Clone)]
pub struct CommandBackend {
    config: CommandBackendConfig,
}

impl CommandBackend {
    /// Resolve the program on PATH and build the backend.
    pub fn new(config: CommandBackendConfig) -> MediaResult<Self> {
        let program = if config.program.components().count() > 1 {
            if !config.program.exists() {
                return Err(MediaError::model_not_found(config.program.display().to_string()));
            }
            config.program.clone()
        } else {
            which::which(&config.program)
                .map_err(|_| MediaError::model_not_found(config.program.display().to_string()))?
        };
        Ok(Self {
            config: CommandBackendConfig { program, ..config },
        })
    }

    fn run(&self, frame: &RgbImage) -> anyhow::Result<Vec<Record>> {
        let mut png = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(frame.clone())
            .write_to(&mut png, ImageOutputFormat::Png)
            .context("encoding frame")?;
        let png = png.into_inner();

        let mut child = Command::new(&self.config.program)
            .args(&self.config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("spawning {}", self.config.program.display()))?;

        let mut stdin = child.stdin.take().context("child stdin unavailable")?;
        let writer = std::thread::spawn(move || stdin.write_all(&png));

        let mut stdout = child.stdout.take().context("child stdout unavailable")?;
        let reader = std::thread::spawn(move || {
            let mut buf = Vec::new();
            stdout.read_to_end(&mut buf).map(|_| buf)
        });
        let stderr = drain_stderr(&mut child);

        let started = Instant::now();
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if started.elapsed() > self.config.timeout {
                let _ = child.kill();
                let _ = child.wait();
                bail!("detector timed out after {:?}", self.config.timeout);
            }
            std::thread::sleep(Duration::from_millis(2));
        };
        let stderr = join_stderr(stderr);

        writer
            .join()
            .map_err(|_| anyhow!("stdin writer panicked"))?
            .context("writing frame to detector")?;
        let output = reader
            .join()
            .map_err(|_| anyhow!("stdout reader panicked"))?
            .context("reading detector output")?;

        if !status.success() {
            bail!(
                "detector exited with {:?}: {}",
                status.code(),
                stderr.unwrap_or_default()
            );
        }

        let records: Vec<Record> =
            serde_json::from_slice(&output).context("parsing detector output")?;
        debug!(
            program = %self.config.program.display(),
            records = records.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Command detector finished"
        );
        Ok(records)
    }
}

impl ObjectDetectionBackend for CommandBackend {
    fn labels(&self) -> Vec<String> {
        self.config.labels.clone()
    }

    fn infer(&mut self, frame: &RgbImage) -> anyhow::Result<Vec<RawObject>> {
        self.run(frame)?
            .into_iter()
            .filter(|r| r.label.is_some())
            .map(|r| {
                Ok(RawObject {
                    region: r.region()?,
                    confidence: r.confidence,
                    label: r.label.unwrap_or_default(),
                })
            })
            .collect()
    }
}

impl TextDetectionBackend for CommandBackend {
    fn read_text(&mut self, frame: &RgbImage) -> anyhow::Result<Vec<RawText>> {
        self.run(frame)?
            .into_iter()
            .filter(|r| r.text.is_some())
            .map(|r| {
                let polygon = match r.region()? {
                    Region::Polygon(p) => p,
                    Region::Box(b) => Polygon::new(vec![
                        Point::new(b.x, b.y),
                        Point::new(b.x2(), b.y),
                        Point::new(b.x2(), b.y2()),
                        Point::new(b.x, b.y2()),
                    ]),
                };
                Ok(RawText {
                    polygon,
                    confidence: r.confidence,
                    text: r.text.unwrap_or_default(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line_parse() {
        let config = CommandBackendConfig::from_command_line("python3 detect.py --model m").unwrap();
        assert_eq!(config.program, PathBuf::from("python3"));
        assert_eq!(config.args, vec!["detect.py", "--model", "m"]);
        assert!(CommandBackendConfig::from_command_line("   ").is_err());
    }

    #[test]
    fn test_record_regions() {
        let records: Vec<Record> = serde_json::from_str(
            r#"[
                {"label": "face", "confidence": 0.9, "box": [1, 2, 3, 4]},
                {"text": "x", "confidence": 0.5, "polygon": [[0,0],[4,0],[4,2],[0,2]]},
                {"label": "face", "confidence": 0.5}
            ]"#,
        )
        .unwrap();
        assert_eq!(
            records[0].region().unwrap(),
            Region::Box(BoundingBox::new(1.0, 2.0, 3.0, 4.0))
        );
        assert_eq!(records[1].region().unwrap().bounding_box().width, 4.0);
        assert!(records[2].region().is_err());
    }

    #[test]
    fn test_missing_program() {
        let config = CommandBackendConfig::from_command_line("/definitely/not/here --x").unwrap();
        assert!(matches!(
            CommandBackend::new(config),
            Err(MediaError::ModelNotFound(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_runs_shell_detector() {
        let config = CommandBackendConfig::from_command_line("sh").unwrap();
        let config = CommandBackendConfig {
            args: vec![
                "-c".to_string(),
                r#"cat > /dev/null; echo '[{"label":"face","confidence":0.8,"box":[1,1,4,4]}]'"#
                    .to_string(),
            ],
            ..config
        };
        let Ok(mut backend) = CommandBackend::new(config) else {
            return;
        };
        let objects = backend.infer(&RgbImage::new(8, 8)).unwrap();
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].label, "face");
    }

    #[cfg(unix)]
    #[test]
    fn test_chatty_stderr_does_not_stall() {
        let config = CommandBackendConfig::from_command_line("sh").unwrap();
        let config = CommandBackendConfig {
            args: vec![
                "-c".to_string(),
                "cat > /dev/null; head -c 200000 /dev/zero >&2; echo '[]'".to_string(),
            ],
            timeout: Duration::from_secs(10),
            ..config
        };
        let Ok(mut backend) = CommandBackend::new(config) else {
            return;
        };
        let objects = backend.infer(&RgbImage::new(8, 8)).unwrap();
        assert!(objects.is_empty());
    }
}
