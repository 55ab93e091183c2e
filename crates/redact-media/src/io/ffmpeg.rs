//! FFmpeg raw-frame pipes.
//!
//! Decoding reads `rgb24` frames from an FFmpeg child's stdout; encoding
//! writes them to another child's stdin and lets it mux the source audio
//! back in.

use image::RgbImage;
use std::io::{BufReader, BufWriter, ErrorKind as IoErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::thread;
use tracing::{debug, info, warn};

use super::{FrameSink, FrameSource};
use crate::error::{MediaError, MediaResult};
use crate::io::probe::VideoInfo;

/// Builder for FFmpeg command lines.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    /// Input arguments (before -i)
    input_args: Vec<String>,
    /// Inputs in order
    inputs: Vec<String>,
    /// Output arguments (after the inputs)
    output_args: Vec<String>,
    output: String,
    log_level: String,
}

impl FfmpegCommand {
    pub fn new(output: impl Into<String>) -> Self {
        Self {
            input_args: Vec::new(),
            inputs: Vec::new(),
            output_args: Vec::new(),
            output: output.into(),
            log_level: "error".to_string(),
        }
    }

    /// Add input arguments, applied to the next input.
    pub fn input_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.input_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Add an input. Pending input arguments are placed before it.
    pub fn input(mut self, input: impl Into<String>) -> Self {
        let args = std::mem::take(&mut self.input_args);
        self.inputs.extend(args);
        self.inputs.push("-i".to_string());
        self.inputs.push(input.into());
        self
    }

    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set video codec.
    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:v").output_arg(codec)
    }

    /// Set audio codec.
    pub fn audio_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:a").output_arg(codec)
    }

    /// Set CRF (quality).
    pub fn crf(self, crf: u8) -> Self {
        self.output_arg("-crf").output_arg(crf.to_string())
    }

    /// Set preset.
    pub fn preset(self, preset: impl Into<String>) -> Self {
        self.output_arg("-preset").output_arg(preset)
    }

    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(),
            "-hide_banner".to_string(),
            "-v".to_string(),
            self.log_level.clone(),
        ];
        args.extend(self.inputs.iter().cloned());
        args.extend(self.output_args.iter().cloned());
        args.push(self.output.clone());
        args
    }

    fn spawn(&self, stdin: Stdio, stdout: Stdio) -> MediaResult<Child> {
        which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?;
        let args = self.build_args();
        debug!("Running: ffmpeg {}", args.join(" "));
        Command::new("ffmpeg")
            .args(&args)
            .stdin(stdin)
            .stdout(stdout)
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| MediaError::ffmpeg_failed(format!("Failed to spawn FFmpeg: {e}"), None, None))
    }
}

/// Collects a child's stderr on a background thread so it can never fill
/// the pipe and stall the child.
pub(crate) fn drain_stderr(child: &mut Child) -> Option<thread::JoinHandle<String>> {
    let mut stderr = child.stderr.take()?;
    Some(thread::spawn(move || {
        let mut text = String::new();
        let _ = stderr.read_to_string(&mut text);
        text
    }))
}

pub(crate) fn join_stderr(handle: Option<thread::JoinHandle<String>>) -> Option<String> {
    handle
        .and_then(|h| h.join().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Decodes a video file into RGB frames.
pub struct FfmpegDecoder {
    child: Child,
    stdout: BufReader<ChildStdout>,
    stderr: Option<thread::JoinHandle<String>>,
    width: u32,
    height: u32,
    frames_read: u64,
    finished: bool,
}

impl FfmpegDecoder {
    /// Start decoding `input`, whose geometry came from a probe.
    ///
    /// Rejects frames larger than `max_frame_pixels` before spawning.
    pub fn open(input: &Path, info: &VideoInfo, max_frame_pixels: u64) -> MediaResult<Self> {
        let pixels = info.width as u64 * info.height as u64;
        if pixels > max_frame_pixels {
            return Err(MediaError::resource_limit(format!(
                "frame size {}x{} exceeds the {} pixel limit",
                info.width, info.height, max_frame_pixels
            )));
        }

        let mut child = FfmpegCommand::new("-")
            .input(input.to_string_lossy())
            .output_args(["-map", "0:v:0", "-f", "rawvideo", "-pix_fmt", "rgb24"])
            .spawn(Stdio::null(), Stdio::piped())?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MediaError::ffmpeg_failed("Failed to capture FFmpeg stdout", None, None))?;
        let stderr = drain_stderr(&mut child);

        info!(
            input = %input.display(),
            width = info.width,
            height = info.height,
            fps = info.fps,
            "Decoding video"
        );
        Ok(Self {
            child,
            stdout: BufReader::with_capacity(pixels as usize * 3, stdout),
            stderr,
            width: info.width,
            height: info.height,
            frames_read: 0,
            finished: false,
        })
    }

    fn close(&mut self) -> MediaResult<()> {
        self.finished = true;
        let status = self.child.wait()?;
        let stderr = join_stderr(self.stderr.take());
        if !status.success() {
            return Err(MediaError::ffmpeg_failed(
                format!("FFmpeg decode failed after {} frames", self.frames_read),
                stderr,
                status.code(),
            ));
        }
        debug!(frames = self.frames_read, "Decoder closed");
        Ok(())
    }
}

impl FrameSource for FfmpegDecoder {
    fn next_frame(&mut self) -> MediaResult<Option<RgbImage>> {
        if self.finished {
            return Ok(None);
        }
        let mut buf = vec![0u8; self.width as usize * self.height as usize * 3];
        match self.stdout.read_exact(&mut buf) {
            Ok(()) => {}
            Err(e) if e.kind() == IoErrorKind::UnexpectedEof => {
                self.close()?;
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        }
        self.frames_read += 1;
        RgbImage::from_raw(self.width, self.height, buf)
            .map(Some)
            .ok_or_else(|| MediaError::internal("decoded frame buffer has the wrong size"))
    }
}

impl Drop for FfmpegDecoder {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

/// Encodes RGB frames into a video file.
pub struct FfmpegEncoder {
    child: Child,
    stdin: Option<BufWriter<ChildStdin>>,
    stderr: Option<thread::JoinHandle<String>>,
    output: PathBuf,
    width: u32,
    height: u32,
    frames_written: u64,
    finished: bool,
}

/// Settings for [`FfmpegEncoder::open`].
#[derive(Debug, Clone)]
pub struct EncodeSettings {
    pub width: u32,
    pub height: u32,
    /// Rate string passed to `-r`, e.g. "30000/1001"
    pub frame_rate: String,
    pub preset: String,
    pub crf: u8,
    /// Source file whose first audio stream is copied, if any
    pub audio_from: Option<PathBuf>,
}

impl FfmpegEncoder {
    pub fn open(output: &Path, settings: &EncodeSettings) -> MediaResult<Self> {
        let mut cmd = FfmpegCommand::new(output.to_string_lossy())
            .input_args([
                "-f".to_string(),
                "rawvideo".to_string(),
                "-pix_fmt".to_string(),
                "rgb24".to_string(),
                "-s".to_string(),
                format!("{}x{}", settings.width, settings.height),
                "-r".to_string(),
                settings.frame_rate.clone(),
            ])
            .input("-");

        if let Some(audio) = &settings.audio_from {
            cmd = cmd
                .input(audio.to_string_lossy())
                .output_args(["-map", "0:v:0", "-map", "1:a:0?"])
                .audio_codec("copy");
        }

        // yuv420p needs even dimensions.
        if settings.width % 2 != 0 || settings.height % 2 != 0 {
            cmd = cmd.output_args(["-vf", "pad=ceil(iw/2)*2:ceil(ih/2)*2"]);
        }

        let mut child = cmd
            .video_codec("libx264")
            .preset(settings.preset.clone())
            .crf(settings.crf)
            .output_args(["-pix_fmt", "yuv420p"])
            .spawn(Stdio::piped(), Stdio::null())?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| MediaError::ffmpeg_failed("Failed to capture FFmpeg stdin", None, None))?;
        let stderr = drain_stderr(&mut child);

        info!(
            output = %output.display(),
            width = settings.width,
            height = settings.height,
            rate = %settings.frame_rate,
            audio = settings.audio_from.is_some(),
            "Encoding video"
        );
        Ok(Self {
            child,
            stdin: Some(BufWriter::new(stdin)),
            stderr,
            output: output.to_path_buf(),
            width: settings.width,
            height: settings.height,
            frames_written: 0,
            finished: false,
        })
    }

    pub fn output(&self) -> &Path {
        &self.output
    }
}

impl FrameSink for FfmpegEncoder {
    fn write_frame(&mut self, frame: &RgbImage) -> MediaResult<()> {
        if frame.dimensions() != (self.width, self.height) {
            return Err(MediaError::internal(format!(
                "frame is {}x{}, encoder expects {}x{}",
                frame.width(),
                frame.height(),
                self.width,
                self.height
            )));
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| MediaError::internal("encoder already finished"))?;
        if let Err(e) = stdin.write_all(frame.as_raw()) {
            // A broken pipe means FFmpeg exited; its stderr says why.
            self.stdin.take();
            let status = self.child.wait()?;
            self.finished = true;
            return Err(MediaError::ffmpeg_failed(
                format!("FFmpeg encode stopped accepting frames: {e}"),
                join_stderr(self.stderr.take()),
                status.code(),
            ));
        }
        self.frames_written += 1;
        Ok(())
    }

    fn finish(&mut self) -> MediaResult<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        if let Some(mut stdin) = self.stdin.take() {
            if let Err(e) = stdin.flush() {
                warn!(error = %e, "Failed to flush encoder input");
            }
        }
        let status = self.child.wait()?;
        let stderr = join_stderr(self.stderr.take());
        if !status.success() {
            return Err(MediaError::ffmpeg_failed(
                format!("FFmpeg encode failed after {} frames", self.frames_written),
                stderr,
                status.code(),
            ));
        }
        info!(
            output = %self.output.display(),
            frames = self.frames_written,
            "Encoding finished"
        );
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.frames_written
    }
}

impl Drop for FfmpegEncoder {
    fn drop(&mut self) {
        if !self.finished {
            self.stdin.take();
            let _ = self.child.wait();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_args_orders_inputs() {
        let args = FfmpegCommand::new("out.mp4")
            .input_args(["-f", "rawvideo"])
            .input("-")
            .input("src.mp4")
            .video_codec("libx264")
            .crf(20)
            .build_args();
        assert_eq!(
            args,
            vec![
                "-y", "-hide_banner", "-v", "error", "-f", "rawvideo", "-i", "-", "-i", "src.mp4",
                "-c:v", "libx264", "-crf", "20", "out.mp4"
            ]
        );
    }

    #[test]
    fn test_decoder_rejects_oversized_frames() {
        let info = VideoInfo {
            width: 8000,
            height: 8000,
            fps: 30.0,
            frame_rate: "30/1".to_string(),
            frame_count: None,
            duration: 1.0,
            codec: "h264".to_string(),
            has_audio: false,
        };
        let err = FfmpegDecoder::open(Path::new("in.mp4"), &info, 7680 * 4320)
            .err()
            .unwrap();
        assert!(matches!(err, MediaError::ResourceLimit(_)));
    }
}
