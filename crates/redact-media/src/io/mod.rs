//! Frame sources and sinks.
//!
//! The pipeline loop pulls decoded RGB frames from a [`FrameSource`] and
//! pushes redacted ones into a [`FrameSink`]. FFmpeg pipes back the file
//! path; in-memory implementations serve embedders and tests.

pub mod ffmpeg;
pub mod memory;
pub mod prefetch;
pub mod probe;
pub mod sniff;

pub use ffmpeg::{EncodeSettings, FfmpegCommand, FfmpegDecoder, FfmpegEncoder};
pub use memory::{MemorySink, MemorySource};
pub use prefetch::PrefetchSource;
pub use probe::{parse_frame_rate, probe_video, VideoInfo};
pub use sniff::{sniff_media_kind, IMAGE_EXTENSIONS, VIDEO_EXTENSIONS};

use image::RgbImage;

use crate::error::MediaResult;

/// Producer of decoded frames in presentation order.
pub trait FrameSource: Send {
    /// Next frame, or `None` once the input is exhausted.
    fn next_frame(&mut self) -> MediaResult<Option<RgbImage>>;
}

/// Consumer of output frames in presentation order.
pub trait FrameSink {
    fn write_frame(&mut self, frame: &RgbImage) -> MediaResult<()>;

    /// Flush and close the output. Called once, including after a failure
    /// so that partial output is usable.
    fn finish(&mut self) -> MediaResult<()>;

    fn frames_written(&self) -> u64;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn next_frame(&mut self) -> MediaResult<Option<RgbImage>> {
        (**self).next_frame()
    }
}

impl<S: FrameSink + ?Sized> FrameSink for Box<S> {
    fn write_frame(&mut self, frame: &RgbImage) -> MediaResult<()> {
        (**self).write_frame(frame)
    }

    fn finish(&mut self) -> MediaResult<()> {
        (**self).finish()
    }

    fn frames_written(&self) -> u64 {
        (**self).frames_written()
    }
}
