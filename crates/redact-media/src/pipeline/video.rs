//! Video runs and the frame loop.

use image::RgbImage;
use redact_models::{MediaKind, RedactionMode, RunId, SensitivityProfile, StageTimings};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::{elapsed_ms, MediaInput, PipelineState, ProcessingRequest, RedactionPipeline, RunOutcome};
use crate::error::{MediaError, MediaResult, PartialOutput};
use crate::io::{
    probe_video, EncodeSettings, FfmpegDecoder, FfmpegEncoder, FrameSink, FrameSource,
    PrefetchSource,
};
use crate::metrics;
use crate::redact::{RedactionEngine, RedactionRegion};
use crate::tracking::{TrackState, TrackedRegion, Tracker};

/// Frames between progress log lines.
const PROGRESS_EVERY: u64 = 250;

/// Counters from one pass over a frame source.
#[derive(Debug, Clone, Default)]
pub struct FrameRunSummary {
    pub frames_read: u64,
    pub frames_written: u64,
    /// Frames that ran full detection
    pub frames_detected: u64,
    pub tracks_created: u64,
    /// Tracks created per class label
    pub class_counts: BTreeMap<String, u64>,
    /// False when cancellation stopped the loop early
    pub complete: bool,
    pub timings: StageTimings,
}

impl RedactionPipeline {
    pub(super) fn process_video(
        &mut self,
        request: &ProcessingRequest,
        run_id: &RunId,
    ) -> MediaResult<RunOutcome> {
        // Byte inputs are spooled so FFmpeg can seek in them.
        let spooled;
        let input: &Path = match &request.input {
            MediaInput::Path(path) => path,
            MediaInput::Bytes { data, name_hint } => {
                std::fs::create_dir_all(&self.config.work_dir)?;
                let suffix = name_hint
                    .as_deref()
                    .and_then(|n| Path::new(n).extension())
                    .and_then(|e| e.to_str())
                    .map(|e| format!(".{e}"))
                    .unwrap_or_else(|| ".bin".to_string());
                let mut file = tempfile::Builder::new()
                    .prefix("redact-input-")
                    .suffix(&suffix)
                    .tempfile_in(&self.config.work_dir)?;
                file.write_all(data)?;
                file.flush()?;
                spooled = file;
                spooled.path()
            }
        };

        let info = probe_video(input)?;
        let output = self.output_path(request, run_id, "mp4")?;

        let decoder = FfmpegDecoder::open(input, &info, self.config.max_frame_pixels)?;
        let mut source = PrefetchSource::spawn(decoder, self.config.decode_buffer_frames)?;
        let mut sink = FfmpegEncoder::open(
            &output,
            &EncodeSettings {
                width: info.width,
                height: info.height,
                frame_rate: info.frame_rate.clone(),
                preset: self.config.encode_preset.clone(),
                crf: self.config.encode_crf,
                audio_from: (self.config.keep_audio && info.has_audio).then(|| input.to_path_buf()),
            },
        )?;

        let summary = self
            .run_frames(
                &mut source,
                &mut sink,
                &request.profile,
                request.mode,
                request.frame_skip,
            )
            .map_err(|e| attach_partial(e, &output, sink.frames_written()))?;

        if let Some(expected) = info.frame_count {
            if summary.complete && expected != summary.frames_written {
                warn!(
                    expected,
                    written = summary.frames_written,
                    "Container frame count differs from frames decoded"
                );
            }
        }

        Ok(RunOutcome {
            output,
            detections_count: summary.tracks_created,
            summary,
        })
    }

    /// Redact every frame of `source` into `sink`.
    ///
    /// Detection runs on frames `0, n, 2n, ..` for `frame_skip = n`; the
    /// frames in between are held until the next detection frame and get
    /// interpolated regions. Every frame read is written exactly once, and
    /// the sink is finished before returning, including on failure.
    pub fn process_frames<S, K>(
        &mut self,
        source: &mut S,
        sink: &mut K,
        profile: &SensitivityProfile,
        mode: RedactionMode,
        frame_skip: u32,
    ) -> MediaResult<FrameRunSummary>
    where
        S: FrameSource + ?Sized,
        K: FrameSink + ?Sized,
    {
        self.state = PipelineState::Running;
        let result = profile
            .validate()
            .map_err(MediaError::from)
            .and_then(|()| match frame_skip {
                0 => Err(MediaError::invalid_config("frame_skip must be at least 1")),
                n if (n - 1) as usize > self.config.max_buffered_frames => Err(MediaError::resource_limit(
                    format!("frame_skip {n} exceeds the frame buffer limit"),
                )),
                _ => Ok(()),
            })
            .and_then(|()| self.run_frames(source, sink, profile, mode, frame_skip));
        self.state = if result.is_ok() {
            PipelineState::Completed
        } else {
            PipelineState::Failed
        };
        result
    }

    fn run_frames<S, K>(
        &mut self,
        source: &mut S,
        sink: &mut K,
        profile: &SensitivityProfile,
        mode: RedactionMode,
        frame_skip: u32,
    ) -> MediaResult<FrameRunSummary>
    where
        S: FrameSource + ?Sized,
        K: FrameSink + ?Sized,
    {
        let mut run = FrameLoop {
            engine: RedactionEngine::for_video(&self.config.redaction),
            tracker: Tracker::new(self.config.tracker.clone()),
            mode,
            summary: FrameRunSummary {
                complete: true,
                ..Default::default()
            },
            pending: Vec::with_capacity(frame_skip as usize),
        };
        self.registry.begin_run(Arc::new(profile.clone()));

        let outcome = self.drive(&mut run, source, sink, profile, frame_skip as u64);

        // Whatever happened, every frame read so far goes out.
        let flushed = run.flush_pending(sink);
        let finish_started = Instant::now();
        let finished = sink.finish();
        run.summary.timings.encode_ms += elapsed_ms(finish_started);

        match (outcome, flushed, finished) {
            (Err(e), _, finish) => {
                if let Err(fe) = finish {
                    warn!(error = %fe, "Failed to finalise output after error");
                }
                Err(e)
            }
            (Ok(()), Err(e), _) | (Ok(()), Ok(()), Err(e)) => Err(e),
            (Ok(()), Ok(()), Ok(())) => {
                run.summary.tracks_created = run.tracker.tracks_created();
                info!(
                    frames = run.summary.frames_written,
                    detected = run.summary.frames_detected,
                    tracks = run.summary.tracks_created,
                    complete = run.summary.complete,
                    "Frame loop finished"
                );
                Ok(run.summary)
            }
        }
    }

    fn drive<S, K>(
        &mut self,
        run: &mut FrameLoop,
        source: &mut S,
        sink: &mut K,
        profile: &SensitivityProfile,
        frame_skip: u64,
    ) -> MediaResult<()>
    where
        S: FrameSource + ?Sized,
        K: FrameSink + ?Sized,
    {
        let mut index = 0u64;
        loop {
            if self.cancelled() {
                info!(frame_index = index, "Cancellation requested, stopping");
                run.summary.complete = false;
                return Ok(());
            }

            let started = Instant::now();
            let Some(mut frame) = source.next_frame()? else {
                return Ok(());
            };
            run.summary.timings.decode_ms += elapsed_ms(started);
            run.summary.frames_read += 1;

            let pixels = frame.width() as u64 * frame.height() as u64;
            if pixels > self.config.max_frame_pixels {
                return Err(MediaError::resource_limit(format!(
                    "frame {index} is {}x{}, over the {} pixel limit",
                    frame.width(),
                    frame.height(),
                    self.config.max_frame_pixels
                )));
            }

            if index % frame_skip != 0 {
                if run.pending.len() >= self.config.max_buffered_frames {
                    return Err(MediaError::resource_limit(format!(
                        "more than {} frames buffered awaiting detection",
                        self.config.max_buffered_frames
                    )));
                }
                run.pending.push((index, frame));
                index += 1;
                continue;
            }

            let started = Instant::now();
            let detected = self
                .registry
                .detect_all(&frame, index, self.config.detectors.parallel);
            let raw = match detected {
                Ok(raw) => raw,
                Err(e) => {
                    // The current frame is still owed to the output.
                    run.pending.push((index, frame));
                    return Err(e);
                }
            };
            let detections = self.combiner.combine(raw, profile);
            run.summary.timings.detect_ms += elapsed_ms(started);
            run.summary.frames_detected += 1;

            let started = Instant::now();
            let step = match run.tracker.step(index, &detections) {
                Ok(step) => step,
                Err(e) => {
                    run.pending.push((index, frame));
                    return Err(e);
                }
            };
            run.summary.timings.track_ms += elapsed_ms(started);
            for region in step.current.iter().filter(|r| r.state == TrackState::New) {
                *run.summary.class_counts.entry(region.class_label.clone()).or_insert(0) += 1;
            }

            for (t, mut held) in std::mem::take(&mut run.pending) {
                run.emit(sink, &mut held, step.regions_at(t), false)?;
            }
            run.emit(sink, &mut frame, &step.current, true)?;

            if index > 0 && index % PROGRESS_EVERY == 0 {
                debug!(
                    frame_index = index,
                    live_tracks = step.current.len(),
                    "Video progress"
                );
            }
            index += 1;
        }
    }
}

/// Mutable state of one pass over the frames.
struct FrameLoop {
    engine: RedactionEngine,
    tracker: Tracker,
    mode: RedactionMode,
    summary: FrameRunSummary,
    /// Frames read but not yet written, in order
    pending: Vec<(u64, RgbImage)>,
}

impl FrameLoop {
    fn emit<K: FrameSink + ?Sized>(
        &mut self,
        sink: &mut K,
        frame: &mut RgbImage,
        regions: &[TrackedRegion],
        detected: bool,
    ) -> MediaResult<()> {
        let started = Instant::now();
        let redactions: Vec<RedactionRegion> = regions
            .iter()
            .map(|r| RedactionRegion::new(r.region.clone(), self.mode))
            .collect();
        self.engine.render_in_place(frame, &redactions);
        let render_ms = elapsed_ms(started);
        self.summary.timings.render_ms += render_ms;
        metrics::record_render_ms(MediaKind::Video, render_ms as f64);

        let started = Instant::now();
        sink.write_frame(frame)?;
        self.summary.timings.encode_ms += elapsed_ms(started);
        self.summary.frames_written += 1;
        metrics::record_frame(MediaKind::Video, detected);
        Ok(())
    }

    /// Write held frames using the tracker's extrapolation.
    fn flush_pending<K: FrameSink + ?Sized>(&mut self, sink: &mut K) -> MediaResult<()> {
        for (t, mut frame) in std::mem::take(&mut self.pending) {
            let regions = self.tracker.extrapolate(t);
            self.emit(sink, &mut frame, &regions, false)?;
        }
        Ok(())
    }
}

/// Point a fatal detector error at what was written before it.
fn attach_partial(error: MediaError, output: &Path, frames_written: u64) -> MediaError {
    match error {
        e @ MediaError::DetectorUnavailable { .. } => e.with_partial(PartialOutput {
            output: PathBuf::from(output),
            frames_written,
        }),
        other => other,
    }
}
