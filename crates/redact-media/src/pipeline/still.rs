//! Still-image runs.

use image::{DynamicImage, ImageFormat};
use redact_models::{MediaKind, RunId, StageTimings};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use super::{elapsed_ms, FrameRunSummary, MediaInput, ProcessingRequest, RedactionPipeline, RunOutcome};
use crate::error::{MediaError, MediaResult};
use crate::metrics;
use crate::redact::{RedactionEngine, RedactionRegion};

impl RedactionPipeline {
    pub(super) fn process_image(
        &mut self,
        request: &ProcessingRequest,
        run_id: &RunId,
    ) -> MediaResult<RunOutcome> {
        let mut timings = StageTimings::default();

        let started = Instant::now();
        let data = match &request.input {
            MediaInput::Path(path) => std::fs::read(path)?,
            MediaInput::Bytes { data, .. } => data.clone(),
        };
        let input_format = image::guess_format(&data).ok();
        let decoded = image::load_from_memory(&data)
            .map_err(|e| MediaError::InvalidImage(e.to_string()))?;
        let pixels = decoded.width() as u64 * decoded.height() as u64;
        if pixels > self.config.max_frame_pixels {
            return Err(MediaError::resource_limit(format!(
                "image {}x{} exceeds the {} pixel limit",
                decoded.width(),
                decoded.height(),
                self.config.max_frame_pixels
            )));
        }
        let mut frame = decoded.to_rgb8();
        timings.decode_ms = elapsed_ms(started);

        let started = Instant::now();
        self.registry.begin_run(Arc::new(request.profile.clone()));
        let raw = self
            .registry
            .detect_all(&frame, 0, self.config.detectors.parallel)?;
        let detections = self.combiner.combine(raw, &request.profile);
        timings.detect_ms = elapsed_ms(started);

        let started = Instant::now();
        let regions: Vec<RedactionRegion> = detections
            .iter()
            .map(|d| RedactionRegion::new(d.region.clone(), request.mode))
            .collect();
        RedactionEngine::for_image(&self.config.redaction).render_in_place(&mut frame, &regions);
        timings.render_ms = elapsed_ms(started);
        metrics::record_render_ms(MediaKind::Image, timings.render_ms as f64);

        let started = Instant::now();
        let format = output_format(request.output.as_deref(), input_format);
        let ext = format.extensions_str().first().copied().unwrap_or("png");
        let output = self.output_path(request, run_id, ext)?;
        DynamicImage::ImageRgb8(frame).save_with_format(&output, format)?;
        timings.encode_ms = elapsed_ms(started);
        metrics::record_frame(MediaKind::Image, true);

        let mut class_counts = BTreeMap::new();
        for d in &detections {
            *class_counts.entry(d.class_label.clone()).or_insert(0u64) += 1;
        }
        debug!(
            detections = detections.len(),
            format = ?format,
            output = %output.display(),
            "Image redacted"
        );

        Ok(RunOutcome {
            output,
            detections_count: detections.len() as u64,
            summary: FrameRunSummary {
                frames_read: 1,
                frames_written: 1,
                frames_detected: 1,
                tracks_created: 0,
                class_counts,
                complete: true,
                timings,
            },
        })
    }
}

/// The output path's extension decides, then the input's own format.
fn output_format(output: Option<&Path>, input: Option<ImageFormat>) -> ImageFormat {
    output
        .and_then(|p| ImageFormat::from_path(p).ok())
        .or(input)
        .unwrap_or(ImageFormat::Png)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_format_precedence() {
        assert_eq!(
            output_format(Some(Path::new("out.jpg")), Some(ImageFormat::Png)),
            ImageFormat::Jpeg
        );
        assert_eq!(output_format(None, Some(ImageFormat::Jpeg)), ImageFormat::Jpeg);
        assert_eq!(output_format(Some(Path::new("out")), None), ImageFormat::Png);
    }
}
