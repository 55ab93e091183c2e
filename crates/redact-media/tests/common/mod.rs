//! Shared helpers for scenario tests.

#![allow(dead_code)]

use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};
use redact_media::{AdapterCore, DetectorAdapter, MediaResult, PipelineConfig};
use redact_models::{normalize_label, BoundingBox, Detection, DetectorId, Region, SensitivityProfile};
use std::collections::BTreeSet;
use std::io::Cursor;
use std::sync::Arc;

pub type Hit = (&'static str, f64, BoundingBox);
type Script = Box<dyn FnMut(u64) -> anyhow::Result<Vec<Hit>> + Send>;

/// Adapter whose output is a function of the frame index.
pub struct ScriptedAdapter {
    core: AdapterCore,
    labels: Vec<&'static str>,
    script: Script,
}

impl ScriptedAdapter {
    pub fn new(
        id: &str,
        labels: Vec<&'static str>,
        script: impl FnMut(u64) -> anyhow::Result<Vec<Hit>> + Send + 'static,
    ) -> Self {
        Self::with_failure_limit(id, labels, 5, script)
    }

    pub fn with_failure_limit(
        id: &str,
        labels: Vec<&'static str>,
        max_consecutive_failures: u32,
        script: impl FnMut(u64) -> anyhow::Result<Vec<Hit>> + Send + 'static,
    ) -> Self {
        Self {
            core: AdapterCore::new(DetectorId::new(id), max_consecutive_failures, 0.0),
            labels,
            script: Box::new(script),
        }
    }

    /// Same hits on every frame.
    pub fn constant(id: &str, hits: Vec<Hit>) -> Self {
        let labels = hits.iter().map(|h| h.0).collect();
        Self::new(id, labels, move |_| Ok(hits.clone()))
    }
}

impl DetectorAdapter for ScriptedAdapter {
    fn id(&self) -> &DetectorId {
        self.core.id()
    }

    fn class_space(&self) -> BTreeSet<String> {
        self.labels.iter().map(|l| normalize_label(l)).collect()
    }

    fn begin_run(&mut self, profile: Arc<SensitivityProfile>) {
        self.core.begin_run(profile);
    }

    fn detect(&mut self, frame: &RgbImage, frame_index: u64) -> MediaResult<Vec<Detection>> {
        let result = (self.script)(frame_index);
        let Some(hits) = self.core.settle(result, frame_index)? else {
            return Ok(Vec::new());
        };
        Ok(hits
            .iter()
            .filter_map(|(label, confidence, b)| {
                self.core
                    .admit(label, *confidence, &Region::Box(*b), frame, frame_index)
            })
            .collect())
    }

    fn failure_count(&self) -> u64 {
        self.core.failure_count()
    }
}

pub const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
pub const BLACK: Rgb<u8> = Rgb([0, 0, 0]);

pub fn white_frames(count: usize, width: u32, height: u32) -> Vec<RgbImage> {
    (0..count)
        .map(|_| RgbImage::from_pixel(width, height, WHITE))
        .collect()
}

pub fn gradient(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x * 3 + y * 5) % 256) as u8])
    })
}

pub fn png_bytes(image: &RgbImage) -> Vec<u8> {
    let mut cursor = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image.clone())
        .write_to(&mut cursor, ImageOutputFormat::Png)
        .unwrap();
    cursor.into_inner()
}

/// Defaults with unpadded regions and a scratch work directory.
pub fn test_config(work_dir: &std::path::Path) -> PipelineConfig {
    let mut config = PipelineConfig {
        work_dir: work_dir.to_path_buf(),
        ..Default::default()
    };
    config.redaction.padding_ratio = 0.0;
    config
}
