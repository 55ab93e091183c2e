//! Rendering of redactions onto frames.
//!
//! Regions are padded, clipped to the frame and grouped into clusters of
//! overlapping same-mode regions. Each cluster is transformed exactly once
//! through the union of its members' masks, so overlapping regions never
//! blur or pixelate the same pixel twice.

pub mod effects;
pub mod mask;

use image::RgbImage;
use redact_models::{RedactionMode, Region};
use tracing::trace;

use crate::config::RedactionSettings;
use mask::{Cluster, PixelRect, Placed};

/// A region to redact and how.
#[derive(Debug, Clone, PartialEq)]
pub struct RedactionRegion {
    pub region: Region,
    pub mode: RedactionMode,
}

impl RedactionRegion {
    pub fn new(region: impl Into<Region>, mode: RedactionMode) -> Self {
        Self {
            region: region.into(),
            mode,
        }
    }
}

/// Applies redactions to frames.
///
/// Stateless between calls; one engine serves a whole run.
#[derive(Debug, Clone)]
pub struct RedactionEngine {
    settings: RedactionSettings,
    block_size: u32,
}

impl RedactionEngine {
    /// Engine using the still-image pixelation block size.
    pub fn for_image(settings: &RedactionSettings) -> Self {
        Self {
            settings: settings.clone(),
            block_size: settings.image_block_size,
        }
    }

    /// Engine using the video pixelation block size.
    pub fn for_video(settings: &RedactionSettings) -> Self {
        Self {
            settings: settings.clone(),
            block_size: settings.video_block_size,
        }
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    /// Render onto a copy of `frame`. The input is left untouched.
    pub fn render(&self, frame: &RgbImage, regions: &[RedactionRegion]) -> RgbImage {
        let mut out = frame.clone();
        self.render_in_place(&mut out, regions);
        out
    }

    /// Render directly into `frame`. Returns the number of clusters drawn.
    pub fn render_in_place(&self, frame: &mut RgbImage, regions: &[RedactionRegion]) -> usize {
        let (width, height) = frame.dimensions();
        let placed: Vec<Placed> = regions
            .iter()
            .filter_map(|r| {
                let region = r
                    .region
                    .padded(self.settings.padding_ratio, self.settings.padding_px)
                    .clip(width, height)?;
                let rect = PixelRect::covering(&region.bounding_box(), width, height)?;
                Some(Placed {
                    region,
                    rect,
                    mode: r.mode,
                })
            })
            .collect();
        if placed.is_empty() {
            return 0;
        }

        let clusters = mask::cluster(&placed);
        for cluster in &clusters {
            self.apply(frame, cluster);
        }
        trace!(
            regions = regions.len(),
            clusters = clusters.len(),
            "Rendered redactions"
        );
        clusters.len()
    }

    fn apply(&self, frame: &mut RgbImage, cluster: &Cluster) {
        match cluster.mode {
            RedactionMode::Pixelate => effects::pixelate(frame, cluster, self.block_size),
            RedactionMode::Blur => {
                let kernel = self.blur_kernel(cluster.rect);
                effects::blur(frame, cluster, kernel);
            }
            RedactionMode::Blackout => effects::blackout(frame, cluster, self.settings.fill_color),
        }
    }

    fn blur_kernel(&self, rect: PixelRect) -> u32 {
        match self.settings.blur_kernel {
            Some(k) => (k.max(3)) | 1,
            None => effects::adaptive_kernel(
                rect.width(),
                rect.height(),
                self.settings.blur_strength.multiplier(),
            ),
        }
    }
}
