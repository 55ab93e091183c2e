//! Adapter for text detectors (OCR).
//!
//! OCR engines report every line of text they read. The adapter keeps the
//! lines whose content looks like PII and labels them by pattern, or keeps
//! every line as `on_screen_text` when asked to.

use image::RgbImage;
use redact_models::{Detection, DetectorId, Polygon, Region, SensitivityProfile};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::trace;

use super::classifier::{TextClassifier, ON_SCREEN_TEXT};
use super::{AdapterCore, DetectorAdapter};
use crate::error::MediaResult;

/// OCR confidence below which a line is ignored (default for new adapters).
pub const DEFAULT_MIN_TEXT_CONFIDENCE: f64 = 0.2;

/// One line of text read by an OCR engine.
#[derive(Debug, Clone, PartialEq)]
pub struct RawText {
    pub text: String,
    pub confidence: f64,
    pub polygon: Polygon,
}

/// OCR engine behind a [`TextDetectorAdapter`].
#[cfg_attr(test, mockall::automock)]
pub trait TextDetectionBackend: Send {
    /// Read all text on a frame.
    fn read_text(&mut self, frame: &RgbImage) -> anyhow::Result<Vec<RawText>>;
}

/// Wraps an OCR engine and classifies what it reads.
pub struct TextDetectorAdapter {
    core: AdapterCore,
    backend: Box<dyn TextDetectionBackend>,
    classifier: TextClassifier,
    redact_all_text: bool,
}

impl TextDetectorAdapter {
    pub fn new(
        id: impl Into<String>,
        backend: Box<dyn TextDetectionBackend>,
        max_consecutive_failures: u32,
    ) -> Self {
        Self {
            core: AdapterCore::new(
                DetectorId::new(id),
                max_consecutive_failures,
                DEFAULT_MIN_TEXT_CONFIDENCE,
            ),
            backend,
            classifier: TextClassifier::new(),
            redact_all_text: false,
        }
    }

    pub fn with_classifier(mut self, classifier: TextClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Emit unclassified text as `on_screen_text` instead of dropping it.
    pub fn with_redact_all_text(mut self, redact_all_text: bool) -> Self {
        self.redact_all_text = redact_all_text;
        self
    }

    pub fn with_min_confidence(mut self, min_confidence: f64) -> Self {
        self.core.set_min_confidence(min_confidence);
        self
    }

    fn label_for(&self, text: &str) -> Option<&'static str> {
        match self.classifier.classify(text) {
            Some(label) => Some(label),
            None if self.redact_all_text && !text.trim().is_empty() => Some(ON_SCREEN_TEXT),
            None => None,
        }
    }
}

impl DetectorAdapter for TextDetectorAdapter {
    fn id(&self) -> &DetectorId {
        self.core.id()
    }

    fn class_space(&self) -> BTreeSet<String> {
        let mut labels: BTreeSet<String> =
            self.classifier.labels().into_iter().map(str::to_string).collect();
        if self.redact_all_text {
            labels.insert(ON_SCREEN_TEXT.to_string());
        }
        labels
    }

    fn begin_run(&mut self, profile: Arc<SensitivityProfile>) {
        self.core.begin_run(profile);
    }

    fn detect(&mut self, frame: &RgbImage, frame_index: u64) -> MediaResult<Vec<Detection>> {
        let result = self.backend.read_text(frame);
        let Some(lines) = self.core.settle(result, frame_index)? else {
            return Ok(Vec::new());
        };

        let detections: Vec<Detection> = lines
            .iter()
            .filter_map(|line| {
                let label = self.label_for(&line.text)?;
                let region = Region::Polygon(line.polygon.clone());
                self.core.admit(label, line.confidence, &region, frame, frame_index)
            })
            .collect();

        trace!(
            detector = %self.core.id(),
            frame_index,
            lines = lines.len(),
            kept = detections.len(),
            "Text detection"
        );
        Ok(detections)
    }

    fn failure_count(&self) -> u64 {
        self.core.failure_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redact_models::Point;

    fn line(text: &str, confidence: f64) -> RawText {
        RawText {
            text: text.to_string(),
            confidence,
            polygon: Polygon::new(vec![
                Point::new(5.0, 5.0),
                Point::new(45.0, 7.0),
                Point::new(44.0, 17.0),
                Point::new(4.0, 15.0),
            ]),
        }
    }

    fn adapter(redact_all: bool) -> TextDetectorAdapter {
        let mut backend = MockTextDetectionBackend::new();
        backend.expect_read_text().returning(|_| {
            Ok(vec![
                line("call +1 555 123 4567", 0.9),
                line("Quarterly report", 0.9),
                line("jane@example.com", 0.1),
            ])
        });
        let mut adapter =
            TextDetectorAdapter::new("ocr", Box::new(backend), 3).with_redact_all_text(redact_all);
        adapter.begin_run(Arc::new(SensitivityProfile::default()));
        adapter
    }

    #[test]
    fn test_only_pii_lines_kept() {
        let detections = adapter(false).detect(&RgbImage::new(64, 32), 2).unwrap();
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].class_label, "phone_number");
        assert!(matches!(detections[0].region, Region::Polygon(_)));
    }

    #[test]
    fn test_redact_all_text() {
        let mut a = adapter(true);
        assert!(a.class_space().contains(ON_SCREEN_TEXT));
        let labels: Vec<String> = a
            .detect(&RgbImage::new(64, 32), 0)
            .unwrap()
            .into_iter()
            .map(|d| d.class_label)
            .collect();
        // The low-confidence email is under the OCR floor.
        assert_eq!(labels, vec!["phone_number", ON_SCREEN_TEXT]);
    }
}
