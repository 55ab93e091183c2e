//! Adapter for object detectors (faces, documents, screens, plates).

use image::RgbImage;
use redact_models::{normalize_label, Detection, DetectorId, Region, SensitivityProfile};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::trace;

use super::{AdapterCore, DetectorAdapter};
use crate::error::MediaResult;

/// One raw hit from an object detection model.
#[derive(Debug, Clone, PartialEq)]
pub struct RawObject {
    pub label: String,
    pub confidence: f64,
    pub region: Region,
}

/// Model behind an [`ObjectDetectorAdapter`].
#[cfg_attr(test, mockall::automock)]
pub trait ObjectDetectionBackend: Send {
    /// Labels the model can produce, as the model spells them.
    fn labels(&self) -> Vec<String>;

    /// Run the model on a frame.
    fn infer(&mut self, frame: &RgbImage) -> anyhow::Result<Vec<RawObject>>;
}

/// Wraps an object detection model.
pub struct ObjectDetectorAdapter {
    core: AdapterCore,
    backend: Box<dyn ObjectDetectionBackend>,
    aliases: BTreeMap<String, String>,
}

impl ObjectDetectorAdapter {
    pub fn new(
        id: impl Into<String>,
        backend: Box<dyn ObjectDetectionBackend>,
        max_consecutive_failures: u32,
    ) -> Self {
        Self {
            core: AdapterCore::new(DetectorId::new(id), max_consecutive_failures, 0.0),
            backend,
            aliases: BTreeMap::new(),
        }
    }

    /// Floor applied before the sensitivity profile.
    pub fn with_min_confidence(mut self, min_confidence: f64) -> Self {
        self.core.set_min_confidence(min_confidence);
        self
    }

    /// Report model label `from` as class `to`, e.g. `"cell phone"` as `"screen"`.
    pub fn with_alias(mut self, from: &str, to: &str) -> Self {
        self.aliases.insert(normalize_label(from), normalize_label(to));
        self
    }

    fn resolve(&self, label: &str) -> String {
        let normalized = normalize_label(label);
        self.aliases.get(&normalized).cloned().unwrap_or(normalized)
    }
}

impl DetectorAdapter for ObjectDetectorAdapter {
    fn id(&self) -> &DetectorId {
        self.core.id()
    }

    fn class_space(&self) -> BTreeSet<String> {
        self.backend.labels().iter().map(|l| self.resolve(l)).collect()
    }

    fn begin_run(&mut self, profile: Arc<SensitivityProfile>) {
        self.core.begin_run(profile);
    }

    fn detect(&mut self, frame: &RgbImage, frame_index: u64) -> MediaResult<Vec<Detection>> {
        let result = self.backend.infer(frame);
        let Some(objects) = self.core.settle(result, frame_index)? else {
            return Ok(Vec::new());
        };

        let detections: Vec<Detection> = objects
            .iter()
            .filter_map(|o| {
                let label = self.resolve(&o.label);
                self.core.admit(&label, o.confidence, &o.region, frame, frame_index)
            })
            .collect();

        trace!(
            detector = %self.core.id(),
            frame_index,
            raw = objects.len(),
            kept = detections.len(),
            "Object detection"
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
    use crate::error::MediaError;
    use redact_models::{BoundingBox, SensitivityLevel};

    fn object(label: &str, confidence: f64) -> RawObject {
        RawObject {
            label: label.to_string(),
            confidence,
            region: Region::Box(BoundingBox::new(10.0, 10.0, 20.0, 20.0)),
        }
    }

    #[test]
    fn test_thresholds_applied() {
        let mut backend = MockObjectDetectionBackend::new();
        backend
            .expect_infer()
            .returning(|_| Ok(vec![object("ID Card", 0.8), object("face", 0.95)]));

        let mut adapter = ObjectDetectorAdapter::new("objects", Box::new(backend), 3);
        let profile = SensitivityProfile::new("strict", 0.5)
            .unwrap()
            .with_threshold("id_card", 0.9)
            .unwrap();
        adapter.begin_run(Arc::new(profile));

        let detections = adapter.detect(&RgbImage::new(64, 64), 7).unwrap();
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].class_label, "face");
        assert_eq!(detections[0].source, DetectorId::new("objects"));
    }

    #[test]
    fn test_alias_and_class_space() {
        let mut backend = MockObjectDetectionBackend::new();
        backend
            .expect_labels()
            .returning(|| vec!["cell phone".to_string(), "face".to_string()]);
        backend.expect_infer().returning(|_| Ok(vec![object("cell phone", 0.9)]));

        let mut adapter = ObjectDetectorAdapter::new("objects", Box::new(backend), 3)
            .with_alias("cell phone", "screen");
        adapter.begin_run(Arc::new(SensitivityLevel::High.profile()));

        assert!(adapter.class_space().contains("screen"));
        let detections = adapter.detect(&RgbImage::new(64, 64), 0).unwrap();
        assert_eq!(detections[0].class_label, "screen");
    }

    #[test]
    fn test_transient_then_fatal() {
        let mut backend = MockObjectDetectionBackend::new();
        backend
            .expect_infer()
            .returning(|_| Err(anyhow::anyhow!("inference timeout")));

        let mut adapter = ObjectDetectorAdapter::new("objects", Box::new(backend), 2);
        adapter.begin_run(Arc::new(SensitivityProfile::default()));
        let frame = RgbImage::new(16, 16);

        assert!(adapter.detect(&frame, 0).unwrap().is_empty());
        assert!(matches!(
            adapter.detect(&frame, 1),
            Err(MediaError::DetectorUnavailable { consecutive_failures: 2, .. })
        ));
        assert_eq!(adapter.failure_count(), 2);
    }
}
