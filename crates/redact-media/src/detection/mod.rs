//! Detector adapters and the registry that fans frames out to them.
//!
//! Every detector, whatever model sits behind it, is wrapped in a
//! [`DetectorAdapter`]. The adapter owns label normalization, frame
//! clipping, threshold filtering and failure accounting, so the rest of the
//! pipeline only ever sees clean [`Detection`]s.

pub mod classifier;
pub mod command;
pub mod health;
pub mod object;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod text;

pub use classifier::TextClassifier;
pub use command::{CommandBackend, CommandBackendConfig};
pub use health::{DetectorHealth, HealthState};
pub use object::{ObjectDetectionBackend, ObjectDetectorAdapter, RawObject};
#[cfg(feature = "onnx")]
pub use onnx::{OnnxObjectBackend, OnnxObjectConfig};
pub use text::{RawText, TextDetectionBackend, TextDetectorAdapter};

use image::RgbImage;
use rayon::prelude::*;
use redact_models::{normalize_label, Detection, DetectorId, Region, SensitivityProfile};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::error::{MediaError, MediaResult};
use crate::metrics;

/// Object classes that are sensitive by default.
pub const SENSITIVE_CLASSES: &[&str] = &[
    // Identity documents and cards
    "passport", "driver license", "id card", "credit card", "debit card",
    "bank card", "identity card", "national id", "social security card",
    // Personal information displays
    "phone number", "email address", "address", "signature",
    "license plate", "vehicle plate", "barcode", "qr code",
    // Financial
    "bank statement", "receipt", "invoice", "check", "financial document",
    // Medical
    "medical record", "prescription", "health card", "medical document",
    // Biometric and personal
    "fingerprint", "face", "person", "child", "minor",
    // Documents
    "document", "contract", "letter", "form", "certificate",
    // Displays
    "screen", "monitor", "tablet", "phone screen", "computer screen",
    "pin entry", "password field", "login screen",
];

/// Uniform interface over every detector variant.
pub trait DetectorAdapter: Send {
    /// Stable identifier, attached to every detection.
    fn id(&self) -> &DetectorId;

    /// Normalized labels this adapter can emit.
    fn class_space(&self) -> BTreeSet<String>;

    /// Install the profile for a run and reset failure history.
    fn begin_run(&mut self, profile: Arc<SensitivityProfile>);

    /// Detect on one frame.
    ///
    /// Returns an empty set when nothing clears the thresholds or when the
    /// backend failed transiently. Returns
    /// [`MediaError::DetectorUnavailable`] once failures persist.
    fn detect(&mut self, frame: &RgbImage, frame_index: u64) -> MediaResult<Vec<Detection>>;

    /// Transient failures seen during the current run.
    fn failure_count(&self) -> u64;
}

/// Shared admission logic for adapters.
#[derive(Debug, Clone)]
pub struct AdapterCore {
    id: DetectorId,
    profile: Arc<SensitivityProfile>,
    health: DetectorHealth,
    min_confidence: f64,
}

impl AdapterCore {
    /// `min_confidence` is the adapter's own floor, applied before the profile.
    pub fn new(id: DetectorId, max_consecutive_failures: u32, min_confidence: f64) -> Self {
        Self {
            id,
            profile: Arc::new(SensitivityProfile::default()),
            health: DetectorHealth::new(max_consecutive_failures),
            min_confidence,
        }
    }

    pub fn id(&self) -> &DetectorId {
        &self.id
    }

    pub fn set_min_confidence(&mut self, min_confidence: f64) {
        self.min_confidence = min_confidence;
    }

    pub fn profile(&self) -> &SensitivityProfile {
        &self.profile
    }

    pub fn begin_run(&mut self, profile: Arc<SensitivityProfile>) {
        self.profile = profile;
        self.health.reset();
    }

    pub fn failure_count(&self) -> u64 {
        self.health.total_failures()
    }

    /// Turn a raw backend hit into a detection, or drop it.
    ///
    /// Drops hits below the adapter floor or the profile threshold, and
    /// regions that fall outside the frame or collapse when clipped.
    pub fn admit(
        &self,
        label: &str,
        confidence: f64,
        region: &Region,
        frame: &RgbImage,
        frame_index: u64,
    ) -> Option<Detection> {
        let label = normalize_label(label);
        if label.is_empty() || !confidence.is_finite() {
            return None;
        }
        if confidence < self.min_confidence || !self.profile.passes(&label, confidence) {
            return None;
        }
        let region = region.clip(frame.width(), frame.height())?;
        Some(Detection::new(&label, confidence, region, frame_index, self.id.clone()))
    }

    /// Account for a backend call.
    ///
    /// `Ok(None)` means the call failed but the detector is still usable.
    pub fn settle<T>(&mut self, result: anyhow::Result<T>, frame_index: u64) -> MediaResult<Option<T>> {
        match result {
            Ok(value) => {
                self.health.success();
                Ok(Some(value))
            }
            Err(e) => {
                metrics::record_detector_failure(self.id.as_str());
                match self.health.failure() {
                    HealthState::Unavailable { consecutive } => {
                        error!(
                            detector = %self.id,
                            frame_index,
                            consecutive,
                            error = %e,
                            "Detector unavailable"
                        );
                        Err(MediaError::detector_unavailable(self.id.as_str(), consecutive))
                    }
                    _ => {
                        warn!(
                            detector = %self.id,
                            frame_index,
                            consecutive = self.health.consecutive_failures(),
                            error = %e,
                            "Detector failed on frame, continuing without its detections"
                        );
                        Ok(None)
                    }
                }
            }
        }
    }
}

/// Adapters owned by a pipeline.
#[derive(Default)]
pub struct DetectorRegistry {
    adapters: Vec<Box<dyn DetectorAdapter>>,
}

impl DetectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter. Identifiers must be unique.
    pub fn register(&mut self, adapter: Box<dyn DetectorAdapter>) -> MediaResult<()> {
        if self.adapters.iter().any(|a| a.id() == adapter.id()) {
            return Err(MediaError::invalid_config(format!(
                "detector '{}' registered twice",
                adapter.id()
            )));
        }
        self.adapters.push(adapter);
        Ok(())
    }

    /// Builder-style registration.
    pub fn with(mut self, adapter: impl DetectorAdapter + 'static) -> MediaResult<Self> {
        self.register(Box::new(adapter))?;
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    pub fn ids(&self) -> Vec<DetectorId> {
        self.adapters.iter().map(|a| a.id().clone()).collect()
    }

    /// Union of every adapter's class space.
    pub fn class_space(&self) -> BTreeSet<String> {
        self.adapters.iter().flat_map(|a| a.class_space()).collect()
    }

    pub fn begin_run(&mut self, profile: Arc<SensitivityProfile>) {
        for adapter in &mut self.adapters {
            adapter.begin_run(Arc::clone(&profile));
        }
    }

    /// Run every adapter on the frame and join their results.
    ///
    /// With `parallel` set each adapter runs on its own rayon task and
    /// writes into its own result slot. Results are concatenated in
    /// registration order either way. The first unavailable detector aborts
    /// the frame.
    pub fn detect_all(
        &mut self,
        frame: &RgbImage,
        frame_index: u64,
        parallel: bool,
    ) -> MediaResult<Vec<Detection>> {
        let results: Vec<MediaResult<Vec<Detection>>> = if parallel && self.adapters.len() > 1 {
            self.adapters
                .par_iter_mut()
                .map(|adapter| adapter.detect(frame, frame_index))
                .collect()
        } else {
            self.adapters
                .iter_mut()
                .map(|adapter| adapter.detect(frame, frame_index))
                .collect()
        };

        let mut all = Vec::new();
        for (adapter, result) in self.adapters.iter().zip(results) {
            let detections = result?;
            metrics::record_detections(adapter.id().as_str(), detections.len());
            all.extend(detections);
        }

        debug!(frame_index, count = all.len(), "Detectors joined");
        Ok(all)
    }

    /// Transient failure counts per adapter for the current run.
    pub fn failure_counts(&self) -> BTreeMap<String, u64> {
        self.adapters
            .iter()
            .map(|a| (a.id().to_string(), a.failure_count()))
            .collect()
    }
}

impl std::fmt::Debug for DetectorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetectorRegistry")
            .field("adapters", &self.ids())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redact_models::BoundingBox;

    struct FixedAdapter {
        core: AdapterCore,
        hits: Vec<(&'static str, f64, BoundingBox)>,
        fail: bool,
    }

    impl DetectorAdapter for FixedAdapter {
        fn id(&self) -> &DetectorId {
            self.core.id()
        }

        fn class_space(&self) -> BTreeSet<String> {
            self.hits.iter().map(|(l, _, _)| normalize_label(l)).collect()
        }

        fn begin_run(&mut self, profile: Arc<SensitivityProfile>) {
            self.core.begin_run(profile);
        }

        fn detect(&mut self, frame: &RgbImage, frame_index: u64) -> MediaResult<Vec<Detection>> {
            let result = if self.fail {
                Err(anyhow::anyhow!("backend down"))
            } else {
                Ok(self.hits.clone())
            };
            let Some(hits) = self.core.settle(result, frame_index)? else {
                return Ok(Vec::new());
            };
            Ok(hits
                .iter()
                .filter_map(|(l, c, b)| self.core.admit(l, *c, &Region::Box(*b), frame, frame_index))
                .collect())
        }

        fn failure_count(&self) -> u64 {
            self.core.failure_count()
        }
    }

    fn fixed(id: &str, hits: Vec<(&'static str, f64, BoundingBox)>, fail: bool) -> FixedAdapter {
        FixedAdapter {
            core: AdapterCore::new(DetectorId::new(id), 2, 0.0),
            hits,
            fail,
        }
    }

    #[test]
    fn test_admit_filters_and_clips() {
        let core = AdapterCore::new(DetectorId::new("d"), 3, 0.2);
        let frame = RgbImage::new(100, 100);
        let region = Region::Box(BoundingBox::new(90.0, 90.0, 20.0, 20.0));

        let d = core.admit("Face", 0.9, &region, &frame, 4).unwrap();
        assert_eq!(d.class_label, "face");
        assert_eq!(d.bounding_box(), BoundingBox::new(90.0, 90.0, 10.0, 10.0));
        assert_eq!(d.frame_index, 4);

        // Below the medium default threshold
        assert!(core.admit("face", 0.45, &region, &frame, 4).is_none());
        // Below the adapter floor
        assert!(core.admit("face", 0.1, &region, &frame, 4).is_none());
        // Outside the frame
        let outside = Region::Box(BoundingBox::new(200.0, 0.0, 5.0, 5.0));
        assert!(core.admit("face", 0.9, &outside, &frame, 4).is_none());
    }

    #[test]
    fn test_registry_joins_in_order() {
        let b = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let mut registry = DetectorRegistry::new()
            .with(fixed("objects", vec![("screen", 0.9, b)], false))
            .unwrap()
            .with(fixed("text", vec![("on_screen_text", 0.8, b)], false))
            .unwrap();
        registry.begin_run(Arc::new(SensitivityProfile::default()));

        let frame = RgbImage::new(32, 32);
        for parallel in [false, true] {
            let all = registry.detect_all(&frame, 0, parallel).unwrap();
            let labels: Vec<&str> = all.iter().map(|d| d.class_label.as_str()).collect();
            assert_eq!(labels, vec!["screen", "on_screen_text"]);
        }
        assert_eq!(
            registry.class_space(),
            BTreeSet::from(["on_screen_text".to_string(), "screen".to_string()])
        );
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let registry = DetectorRegistry::new().with(fixed("a", vec![], false)).unwrap();
        assert!(registry.with(fixed("a", vec![], false)).is_err());
    }

    #[test]
    fn test_failures_escalate() {
        let mut registry = DetectorRegistry::new().with(fixed("flaky", vec![], true)).unwrap();
        registry.begin_run(Arc::new(SensitivityProfile::default()));
        let frame = RgbImage::new(8, 8);

        assert!(registry.detect_all(&frame, 0, false).unwrap().is_empty());
        let err = registry.detect_all(&frame, 1, false).unwrap_err();
        assert!(matches!(err, MediaError::DetectorUnavailable { .. }));
        assert_eq!(registry.failure_counts()["flaky"], 2);
    }
}
