//! Reconciles the detections all adapters produced for one frame.
//!
//! Same-class detections that overlap beyond the merge threshold are the
//! same object seen twice, possibly by different detectors; one survives.
//! Detections of different classes never merge, so a face inside a screen
//! stays two regions.

use redact_models::{Detection, SensitivityProfile};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::trace;

use crate::config::CombinerConfig;

/// Which of a set of duplicates survives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// Highest confidence; ties go to the smaller region.
    #[default]
    HighestConfidence,
    /// Smallest region; ties go to the higher confidence.
    TightestRegion,
}

impl MergePolicy {
    /// Order two candidates, best first. Remaining ties resolve by detector
    /// id so the outcome does not depend on adapter scheduling.
    fn rank(&self, a: &Detection, b: &Detection) -> Ordering {
        let by_confidence = b.confidence.total_cmp(&a.confidence);
        let by_area = a.area().total_cmp(&b.area());
        let primary = match self {
            MergePolicy::HighestConfidence => by_confidence.then(by_area),
            MergePolicy::TightestRegion => by_area.then(by_confidence),
        };
        primary.then_with(|| a.source.cmp(&b.source))
    }
}

/// Per-frame duplicate suppression.
#[derive(Debug, Clone)]
pub struct DetectionCombiner {
    merge_iou_threshold: f64,
    policy: MergePolicy,
}

impl DetectionCombiner {
    pub fn new(config: &CombinerConfig) -> Self {
        Self {
            merge_iou_threshold: config.merge_iou_threshold,
            policy: config.policy,
        }
    }

    pub fn policy(&self) -> MergePolicy {
        self.policy
    }

    /// Drop sub-threshold detections, then collapse duplicates.
    ///
    /// Survivors keep their input order.
    pub fn combine(&self, detections: Vec<Detection>, profile: &SensitivityProfile) -> Vec<Detection> {
        let candidates: Vec<Detection> = detections
            .into_iter()
            .filter(|d| profile.passes(&d.class_label, d.confidence))
            .collect();
        if candidates.len() < 2 {
            return candidates;
        }

        let mut order: Vec<usize> = (0..candidates.len()).collect();
        order.sort_by(|&i, &j| {
            self.policy
                .rank(&candidates[i], &candidates[j])
                .then(i.cmp(&j))
        });

        let mut keep = vec![false; candidates.len()];
        let mut suppressed = vec![false; candidates.len()];
        for (pos, &i) in order.iter().enumerate() {
            if suppressed[i] {
                continue;
            }
            keep[i] = true;
            let winner = candidates[i].bounding_box();
            for &j in &order[pos + 1..] {
                if suppressed[j] || candidates[j].class_label != candidates[i].class_label {
                    continue;
                }
                if winner.iou(&candidates[j].bounding_box()) > self.merge_iou_threshold {
                    suppressed[j] = true;
                }
            }
        }

        let total = candidates.len();
        let survivors: Vec<Detection> = candidates
            .into_iter()
            .zip(keep)
            .filter_map(|(d, k)| k.then_some(d))
            .collect();
        trace!(total, kept = survivors.len(), "Combined detections");
        survivors
    }
}

impl Default for DetectionCombiner {
    fn default() -> Self {
        Self::new(&CombinerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redact_models::{BoundingBox, DetectorId};

    fn det(label: &str, confidence: f64, b: BoundingBox, source: &str) -> Detection {
        Detection::new(label, confidence, b, 0, DetectorId::new(source))
    }

    #[test]
    fn test_same_class_overlap_merges() {
        let combiner = DetectionCombiner::default();
        let out = combiner.combine(
            vec![
                det("face", 0.7, BoundingBox::new(10.0, 10.0, 50.0, 50.0), "a"),
                det("face", 0.9, BoundingBox::new(12.0, 12.0, 50.0, 50.0), "b"),
            ],
            &SensitivityProfile::default(),
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].source, DetectorId::new("b"));
    }

    #[test]
    fn test_different_classes_never_merge() {
        let combiner = DetectionCombiner::default();
        let b = BoundingBox::new(0.0, 0.0, 100.0, 60.0);
        let out = combiner.combine(
            vec![det("screen", 0.9, b, "objects"), det("on_screen_text", 0.9, b, "ocr")],
            &SensitivityProfile::default(),
        );
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_below_threshold_dropped() {
        let profile = SensitivityProfile::new("p", 0.5)
            .unwrap()
            .with_threshold("id_card", 0.9)
            .unwrap();
        let out = DetectionCombiner::default().combine(
            vec![det("id_card", 0.8, BoundingBox::new(0.0, 0.0, 10.0, 10.0), "a")],
            &profile,
        );
        assert!(out.is_empty());
    }

    #[test]
    fn test_tightest_region_policy() {
        let combiner = DetectionCombiner::new(&CombinerConfig {
            merge_iou_threshold: 0.5,
            policy: MergePolicy::TightestRegion,
        });
        let out = combiner.combine(
            vec![
                det("face", 0.95, BoundingBox::new(0.0, 0.0, 100.0, 100.0), "a"),
                det("face", 0.6, BoundingBox::new(5.0, 5.0, 90.0, 90.0), "b"),
            ],
            &SensitivityProfile::default(),
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].source, DetectorId::new("b"));
    }

    #[test]
    fn test_tie_breaks_on_detector_id() {
        let b = BoundingBox::new(0.0, 0.0, 20.0, 20.0);
        let combiner = DetectionCombiner::default();
        let profile = SensitivityProfile::default();
        let one = combiner.combine(vec![det("face", 0.8, b, "zeta"), det("face", 0.8, b, "alpha")], &profile);
        let two = combiner.combine(vec![det("face", 0.8, b, "alpha"), det("face", 0.8, b, "zeta")], &profile);
        assert_eq!(one[0].source, DetectorId::new("alpha"));
        assert_eq!(two[0].source, DetectorId::new("alpha"));
    }

    #[test]
    fn test_survivors_keep_input_order() {
        let combiner = DetectionCombiner::default();
        let out = combiner.combine(
            vec![
                det("plate", 0.6, BoundingBox::new(200.0, 0.0, 30.0, 10.0), "a"),
                det("face", 0.9, BoundingBox::new(0.0, 0.0, 30.0, 30.0), "a"),
            ],
            &SensitivityProfile::default(),
        );
        let labels: Vec<&str> = out.iter().map(|d| d.class_label.as_str()).collect();
        assert_eq!(labels, vec!["plate", "face"]);
    }
}
