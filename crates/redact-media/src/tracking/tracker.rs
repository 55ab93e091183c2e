//! IoU tracker with constant-velocity prediction.

use redact_models::{BoundingBox, Detection, Region};
use std::collections::BTreeMap;
use tracing::{debug, trace};

use super::assignment::{assign, Candidate};
use super::{Track, TrackId, TrackState, TrackedRegion, TrackerStep, Velocity};
use crate::config::TrackerConfig;
use crate::error::{MediaError, MediaResult};
use crate::metrics;

/// Maintains object identity across detection frames.
///
/// Owned by one pipeline run and stepped only by it.
#[derive(Debug)]
pub struct Tracker {
    config: TrackerConfig,
    tracks: BTreeMap<TrackId, Track>,
    next_id: u64,
    last_step: Option<u64>,
    created: u64,
}

impl Tracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            tracks: BTreeMap::new(),
            next_id: 1,
            last_step: None,
            created: 0,
        }
    }

    /// Live tracks in id order.
    pub fn tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.values()
    }

    pub fn get(&self, id: TrackId) -> Option<&Track> {
        self.tracks.get(&id)
    }

    /// Tracks created since the last reset.
    pub fn tracks_created(&self) -> u64 {
        self.created
    }

    pub fn last_step(&self) -> Option<u64> {
        self.last_step
    }

    pub fn reset(&mut self) {
        self.tracks.clear();
        self.next_id = 1;
        self.last_step = None;
        self.created = 0;
    }

    /// Advance to detection frame `frame_index`.
    ///
    /// Frame indices must strictly increase between calls. The returned
    /// step also covers every frame skipped since the previous call.
    pub fn step(&mut self, frame_index: u64, detections: &[Detection]) -> MediaResult<TrackerStep> {
        let previous = self.last_step;
        if let Some(p) = previous {
            if frame_index <= p {
                return Err(MediaError::internal(format!(
                    "tracker stepped backwards: frame {frame_index} after {p}"
                )));
            }
        }

        let ids: Vec<TrackId> = self.tracks.keys().copied().collect();
        let predictions: Vec<Region> = ids
            .iter()
            .map(|id| self.tracks[id].predict(frame_index))
            .collect();

        let mut candidates = Vec::new();
        for (ti, id) in ids.iter().enumerate() {
            let track = &self.tracks[id];
            for (di, det) in detections.iter().enumerate() {
                if det.class_label != track.class_label {
                    continue;
                }
                let iou = predictions[ti].iou(&det.region);
                if iou >= self.config.iou_threshold {
                    candidates.push(Candidate {
                        track: ti,
                        detection: di,
                        iou,
                    });
                }
            }
        }
        let pairs = assign(self.config.strategy, ids.len(), detections.len(), &candidates);

        let mut matched_det = vec![None; ids.len()];
        let mut det_taken = vec![false; detections.len()];
        for &(ti, di) in &pairs {
            matched_det[ti] = Some(di);
            det_taken[di] = true;
        }

        // Skipped frames strictly between the previous step and this one.
        let gap: Vec<u64> = match previous {
            Some(p) => (p + 1..frame_index).collect(),
            None => Vec::new(),
        };
        let mut interpolated: BTreeMap<u64, Vec<TrackedRegion>> =
            gap.iter().map(|&t| (t, Vec::new())).collect();

        let grace = self.config.grace_period;
        let mut reaped = Vec::new();
        for (ti, id) in ids.iter().enumerate() {
            let Some(track) = self.tracks.get_mut(id) else {
                continue;
            };
            match matched_det[ti] {
                Some(di) => {
                    let det = &detections[di];
                    let from = track.region.bounding_box();
                    let to = BoundingBox::lerp(
                        &det.bounding_box(),
                        &predictions[ti].bounding_box(),
                        self.config.region_smoothing,
                    );
                    if let Some(p) = previous {
                        let span = (frame_index - p) as f64;
                        for &t in &gap {
                            let b = BoundingBox::lerp(&from, &to, (t - p) as f64 / span);
                            interpolated.entry(t).or_default().push(TrackedRegion {
                                track_id: *id,
                                class_label: track.class_label.clone(),
                                region: det.region.fit_to(&b),
                                state: TrackState::Active,
                            });
                        }
                    }
                    apply_match(track, det, &to, frame_index, self.config.velocity_smoothing);
                }
                None => {
                    for &t in &gap {
                        if t - track.last_matched_frame <= grace {
                            interpolated.entry(t).or_default().push(TrackedRegion {
                                track_id: *id,
                                class_label: track.class_label.clone(),
                                region: track.predict(t),
                                state: TrackState::Lost,
                            });
                        }
                    }
                    track.frames_since_last_match = frame_index - track.last_matched_frame;
                    if track.frames_since_last_match > grace {
                        track.state = TrackState::Reaped;
                        reaped.push(*id);
                    } else {
                        track.state = TrackState::Lost;
                        track.region = predictions[ti].clone();
                    }
                }
            }
            track.age_in_frames = frame_index - track.created_frame;
        }

        for id in &reaped {
            if let Some(track) = self.tracks.remove(id) {
                debug!(
                    track = %track.id,
                    class = %track.class_label,
                    last_matched_frame = track.last_matched_frame,
                    frame_index,
                    "Track reaped"
                );
            }
        }

        for (di, det) in detections.iter().enumerate() {
            if det_taken[di] {
                continue;
            }
            let id = TrackId(self.next_id);
            self.next_id += 1;
            self.created += 1;
            metrics::record_track_created(&det.class_label);
            trace!(track = %id, class = %det.class_label, frame_index, "Track created");
            self.tracks.insert(
                id,
                Track {
                    id,
                    class_label: det.class_label.clone(),
                    source: det.source.clone(),
                    confidence: det.confidence,
                    region: det.region.clone(),
                    velocity: Velocity::default(),
                    last_matched_frame: frame_index,
                    last_matched_region: det.region.clone(),
                    age_in_frames: 0,
                    frames_since_last_match: 0,
                    state: TrackState::New,
                    created_frame: frame_index,
                    velocity_measured: false,
                },
            );
        }

        self.last_step = Some(frame_index);
        let current = self
            .tracks
            .values()
            .map(|track| TrackedRegion {
                track_id: track.id,
                class_label: track.class_label.clone(),
                region: track.region.clone(),
                state: track.state,
            })
            .collect();

        trace!(
            frame_index,
            matched = pairs.len(),
            reaped = reaped.len(),
            live = self.tracks.len(),
            "Tracker step"
        );
        Ok(TrackerStep {
            frame_index,
            current,
            interpolated,
        })
    }

    /// Regions for a frame after the last detection step.
    ///
    /// A track is included while `t - last_matched_frame <= grace_period`.
    pub fn extrapolate(&self, t: u64) -> Vec<TrackedRegion> {
        self.tracks
            .values()
            .filter(|track| {
                t >= track.last_matched_frame
                    && t - track.last_matched_frame <= self.config.grace_period
            })
            .map(|track| TrackedRegion {
                track_id: track.id,
                class_label: track.class_label.clone(),
                region: track.predict(t),
                state: if t == track.last_matched_frame {
                    track.state
                } else {
                    TrackState::Lost
                },
            })
            .collect()
    }
}

/// `shown` is the detection box after region smoothing; velocity is
/// measured between shown boxes so extrapolation continues from them.
fn apply_match(
    track: &mut Track,
    det: &Detection,
    shown: &BoundingBox,
    frame_index: u64,
    smoothing: f64,
) {
    let elapsed = (frame_index - track.last_matched_frame).max(1) as f64;
    let old = track.last_matched_region.bounding_box();
    let new = *shown;
    let measured = Velocity {
        dx: (new.x - old.x) / elapsed,
        dy: (new.y - old.y) / elapsed,
        dw: (new.width - old.width) / elapsed,
        dh: (new.height - old.height) / elapsed,
    };
    track.velocity = if track.velocity_measured {
        track.velocity.blend(&measured, smoothing)
    } else {
        measured
    };
    track.velocity_measured = true;

    let region = if *shown == det.bounding_box() {
        det.region.clone()
    } else {
        det.region.fit_to(shown)
    };
    track.last_matched_region = region.clone();
    track.region = region;
    track.last_matched_frame = frame_index;
    track.frames_since_last_match = 0;
    track.confidence = det.confidence;
    track.source = det.source.clone();
    track.state = TrackState::Active;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::MatchingStrategy;
    use redact_models::DetectorId;

    fn face(frame: u64, x: f64) -> Detection {
        Detection::new(
            "face",
            0.9,
            BoundingBox::new(x, 50.0, 40.0, 40.0),
            frame,
            DetectorId::new("faces"),
        )
    }

    fn tracker(grace: u64) -> Tracker {
        Tracker::new(TrackerConfig {
            grace_period: grace,
            ..Default::default()
        })
    }

    #[test]
    fn test_identity_kept_across_frames() {
        let mut t = tracker(5);
        let s0 = t.step(0, &[face(0, 100.0)]).unwrap();
        assert_eq!(s0.current[0].state, TrackState::New);
        let id = s0.current[0].track_id;

        let s1 = t.step(1, &[face(1, 104.0)]).unwrap();
        assert_eq!(s1.current.len(), 1);
        assert_eq!(s1.current[0].track_id, id);
        assert_eq!(s1.current[0].state, TrackState::Active);
        assert_eq!(t.get(id).unwrap().velocity.dx, 4.0);
        assert_eq!(t.tracks_created(), 1);
    }

    #[test]
    fn test_class_mismatch_spawns_new_track() {
        let mut t = tracker(5);
        t.step(0, &[face(0, 100.0)]).unwrap();
        let plate = Detection::new(
            "license_plate",
            0.9,
            BoundingBox::new(100.0, 50.0, 40.0, 40.0),
            1,
            DetectorId::new("objects"),
        );
        let s = t.step(1, &[plate]).unwrap();
        assert_eq!(s.current.len(), 2);
        assert_eq!(t.tracks_created(), 2);
    }

    #[test]
    fn test_lost_then_reaped_after_grace() {
        let mut t = tracker(2);
        t.step(0, &[face(0, 100.0)]).unwrap();

        let s1 = t.step(1, &[]).unwrap();
        assert_eq!(s1.current[0].state, TrackState::Lost);
        let s2 = t.step(2, &[]).unwrap();
        assert_eq!(s2.current.len(), 1);
        let s3 = t.step(3, &[]).unwrap();
        assert!(s3.current.is_empty());
    }

    #[test]
    fn test_lost_track_moves_with_velocity() {
        let mut t = tracker(5);
        t.step(0, &[face(0, 100.0)]).unwrap();
        t.step(1, &[face(1, 110.0)]).unwrap();
        let s = t.step(2, &[]).unwrap();
        assert_eq!(s.current[0].region.bounding_box().x, 120.0);
    }

    #[test]
    fn test_skipped_frames_interpolated() {
        let mut t = tracker(5);
        t.step(0, &[face(0, 100.0)]).unwrap();
        let s = t.step(4, &[face(4, 108.0)]).unwrap();
        let xs: Vec<f64> = (1..4)
            .map(|f| s.regions_at(f)[0].region.bounding_box().x)
            .collect();
        assert_eq!(xs, vec![102.0, 104.0, 106.0]);
    }

    #[test]
    fn test_new_tracks_not_back_filled() {
        let mut t = tracker(5);
        t.step(0, &[]).unwrap();
        let s = t.step(3, &[face(3, 10.0)]).unwrap();
        assert!(s.regions_at(1).is_empty());
        assert!(s.regions_at(2).is_empty());
        assert_eq!(s.regions_at(3).len(), 1);
    }

    #[test]
    fn test_extrapolate_respects_grace() {
        let mut t = tracker(3);
        t.step(10, &[face(10, 0.0)]).unwrap();
        assert_eq!(t.extrapolate(13).len(), 1);
        assert!(t.extrapolate(14).is_empty());
    }

    #[test]
    fn test_region_smoothing_damps_jitter() {
        let mut t = Tracker::new(TrackerConfig {
            region_smoothing: 0.5,
            ..Default::default()
        });
        let mut xs = Vec::new();
        for (frame, x) in [100.0, 104.0, 100.0, 104.0].into_iter().enumerate() {
            let s = t.step(frame as u64, &[face(frame as u64, x)]).unwrap();
            assert_eq!(s.current.len(), 1);
            xs.push(s.current[0].region.bounding_box().x);
        }
        assert_eq!(xs, vec![100.0, 102.0, 102.0, 103.5]);
        assert!(xs.windows(2).all(|w| (w[1] - w[0]).abs() <= 2.0));
        assert_eq!(t.tracks_created(), 1);
    }

    #[test]
    fn test_no_smoothing_by_default() {
        let mut t = tracker(5);
        t.step(0, &[face(0, 100.0)]).unwrap();
        let s = t.step(1, &[face(1, 104.0)]).unwrap();
        assert_eq!(s.current[0].region.bounding_box().x, 104.0);
    }

    #[test]
    fn test_distant_detection_does_not_teleport_track() {
        let mut t = tracker(5);
        let s0 = t.step(0, &[face(0, 100.0)]).unwrap();
        let original = s0.current[0].track_id;

        // Same class, no overlap with the prediction.
        let s1 = t.step(1, &[face(1, 400.0)]).unwrap();
        assert_eq!(t.tracks_created(), 2);
        assert_eq!(s1.current.len(), 2);

        let kept = s1.current.iter().find(|r| r.track_id == original).unwrap();
        assert_eq!(kept.state, TrackState::Lost);
        assert_eq!(kept.region.bounding_box().x, 100.0);
        let spawned = s1.current.iter().find(|r| r.track_id != original).unwrap();
        assert_eq!(spawned.state, TrackState::New);
        assert_eq!(spawned.region.bounding_box().x, 400.0);
    }

    #[test]
    fn test_backwards_step_rejected() {
        let mut t = tracker(3);
        t.step(5, &[]).unwrap();
        assert!(t.step(5, &[]).is_err());
    }

    #[test]
    fn test_optimal_strategy_matches() {
        let mut t = Tracker::new(TrackerConfig {
            strategy: MatchingStrategy::Optimal,
            ..Default::default()
        });
        t.step(0, &[face(0, 0.0), face(0, 100.0)]).unwrap();
        let s = t.step(1, &[face(1, 102.0), face(1, 2.0)]).unwrap();
        assert_eq!(s.current.len(), 2);
        assert_eq!(t.tracks_created(), 2);
        assert!(s.current.iter().all(|r| r.state == TrackState::Active));
    }
}
