//! Track/detection assignment.

use pathfinding::prelude::{kuhn_munkres, Matrix};
use std::collections::BTreeSet;

use super::MatchingStrategy;

/// IoU is scaled to integers for the solver.
const IOU_SCALE: f64 = 1_000_000.0;

/// An admissible pairing. `track` indexes tracks in ascending id order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(super) struct Candidate {
    pub track: usize,
    pub detection: usize,
    pub iou: f64,
}

/// Pick a one-to-one subset of the candidates.
///
/// Returns `(track, detection)` pairs.
pub(super) fn assign(
    strategy: MatchingStrategy,
    num_tracks: usize,
    num_detections: usize,
    candidates: &[Candidate],
) -> Vec<(usize, usize)> {
    if candidates.is_empty() {
        return Vec::new();
    }
    match strategy {
        MatchingStrategy::Greedy => greedy(num_tracks, num_detections, candidates),
        MatchingStrategy::Optimal => optimal(num_tracks, num_detections, candidates),
    }
}

/// Descending IoU; ties go to the lower track index, then detection index.
fn greedy(num_tracks: usize, num_detections: usize, candidates: &[Candidate]) -> Vec<(usize, usize)> {
    let mut sorted = candidates.to_vec();
    sorted.sort_by(|a, b| {
        b.iou
            .total_cmp(&a.iou)
            .then(a.track.cmp(&b.track))
            .then(a.detection.cmp(&b.detection))
    });

    let mut track_used = vec![false; num_tracks];
    let mut det_used = vec![false; num_detections];
    let mut pairs = Vec::new();
    for c in sorted {
        if track_used[c.track] || det_used[c.detection] {
            continue;
        }
        track_used[c.track] = true;
        det_used[c.detection] = true;
        pairs.push((c.track, c.detection));
    }
    pairs
}

/// Maximum total IoU over admissible pairs.
///
/// The weight matrix is padded square; non-candidate cells weigh zero and
/// candidates get one extra unit so a zero-IoU candidate still beats an
/// inadmissible cell.
fn optimal(num_tracks: usize, num_detections: usize, candidates: &[Candidate]) -> Vec<(usize, usize)> {
    let size = num_tracks.max(num_detections);
    let mut weights = Matrix::new(size, size, 0i64);
    let mut admissible = BTreeSet::new();
    for c in candidates {
        weights[(c.track, c.detection)] = (c.iou * IOU_SCALE).round() as i64 + 1;
        admissible.insert((c.track, c.detection));
    }

    let (_total, columns) = kuhn_munkres(&weights);
    columns
        .into_iter()
        .enumerate()
        .filter(|pair| admissible.contains(pair))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(track: usize, detection: usize, iou: f64) -> Candidate {
        Candidate { track, detection, iou }
    }

    #[test]
    fn test_greedy_takes_best_first() {
        let pairs = assign(
            MatchingStrategy::Greedy,
            2,
            2,
            &[c(0, 0, 0.6), c(0, 1, 0.9), c(1, 1, 0.8)],
        );
        assert_eq!(pairs, vec![(0, 1)]);
    }

    #[test]
    fn test_optimal_maximises_total() {
        let mut pairs = assign(
            MatchingStrategy::Optimal,
            2,
            2,
            &[c(0, 0, 0.6), c(0, 1, 0.9), c(1, 1, 0.8)],
        );
        pairs.sort();
        assert_eq!(pairs, vec![(0, 0), (1, 1)]);
    }

    #[test]
    fn test_optimal_rectangular() {
        let pairs = assign(MatchingStrategy::Optimal, 3, 1, &[c(2, 0, 0.4)]);
        assert_eq!(pairs, vec![(2, 0)]);
        let pairs = assign(MatchingStrategy::Optimal, 1, 3, &[c(0, 2, 0.4)]);
        assert_eq!(pairs, vec![(0, 2)]);
    }

    #[test]
    fn test_greedy_tie_prefers_lower_track() {
        let pairs = assign(MatchingStrategy::Greedy, 2, 1, &[c(1, 0, 0.5), c(0, 0, 0.5)]);
        assert_eq!(pairs, vec![(0, 0)]);
    }
}
