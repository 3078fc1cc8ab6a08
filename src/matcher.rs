// src/matcher.rs - Training-free nearest-exemplar matching
use crate::config::MatcherConfig;
use crate::gestures::{GestureClass, GestureLibrary};
use crate::landmarks::{hand, Hand, LandmarkFrame, Point3D, HAND_LANDMARKS};
use nalgebra::Vector3;
use std::cmp::Ordering;

const FINGERTIPS: [usize; 5] = [
    hand::THUMB_TIP,
    hand::INDEX_TIP,
    hand::MIDDLE_TIP,
    hand::RING_TIP,
    hand::PINKY_TIP,
];

const KNUCKLES: [usize; 4] = [
    hand::INDEX_MCP,
    hand::MIDDLE_MCP,
    hand::RING_MCP,
    hand::PINKY_MCP,
];

#[derive(Debug, Clone, PartialEq)]
pub struct GestureScore {
    pub label: String,
    pub score: f64,
}

pub struct SimilarityMatcher {
    config: MatcherConfig,
}

impl SimilarityMatcher {
    pub fn new(config: MatcherConfig) -> Self {
        Self { config }
    }

    pub fn confidence_threshold(&self) -> f64 {
        self.config.confidence_threshold
    }

    /// Similarity of `live` to one stored frame in [0, 1]; 0 when the two
    /// frames share no hand.
    pub fn score_frame(&self, live: &LandmarkFrame, reference: &LandmarkFrame) -> f64 {
        let mut weighted_sum = 0.0;
        let mut weighted_count = 0.0;

        for side in Hand::BOTH {
            let (Some(live_rel), Some(ref_rel)) = (
                wrist_relative(live.hand(side)),
                wrist_relative(reference.hand(side)),
            ) else {
                continue;
            };

            let live_extent = max_extent(&live_rel);
            let ref_extent = max_extent(&ref_rel);
            if live_extent <= f64::EPSILON || ref_extent <= f64::EPSILON {
                continue;
            }
            let scale = ref_extent / live_extent;

            let key_points = FINGERTIPS
                .iter()
                .map(|&i| (i, self.config.fingertip_weight))
                .chain(KNUCKLES.iter().map(|&i| (i, self.config.knuckle_weight)));

            for (index, weight) in key_points {
                let distance = (live_rel[index] * scale - ref_rel[index]).norm();
                let similarity = (1.0 - 2.0 * distance).max(0.0);
                weighted_sum += similarity * weight;
                weighted_count += weight;
            }
        }

        if weighted_count > 0.0 {
            weighted_sum / weighted_count
        } else {
            0.0
        }
    }

    /// Best exemplar score for one gesture, `None` when it has no usable
    /// sample.
    pub fn score_gesture(&self, live: &LandmarkFrame, class: &GestureClass) -> Option<f64> {
        class
            .samples
            .iter()
            .filter_map(|s| s.middle_frame())
            .filter(|f| f.has_hands())
            .map(|f| self.score_frame(live, f))
            .fold(None, |best: Option<f64>, s| Some(best.map_or(s, |b| b.max(s))))
    }

    /// All scorable gestures, best first. Empty when `live` has no hands.
    pub fn rank(&self, live: &LandmarkFrame, library: &GestureLibrary) -> Vec<GestureScore> {
        if !live.has_hands() {
            return Vec::new();
        }

        let mut ranking: Vec<GestureScore> = library
            .classes()
            .filter_map(|class| {
                self.score_gesture(live, class).map(|score| GestureScore {
                    label: class.name.clone(),
                    score,
                })
            })
            .collect();
        ranking.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        ranking
    }

    /// Top gesture if it clears `threshold` (the configured one when `None`).
    pub fn best_match(
        &self,
        live: &LandmarkFrame,
        library: &GestureLibrary,
        threshold: Option<f64>,
    ) -> Option<GestureScore> {
        let threshold = threshold.unwrap_or(self.config.confidence_threshold);
        self.rank(live, library)
            .into_iter()
            .next()
            .filter(|top| top.score > threshold)
    }
}

fn wrist_relative(points: &[Point3D]) -> Option<Vec<Vector3<f64>>> {
    if points.len() < HAND_LANDMARKS {
        return None;
    }
    let wrist = points[hand::WRIST].to_vector();
    Some(points.iter().map(|p| p.to_vector() - wrist).collect())
}

fn max_extent(points: &[Vector3<f64>]) -> f64 {
    points.iter().map(|p| p.norm()).fold(0.0, f64::max)
}

/// Suppresses announcing the same label twice in a row unless a re-trigger
/// was requested.
#[derive(Debug, Default)]
pub struct RepeatGate {
    last: Option<String>,
    retrigger: bool,
}

impl RepeatGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn admit(&mut self, label: &str) -> bool {
        if self.retrigger || self.last.as_deref() != Some(label) {
            self.last = Some(label.to_string());
            self.retrigger = false;
            true
        } else {
            false
        }
    }

    pub fn request_retrigger(&mut self) {
        self.retrigger = true;
    }

    pub fn last(&self) -> Option<&str> {
        self.last.as_deref()
    }

    pub fn reset(&mut self) {
        self.last = None;
        self.retrigger = false;
    }
}
