// src/features.rs - Per-frame feature vectors for the sequence classifier
use crate::landmarks::{Hand, LandmarkFrame, HAND_LANDMARKS};
use nalgebra::DVector;

pub const FEATURES_PER_HAND: usize = HAND_LANDMARKS * 3;

/// Left hand then right hand, x/y/z per landmark.
pub const FRAME_FEATURES: usize = FEATURES_PER_HAND * 2;

/// Flattens both hands into one vector; an absent hand contributes zeros.
pub fn frame_features(frame: &LandmarkFrame) -> DVector<f64> {
    let mut features = DVector::zeros(FRAME_FEATURES);
    for (slot, side) in Hand::BOTH.iter().enumerate() {
        let offset = slot * FEATURES_PER_HAND;
        for (i, p) in frame.hand(*side).iter().take(HAND_LANDMARKS).enumerate() {
            features[offset + i * 3] = p.x;
            features[offset + i * 3 + 1] = p.y;
            features[offset + i * 3 + 2] = p.z;
        }
    }
    features
}

/// Features for exactly `length` frames: zero rows pad a short sequence,
/// extra frames are dropped.
pub fn sequence_features(frames: &[LandmarkFrame], length: usize) -> Vec<DVector<f64>> {
    let mut rows: Vec<DVector<f64>> = frames.iter().take(length).map(frame_features).collect();
    rows.resize(length, DVector::zeros(FRAME_FEATURES));
    rows
}

/// Splits `items` into consecutive non-overlapping chunks of `length`; an
/// incomplete tail is discarded.
pub fn rechunk<T: Clone>(items: &[T], length: usize) -> Vec<Vec<T>> {
    if length == 0 {
        return Vec::new();
    }
    items.chunks_exact(length).map(|c| c.to_vec()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::test_frames::{empty_frame, frame_with_right, open_hand};

    #[test]
    fn test_missing_hand_is_zero() {
        let frame = frame_with_right(open_hand((0.5, 0.5), 1.0), 0);
        let f = frame_features(&frame);
        assert_eq!(f.len(), FRAME_FEATURES);
        assert!(f.iter().take(FEATURES_PER_HAND).all(|v| *v == 0.0));
        assert_eq!(f[FEATURES_PER_HAND], frame.right_hand[0].x);
    }

    #[test]
    fn test_sequence_pads_and_truncates() {
        let frames: Vec<_> = (0..5).map(|t| frame_with_right(open_hand((0.5, 0.5), 1.0), t)).collect();
        let padded = sequence_features(&frames, 8);
        assert_eq!(padded.len(), 8);
        assert!(padded[7].iter().all(|v| *v == 0.0));
        assert_eq!(sequence_features(&frames, 3).len(), 3);
    }

    #[test]
    fn test_rechunk_drops_tail() {
        let items: Vec<u32> = (0..65).collect();
        let chunks = rechunk(&items, 30);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1][0], 30);
        assert!(rechunk(&items[..10], 30).is_empty());
    }

    #[test]
    fn test_rechunk_is_idempotent() {
        let frames: Vec<_> = (0..95).map(empty_frame).collect();
        let first = rechunk(&frames, 30);
        let second = rechunk(&frames, 30);
        assert_eq!(first, second);
        let boundaries: Vec<u64> = first.iter().map(|c| c[0].timestamp_ms).collect();
        assert_eq!(boundaries, vec![0, 30, 60]);
    }
}
