// src/landmarks.rs - Landmark frames as delivered by the external detector
use crate::error::{EngineError, Result};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::Path;

pub const HAND_LANDMARKS: usize = 21;
pub const POSE_LANDMARKS: usize = 33;

/// MediaPipe hand landmark indices used by the matcher.
pub mod hand {
    pub const WRIST: usize = 0;
    pub const THUMB_TIP: usize = 4;
    pub const INDEX_MCP: usize = 5;
    pub const INDEX_TIP: usize = 8;
    pub const MIDDLE_MCP: usize = 9;
    pub const MIDDLE_TIP: usize = 12;
    pub const RING_MCP: usize = 13;
    pub const RING_TIP: usize = 16;
    pub const PINKY_MCP: usize = 17;
    pub const PINKY_TIP: usize = 20;
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point3D {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3D {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn to_vector(&self) -> Vector3<f64> {
        Vector3::new(self.x, self.y, self.z)
    }

    fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hand {
    Left,
    Right,
}

impl Hand {
    pub const BOTH: [Hand; 2] = [Hand::Left, Hand::Right];

    pub fn as_str(&self) -> &'static str {
        match self {
            Hand::Left => "left",
            Hand::Right => "right",
        }
    }
}

/// One detector output. Sub-arrays are empty when the detector saw nothing.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LandmarkFrame {
    #[serde(default)]
    pub pose: Vec<Point3D>,
    #[serde(default)]
    pub left_hand: Vec<Point3D>,
    #[serde(default)]
    pub right_hand: Vec<Point3D>,
    #[serde(default)]
    pub face: Vec<Point3D>,
    #[serde(default)]
    pub timestamp_ms: u64,
}

impl LandmarkFrame {
    pub fn hand(&self, hand: Hand) -> &[Point3D] {
        match hand {
            Hand::Left => &self.left_hand,
            Hand::Right => &self.right_hand,
        }
    }

    pub fn has_hands(&self) -> bool {
        !self.left_hand.is_empty() || !self.right_hand.is_empty()
    }

    /// Checks the frame shape once at ingestion so downstream code can index
    /// hands and pose without bounds checks.
    pub fn validate(&self) -> Result<()> {
        for side in Hand::BOTH {
            let points = self.hand(side);
            if !points.is_empty() && points.len() != HAND_LANDMARKS {
                return Err(EngineError::InvalidFrame(format!(
                    "{} hand has {} landmarks, expected {}",
                    side.as_str(),
                    points.len(),
                    HAND_LANDMARKS
                )));
            }
        }

        if !self.pose.is_empty() && self.pose.len() != POSE_LANDMARKS {
            return Err(EngineError::InvalidFrame(format!(
                "pose has {} landmarks, expected {}",
                self.pose.len(),
                POSE_LANDMARKS
            )));
        }

        let all_points = self
            .pose
            .iter()
            .chain(self.left_hand.iter())
            .chain(self.right_hand.iter())
            .chain(self.face.iter());
        if let Some(bad) = all_points.into_iter().find(|p| !p.is_finite()) {
            return Err(EngineError::InvalidFrame(format!(
                "non-finite coordinate ({}, {}, {})",
                bad.x, bad.y, bad.z
            )));
        }

        Ok(())
    }
}

/// True if any hand or pose landmarks are present.
pub fn has_presence(frame: &LandmarkFrame) -> bool {
    frame.has_hands() || !frame.pose.is_empty()
}

/// Pull side of the frame source boundary.
pub trait FrameSource {
    fn next_frame(&mut self) -> Option<LandmarkFrame>;
}

/// Replays a recorded session, in order, once.
pub struct ReplaySource {
    frames: VecDeque<LandmarkFrame>,
}

impl ReplaySource {
    pub fn new(frames: Vec<LandmarkFrame>) -> Self {
        Self {
            frames: frames.into(),
        }
    }

    /// Loads a JSON array of frames.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let frames: Vec<LandmarkFrame> = serde_json::from_str(&content)?;
        Ok(Self::new(frames))
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl FrameSource for ReplaySource {
    fn next_frame(&mut self) -> Option<LandmarkFrame> {
        self.frames.pop_front()
    }
}

#[cfg(test)]
pub(crate) mod test_frames {
    use super::*;

    /// An open hand whose wrist sits at `origin`, scaled by `scale`.
    pub fn open_hand(origin: (f64, f64), scale: f64) -> Vec<Point3D> {
        (0..HAND_LANDMARKS)
            .map(|i| {
                let finger = (i as f64 - 1.0).max(0.0) / 4.0;
                let joint = if i == 0 { 0.0 } else { ((i - 1) % 4 + 1) as f64 };
                Point3D::new(
                    origin.0 + scale * (finger.floor() * 0.04 - 0.08),
                    origin.1 - scale * joint * 0.05,
                    0.0,
                )
            })
            .collect()
    }

    /// A closed fist: every point close to the wrist.
    pub fn fist(origin: (f64, f64), scale: f64) -> Vec<Point3D> {
        (0..HAND_LANDMARKS)
            .map(|i| {
                let angle = i as f64 * 0.3;
                let r = if i == 0 { 0.0 } else { 0.03 * scale };
                Point3D::new(origin.0 + r * angle.cos(), origin.1 + r * angle.sin(), 0.0)
            })
            .collect()
    }

    pub fn frame_with_right(hand: Vec<Point3D>, timestamp_ms: u64) -> LandmarkFrame {
        LandmarkFrame {
            right_hand: hand,
            timestamp_ms,
            ..Default::default()
        }
    }

    pub fn empty_frame(timestamp_ms: u64) -> LandmarkFrame {
        LandmarkFrame {
            timestamp_ms,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_frames::*;
    use super::*;

    #[test]
    fn test_presence() {
        assert!(!has_presence(&empty_frame(0)));
        assert!(has_presence(&frame_with_right(open_hand((0.5, 0.5), 1.0), 0)));

        let pose_only = LandmarkFrame {
            pose: vec![Point3D::default(); POSE_LANDMARKS],
            ..Default::default()
        };
        assert!(has_presence(&pose_only));
        assert!(!pose_only.has_hands());
    }

    #[test]
    fn test_validate_rejects_short_hand() {
        let frame = frame_with_right(vec![Point3D::default(); 5], 0);
        assert!(matches!(frame.validate(), Err(EngineError::InvalidFrame(_))));
    }

    #[test]
    fn test_validate_rejects_nan() {
        let mut hand = open_hand((0.5, 0.5), 1.0);
        hand[3].y = f64::NAN;
        let frame = frame_with_right(hand, 0);
        assert!(frame.validate().is_err());
    }

    #[test]
    fn test_camel_case_with_missing_arrays() {
        let json = r#"{"rightHand": [], "timestampMs": 42}"#;
        let frame: LandmarkFrame = serde_json::from_str(json).unwrap();
        assert_eq!(frame.timestamp_ms, 42);
        assert!(frame.left_hand.is_empty());
        assert!(frame.validate().is_ok());
    }

    #[test]
    fn test_replay_source_in_order() {
        let mut source = ReplaySource::new(vec![empty_frame(1), empty_frame(2)]);
        assert_eq!(source.remaining(), 2);
        assert_eq!(source.next_frame().map(|f| f.timestamp_ms), Some(1));
        assert_eq!(source.next_frame().map(|f| f.timestamp_ms), Some(2));
        assert!(source.next_frame().is_none());
    }
}
