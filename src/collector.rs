// src/collector.rs - Turns a live frame stream into one labeled sample
use crate::config::CollectorConfig;
use crate::error::{EngineError, PartialSampleWarning, Result};
use crate::gestures::GestureSample;
use crate::landmarks::{has_presence, LandmarkFrame};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionHandle {
    pub label: String,
    pub target: usize,
    pub deadline_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionProgress {
    pub frames: usize,
    pub target: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollectedSample {
    pub label: String,
    pub sample: GestureSample,
    /// Buffered frames that had hand or pose landmarks.
    pub presence_frames: usize,
    pub warning: Option<PartialSampleWarning>,
}

impl CollectedSample {
    pub fn is_complete(&self) -> bool {
        self.warning.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CollectorEvent {
    /// No collection in flight.
    Ignored,
    Progress(CollectionProgress),
    Finished(CollectedSample),
}

#[derive(Debug)]
struct ActiveCollection {
    label: String,
    deadline_ms: u64,
    frames: Vec<LandmarkFrame>,
    presence_frames: usize,
}

/// Non re-entrant: at most one collection is buffered at a time. Time is
/// measured in the frame clock (`timestamp_ms`), and `poll` takes a reading
/// from the same clock so a stalled stream still times out.
pub struct SampleCollector {
    config: CollectorConfig,
    active: Option<ActiveCollection>,
}

impl SampleCollector {
    pub fn new(config: CollectorConfig) -> Self {
        Self {
            config,
            active: None,
        }
    }

    pub fn is_collecting(&self) -> bool {
        self.active.is_some()
    }

    pub fn target(&self) -> usize {
        self.config.sequence_length
    }

    /// Live progress of the in-flight collection.
    pub fn progress(&self) -> Option<CollectionProgress> {
        self.active.as_ref().map(|a| CollectionProgress {
            frames: a.frames.len(),
            target: self.config.sequence_length,
        })
    }

    pub fn start_collection(&mut self, label: &str, now_ms: u64) -> Result<CollectionHandle> {
        if label.trim().is_empty() {
            return Err(EngineError::InvalidLabel);
        }
        if let Some(active) = &self.active {
            return Err(EngineError::AlreadyCollecting(active.label.clone()));
        }

        let deadline_ms = now_ms.saturating_add(self.config.timeout_ms);
        self.active = Some(ActiveCollection {
            label: label.to_string(),
            deadline_ms,
            frames: Vec::with_capacity(self.config.sequence_length),
            presence_frames: 0,
        });
        info!(
            "Collecting '{}' ({} frames, timeout {} ms)",
            label, self.config.sequence_length, self.config.timeout_ms
        );

        Ok(CollectionHandle {
            label: label.to_string(),
            target: self.config.sequence_length,
            deadline_ms,
        })
    }

    /// Buffers one frame. Frames without presence are kept; only the count
    /// of present frames changes.
    pub fn push_frame(&mut self, frame: LandmarkFrame) -> Result<CollectorEvent> {
        let Some(active) = self.active.as_mut() else {
            return Ok(CollectorEvent::Ignored);
        };

        if frame.timestamp_ms >= active.deadline_ms {
            return self.finish_on_timeout().map(CollectorEvent::Finished);
        }

        if has_presence(&frame) {
            active.presence_frames += 1;
        }
        active.frames.push(frame);

        let target = self.config.sequence_length;
        if active.frames.len() >= target {
            let Some(active) = self.active.take() else {
                return Ok(CollectorEvent::Ignored);
            };
            info!(
                "Collected complete sample for '{}' ({} frames, {} with presence)",
                active.label,
                active.frames.len(),
                active.presence_frames
            );
            return Ok(CollectorEvent::Finished(CollectedSample {
                label: active.label,
                sample: GestureSample::new(active.frames),
                presence_frames: active.presence_frames,
                warning: None,
            }));
        }

        Ok(CollectorEvent::Progress(CollectionProgress {
            frames: active.frames.len(),
            target,
        }))
    }

    /// Checks the collection deadline against `now_ms`.
    pub fn poll(&mut self, now_ms: u64) -> Result<Option<CollectedSample>> {
        match &self.active {
            Some(active) if now_ms >= active.deadline_ms => self.finish_on_timeout().map(Some),
            _ => Ok(None),
        }
    }

    /// Discards buffered frames. Safe to call when idle.
    pub fn cancel_collection(&mut self) -> bool {
        match self.active.take() {
            Some(active) => {
                info!(
                    "Cancelled collection for '{}' ({} frames discarded)",
                    active.label,
                    active.frames.len()
                );
                true
            }
            None => false,
        }
    }

    fn finish_on_timeout(&mut self) -> Result<CollectedSample> {
        let Some(active) = self.active.take() else {
            return Err(EngineError::NoDetection {
                timeout_ms: self.config.timeout_ms,
            });
        };

        if active.frames.is_empty() {
            warn!("Collection for '{}' timed out with no frames", active.label);
            return Err(EngineError::NoDetection {
                timeout_ms: self.config.timeout_ms,
            });
        }

        let warning = PartialSampleWarning {
            label: active.label.clone(),
            frames: active.frames.len(),
            target: self.config.sequence_length,
        };
        warn!("{}", warning);
        debug!("{} of the partial frames had presence", active.presence_frames);

        Ok(CollectedSample {
            label: active.label,
            sample: GestureSample::new(active.frames),
            presence_frames: active.presence_frames,
            warning: Some(warning),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::test_frames::{empty_frame, frame_with_right, open_hand};

    fn collector(len: usize, timeout_ms: u64) -> SampleCollector {
        SampleCollector::new(CollectorConfig {
            sequence_length: len,
            timeout_ms,
        })
    }

    fn hand_frame(t: u64) -> LandmarkFrame {
        frame_with_right(open_hand((0.5, 0.6), 1.0), t)
    }

    #[test]
    fn test_complete_sample_after_target_frames() {
        let mut c = collector(30, 10_000);
        c.start_collection("hello", 0).unwrap();

        let mut finished = None;
        for i in 0..40u64 {
            match c.push_frame(hand_frame(i * 33)).unwrap() {
                CollectorEvent::Finished(sample) => {
                    finished = Some(sample);
                    break;
                }
                CollectorEvent::Progress(p) => assert_eq!(p.frames, i as usize + 1),
                CollectorEvent::Ignored => panic!("frame ignored during collection"),
            }
        }

        let sample = finished.expect("collection never finished");
        assert!(sample.is_complete());
        assert_eq!(sample.sample.len(), 30);
        assert_eq!(sample.presence_frames, 30);
        assert!(!c.is_collecting());
        assert_eq!(c.push_frame(hand_frame(2000)).unwrap(), CollectorEvent::Ignored);
    }

    #[test]
    fn test_stall_yields_partial_with_warning() {
        let mut c = collector(30, 10_000);
        c.start_collection("thanks", 1_000).unwrap();
        for i in 0..5u64 {
            c.push_frame(hand_frame(1_000 + i * 33)).unwrap();
        }
        assert!(c.poll(5_000).unwrap().is_none());

        let sample = c.poll(11_000).unwrap().expect("timeout should finalize");
        assert_eq!(sample.sample.len(), 5);
        let warning = sample.warning.expect("partial sample must warn");
        assert_eq!(warning.frames, 5);
        assert_eq!(warning.target, 30);
        assert!(!c.is_collecting());
    }

    #[test]
    fn test_timeout_without_frames_is_no_detection() {
        let mut c = collector(30, 100);
        c.start_collection("wave", 0).unwrap();
        assert!(matches!(c.poll(100), Err(EngineError::NoDetection { .. })));
        assert!(!c.is_collecting());
    }

    #[test]
    fn test_late_frame_triggers_timeout() {
        let mut c = collector(30, 100);
        c.start_collection("wave", 0).unwrap();
        c.push_frame(hand_frame(10)).unwrap();
        match c.push_frame(hand_frame(150)).unwrap() {
            CollectorEvent::Finished(sample) => {
                assert_eq!(sample.sample.len(), 1);
                assert!(!sample.is_complete());
            }
            other => panic!("expected finished, got {:?}", other),
        }
    }

    #[test]
    fn test_frames_without_presence_are_buffered() {
        let mut c = collector(3, 1_000);
        c.start_collection("blank", 0).unwrap();
        c.push_frame(empty_frame(1)).unwrap();
        c.push_frame(hand_frame(2)).unwrap();
        match c.push_frame(empty_frame(3)).unwrap() {
            CollectorEvent::Finished(sample) => {
                assert_eq!(sample.sample.len(), 3);
                assert_eq!(sample.presence_frames, 1);
            }
            other => panic!("expected finished, got {:?}", other),
        }
    }

    #[test]
    fn test_start_errors() {
        let mut c = collector(30, 1_000);
        assert!(matches!(c.start_collection("  ", 0), Err(EngineError::InvalidLabel)));
        c.start_collection("a", 0).unwrap();
        assert!(matches!(
            c.start_collection("b", 0),
            Err(EngineError::AlreadyCollecting(label)) if label == "a"
        ));
    }

    #[test]
    fn test_cancel_returns_to_idle() {
        let mut c = collector(30, 1_000);
        assert!(!c.cancel_collection());
        c.start_collection("a", 0).unwrap();
        c.push_frame(hand_frame(1)).unwrap();
        assert_eq!(c.progress(), Some(CollectionProgress { frames: 1, target: 30 }));
        assert!(c.cancel_collection());
        assert!(c.progress().is_none());
        assert!(c.start_collection("a", 5).is_ok());
    }
}
