// src/orchestrator.rs - Live recognition state machine
use crate::config::OrchestratorConfig;
use crate::error::Result;
use crate::gestures::GestureLibrary;
use crate::landmarks::{has_presence, LandmarkFrame};
use crate::matcher::{RepeatGate, SimilarityMatcher};
use crate::model::{ModelRunner, TrainedModel};
use std::collections::VecDeque;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecognitionState {
    Idle,
    Armed,
    Recognizing,
    Cooldown { until_ms: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecognitionSource {
    Model,
    Matcher,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Recognition {
    pub label: String,
    pub score: f64,
    pub source: RecognitionSource,
    pub timestamp_ms: u64,
}

pub struct RecognitionOrchestrator {
    config: OrchestratorConfig,
    state: RecognitionState,
    runner: Option<ModelRunner>,
    model_name: Option<String>,
    /// Most recent presence frames, at most the model's sequence length.
    window: VecDeque<LandmarkFrame>,
    gate: RepeatGate,
}

impl RecognitionOrchestrator {
    pub fn new(config: OrchestratorConfig) -> Self {
        Self {
            config,
            state: RecognitionState::Idle,
            runner: None,
            model_name: None,
            window: VecDeque::new(),
            gate: RepeatGate::new(),
        }
    }

    pub fn state(&self) -> RecognitionState {
        self.state
    }

    pub fn model_name(&self) -> Option<&str> {
        self.model_name.as_deref()
    }

    pub fn last_announced(&self) -> Option<&str> {
        self.gate.last()
    }

    /// Starts listening. With `None` recognition falls back to the
    /// similarity matcher over the gesture library.
    pub fn arm(&mut self, model: Option<&TrainedModel>) -> Result<()> {
        self.runner = model.map(TrainedModel::runner).transpose()?;
        self.model_name = model.map(|m| m.name.clone());
        self.window.clear();
        self.gate.reset();
        self.state = RecognitionState::Armed;

        match &self.model_name {
            Some(name) => info!("Recognition armed with model '{}'", name),
            None => info!("Recognition armed in matcher-only mode"),
        }
        Ok(())
    }

    pub fn disarm(&mut self) {
        self.runner = None;
        self.model_name = None;
        self.window.clear();
        self.state = RecognitionState::Idle;
        debug!("Recognition disarmed");
    }

    /// Ends an expired cooldown.
    pub fn tick(&mut self, now_ms: u64) {
        if let RecognitionState::Cooldown { until_ms } = self.state {
            if now_ms >= until_ms {
                self.state = RecognitionState::Armed;
            }
        }
    }

    /// Lets the next recognition repeat the last announced label.
    pub fn request_retrigger(&mut self) {
        self.gate.request_retrigger();
    }

    /// Evaluates one frame and returns a recognition when one is announced.
    /// Frames arriving during cooldown are still evaluated, so the model
    /// window keeps filling, but never announced.
    pub fn on_frame(
        &mut self,
        frame: &LandmarkFrame,
        library: &GestureLibrary,
        matcher: &SimilarityMatcher,
    ) -> Option<Recognition> {
        if self.state == RecognitionState::Idle {
            return None;
        }
        self.tick(frame.timestamp_ms);

        if !has_presence(frame) {
            return None;
        }

        let (label, score, source) = self.infer(frame, library, matcher)?;
        if self.state != RecognitionState::Armed {
            return None;
        }
        let admitted = self.gate.admit(&label);
        if self.config.suppress_repeats && !admitted {
            return None;
        }

        self.state = RecognitionState::Recognizing;
        info!("Recognized '{}' ({:.2}, {:?})", label, score, source);
        let recognition = Recognition {
            label,
            score,
            source,
            timestamp_ms: frame.timestamp_ms,
        };

        self.state = if self.config.cooldown_ms == 0 {
            RecognitionState::Armed
        } else {
            RecognitionState::Cooldown {
                until_ms: frame.timestamp_ms.saturating_add(self.config.cooldown_ms),
            }
        };
        Some(recognition)
    }

    fn infer(
        &mut self,
        frame: &LandmarkFrame,
        library: &GestureLibrary,
        matcher: &SimilarityMatcher,
    ) -> Option<(String, f64, RecognitionSource)> {
        match &self.runner {
            Some(runner) => {
                self.window.push_back(frame.clone());
                while self.window.len() > runner.sequence_length() {
                    self.window.pop_front();
                }
                if self.window.len() < runner.sequence_length() {
                    return None;
                }
                let top = runner
                    .predict(self.window.make_contiguous())
                    .into_iter()
                    .next()?;
                (top.confidence >= self.config.model_threshold)
                    .then_some((top.label, top.confidence, RecognitionSource::Model))
            }
            None => matcher
                .rank(frame, library)
                .into_iter()
                .next()
                .filter(|top| top.score >= self.config.matcher_threshold)
                .map(|top| (top.label, top.score, RecognitionSource::Matcher)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{SeededRng, TemporalClassifier};
    use crate::config::MatcherConfig;
    use crate::features::FRAME_FEATURES;
    use crate::gestures::GestureSample;
    use crate::landmarks::test_frames::*;
    use crate::model::ModelMetadata;
    use crate::normalizer::NormalizationStats;
    use chrono::Utc;

    fn library_with_open_hand() -> GestureLibrary {
        let mut library = GestureLibrary::new();
        let frames = (0..3)
            .map(|t| frame_with_right(open_hand((0.5, 0.6), 1.0), t))
            .collect();
        library.add_sample("hello", GestureSample::new(frames));
        library
    }

    fn live(t: u64) -> LandmarkFrame {
        frame_with_right(open_hand((0.5, 0.6), 1.0), t)
    }

    fn orchestrator(config: OrchestratorConfig) -> RecognitionOrchestrator {
        let mut orchestrator = RecognitionOrchestrator::new(config);
        orchestrator.arm(None).unwrap();
        orchestrator
    }

    /// A single-class model predicts its only label with probability 1.
    fn single_label_model(sequence_length: usize) -> TrainedModel {
        let mut rng = SeededRng::new(1);
        let classifier = TemporalClassifier::new(FRAME_FEATURES, 2, 4, 1, &mut rng);
        TrainedModel {
            id: None,
            name: "solo".to_string(),
            gesture_labels: vec!["wave".to_string()],
            sequence_length,
            parameters: classifier.to_weights(),
            normalization: NormalizationStats {
                mean: vec![0.0; FRAME_FEATURES],
                scale: vec![1.0; FRAME_FEATURES],
            },
            metadata: ModelMetadata {
                epochs: 1,
                hidden_units: 4,
                learning_rate: 0.001,
                final_loss: 0.0,
                accuracy: 1.0,
                training_examples: 1,
                created_at: Utc::now(),
                history: Vec::new(),
            },
        }
    }

    #[test]
    fn test_cooldown_blocks_then_releases() {
        let library = library_with_open_hand();
        let matcher = SimilarityMatcher::new(MatcherConfig::default());
        let mut orch = orchestrator(OrchestratorConfig {
            cooldown_ms: 1000,
            ..Default::default()
        });

        let first = orch.on_frame(&live(0), &library, &matcher).unwrap();
        assert_eq!(first.label, "hello");
        assert_eq!(first.source, RecognitionSource::Matcher);
        assert_eq!(orch.state(), RecognitionState::Cooldown { until_ms: 1000 });

        assert!(orch.on_frame(&live(500), &library, &matcher).is_none());

        let again = orch.on_frame(&live(1100), &library, &matcher);
        assert_eq!(again.map(|r| r.label), Some("hello".to_string()));
    }

    #[test]
    fn test_tick_returns_to_armed() {
        let library = library_with_open_hand();
        let matcher = SimilarityMatcher::new(MatcherConfig::default());
        let mut orch = orchestrator(OrchestratorConfig::default());

        orch.on_frame(&live(10), &library, &matcher).unwrap();
        orch.tick(500);
        assert!(matches!(orch.state(), RecognitionState::Cooldown { .. }));
        orch.tick(1010);
        assert_eq!(orch.state(), RecognitionState::Armed);
    }

    #[test]
    fn test_idle_and_absent_hands_never_announce() {
        let library = library_with_open_hand();
        let matcher = SimilarityMatcher::new(MatcherConfig::default());

        let mut idle = RecognitionOrchestrator::new(OrchestratorConfig::default());
        assert!(idle.on_frame(&live(0), &library, &matcher).is_none());
        assert_eq!(idle.state(), RecognitionState::Idle);

        let mut orch = orchestrator(OrchestratorConfig::default());
        assert!(orch.on_frame(&empty_frame(0), &library, &matcher).is_none());
        assert_eq!(orch.state(), RecognitionState::Armed);
    }

    #[test]
    fn test_low_score_is_not_announced() {
        let library = library_with_open_hand();
        let matcher = SimilarityMatcher::new(MatcherConfig::default());
        let mut orch = orchestrator(OrchestratorConfig::default());

        // Library only knows the right hand, so a left-only frame scores 0.
        let left_only = LandmarkFrame {
            left_hand: open_hand((0.5, 0.6), 1.0),
            ..Default::default()
        };
        assert!(orch.on_frame(&left_only, &library, &matcher).is_none());
        assert_eq!(orch.state(), RecognitionState::Armed);
    }

    #[test]
    fn test_suppress_repeats_until_retrigger() {
        let library = library_with_open_hand();
        let matcher = SimilarityMatcher::new(MatcherConfig::default());
        let mut orch = orchestrator(OrchestratorConfig {
            cooldown_ms: 100,
            suppress_repeats: true,
            ..Default::default()
        });

        assert!(orch.on_frame(&live(0), &library, &matcher).is_some());
        assert!(orch.on_frame(&live(200), &library, &matcher).is_none());
        assert_eq!(orch.state(), RecognitionState::Armed);

        orch.request_retrigger();
        assert!(orch.on_frame(&live(300), &library, &matcher).is_some());
        assert_eq!(orch.last_announced(), Some("hello"));
    }

    #[test]
    fn test_model_waits_for_full_window() {
        let library = GestureLibrary::new();
        let matcher = SimilarityMatcher::new(MatcherConfig::default());
        let model = single_label_model(3);
        let mut orch = RecognitionOrchestrator::new(OrchestratorConfig::default());
        orch.arm(Some(&model)).unwrap();
        assert_eq!(orch.model_name(), Some("solo"));

        assert!(orch.on_frame(&live(0), &library, &matcher).is_none());
        assert!(orch.on_frame(&empty_frame(10), &library, &matcher).is_none());
        assert!(orch.on_frame(&live(20), &library, &matcher).is_none());

        let hit = orch.on_frame(&live(30), &library, &matcher).unwrap();
        assert_eq!(hit.label, "wave");
        assert_eq!(hit.source, RecognitionSource::Model);
        assert!((hit.score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_disarm_goes_idle() {
        let mut orch = orchestrator(OrchestratorConfig::default());
        orch.disarm();
        assert_eq!(orch.state(), RecognitionState::Idle);
        assert!(orch.model_name().is_none());
    }
}
