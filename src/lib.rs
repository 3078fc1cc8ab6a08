//! # sign_trainer
//!
//! Gesture sample collection, training and real-time recognition over hand
//! landmark streams produced by an external detector.
//!
//! This crate provides:
//! - **Sample Collection**: fixed-length labeled recordings with a timeout
//! - **Similarity Matching**: training-free nearest-exemplar recognition
//! - **Sequence Training**: a segment-pooled classifier trained in the background
//! - **Model Registry**: durable models with a cheap index and an active selection
//! - **Recognition**: an armed/cooldown state machine over live frames
//!
//! ## Quick Start
//!
//! ```rust
//! use sign_trainer::{EngineConfig, EngineEvent, GestureEngine, LandmarkFrame, MemoryStore};
//!
//! let mut engine = GestureEngine::new(EngineConfig::default(), MemoryStore::new()).unwrap();
//! engine.start_collection("hello", 0).unwrap();
//!
//! // Frames normally come from a hand tracker.
//! let event = engine.on_frame(LandmarkFrame::default()).unwrap();
//! assert!(matches!(event, EngineEvent::Progress(_)));
//! ```

pub mod classifier;
pub mod collector;
pub mod config;
pub mod engine;
pub mod error;
pub mod features;
pub mod gestures;
pub mod landmarks;
pub mod matcher;
pub mod model;
pub mod normalizer;
pub mod orchestrator;
pub mod registry;
pub mod samples;
pub mod trainer;

pub use collector::{CollectedSample, CollectionHandle, CollectionProgress, SampleCollector};
pub use config::EngineConfig;
pub use engine::{EngineEvent, EngineListener, GestureEngine, NoopListener};
pub use error::{EngineError, PartialSampleWarning, Result};
pub use gestures::{GestureClass, GestureLibrary, GestureSample};
pub use landmarks::{has_presence, FrameSource, Hand, LandmarkFrame, Point3D, ReplaySource};
pub use matcher::{GestureScore, SimilarityMatcher};
pub use model::{ClassMetrics, EvaluationReport, ModelMetadata, Prediction, TrainedModel};
pub use orchestrator::{Recognition, RecognitionOrchestrator, RecognitionSource, RecognitionState};
pub use registry::{FileStore, MemoryStore, ModelRegistry, ModelStore, ModelSummary};
pub use samples::SampleStore;
pub use trainer::{spawn_training, CancelToken, EpochMetrics, Trainer, TrainingTask};
