// src/engine.rs - Facade tying collection, training, storage and recognition together
use crate::collector::{CollectedSample, CollectionHandle, CollectionProgress, CollectorEvent, SampleCollector};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::gestures::GestureLibrary;
use crate::landmarks::LandmarkFrame;
use crate::matcher::SimilarityMatcher;
use crate::model::TrainedModel;
use crate::orchestrator::{Recognition, RecognitionOrchestrator, RecognitionState};
use crate::registry::{ModelRegistry, ModelStore};
use crate::samples::SampleStore;
use crate::trainer::{self, CancelToken, EpochMetrics, Trainer, TrainingGuard, TrainingTask};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Outward notifications. Every method defaults to doing nothing.
pub trait EngineListener {
    fn on_collection_progress(&mut self, _frames: usize, _target: usize) {}
    fn on_collection_finished(&mut self, _sample: &CollectedSample) {}
    fn on_epoch_end(&mut self, _metrics: &EpochMetrics) {}
    fn on_recognition(&mut self, _recognition: &Recognition) {}
}

pub struct NoopListener;

impl EngineListener for NoopListener {}

/// What a single frame did to the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    None,
    Progress(CollectionProgress),
    Collected(CollectedSample),
    Recognized(Recognition),
}

pub struct GestureEngine<S: ModelStore> {
    config: EngineConfig,
    library: GestureLibrary,
    sample_store: Option<SampleStore>,
    collector: SampleCollector,
    matcher: SimilarityMatcher,
    registry: ModelRegistry<S>,
    orchestrator: RecognitionOrchestrator,
    listener: Box<dyn EngineListener>,
    training: Arc<AtomicBool>,
}

impl<S: ModelStore> GestureEngine<S> {
    pub fn new(config: EngineConfig, store: S) -> Result<Self> {
        config.validate()?;
        let registry = ModelRegistry::open(store)?;

        Ok(Self {
            collector: SampleCollector::new(config.collector.clone()),
            matcher: SimilarityMatcher::new(config.matcher.clone()),
            orchestrator: RecognitionOrchestrator::new(config.orchestrator.clone()),
            library: GestureLibrary::new(),
            sample_store: None,
            registry,
            listener: Box::new(NoopListener),
            training: Arc::new(AtomicBool::new(false)),
            config,
        })
    }

    /// Persists collected samples to `store` and replaces the in-memory
    /// library with what it already holds.
    pub fn with_sample_store(mut self, store: SampleStore) -> Result<Self> {
        self.library = store.load_library()?;
        self.sample_store = Some(store);
        Ok(self)
    }

    pub fn with_listener(mut self, listener: impl EngineListener + 'static) -> Self {
        self.listener = Box::new(listener);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn library(&self) -> &GestureLibrary {
        &self.library
    }

    pub fn sample_store(&self) -> Option<&SampleStore> {
        self.sample_store.as_ref()
    }

    pub fn registry(&self) -> &ModelRegistry<S> {
        &self.registry
    }

    pub fn recognition_state(&self) -> RecognitionState {
        self.orchestrator.state()
    }

    pub fn is_collecting(&self) -> bool {
        self.collector.is_collecting()
    }

    pub fn is_training(&self) -> bool {
        self.training.load(Ordering::SeqCst)
    }

    pub fn start_collection(&mut self, label: &str, now_ms: u64) -> Result<CollectionHandle> {
        if self.is_training() {
            return Err(EngineError::Busy("training is in progress"));
        }
        self.collector.start_collection(label, now_ms)
    }

    pub fn cancel_collection(&mut self) -> bool {
        self.collector.cancel_collection()
    }

    /// Feeds one detector frame. While collecting, frames go to the collector
    /// only; otherwise they drive recognition.
    pub fn on_frame(&mut self, frame: LandmarkFrame) -> Result<EngineEvent> {
        frame.validate()?;

        if self.collector.is_collecting() {
            return match self.collector.push_frame(frame)? {
                CollectorEvent::Ignored => Ok(EngineEvent::None),
                CollectorEvent::Progress(progress) => {
                    self.listener
                        .on_collection_progress(progress.frames, progress.target);
                    Ok(EngineEvent::Progress(progress))
                }
                CollectorEvent::Finished(collected) => {
                    self.accept_sample(&collected)?;
                    Ok(EngineEvent::Collected(collected))
                }
            };
        }

        match self.orchestrator.on_frame(&frame, &self.library, &self.matcher) {
            Some(recognition) => {
                self.listener.on_recognition(&recognition);
                Ok(EngineEvent::Recognized(recognition))
            }
            None => Ok(EngineEvent::None),
        }
    }

    /// Advances timers when the stream may have stalled.
    pub fn poll(&mut self, now_ms: u64) -> Result<Option<CollectedSample>> {
        self.orchestrator.tick(now_ms);
        match self.collector.poll(now_ms)? {
            Some(collected) => {
                self.accept_sample(&collected)?;
                Ok(Some(collected))
            }
            None => Ok(None),
        }
    }

    /// Persists first so a failed write leaves the library unchanged.
    fn accept_sample(&mut self, collected: &CollectedSample) -> Result<()> {
        if let Some(store) = &self.sample_store {
            store.save_sample(&collected.label, &collected.sample)?;
        }
        let count = self
            .library
            .add_sample(&collected.label, collected.sample.clone());
        info!("'{}' now has {} sample(s)", collected.label, count);
        self.listener.on_collection_finished(collected);
        Ok(())
    }

    /// Drops a gesture from the library and from disk.
    pub fn reset_gesture(&mut self, name: &str) -> Result<bool> {
        let removed = self.library.remove_gesture(name).is_some();
        if let Some(store) = &self.sample_store {
            store.remove_gesture(name)?;
        }
        Ok(removed)
    }

    fn trainer(&self) -> Trainer {
        Trainer::new(
            self.config.trainer.clone(),
            self.config.collector.sequence_length,
        )
    }

    fn acquire_training(&self) -> Result<TrainingGuard> {
        if self.collector.is_collecting() {
            return Err(EngineError::Busy("sample collection is in progress"));
        }
        TrainingGuard::acquire(&self.training)
    }

    /// Blocking convenience: trains on the calling thread, then saves the
    /// model, makes it active and re-arms recognition with it. A failed run
    /// leaves the registry untouched. Use `spawn_training` to keep frames
    /// flowing while a model trains.
    pub fn train(&mut self, name: &str) -> Result<TrainedModel> {
        self.train_cancellable(name, &CancelToken::new())
    }

    /// Like `train`, stopping between epochs once `cancel` fires.
    pub fn train_cancellable(&mut self, name: &str, cancel: &CancelToken) -> Result<TrainedModel> {
        let guard = self.acquire_training()?;
        let trainer = self.trainer();
        let listener = &mut self.listener;
        let result = trainer.train(&self.library, name, cancel, |metrics| {
            listener.on_epoch_end(metrics)
        });
        drop(guard);

        let mut model = result?;
        model.id = Some(self.register_model(&model)?);
        Ok(model)
    }

    /// Starts training on a blocking worker. Hand the joined model to
    /// `register_model`. Requires a tokio runtime.
    pub fn spawn_training(&self, name: &str) -> Result<TrainingTask> {
        let guard = self.acquire_training()?;
        Ok(trainer::spawn_guarded(
            self.trainer(),
            self.library.clone(),
            name.to_string(),
            guard,
        ))
    }

    /// Saves a model, selects it and arms recognition with it.
    pub fn register_model(&mut self, model: &TrainedModel) -> Result<String> {
        let id = self.registry.save(model)?;
        self.registry.set_active(&id)?;
        self.arm()?;
        Ok(id)
    }

    pub fn set_active_model(&mut self, id: &str) -> Result<()> {
        self.registry.set_active(id)?;
        if self.orchestrator.state() != RecognitionState::Idle {
            self.arm()?;
        }
        Ok(())
    }

    pub fn remove_model(&mut self, id: &str) -> Result<()> {
        self.registry.remove(id)?;
        if self.orchestrator.state() != RecognitionState::Idle {
            self.arm()?;
        }
        Ok(())
    }

    /// Arms recognition with the active model, or matcher-only when the
    /// registry is empty.
    pub fn arm(&mut self) -> Result<()> {
        let model = self.registry.load_active()?;
        if model.is_none() && self.library.is_empty() {
            warn!("Armed with neither a model nor collected gestures");
        }
        self.orchestrator.arm(model.as_ref())
    }

    pub fn disarm(&mut self) {
        self.orchestrator.disarm();
    }

    pub fn request_retrigger(&mut self) {
        self.orchestrator.request_retrigger();
    }
}
