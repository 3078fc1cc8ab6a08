// src/trainer.rs - Fits a normalizer and temporal classifier over collected gestures
use crate::classifier::{Adam, SeededRng, TemporalClassifier};
use crate::config::TrainerConfig;
use crate::error::{EngineError, Result};
use crate::features::{frame_features, rechunk, FRAME_FEATURES};
use crate::gestures::GestureLibrary;
use crate::model::{ModelMetadata, TrainedModel};
use crate::normalizer::NormalizationStats;
use chrono::Utc;
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpochMetrics {
    pub epoch: usize,
    pub loss: f64,
    /// Validation accuracy when a validation split exists, else training.
    pub accuracy: f64,
    pub val_loss: Option<f64>,
    pub val_accuracy: Option<f64>,
}

/// Cooperative cancellation, observed between epochs.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Marks a shared flag busy for as long as it lives.
#[derive(Debug)]
pub struct TrainingGuard(Arc<AtomicBool>);

impl TrainingGuard {
    pub fn acquire(flag: &Arc<AtomicBool>) -> Result<Self> {
        if flag
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(EngineError::Busy("training already in progress"));
        }
        Ok(Self(flag.clone()))
    }
}

impl Drop for TrainingGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

struct Example {
    label: usize,
    rows: Vec<DVector<f64>>,
}

#[derive(Debug, Clone)]
pub struct Trainer {
    config: TrainerConfig,
    sequence_length: usize,
}

impl Trainer {
    pub fn new(config: TrainerConfig, sequence_length: usize) -> Self {
        Self {
            config,
            sequence_length,
        }
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    /// Runs the full training loop. `on_epoch` fires once per completed epoch.
    pub fn train<F>(
        &self,
        library: &GestureLibrary,
        name: &str,
        cancel: &CancelToken,
        mut on_epoch: F,
    ) -> Result<TrainedModel>
    where
        F: FnMut(&EpochMetrics),
    {
        self.config.validate()?;
        if self.sequence_length == 0 {
            return Err(EngineError::Config(
                "sequence length must be positive".to_string(),
            ));
        }
        if library.is_empty() || library.total_samples() == 0 {
            return Err(EngineError::InsufficientData(
                "at least one gesture with one sample is required".to_string(),
            ));
        }

        let (labels, examples) = self.build_examples(library);
        if examples.is_empty() {
            return Err(EngineError::InsufficientData(format!(
                "no gesture has {} collected frames",
                self.sequence_length
            )));
        }

        let normalization = NormalizationStats::fit(examples.iter().flat_map(|e| e.rows.iter()))
            .ok_or_else(|| EngineError::InsufficientData("no frames to normalize".to_string()))?;

        let mut rng = SeededRng::new(self.config.seed);
        let mut model = TemporalClassifier::new(
            FRAME_FEATURES,
            self.config.temporal_segments,
            self.config.hidden_units,
            labels.len(),
            &mut rng,
        );

        let inputs: Vec<(DVector<f64>, usize)> = examples
            .iter()
            .map(|e| {
                let normalized: Vec<_> = e.rows.iter().map(|r| normalization.transform(r)).collect();
                (model.encode(&normalized), e.label)
            })
            .collect();

        let mut order: Vec<usize> = (0..inputs.len()).collect();
        rng.shuffle(&mut order);
        let val_count = ((inputs.len() as f64 * self.config.validation_split).floor() as usize)
            .min(inputs.len() - 1);
        let (val_idx, train_idx) = order.split_at(val_count);
        let mut train_idx = train_idx.to_vec();
        let val_set: Vec<(&DVector<f64>, usize)> =
            val_idx.iter().map(|&i| (&inputs[i].0, inputs[i].1)).collect();

        info!(
            "Training '{}' on {} examples ({} validation) across {} gestures for {} epochs",
            name,
            inputs.len(),
            val_set.len(),
            labels.len(),
            self.config.epochs
        );

        let mut adam = Adam::new(&model, self.config.learning_rate);
        let mut history: Vec<EpochMetrics> = Vec::with_capacity(self.config.epochs);

        for epoch in 0..self.config.epochs {
            if cancel.is_cancelled() {
                info!("Training '{}' cancelled after {} epochs", name, epoch);
                return Err(EngineError::TrainingCancelled {
                    completed_epochs: epoch,
                });
            }

            rng.shuffle(&mut train_idx);
            let mut loss_sum = 0.0;
            let mut correct = 0;
            for batch_idx in train_idx.chunks(self.config.batch_size) {
                let batch: Vec<(&DVector<f64>, usize)> =
                    batch_idx.iter().map(|&i| (&inputs[i].0, inputs[i].1)).collect();
                let (grads, batch_loss, batch_correct) = model.batch_gradients(&batch);
                loss_sum += batch_loss;
                correct += batch_correct;
                adam.update(&mut model, &grads);
            }

            let loss = loss_sum / train_idx.len() as f64;
            if !loss.is_finite() {
                warn!("Training '{}' diverged at epoch {}", name, epoch);
                return Err(EngineError::TrainingDiverged { epoch, loss });
            }
            let train_accuracy = correct as f64 / train_idx.len() as f64;

            let (val_loss, val_accuracy) = if val_set.is_empty() {
                (None, None)
            } else {
                let (sum, hits) = model.evaluate(&val_set);
                let n = val_set.len() as f64;
                (Some(sum / n), Some(hits as f64 / n))
            };

            let metrics = EpochMetrics {
                epoch,
                loss,
                accuracy: val_accuracy.unwrap_or(train_accuracy),
                val_loss,
                val_accuracy,
            };
            debug!(
                "epoch {}/{}: loss {:.4}, accuracy {:.3}",
                epoch + 1,
                self.config.epochs,
                metrics.loss,
                metrics.accuracy
            );
            on_epoch(&metrics);
            history.push(metrics);
        }

        let (final_loss, accuracy) = history
            .last()
            .map(|m| (m.loss, m.accuracy))
            .unwrap_or((0.0, 0.0));
        info!(
            "Trained '{}': loss {:.4}, accuracy {:.3}",
            name, final_loss, accuracy
        );

        Ok(TrainedModel {
            id: None,
            name: name.to_string(),
            gesture_labels: labels,
            sequence_length: self.sequence_length,
            parameters: model.to_weights(),
            normalization,
            metadata: ModelMetadata {
                epochs: history.len(),
                hidden_units: self.config.hidden_units,
                learning_rate: self.config.learning_rate,
                final_loss,
                accuracy,
                training_examples: inputs.len(),
                created_at: Utc::now(),
                history,
            },
        })
    }

    /// Re-chunks each gesture's raw frames into fixed-length examples.
    /// Gestures with fewer than one full chunk contribute no label.
    fn build_examples(&self, library: &GestureLibrary) -> (Vec<String>, Vec<Example>) {
        let mut labels = Vec::new();
        let mut examples = Vec::new();

        for class in library.classes() {
            let rows: Vec<DVector<f64>> = class.raw_frames().map(frame_features).collect();
            let chunks = rechunk(&rows, self.sequence_length);
            if chunks.is_empty() {
                warn!(
                    "Gesture '{}' has {} frames, fewer than one {}-frame chunk; skipped",
                    class.name,
                    rows.len(),
                    self.sequence_length
                );
                continue;
            }

            let label = labels.len();
            labels.push(class.name.clone());
            examples.extend(chunks.into_iter().map(|rows| Example { label, rows }));
        }

        (labels, examples)
    }
}

/// A training run on a blocking worker thread. Epoch metrics stream through
/// `next_epoch` and the model arrives from `join`.
pub struct TrainingTask {
    events: mpsc::UnboundedReceiver<EpochMetrics>,
    cancel: CancelToken,
    handle: JoinHandle<Result<TrainedModel>>,
}

impl TrainingTask {
    /// Next epoch's metrics; `None` once the run has ended.
    pub async fn next_epoch(&mut self) -> Option<EpochMetrics> {
        self.events.recv().await
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub async fn join(self) -> Result<TrainedModel> {
        self.handle
            .await
            .map_err(|e| EngineError::TrainingAborted(e.to_string()))?
    }
}

pub fn spawn_training(trainer: Trainer, library: GestureLibrary, name: String) -> TrainingTask {
    spawn_inner(trainer, library, name, None)
}

pub(crate) fn spawn_guarded(
    trainer: Trainer,
    library: GestureLibrary,
    name: String,
    guard: TrainingGuard,
) -> TrainingTask {
    spawn_inner(trainer, library, name, Some(guard))
}

fn spawn_inner(
    trainer: Trainer,
    library: GestureLibrary,
    name: String,
    guard: Option<TrainingGuard>,
) -> TrainingTask {
    let (tx, rx) = mpsc::unbounded_channel();
    let cancel = CancelToken::new();
    let worker_cancel = cancel.clone();

    let handle = tokio::task::spawn_blocking(move || {
        let _guard = guard;
        trainer.train(&library, &name, &worker_cancel, |metrics| {
            // Receiver may be gone; training continues regardless.
            let _ = tx.send(metrics.clone());
        })
    });

    TrainingTask {
        events: rx,
        cancel,
        handle,
    }
}
