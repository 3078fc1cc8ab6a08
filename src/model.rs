// src/model.rs - Trained gesture models and inference over them
use crate::classifier::{ClassifierWeights, TemporalClassifier};
use crate::error::{EngineError, Result};
use crate::features::{rechunk, sequence_features, FRAME_FEATURES};
use crate::gestures::GestureLibrary;
use crate::landmarks::LandmarkFrame;
use crate::normalizer::NormalizationStats;
use crate::trainer::EpochMetrics;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelMetadata {
    pub epochs: usize,
    pub hidden_units: usize,
    pub learning_rate: f64,
    pub final_loss: f64,
    pub accuracy: f64,
    pub training_examples: usize,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub history: Vec<EpochMetrics>,
}

/// Immutable once trained: retraining produces a new model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainedModel {
    /// Assigned by the registry on first save.
    pub id: Option<String>,
    pub name: String,
    /// Sorted; index `i` is output class `i` of the classifier.
    pub gesture_labels: Vec<String>,
    pub sequence_length: usize,
    pub parameters: ClassifierWeights,
    pub normalization: NormalizationStats,
    pub metadata: ModelMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassMetrics {
    pub label: String,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// Scores of a model against a labelled library.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationReport {
    pub labels: Vec<String>,
    pub examples: usize,
    /// Mean cross-entropy of the true label.
    pub loss: f64,
    pub accuracy: f64,
    /// `confusion[actual][predicted]`, indexed like `labels`.
    pub confusion: Vec<Vec<usize>>,
    pub per_class: Vec<ClassMetrics>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub label: String,
    pub confidence: f64,
}

impl TrainedModel {
    /// Builds a ready-to-run predictor, checking that weights, labels and
    /// normalization agree.
    pub fn runner(&self) -> Result<ModelRunner> {
        let corrupt = |reason: String| EngineError::CorruptModel {
            id: self.id.clone().unwrap_or_else(|| self.name.clone()),
            reason,
        };

        let classifier = TemporalClassifier::from_weights(&self.parameters).map_err(corrupt)?;
        if classifier.classes() != self.gesture_labels.len() {
            return Err(corrupt(format!(
                "{} output classes for {} labels",
                classifier.classes(),
                self.gesture_labels.len()
            )));
        }
        if self.normalization.dim() != FRAME_FEATURES
            || self.normalization.scale.len() != FRAME_FEATURES
            || self.parameters.frame_features != FRAME_FEATURES
        {
            return Err(corrupt(format!(
                "expected {} features per frame",
                FRAME_FEATURES
            )));
        }
        if self.sequence_length == 0 {
            return Err(corrupt("sequence length is zero".to_string()));
        }

        Ok(ModelRunner {
            labels: self.gesture_labels.clone(),
            sequence_length: self.sequence_length,
            normalization: self.normalization.clone(),
            classifier,
        })
    }

    pub fn predict(&self, frames: &[LandmarkFrame]) -> Result<Vec<Prediction>> {
        Ok(self.runner()?.predict(frames))
    }

    /// Runs the model over `library`, cut into `sequence_length` chunks the
    /// same way training cuts it. Gestures the model does not know are
    /// skipped.
    pub fn evaluate(&self, library: &GestureLibrary) -> Result<EvaluationReport> {
        let runner = self.runner()?;
        let classes = self.gesture_labels.len();
        let mut confusion = vec![vec![0usize; classes]; classes];
        let mut loss_sum = 0.0;
        let mut examples = 0;

        for class in library.classes() {
            let Some(actual) = self.gesture_labels.iter().position(|l| *l == class.name) else {
                warn!("Gesture '{}' is not known to model '{}'; skipped", class.name, self.name);
                continue;
            };
            let frames: Vec<LandmarkFrame> = class.raw_frames().cloned().collect();
            for chunk in rechunk(&frames, self.sequence_length) {
                let predictions = runner.predict(&chunk);
                let p_true = predictions
                    .iter()
                    .find(|p| p.label == class.name)
                    .map_or(0.0, |p| p.confidence);
                loss_sum -= p_true.clamp(1e-12, 1.0).ln();

                let predicted = predictions
                    .first()
                    .and_then(|best| self.gesture_labels.iter().position(|l| *l == best.label))
                    .unwrap_or(actual);
                confusion[actual][predicted] += 1;
                examples += 1;
            }
        }

        if examples == 0 {
            return Err(EngineError::InsufficientData(format!(
                "no {}-frame chunk of a gesture known to model '{}'",
                self.sequence_length, self.name
            )));
        }

        let correct: usize = (0..classes).map(|i| confusion[i][i]).sum();
        let per_class = self
            .gesture_labels
            .iter()
            .enumerate()
            .map(|(i, label)| {
                let support: usize = confusion[i].iter().sum();
                let predicted: usize = confusion.iter().map(|row| row[i]).sum();
                let hits = confusion[i][i] as f64;
                let precision = if predicted > 0 { hits / predicted as f64 } else { 0.0 };
                let recall = if support > 0 { hits / support as f64 } else { 0.0 };
                let f1 = if precision + recall > 0.0 {
                    2.0 * precision * recall / (precision + recall)
                } else {
                    0.0
                };
                ClassMetrics {
                    label: label.clone(),
                    precision,
                    recall,
                    f1,
                    support,
                }
            })
            .collect();

        let report = EvaluationReport {
            labels: self.gesture_labels.clone(),
            examples,
            loss: loss_sum / examples as f64,
            accuracy: correct as f64 / examples as f64,
            confusion,
            per_class,
        };
        info!(
            "Evaluated '{}' on {} examples: loss {:.4}, accuracy {:.3}",
            self.name, report.examples, report.loss, report.accuracy
        );
        Ok(report)
    }
}

pub struct ModelRunner {
    labels: Vec<String>,
    sequence_length: usize,
    normalization: NormalizationStats,
    classifier: TemporalClassifier,
}

impl ModelRunner {
    pub fn sequence_length(&self) -> usize {
        self.sequence_length
    }

    /// Class probabilities, best first. The input is padded or truncated to
    /// the model's sequence length.
    pub fn predict(&self, frames: &[LandmarkFrame]) -> Vec<Prediction> {
        let sequence: Vec<_> = sequence_features(frames, self.sequence_length)
            .iter()
            .map(|row| self.normalization.transform(row))
            .collect();
        let probs = self.classifier.predict_proba(&sequence);

        let mut predictions: Vec<Prediction> = self
            .labels
            .iter()
            .zip(probs.iter())
            .map(|(label, p)| Prediction {
                label: label.clone(),
                confidence: *p,
            })
            .collect();
        predictions.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(Ordering::Equal)
        });
        predictions
    }
}
