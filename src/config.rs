// src/config.rs
use crate::error::{EngineError, Result};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

static DEFAULT_DATA_DIR: Lazy<PathBuf> = Lazy::new(|| {
    directories::ProjectDirs::from("", "", "sign_trainer")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("./sign_trainer_data"))
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub collector: CollectorConfig,
    pub matcher: MatcherConfig,
    pub trainer: TrainerConfig,
    pub orchestrator: OrchestratorConfig,
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    pub sequence_length: usize,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    pub confidence_threshold: f64,
    pub fingertip_weight: f64,
    pub knuckle_weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub validation_split: f64,
    pub learning_rate: f64,
    pub hidden_units: usize,
    pub temporal_segments: usize,
    pub seed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub model_threshold: f64,
    pub matcher_threshold: f64,
    pub cooldown_ms: u64,
    /// Keep suppressing a repeated label after cooldown until it changes.
    pub suppress_repeats: bool,
}

impl TrainerConfig {
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: &str| Err(EngineError::Config(msg.to_string()));

        if self.epochs == 0 {
            return fail("trainer.epochs must be positive");
        }
        if self.batch_size == 0 {
            return fail("trainer.batch_size must be positive");
        }
        if !(0.0..1.0).contains(&self.validation_split) {
            return fail("trainer.validation_split must be in [0, 1)");
        }
        if !(self.learning_rate > 0.0) {
            return fail("trainer.learning_rate must be positive");
        }
        if self.hidden_units == 0 {
            return fail("trainer.hidden_units must be positive");
        }
        if self.temporal_segments == 0 {
            return fail("trainer.temporal_segments must be positive");
        }
        Ok(())
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            sequence_length: 30,
            timeout_ms: 10_000,
        }
    }
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            fingertip_weight: 1.5,
            knuckle_weight: 1.0,
        }
    }
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            epochs: 50,
            batch_size: 16,
            validation_split: 0.1,
            learning_rate: 0.001,
            hidden_units: 64,
            temporal_segments: 3,
            seed: 42,
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            model_threshold: 0.7,
            matcher_threshold: 0.5,
            cooldown_ms: 1000,
            suppress_repeats: false,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            collector: CollectorConfig::default(),
            matcher: MatcherConfig::default(),
            trainer: TrainerConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            data_dir: DEFAULT_DATA_DIR.clone(),
        }
    }
}

impl EngineConfig {
    /// Reads a JSON config. Missing file means defaults; missing fields fall
    /// back to their defaults as well.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        let config: EngineConfig = serde_json::from_str(&content)
            .map_err(|e| EngineError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let fail = |msg: &str| Err(EngineError::Config(msg.to_string()));

        if self.collector.sequence_length == 0 {
            return fail("collector.sequence_length must be positive");
        }
        self.trainer.validate()
    }

    pub fn samples_dir(&self) -> PathBuf {
        self.data_dir.join("samples")
    }

    /// Root of the model store: `index.json` plus `models/<id>.json`.
    pub fn registry_dir(&self) -> PathBuf {
        self.data_dir.clone()
    }
}
