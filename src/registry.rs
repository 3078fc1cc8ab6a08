// src/registry.rs - Durable storage and selection of trained models
use crate::error::{EngineError, Result};
use crate::model::TrainedModel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const INDEX_KEY: &str = "index.json";

/// Model ids double as store keys: ASCII letters, digits, `_` and `-`.
pub fn is_valid_model_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Key-value persistence boundary. Keys are relative, `/`-separated names.
pub trait ModelStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    fn put(&mut self, key: &str, bytes: &[u8]) -> Result<()>;
    fn delete(&mut self, key: &str) -> Result<()>;
}

/// Keeps everything in memory; lost on drop.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: HashMap<String, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ModelStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.get(key).cloned())
    }

    fn put(&mut self, key: &str, bytes: &[u8]) -> Result<()> {
        self.entries.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// One file per key under a root directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps a key below the root. Empty, `.`, `..` and rooted segments are
    /// rejected so no key can leave the store directory.
    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let mut path = self.root.clone();
        for part in key.split('/') {
            let plain = !part.is_empty()
                && part != "."
                && part != ".."
                && !part.contains(['\\', ':'])
                && Path::new(part).is_relative();
            if !plain {
                return Err(io::Error::new(
                    ErrorKind::InvalidInput,
                    format!("invalid store key '{}'", key),
                )
                .into());
            }
            path.push(part);
        }
        Ok(path)
    }
}

impl ModelStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match fs::read(self.path_for(key)?) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn put(&mut self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        // Readers never see a half-written document.
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        match fs::remove_file(self.path_for(key)?) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Cheap listing record kept apart from the weight blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelSummary {
    pub id: String,
    pub name: String,
    pub gesture_labels: Vec<String>,
    pub accuracy: f64,
    pub epochs: usize,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegistryIndex {
    #[serde(default)]
    active_model_id: Option<String>,
    /// Insertion order.
    #[serde(default)]
    models: Vec<ModelSummary>,
}

pub struct ModelRegistry<S: ModelStore> {
    store: S,
    index: RegistryIndex,
}

impl<S: ModelStore> ModelRegistry<S> {
    /// Opens the registry, reading the index if the store has one.
    pub fn open(store: S) -> Result<Self> {
        let index = match store.get(INDEX_KEY)? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| EngineError::CorruptIndex(e.to_string()))?,
            None => RegistryIndex::default(),
        };
        debug!("Model registry opened with {} model(s)", index.models.len());
        Ok(Self { store, index })
    }

    fn blob_key(id: &str) -> String {
        format!("models/{}.json", id)
    }

    /// Writes `index` and adopts it only once the write succeeded.
    fn commit_index(&mut self, index: RegistryIndex) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(&index)?;
        self.store.put(INDEX_KEY, &bytes)?;
        self.index = index;
        Ok(())
    }

    /// Persists the model and returns its id, assigning one if absent.
    /// Saving an id that already exists replaces it in place.
    pub fn save(&mut self, model: &TrainedModel) -> Result<String> {
        let id = match model.id.as_deref() {
            Some(id) if is_valid_model_id(id) => id.to_string(),
            Some(id) => return Err(EngineError::InvalidModelId(id.to_string())),
            None => format!("model_{}", uuid::Uuid::new_v4().simple()),
        };

        let mut stored = model.clone();
        stored.id = Some(id.clone());
        let blob = serde_json::to_vec(&stored)?;
        self.store.put(&Self::blob_key(&id), &blob)?;

        let summary = ModelSummary {
            id: id.clone(),
            name: stored.name.clone(),
            gesture_labels: stored.gesture_labels.clone(),
            accuracy: stored.metadata.accuracy,
            epochs: stored.metadata.epochs,
            created_at: stored.metadata.created_at,
        };
        let mut index = self.index.clone();
        match index.models.iter_mut().find(|m| m.id == id) {
            Some(existing) => *existing = summary,
            None => index.models.push(summary),
        }
        self.commit_index(index)?;

        info!(
            "Saved model '{}' as {} ({} gestures)",
            stored.name,
            id,
            stored.gesture_labels.len()
        );
        Ok(id)
    }

    /// Summaries in insertion order.
    pub fn list(&self) -> &[ModelSummary] {
        &self.index.models
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.models.iter().any(|m| m.id == id)
    }

    pub fn load(&self, id: &str) -> Result<TrainedModel> {
        if !is_valid_model_id(id) {
            return Err(EngineError::ModelNotFound(id.to_string()));
        }
        let bytes = self
            .store
            .get(&Self::blob_key(id))?
            .ok_or_else(|| EngineError::ModelNotFound(id.to_string()))?;

        let model: TrainedModel =
            serde_json::from_slice(&bytes).map_err(|e| EngineError::CorruptModel {
                id: id.to_string(),
                reason: e.to_string(),
            })?;
        // Weight shapes are checked here so corruption surfaces at load time.
        model.runner()?;
        debug!("Loaded model {}", id);
        Ok(model)
    }

    pub fn set_active(&mut self, id: &str) -> Result<()> {
        if !self.contains(id) {
            return Err(EngineError::ModelNotFound(id.to_string()));
        }
        let mut index = self.index.clone();
        index.active_model_id = Some(id.to_string());
        self.commit_index(index)?;
        info!("Active model set to {}", id);
        Ok(())
    }

    /// Explicitly selected model, else the most recently saved one.
    pub fn get_active(&self) -> Option<&ModelSummary> {
        self.index
            .active_model_id
            .as_deref()
            .and_then(|id| self.index.models.iter().find(|m| m.id == id))
            .or_else(|| self.index.models.last())
    }

    pub fn load_active(&self) -> Result<Option<TrainedModel>> {
        match self.get_active() {
            Some(summary) => self.load(&summary.id).map(Some),
            None => Ok(None),
        }
    }

    /// Deletes a model. Removing the selected model clears the selection.
    pub fn remove(&mut self, id: &str) -> Result<()> {
        if !self.contains(id) {
            return Err(EngineError::ModelNotFound(id.to_string()));
        }
        let mut index = self.index.clone();
        index.models.retain(|m| m.id != id);
        if index.active_model_id.as_deref() == Some(id) {
            warn!("Removed the active model {}, falling back to most recent", id);
            index.active_model_id = None;
        }
        self.commit_index(index)?;
        self.store.delete(&Self::blob_key(id))?;
        info!("Removed model {}", id);
        Ok(())
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}
