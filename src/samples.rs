// src/samples.rs - On-disk sample documents and CSV export
use crate::error::{EngineError, Result};
use crate::gestures::{GestureLibrary, GestureSample};
use crate::landmarks::{Hand, LandmarkFrame};
use chrono::{DateTime, Utc};
use csv::Writer;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SampleDocument {
    id: Uuid,
    gesture_name: String,
    frames: Vec<LandmarkFrame>,
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct LandmarkRecord<'a> {
    sample: usize,
    frame: usize,
    timestamp_ms: u64,
    hand: &'a str,
    landmark: usize,
    x: f64,
    y: f64,
    z: f64,
}

/// One JSON document per collected sample under a single directory.
pub struct SampleStore {
    dir: PathBuf,
}

impl SampleStore {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn save_sample(&self, gesture_name: &str, sample: &GestureSample) -> Result<Uuid> {
        let doc = SampleDocument {
            id: Uuid::new_v4(),
            gesture_name: gesture_name.to_string(),
            frames: sample.frames.clone(),
            timestamp: Utc::now(),
        };
        let path = self.dir.join(format!("{}.json", doc.id));
        let file = File::create(&path)?;
        serde_json::to_writer(file, &doc)?;
        debug!("Saved {}-frame sample for '{}' to {:?}", sample.len(), gesture_name, path);
        Ok(doc.id)
    }

    fn documents(&self) -> Result<Vec<(PathBuf, SampleDocument)>> {
        let mut docs = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let parsed = fs::read(&path)
                .map_err(EngineError::from)
                .and_then(|bytes| serde_json::from_slice(&bytes).map_err(EngineError::from));
            match parsed {
                Ok(doc) => docs.push((path, doc)),
                Err(e) => warn!("Skipping unreadable sample {:?}: {}", path, e),
            }
        }
        Ok(docs)
    }

    /// Rebuilds the library from disk, oldest sample first. Samples holding a
    /// malformed frame are skipped.
    pub fn load_library(&self) -> Result<GestureLibrary> {
        let mut docs = self.documents()?;
        docs.sort_by_key(|(_, doc)| doc.timestamp);

        let mut library = GestureLibrary::new();
        for (path, doc) in docs {
            if let Err(e) = doc.frames.iter().try_for_each(LandmarkFrame::validate) {
                warn!("Skipping invalid sample {:?}: {}", path, e);
                continue;
            }
            library.add_sample(&doc.gesture_name, GestureSample::new(doc.frames));
        }
        info!(
            "Loaded {} samples across {} gestures from {:?}",
            library.total_samples(),
            library.len(),
            self.dir
        );
        Ok(library)
    }

    /// Deletes every stored sample of a gesture. Returns how many were removed.
    pub fn remove_gesture(&self, gesture_name: &str) -> Result<usize> {
        let mut removed = 0;
        for (path, doc) in self.documents()? {
            if doc.gesture_name == gesture_name {
                fs::remove_file(&path)?;
                removed += 1;
            }
        }
        info!("Removed {} stored samples of '{}'", removed, gesture_name);
        Ok(removed)
    }

    /// Writes one row per hand landmark per frame for every stored sample of
    /// the gesture.
    pub fn export_csv(&self, gesture_name: &str, csv_path: impl AsRef<Path>) -> Result<usize> {
        let csv_path = csv_path.as_ref();
        if let Some(parent) = csv_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut docs: Vec<_> = self
            .documents()?
            .into_iter()
            .filter(|(_, doc)| doc.gesture_name == gesture_name)
            .collect();
        docs.sort_by_key(|(_, doc)| doc.timestamp);

        let mut writer = Writer::from_writer(File::create(csv_path)?);
        let mut rows = 0;
        for (sample_index, (_, doc)) in docs.iter().enumerate() {
            for (frame_index, frame) in doc.frames.iter().enumerate() {
                for side in Hand::BOTH {
                    for (landmark, point) in frame.hand(side).iter().enumerate() {
                        writer.serialize(LandmarkRecord {
                            sample: sample_index,
                            frame: frame_index,
                            timestamp_ms: frame.timestamp_ms,
                            hand: side.as_str(),
                            landmark,
                            x: point.x,
                            y: point.y,
                            z: point.z,
                        })?;
                        rows += 1;
                    }
                }
            }
        }
        writer.flush()?;

        info!("Exported {} rows for '{}' to {:?}", rows, gesture_name, csv_path);
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::test_frames::{empty_frame, frame_with_right, open_hand};
    use crate::landmarks::HAND_LANDMARKS;

    struct TempDir(PathBuf);

    impl TempDir {
        fn new() -> Self {
            Self(std::env::temp_dir().join(format!("sign_trainer_samples_{}", Uuid::new_v4())))
        }
    }

    impl Drop for TempDir {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.0);
        }
    }

    fn sample(frames: usize) -> GestureSample {
        GestureSample::new(
            (0..frames as u64)
                .map(|t| frame_with_right(open_hand((0.5, 0.5), 1.0), t * 33))
                .collect(),
        )
    }

    #[test]
    fn test_save_and_reload_library() {
        let tmp = TempDir::new();
        let store = SampleStore::new(&tmp.0).unwrap();
        store.save_sample("hello", &sample(4)).unwrap();
        store.save_sample("hello", &sample(2)).unwrap();
        store.save_sample("thanks", &sample(3)).unwrap();

        let library = store.load_library().unwrap();
        assert_eq!(library.names(), vec!["hello", "thanks"]);
        assert_eq!(library.total_samples(), 3);
        let hello = library.get("hello").unwrap();
        assert_eq!(hello.samples[0].len() + hello.samples[1].len(), 6);
    }

    #[test]
    fn test_unreadable_files_are_skipped() {
        let tmp = TempDir::new();
        let store = SampleStore::new(&tmp.0).unwrap();
        store.save_sample("hello", &sample(2)).unwrap();
        fs::write(tmp.0.join("broken.json"), "{oops").unwrap();

        let library = store.load_library().unwrap();
        assert_eq!(library.total_samples(), 1);
    }

    #[test]
    fn test_saved_sample_is_named_by_its_id() {
        let tmp = TempDir::new();
        let store = SampleStore::new(&tmp.0).unwrap();
        let id = store.save_sample("hello", &sample(2)).unwrap();
        assert!(tmp.0.join(format!("{}.json", id)).exists());
    }

    #[test]
    fn test_malformed_frames_are_skipped_on_load() {
        let tmp = TempDir::new();
        let store = SampleStore::new(&tmp.0).unwrap();
        store.save_sample("hello", &sample(2)).unwrap();

        let mut bad = frame_with_right(open_hand((0.5, 0.5), 1.0), 0);
        bad.right_hand.truncate(5);
        let doc = SampleDocument {
            id: Uuid::new_v4(),
            gesture_name: "thanks".to_string(),
            frames: vec![bad],
            timestamp: Utc::now(),
        };
        fs::write(
            tmp.0.join(format!("{}.json", doc.id)),
            serde_json::to_vec(&doc).unwrap(),
        )
        .unwrap();

        let library = store.load_library().unwrap();
        assert_eq!(library.names(), vec!["hello"]);
        assert_eq!(library.total_samples(), 1);
    }

    #[test]
    fn test_remove_gesture_only_touches_that_gesture() {
        let tmp = TempDir::new();
        let store = SampleStore::new(&tmp.0).unwrap();
        store.save_sample("hello", &sample(2)).unwrap();
        store.save_sample("hello", &sample(2)).unwrap();
        store.save_sample("thanks", &sample(2)).unwrap();

        assert_eq!(store.remove_gesture("hello").unwrap(), 2);
        assert_eq!(store.load_library().unwrap().names(), vec!["thanks"]);
    }

    #[test]
    fn test_export_csv_rows() {
        let tmp = TempDir::new();
        let store = SampleStore::new(&tmp.0).unwrap();
        let mut s = sample(2);
        s.frames.push(empty_frame(99));
        store.save_sample("hello", &s).unwrap();

        let out = tmp.0.join("export").join("hello.csv");
        let rows = store.export_csv("hello", &out).unwrap();
        assert_eq!(rows, 2 * HAND_LANDMARKS);

        let mut reader = csv::Reader::from_path(&out).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(
            headers.iter().collect::<Vec<_>>(),
            vec!["sample", "frame", "timestamp_ms", "hand", "landmark", "x", "y", "z"]
        );
        assert_eq!(reader.records().count(), rows);
    }
}
