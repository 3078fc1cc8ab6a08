// src/gestures.rs
use crate::landmarks::LandmarkFrame;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One recorded performance of a gesture. Complete samples hold exactly the
/// configured sequence length; partial ones (collection timed out) hold fewer.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GestureSample {
    pub frames: Vec<LandmarkFrame>,
}

impl GestureSample {
    pub fn new(frames: Vec<LandmarkFrame>) -> Self {
        Self { frames }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Representative frame for single-frame matching.
    pub fn middle_frame(&self) -> Option<&LandmarkFrame> {
        self.frames.get(self.frames.len() / 2)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GestureClass {
    pub name: String,
    pub samples: Vec<GestureSample>,
}

impl GestureClass {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            samples: Vec::new(),
        }
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// All collected frames of this gesture, in collection order.
    pub fn raw_frames(&self) -> impl Iterator<Item = &LandmarkFrame> {
        self.samples.iter().flat_map(|s| s.frames.iter())
    }
}

/// Every gesture collected in the current session, keyed by its exact name.
#[derive(Debug, Clone, Default)]
pub struct GestureLibrary {
    classes: BTreeMap<String, GestureClass>,
}

impl GestureLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a sample, creating the gesture on first use.
    pub fn add_sample(&mut self, name: &str, sample: GestureSample) -> usize {
        let class = self
            .classes
            .entry(name.to_string())
            .or_insert_with(|| GestureClass::new(name));
        class.samples.push(sample);
        class.sample_count()
    }

    pub fn get(&self, name: &str) -> Option<&GestureClass> {
        self.classes.get(name)
    }

    pub fn remove_gesture(&mut self, name: &str) -> Option<GestureClass> {
        self.classes.remove(name)
    }

    pub fn reset(&mut self) {
        self.classes.clear();
    }

    pub fn classes(&self) -> impl Iterator<Item = &GestureClass> {
        self.classes.values()
    }

    pub fn names(&self) -> Vec<String> {
        self.classes.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn total_samples(&self) -> usize {
        self.classes.values().map(|c| c.sample_count()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::test_frames::empty_frame;

    fn sample(len: usize) -> GestureSample {
        GestureSample::new((0..len as u64).map(empty_frame).collect())
    }

    #[test]
    fn test_add_creates_class_once() {
        let mut library = GestureLibrary::new();
        assert_eq!(library.add_sample("hello", sample(3)), 1);
        assert_eq!(library.add_sample("hello", sample(3)), 2);
        assert_eq!(library.add_sample("Hello", sample(3)), 1);

        assert_eq!(library.len(), 2);
        assert_eq!(library.total_samples(), 3);
        assert_eq!(library.names(), vec!["Hello".to_string(), "hello".to_string()]);
    }

    #[test]
    fn test_raw_frames_concatenates_samples() {
        let mut library = GestureLibrary::new();
        library.add_sample("wave", sample(2));
        library.add_sample("wave", sample(3));
        assert_eq!(library.get("wave").unwrap().raw_frames().count(), 5);
    }

    #[test]
    fn test_middle_frame() {
        let s = sample(5);
        assert_eq!(s.middle_frame().map(|f| f.timestamp_ms), Some(2));
        assert!(GestureSample::default().middle_frame().is_none());
    }
}
