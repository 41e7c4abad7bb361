//! Weight sources: where a block's constants come from, if anywhere.
//!
//! Blocks never branch on "have weights / no weights" themselves. They ask a
//! [`WeightSource`] for each tensor and fall back to the engine's
//! initializer when the answer is `None`.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};

use burn::tensor::TensorData;
use serde::{Deserialize, Serialize};

use super::key::WeightKey;
use crate::error::{HourglassError, Result};

/// Dense row-major `f32` array with its shape.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WeightArray {
    pub shape: Vec<usize>,
    pub values: Vec<f32>,
}

impl WeightArray {
    /// Fails if `values.len()` is not the product of `shape`.
    pub fn new(shape: impl Into<Vec<usize>>, values: Vec<f32>) -> Result<Self> {
        let shape = shape.into();
        let expected = shape.iter().product::<usize>();
        if values.len() != expected {
            return Err(HourglassError::ArrayLength {
                shape,
                expected,
                found: values.len(),
            });
        }
        Ok(Self { shape, values })
    }

    pub fn filled(shape: impl Into<Vec<usize>>, value: f32) -> Self {
        let shape = shape.into();
        let len = shape.iter().product();
        Self {
            shape,
            values: vec![value; len],
        }
    }

    pub fn to_tensor_data(&self) -> TensorData {
        TensorData::new(self.values.clone(), self.shape.clone())
    }
}

/// Provider of constant tensors for graph construction.
pub trait WeightSource {
    /// Resolve `key`. `shape` is the shape the requesting block expects.
    ///
    /// `Ok(None)` means this source carries no weights and the block should
    /// use its default initializer.
    fn fetch(&self, key: &WeightKey, shape: &[usize]) -> Result<Option<TensorData>>;

    /// Keys this source holds that `manifest` never requested.
    fn unused_keys(&self, _manifest: &WeightManifest) -> Vec<String> {
        Vec::new()
    }
}

// ─── Unseeded ─────────────────────────────────────────────────────

/// Source with no weights: every block keeps the engine's default init.
#[derive(Clone, Copy, Debug, Default)]
pub struct Unseeded;

impl WeightSource for Unseeded {
    fn fetch(&self, _key: &WeightKey, _shape: &[usize]) -> Result<Option<TensorData>> {
        Ok(None)
    }
}

// ─── Weight Store ─────────────────────────────────────────────────

/// Immutable flat mapping from rendered weight key to array.
#[derive(Clone, Debug, Default)]
pub struct WeightStore {
    arrays: HashMap<String, WeightArray>,
}

impl WeightStore {
    pub fn from_map(arrays: HashMap<String, WeightArray>) -> Self {
        Self { arrays }
    }

    pub fn len(&self) -> usize {
        self.arrays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arrays.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.arrays.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&WeightArray> {
        self.arrays.get(key)
    }

    /// Look up a composed key, failing if it is absent.
    pub fn lookup(&self, key: &WeightKey) -> Result<&WeightArray> {
        let rendered = key.to_string();
        self.arrays
            .get(&rendered)
            .ok_or(HourglassError::KeyNotFound { key: rendered })
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.arrays.keys().map(String::as_str)
    }
}

impl FromIterator<(String, WeightArray)> for WeightStore {
    fn from_iter<I: IntoIterator<Item = (String, WeightArray)>>(iter: I) -> Self {
        Self {
            arrays: iter.into_iter().collect(),
        }
    }
}

impl WeightSource for WeightStore {
    fn fetch(&self, key: &WeightKey, shape: &[usize]) -> Result<Option<TensorData>> {
        let array = self.lookup(key)?;
        if array.shape != shape {
            return Err(HourglassError::WeightShape {
                key: key.to_string(),
                expected: shape.to_vec(),
                found: array.shape.clone(),
            });
        }
        Ok(Some(array.to_tensor_data()))
    }

    fn unused_keys(&self, manifest: &WeightManifest) -> Vec<String> {
        let requested: HashSet<&str> = manifest.keys().collect();
        let mut unused: Vec<String> = self
            .keys()
            .filter(|k| !requested.contains(k))
            .map(str::to_string)
            .collect();
        unused.sort();
        unused
    }
}

// ─── Manifest ─────────────────────────────────────────────────────

/// One tensor the graph binds, with the shape it expects.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub key: String,
    pub shape: Vec<usize>,
}

/// Every key a graph requests, in construction order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightManifest {
    pub entries: Vec<ManifestEntry>,
}

impl WeightManifest {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.key.as_str())
    }

    pub fn get(&self, key: &str) -> Option<&ManifestEntry> {
        self.entries.iter().find(|e| e.key == key)
    }

    /// Keys requested more than once. Non-empty means two blocks collide.
    pub fn duplicates(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        let mut dups = Vec::new();
        for key in self.keys() {
            if !seen.insert(key) && !dups.contains(&key) {
                dups.push(key);
            }
        }
        dups
    }

    /// Total number of scalar values across all entries.
    pub fn num_values(&self) -> usize {
        self.entries
            .iter()
            .map(|e| e.shape.iter().product::<usize>())
            .sum()
    }

    /// Build a store holding one constant array per entry.
    pub fn synthesize(&self, fill: impl Fn(&ManifestEntry) -> f32) -> WeightStore {
        self.entries
            .iter()
            .map(|e| (e.key.clone(), WeightArray::filled(e.shape.clone(), fill(e))))
            .collect()
    }
}

// ─── Key Recorder ─────────────────────────────────────────────────

/// Records every request while delegating to an inner source.
///
/// With no inner source it answers `None` for everything, which yields the
/// manifest of a default-initialized graph.
pub struct KeyRecorder<'a> {
    inner: Option<&'a dyn WeightSource>,
    entries: RefCell<Vec<ManifestEntry>>,
    resolved: Cell<usize>,
}

impl<'a> KeyRecorder<'a> {
    pub fn new() -> Self {
        Self {
            inner: None,
            entries: RefCell::new(Vec::new()),
            resolved: Cell::new(0),
        }
    }

    pub fn wrap(inner: &'a dyn WeightSource) -> Self {
        Self {
            inner: Some(inner),
            entries: RefCell::new(Vec::new()),
            resolved: Cell::new(0),
        }
    }

    /// Snapshot of the requests seen so far.
    pub fn manifest(&self) -> WeightManifest {
        WeightManifest {
            entries: self.entries.borrow().clone(),
        }
    }

    /// How many requests the inner source answered with a tensor.
    pub fn resolved(&self) -> usize {
        self.resolved.get()
    }

    pub fn into_manifest(self) -> WeightManifest {
        WeightManifest {
            entries: self.entries.into_inner(),
        }
    }
}

impl Default for KeyRecorder<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl WeightSource for KeyRecorder<'_> {
    fn fetch(&self, key: &WeightKey, shape: &[usize]) -> Result<Option<TensorData>> {
        self.entries.borrow_mut().push(ManifestEntry {
            key: key.to_string(),
            shape: shape.to_vec(),
        });
        let found = match self.inner {
            Some(inner) => inner.fetch(key, shape)?,
            None => None,
        };
        if found.is_some() {
            self.resolved.set(self.resolved.get() + 1);
        }
        Ok(found)
    }

    fn unused_keys(&self, manifest: &WeightManifest) -> Vec<String> {
        self.inner
            .map(|inner| inner.unused_keys(manifest))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::weights::{Role, ScopePath};

    fn conv_key(prefix: &str, index: usize) -> WeightKey {
        WeightKey::new(&ScopePath::root().join(prefix), Role::ConvKernel, index)
    }

    #[test]
    fn store_resolves_composed_key() {
        let store: WeightStore = [(
            "3/0/0/1/conv2d_2/kernel".to_string(),
            WeightArray::filled([1, 1, 4, 8], 0.5),
        )]
        .into_iter()
        .collect();

        let found = store.lookup(&conv_key("3/0/0/1", 2)).unwrap();
        assert_eq!(found.shape, vec![1, 1, 4, 8]);
        assert!(store.fetch(&conv_key("3/0/0/1", 2), &[1, 1, 4, 8]).unwrap().is_some());
    }

    #[test]
    fn missing_key_names_the_key() {
        let store = WeightStore::default();
        let err = store.fetch(&conv_key("0", 0), &[7, 7, 3, 128]).unwrap_err();
        assert_eq!(
            err,
            HourglassError::KeyNotFound {
                key: "0/conv2d/kernel".into()
            }
        );
    }

    #[test]
    fn wrong_shape_is_rejected() {
        let store: WeightStore = [("0/conv2d/kernel".to_string(), WeightArray::filled([3, 3, 3, 8], 0.0))]
            .into_iter()
            .collect();
        let err = store.fetch(&conv_key("0", 0), &[7, 7, 3, 8]).unwrap_err();
        assert!(matches!(err, HourglassError::WeightShape { .. }));
    }

    #[test]
    fn array_length_must_match_shape() {
        assert_eq!(WeightArray::new([2, 3], vec![0.0; 6]).unwrap().shape, vec![2, 3]);
        assert_eq!(
            WeightArray::new([2, 3], vec![0.0; 5]).unwrap_err(),
            HourglassError::ArrayLength {
                shape: vec![2, 3],
                expected: 6,
                found: 5,
            }
        );
    }

    #[test]
    fn unseeded_answers_none() {
        assert!(Unseeded.fetch(&conv_key("0", 0), &[1]).unwrap().is_none());
    }

    #[test]
    fn recorder_collects_manifest_and_delegates() {
        let store: WeightStore = [
            ("a/conv2d/kernel".to_string(), WeightArray::filled([2], 1.0)),
            ("b/conv2d/kernel".to_string(), WeightArray::filled([2], 1.0)),
        ]
        .into_iter()
        .collect();
        let recorder = KeyRecorder::wrap(&store);
        assert!(recorder.fetch(&conv_key("a", 0), &[2]).unwrap().is_some());
        assert!(recorder.fetch(&conv_key("a", 0), &[2]).unwrap().is_some());

        let unused = recorder.unused_keys(&recorder.manifest());
        assert_eq!(unused, vec!["b/conv2d/kernel".to_string()]);
        assert_eq!(recorder.resolved(), 2);

        let manifest = recorder.into_manifest();
        assert_eq!(manifest.len(), 2);
        assert_eq!(manifest.duplicates(), vec!["a/conv2d/kernel"]);
    }

    #[test]
    fn synthesize_fills_every_entry() {
        let manifest = WeightManifest {
            entries: vec![
                ManifestEntry {
                    key: "x/conv2d/kernel".into(),
                    shape: vec![3, 3, 2, 4],
                },
                ManifestEntry {
                    key: "x/conv2d/bias".into(),
                    shape: vec![4],
                },
            ],
        };
        let store = manifest.synthesize(|e| if e.key.ends_with("bias") { 1.0 } else { 0.0 });
        assert_eq!(store.len(), 2);
        assert_eq!(store.get("x/conv2d/bias").unwrap().values, vec![1.0; 4]);
        assert_eq!(manifest.num_values(), 72 + 4);
    }
}
