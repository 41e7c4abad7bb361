//! Path-addressed weight binding.
//!
//! A pretrained weight file is a flat dictionary keyed by strings such as
//! `3/0/0/3/0/1/1/batch_normalization_2/moving_mean`. This module rebuilds
//! those strings from a block's position ([`ScopePath`]), the tensor's
//! [`Role`] and its occurrence index, and resolves them against a
//! [`WeightSource`].

pub mod key;
pub mod path;
pub mod store;

pub use key::{Role, WeightKey};
pub use path::ScopePath;
pub use store::{
    KeyRecorder, ManifestEntry, Unseeded, WeightArray, WeightManifest, WeightSource, WeightStore,
};
