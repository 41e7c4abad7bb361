//! Recursive multi-scale Hourglass network for monocular depth estimation.
//!
//! The network is assembled from an architecture table and, optionally,
//! seeded from a flat pretrained weight dictionary whose keys encode each
//! tensor's position in the recursion tree.
//!
//! ```ignore
//! use hourglass::{Hourglass, WeightStore};
//! let model = Hourglass::<NdArray>::build(Some(&store), true, &device)?;
//! let inverse_depth = model.infer(image)?; // [H, W], values in (0, 1]
//! ```

pub mod error;
pub mod model;
pub mod weights;

pub use error::{HourglassError, Result};
pub use model::{Hourglass, HourglassConfig};
pub use weights::{KeyRecorder, Unseeded, WeightArray, WeightManifest, WeightSource, WeightStore};
