use thiserror::Error;

/// Errors raised while assembling the network or running inference.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HourglassError {
    #[error("weight `{key}` not found in store")]
    KeyNotFound { key: String },

    #[error("weight `{key}` has shape {found:?}, expected {expected:?}")]
    WeightShape {
        key: String,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    #[error("array of shape {shape:?} needs {expected} values, got {found}")]
    ArrayLength {
        shape: Vec<usize>,
        expected: usize,
        found: usize,
    },

    #[error("level at `{path}` merges {shallow} shallow channels with {deep} deep channels")]
    ChannelMismatch {
        path: String,
        shallow: usize,
        deep: usize,
    },

    #[error("cannot add tensors of shape {left:?} and {right:?} at `{path}`")]
    ShapeMismatch {
        path: String,
        left: Vec<usize>,
        right: Vec<usize>,
    },

    #[error("invalid architecture: {0}")]
    InvalidArchitecture(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("inverse depth spans [{min}, {max}], cannot normalize into (0, 1]")]
    DegenerateOutput { min: f32, max: f32 },
}

pub type Result<T, E = HourglassError> = std::result::Result<T, E>;
