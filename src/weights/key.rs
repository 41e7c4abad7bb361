//! Weight key composition.
//!
//! Keys follow the training framework's flat variable registry: the first
//! layer of a family under a prefix is unqualified (`conv2d/kernel`), the
//! n-th repeat carries a `_n` suffix (`conv2d_2/kernel`). Serialized
//! weight files depend on this exact format.

use std::fmt;

use super::path::ScopePath;

/// Which tensor of a layer a key refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    ConvKernel,
    ConvBias,
    BnMovingMean,
    BnMovingVariance,
    BnGamma,
    BnBeta,
}

impl Role {
    /// Layer family name in the variable registry.
    pub fn family(&self) -> &'static str {
        match self {
            Self::ConvKernel | Self::ConvBias => "conv2d",
            Self::BnMovingMean | Self::BnMovingVariance | Self::BnGamma | Self::BnBeta => {
                "batch_normalization"
            }
        }
    }

    /// Variable name within the layer.
    pub fn variable(&self) -> &'static str {
        match self {
            Self::ConvKernel => "kernel",
            Self::ConvBias => "bias",
            Self::BnMovingMean => "moving_mean",
            Self::BnMovingVariance => "moving_variance",
            Self::BnGamma => "gamma",
            Self::BnBeta => "beta",
        }
    }
}

/// Fully qualified address of one tensor in a weight store.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct WeightKey {
    pub path: ScopePath,
    pub role: Role,
    pub index: usize,
}

impl WeightKey {
    pub fn new(path: &ScopePath, role: Role, index: usize) -> Self {
        Self {
            path: path.clone(),
            role,
            index,
        }
    }
}

impl fmt::Display for WeightKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.path, self.role.family())?;
        if self.index > 0 {
            write!(f, "_{}", self.index)?;
        }
        write!(f, "/{}", self.role.variable())
    }
}
