//! Network blocks, from a single convolution up to the full Hourglass.

pub mod conv;
pub mod inception;
pub mod level;
pub mod network;
pub mod norm;
pub mod table;

pub use conv::{ConvBlock, ConvBlockConfig, Padding};
pub use inception::{
    InceptionBlock, InceptionBlockConfig, InceptionConfig, InceptionUnit, InceptionUnitConfig,
    UnitSpec,
};
pub use level::{ChannelLevel, ChannelStack};
pub use network::{inverse_depth, Hourglass, HourglassConfig};
pub use norm::{NormalizationBlock, NormalizationConfig};
pub use table::{pretrained_levels, BranchSpec, LevelSpec, Pool, Stage};
