//! Inception blocks: four parallel branches concatenated on channels.

use burn::config::Config;
use burn::module::Module;
use burn::prelude::*;
use burn::tensor::activation::relu;
use serde::{Deserialize, Serialize};

use super::conv::{ConvBlock, ConvBlockConfig, Padding};
use super::norm::{NormalizationBlock, NormalizationConfig};
use crate::error::Result;
use crate::weights::{ScopePath, WeightSource};

// ─── Configuration ────────────────────────────────────────────────

/// One multi-scale branch: `[kernel, reduce, out]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitSpec {
    /// Spatial kernel size of the second convolution.
    pub kernel: usize,
    /// Channels after the 1x1 reduction.
    pub reduce: usize,
    /// Channels the branch emits.
    pub out: usize,
}

impl UnitSpec {
    pub const fn from_triple(spec: [usize; 3]) -> Self {
        Self {
            kernel: spec[0],
            reduce: spec[1],
            out: spec[2],
        }
    }
}

/// Branch table of one inception block.
///
/// Concatenation order is fixed: direct branch, then `branches[0..3]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InceptionConfig {
    /// Channels of the direct 1x1 branch.
    pub direct: usize,
    pub branches: [UnitSpec; 3],
}

impl InceptionConfig {
    pub const fn new(direct: usize, branches: [[usize; 3]; 3]) -> Self {
        Self {
            direct,
            branches: [
                UnitSpec::from_triple(branches[0]),
                UnitSpec::from_triple(branches[1]),
                UnitSpec::from_triple(branches[2]),
            ],
        }
    }

    pub fn out_channels(&self) -> usize {
        self.direct + self.branches.iter().map(|b| b.out).sum::<usize>()
    }
}

#[derive(Config, Debug)]
pub struct InceptionUnitConfig {
    pub in_channels: usize,
    pub spec: UnitSpec,
    #[config(default = 1e-3)]
    pub epsilon: f64,
}

#[derive(Config, Debug)]
pub struct InceptionBlockConfig {
    pub in_channels: usize,
    pub branches: InceptionConfig,
    #[config(default = 1e-3)]
    pub epsilon: f64,
}

// ─── Inception Unit ───────────────────────────────────────────────

/// Bottleneck branch: 1x1 reduce → bn → relu → kxk conv → bn → relu.
///
/// Uses conv/bn occurrence indices `index` and `index + 1`.
#[derive(Module, Debug)]
pub struct InceptionUnit<B: Backend> {
    reduce: ConvBlock<B>,
    reduce_norm: NormalizationBlock<B>,
    spatial: ConvBlock<B>,
    spatial_norm: NormalizationBlock<B>,
}

impl InceptionUnitConfig {
    pub fn init<B: Backend>(
        &self,
        seeds: &dyn WeightSource,
        path: &ScopePath,
        index: usize,
        device: &B::Device,
    ) -> Result<InceptionUnit<B>> {
        let UnitSpec {
            kernel,
            reduce,
            out,
        } = self.spec;
        let norm = |channels| NormalizationConfig::new(channels).with_epsilon(self.epsilon);

        Ok(InceptionUnit {
            reduce: ConvBlockConfig::new(self.in_channels, reduce, 1)
                .with_padding(Padding::Valid)
                .init(seeds, path, index, device)?,
            reduce_norm: norm(reduce).init(seeds, path, index, device)?,
            spatial: ConvBlockConfig::new(reduce, out, kernel).init(seeds, path, index + 1, device)?,
            spatial_norm: norm(out).init(seeds, path, index + 1, device)?,
        })
    }
}

impl<B: Backend> InceptionUnit<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = relu(self.reduce_norm.forward(self.reduce.forward(x)));
        relu(self.spatial_norm.forward(self.spatial.forward(x)))
    }

    pub fn out_channels(&self) -> usize {
        self.spatial.out_channels()
    }
}

// ─── Inception Block ──────────────────────────────────────────────

/// Direct 1x1 branch plus three bottleneck branches.
///
/// Occurrence indices: direct 0, branches (1, 2), (3, 4), (5, 6).
#[derive(Module, Debug)]
pub struct InceptionBlock<B: Backend> {
    direct: ConvBlock<B>,
    direct_norm: NormalizationBlock<B>,
    units: Vec<InceptionUnit<B>>,
}

impl InceptionBlockConfig {
    pub fn init<B: Backend>(
        &self,
        seeds: &dyn WeightSource,
        path: &ScopePath,
        device: &B::Device,
    ) -> Result<InceptionBlock<B>> {
        let direct = ConvBlockConfig::new(self.in_channels, self.branches.direct, 1)
            .with_padding(Padding::Valid)
            .init(seeds, path, 0, device)?;
        let direct_norm = NormalizationConfig::new(self.branches.direct)
            .with_epsilon(self.epsilon)
            .init(seeds, path, 0, device)?;

        let units = self
            .branches
            .branches
            .iter()
            .enumerate()
            .map(|(i, spec)| {
                InceptionUnitConfig::new(self.in_channels, *spec)
                    .with_epsilon(self.epsilon)
                    .init(seeds, path, 2 * i + 1, device)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(InceptionBlock {
            direct,
            direct_norm,
            units,
        })
    }
}

impl<B: Backend> InceptionBlock<B> {
    /// `[N, in, H, W]` → `[N, out_channels, H, W]`.
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut outputs = Vec::with_capacity(1 + self.units.len());
        outputs.push(relu(self.direct_norm.forward(self.direct.forward(x.clone()))));
        for unit in &self.units {
            outputs.push(unit.forward(x.clone()));
        }
        Tensor::cat(outputs, 1)
    }

    pub fn out_channels(&self) -> usize {
        self.direct.out_channels()
            + self
                .units
                .iter()
                .map(InceptionUnit::out_channels)
                .sum::<usize>()
    }
}

// ─── Tests ────────────────────────────────────────────────────────
