//! Hourglass: head convolution, recursive channel stack, tail convolution.
//!
//! Weight paths of the top-level blocks:
//!
//! | path | block                                  |
//! |------|----------------------------------------|
//! | `0/` | 7x7 head conv                          |
//! | `1/` | head normalization (gamma/beta active) |
//! | `2/` | relu, no weights                       |
//! | `3/` | channel stack                          |
//! | `4/` | 3x3 tail conv to one channel           |

use burn::config::Config;
use burn::module::Module;
use burn::prelude::*;
use burn::tensor::activation::relu;
use burn::tensor::ElementConversion;

use super::conv::{ConvBlock, ConvBlockConfig};
use super::level::ChannelStack;
use super::norm::{NormalizationBlock, NormalizationConfig};
use super::table::{pretrained_levels, LevelSpec};
use crate::error::{HourglassError, Result};
use crate::weights::{
    KeyRecorder, ScopePath, Unseeded, WeightManifest, WeightSource, WeightStore,
};

// ─── Configuration ────────────────────────────────────────────────

/// Hourglass configuration. `HourglassConfig::new()` is the pretrained layout.
#[derive(Config, Debug)]
pub struct HourglassConfig {
    /// Scale pixel values by 1/255 before the head.
    #[config(default = false)]
    pub normalize_input: bool,
    #[config(default = 3)]
    pub input_channels: usize,
    #[config(default = 128)]
    pub head_channels: usize,
    #[config(default = 7)]
    pub head_kernel: usize,
    #[config(default = 3)]
    pub tail_kernel: usize,
    /// Normalization epsilon of every bn layer.
    #[config(default = 1e-3)]
    pub epsilon: f64,
    /// Recursion levels, outermost first.
    #[config(default = "pretrained_levels()")]
    pub levels: Vec<LevelSpec>,
}

// ─── Hourglass ────────────────────────────────────────────────────

#[derive(Module, Debug)]
pub struct Hourglass<B: Backend> {
    head: ConvBlock<B>,
    head_norm: NormalizationBlock<B>,
    channels: ChannelStack<B>,
    tail: ConvBlock<B>,
    input_scale: f32,
    input_channels: usize,
}

impl HourglassConfig {
    /// Build the network, binding every tensor through `seeds`.
    ///
    /// Fails on the first unresolved key; no partially seeded network is
    /// returned.
    pub fn init<B: Backend>(
        &self,
        seeds: &dyn WeightSource,
        device: &B::Device,
    ) -> Result<Hourglass<B>> {
        let root = ScopePath::root();
        let recorder = KeyRecorder::wrap(seeds);

        let head = ConvBlockConfig::new(self.input_channels, self.head_channels, self.head_kernel)
            .init(&recorder, &root.child(0), 0, device)?;
        let head_norm = NormalizationConfig::new(self.head_channels)
            .with_epsilon(self.epsilon)
            .with_affine(true)
            .init(&recorder, &root.child(1), 0, device)?;
        let channels = ChannelStack::init(
            &self.levels,
            self.head_channels,
            self.epsilon,
            &recorder,
            &root.child(3),
            device,
        )?;
        let tail = ConvBlockConfig::new(channels.out_channels(), 1, self.tail_kernel)
            .init(&recorder, &root.child(4), 0, device)?;

        let manifest = recorder.manifest();
        let unused = recorder.unused_keys(&manifest);
        if !unused.is_empty() {
            log::warn!(
                "{} weights in the store were never bound, first: `{}`",
                unused.len(),
                unused[0]
            );
        }

        let model = Hourglass {
            head,
            head_norm,
            channels,
            tail,
            input_scale: if self.normalize_input { 1.0 / 255.0 } else { 1.0 },
            input_channels: self.input_channels,
        };
        log::info!(
            "hourglass built: {} levels, {} parameters, {}/{} tensors seeded",
            model.channels.depth(),
            model.num_params(),
            recorder.resolved(),
            manifest.len()
        );
        Ok(model)
    }

    /// Every key the network binds, with its expected shape, in build order.
    pub fn manifest<B: Backend>(&self, device: &B::Device) -> Result<WeightManifest> {
        let recorder = KeyRecorder::new();
        self.init::<B>(&recorder, device)?;
        Ok(recorder.into_manifest())
    }

    /// Input height and width must be multiples of this.
    pub fn spatial_multiple(&self) -> usize {
        1 << self.levels.len()
    }
}

impl<B: Backend> Hourglass<B> {
    /// Pretrained architecture, seeded from `weights` when given.
    pub fn build(
        weights: Option<&WeightStore>,
        normalize_input: bool,
        device: &B::Device,
    ) -> Result<Self> {
        let config = HourglassConfig::new().with_normalize_input(normalize_input);
        match weights {
            Some(store) => config.init(store, device),
            None => config.init(&Unseeded, device),
        }
    }

    /// Raw network output: `[N, C, H, W]` → `[N, 1, H, W]` log-depth.
    pub fn forward(&self, x: Tensor<B, 4>) -> Result<Tensor<B, 4>> {
        let x = if self.input_scale != 1.0 {
            x.mul_scalar(self.input_scale)
        } else {
            x
        };
        let x = relu(self.head_norm.forward(self.head.forward(x)));
        let x = self.channels.forward(x)?;
        Ok(self.tail.forward(x))
    }

    /// Normalized inverse depth of an `[H, W, C]` image, in `(0, 1]`.
    pub fn infer(&self, image: Tensor<B, 3>) -> Result<Tensor<B, 2>> {
        self.infer_batched(image.unsqueeze_dim::<4>(0))
    }

    /// Same as [`infer`](Self::infer) for a `[1, H, W, C]` batch.
    pub fn infer_batched(&self, image: Tensor<B, 4>) -> Result<Tensor<B, 2>> {
        let [n, h, w, c] = image.dims();
        let multiple = 1 << self.channels.depth();
        if n != 1 {
            return Err(HourglassError::InvalidInput(format!(
                "expected a batch of 1, got {}",
                n
            )));
        }
        if c != self.input_channels {
            return Err(HourglassError::InvalidInput(format!(
                "expected {} channels, got {}",
                self.input_channels, c
            )));
        }
        if h == 0 || w == 0 || h % multiple != 0 || w % multiple != 0 {
            return Err(HourglassError::InvalidInput(format!(
                "spatial size {}x{} is not a multiple of {}",
                h, w, multiple
            )));
        }
        log::trace!("infer {}x{}x{}", h, w, c);

        let raw = self.forward(image.permute([0, 3, 1, 2]))?;
        inverse_depth(raw)
    }

    pub fn depth(&self) -> usize {
        self.channels.depth()
    }
}

/// `[1, 1, H, W]` log-depth → `[H, W]` inverse depth scaled to max 1.
///
/// Fails if any value overflows or underflows, so every returned element
/// lies in `(0, 1]`.
pub fn inverse_depth<B: Backend>(raw: Tensor<B, 4>) -> Result<Tensor<B, 2>> {
    let [_, _, h, w] = raw.dims();
    let inverse = raw.reshape([h, w]).exp().recip();
    let max: f32 = inverse.clone().max().into_scalar().elem();
    let min: f32 = inverse.clone().min().into_scalar().elem();
    if !max.is_finite() || min.is_nan() || min <= 0.0 {
        return Err(HourglassError::DegenerateOutput { min, max });
    }
    let normalized = inverse.div_scalar(max);
    // The ratio itself can still underflow.
    if normalized.clone().min().into_scalar().elem::<f32>() <= 0.0 {
        return Err(HourglassError::DegenerateOutput { min, max });
    }
    Ok(normalized)
}

// ─── Tests ────────────────────────────────────────────────────────
