//! Convolution unit with optional pretrained constants.

use burn::config::Config;
use burn::module::{Module, Param};
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::PaddingConfig2d;
use burn::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{HourglassError, Result};
use crate::weights::{Role, ScopePath, WeightKey, WeightSource};

/// Spatial padding mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Padding {
    /// Output keeps the input's spatial size (stride 1 only).
    Same,
    /// No padding; output shrinks by `kernel - 1` before striding.
    Valid,
}

/// Hyper-parameters of one convolution.
#[derive(Config, Debug)]
pub struct ConvBlockConfig {
    pub in_channels: usize,
    pub out_channels: usize,
    pub kernel_size: usize,
    #[config(default = 1)]
    pub stride: usize,
    #[config(default = "Padding::Same")]
    pub padding: Padding,
}

/// 2D convolution with bias.
///
/// Same padding is applied to the input as explicit zeros before a valid
/// convolution, so kernels wider than the feature map are supported.
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    conv: Conv2d<B>,
    /// Zeros added on each spatial border before the convolution.
    border: usize,
    out_channels: usize,
}

impl ConvBlockConfig {
    /// Shape of the kernel as stored in a weight file: `[kh, kw, in, out]`.
    pub fn kernel_shape(&self) -> [usize; 4] {
        [
            self.kernel_size,
            self.kernel_size,
            self.in_channels,
            self.out_channels,
        ]
    }

    /// Build the convolution, seeding kernel and bias from `seeds` under
    /// `path` with occurrence `index`.
    pub fn init<B: Backend>(
        &self,
        seeds: &dyn WeightSource,
        path: &ScopePath,
        index: usize,
        device: &B::Device,
    ) -> Result<ConvBlock<B>> {
        if self.padding == Padding::Same && (self.stride != 1 || self.kernel_size % 2 == 0) {
            return Err(HourglassError::InvalidArchitecture(format!(
                "same padding needs stride 1 and an odd kernel, got stride {} kernel {} at `{}`",
                self.stride, self.kernel_size, path
            )));
        }
        let border = match self.padding {
            Padding::Same => self.kernel_size / 2,
            Padding::Valid => 0,
        };

        let mut conv = Conv2dConfig::new(
            [self.in_channels, self.out_channels],
            [self.kernel_size, self.kernel_size],
        )
        .with_stride([self.stride, self.stride])
        .with_padding(PaddingConfig2d::Valid)
        .with_bias(true)
        .init(device);

        let kernel = seeds.fetch(
            &WeightKey::new(path, Role::ConvKernel, index),
            &self.kernel_shape(),
        )?;
        let bias = seeds.fetch(
            &WeightKey::new(path, Role::ConvBias, index),
            &[self.out_channels],
        )?;

        let seeded = kernel.is_some();
        if let Some(kernel) = kernel {
            // HWIO -> OIHW
            let kernel = Tensor::<B, 4>::from_data(kernel, device).permute([3, 2, 0, 1]);
            conv.weight = Param::from_tensor(kernel);
        }
        if let Some(bias) = bias {
            conv.bias = Some(Param::from_tensor(Tensor::<B, 1>::from_data(bias, device)));
        }
        log::debug!(
            "conv {}x{} {}->{} at `{}` #{} ({})",
            self.kernel_size,
            self.kernel_size,
            self.in_channels,
            self.out_channels,
            path,
            index,
            if seeded { "seeded" } else { "default init" }
        );

        Ok(ConvBlock {
            conv,
            border,
            out_channels: self.out_channels,
        })
    }
}

impl<B: Backend> ConvBlock<B> {
    /// `[N, in, H, W]` → `[N, out, H', W']`.
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        if self.border == 0 {
            return self.conv.forward(input);
        }
        let b = self.border;
        self.conv.forward(input.pad((b, b, b, b), 0.0))
    }

    pub fn out_channels(&self) -> usize {
        self.out_channels
    }
}
