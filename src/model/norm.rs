//! Inference-mode batch normalization.
//!
//! Statistics are frozen constants; nothing is computed from the batch.

use burn::config::Config;
use burn::module::{Module, Param};
use burn::prelude::*;

use crate::error::Result;
use crate::weights::{Role, ScopePath, WeightKey, WeightSource};

#[derive(Config, Debug)]
pub struct NormalizationConfig {
    pub channels: usize,
    /// Added to the variance before the square root.
    #[config(default = 1e-3)]
    pub epsilon: f64,
    /// Whether gamma and beta are learned. When false they are fixed at 1 and 0.
    #[config(default = false)]
    pub affine: bool,
}

/// `y = (x - mean) / sqrt(var + eps) * gamma + beta`, per channel.
#[derive(Module, Debug)]
pub struct NormalizationBlock<B: Backend> {
    mean: Param<Tensor<B, 1>>,
    variance: Param<Tensor<B, 1>>,
    gamma: Option<Param<Tensor<B, 1>>>,
    beta: Option<Param<Tensor<B, 1>>>,
    epsilon: f64,
}

impl NormalizationConfig {
    pub fn init<B: Backend>(
        &self,
        seeds: &dyn WeightSource,
        path: &ScopePath,
        index: usize,
        device: &B::Device,
    ) -> Result<NormalizationBlock<B>> {
        let c = self.channels;
        let fetch = |role: Role, default: f32| -> Result<Param<Tensor<B, 1>>> {
            let tensor = match seeds.fetch(&WeightKey::new(path, role, index), &[c])? {
                Some(data) => Tensor::from_data(data, device),
                None => Tensor::full([c], default, device),
            };
            Ok(Param::from_tensor(tensor))
        };

        let (gamma, beta) = if self.affine {
            (
                Some(fetch(Role::BnGamma, 1.0)?),
                Some(fetch(Role::BnBeta, 0.0)?),
            )
        } else {
            (None, None)
        };

        Ok(NormalizationBlock {
            mean: fetch(Role::BnMovingMean, 0.0)?,
            variance: fetch(Role::BnMovingVariance, 1.0)?,
            gamma,
            beta,
            epsilon: self.epsilon,
        })
    }
}

impl<B: Backend> NormalizationBlock<B> {
    /// `[N, C, H, W]` → `[N, C, H, W]`.
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let channels = self.mean.dims()[0];
        let shape = [1, channels, 1, 1];

        let mean = self.mean.val().reshape(shape);
        let std = self.variance.val().add_scalar(self.epsilon).sqrt().reshape(shape);
        let mut out = (input - mean) / std;

        if let Some(gamma) = &self.gamma {
            out = out * gamma.val().reshape(shape);
        }
        if let Some(beta) = &self.beta {
            out = out + beta.val().reshape(shape);
        }
        out
    }

    pub fn is_affine(&self) -> bool {
        self.gamma.is_some()
    }
}
