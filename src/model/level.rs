//! Recursive multi-resolution levels.
//!
//! A level runs two pipelines on the same input and adds their outputs:
//! a shallow one at the input resolution, and a deep one that downsamples,
//! runs its stages (one of which may be the next-deeper level) and
//! upsamples back. All levels share one type; their differences live in
//! [`LevelSpec`] tables.

use std::collections::HashSet;

use burn::module::Module;
use burn::nn::pool::{AvgPool2d, AvgPool2dConfig, MaxPool2d, MaxPool2dConfig};
use burn::prelude::*;

use super::inception::{InceptionBlock, InceptionBlockConfig};
use super::table::{BranchSpec, LevelSpec, Pool, Stage};
use crate::error::{HourglassError, Result};
use crate::weights::{ScopePath, WeightSource};

/// One recursion level, without the levels it nests.
#[derive(Module, Debug)]
pub struct ChannelLevel<B: Backend> {
    shallow: Vec<InceptionBlock<B>>,
    /// Deep stages before the nested level; all deep stages at the base case.
    deep_head: Vec<InceptionBlock<B>>,
    /// Deep stages after the nested level.
    deep_tail: Vec<InceptionBlock<B>>,
    avg_pool: Option<AvgPool2d>,
    max_pool: Option<MaxPool2d>,
    out_channels: usize,
}

impl<B: Backend> ChannelLevel<B> {
    fn downsample(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        match (&self.avg_pool, &self.max_pool) {
            (Some(pool), _) => pool.forward(x),
            (None, Some(pool)) => pool.forward(x),
            (None, None) => x,
        }
    }

    pub fn out_channels(&self) -> usize {
        self.out_channels
    }
}

fn run<B: Backend>(blocks: &[InceptionBlock<B>], x: Tensor<B, 4>) -> Tensor<B, 4> {
    blocks.iter().fold(x, |x, block| block.forward(x))
}

/// Bilinear x2 upsampling with half-pixel centres, edges clamped.
fn upsample<B: Backend>(x: Tensor<B, 4>) -> Tensor<B, 4> {
    upsample_dim(upsample_dim(x, 2), 3)
}

/// Doubles `dim`: `out[2i] = 3/4 x[i] + 1/4 x[i-1]`,
/// `out[2i+1] = 3/4 x[i] + 1/4 x[i+1]`.
fn upsample_dim<B: Backend>(x: Tensor<B, 4>, dim: usize) -> Tensor<B, 4> {
    let mut dims = x.dims();
    let n = dims[dim];
    let (before, after) = if n > 1 {
        (
            Tensor::cat(vec![x.clone().narrow(dim, 0, 1), x.clone().narrow(dim, 0, n - 1)], dim),
            Tensor::cat(vec![x.clone().narrow(dim, 1, n - 1), x.clone().narrow(dim, n - 1, 1)], dim),
        )
    } else {
        (x.clone(), x.clone())
    };
    let centre = x.mul_scalar(0.75);
    let even = centre.clone().add(before.mul_scalar(0.25));
    let odd = centre.add(after.mul_scalar(0.25));

    dims[dim] = n * 2;
    Tensor::stack::<5>(vec![even, odd], dim + 1).reshape(dims)
}

// ─── Channel Stack ────────────────────────────────────────────────

/// All levels, outermost first. Level `i` nests level `i + 1`.
#[derive(Module, Debug)]
pub struct ChannelStack<B: Backend> {
    levels: Vec<ChannelLevel<B>>,
}

impl<B: Backend> ChannelStack<B> {
    /// Build every level under `path` from a table, outermost first.
    pub fn init(
        levels: &[LevelSpec],
        in_channels: usize,
        epsilon: f64,
        seeds: &dyn WeightSource,
        path: &ScopePath,
        device: &B::Device,
    ) -> Result<Self> {
        validate(levels)?;
        let mut built = Vec::with_capacity(levels.len());
        let builder = LevelBuilder {
            levels,
            epsilon,
            seeds,
            device,
        };
        builder.build(0, in_channels, path, &mut built)?;
        // Inner levels finish first.
        built.reverse();
        Ok(Self { levels: built })
    }

    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    pub fn out_channels(&self) -> usize {
        self.levels.first().map_or(0, ChannelLevel::out_channels)
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Result<Tensor<B, 4>> {
        self.forward_level(0, x)
    }

    fn forward_level(&self, depth: usize, x: Tensor<B, 4>) -> Result<Tensor<B, 4>> {
        let level = &self.levels[depth];
        let shallow = run(&level.shallow, x.clone());

        let mut deep = run(&level.deep_head, level.downsample(x));
        if depth + 1 < self.levels.len() {
            deep = self.forward_level(depth + 1, deep)?;
        }
        let deep = upsample(run(&level.deep_tail, deep));

        let (left, right) = (shallow.dims(), deep.dims());
        if left != right {
            return Err(HourglassError::ShapeMismatch {
                path: format!("level {}", depth + 1),
                left: left.to_vec(),
                right: right.to_vec(),
            });
        }
        log::trace!("level {} merged {:?}", depth + 1, left);
        Ok(shallow + deep)
    }
}

fn validate(levels: &[LevelSpec]) -> Result<()> {
    if levels.is_empty() {
        return Err(HourglassError::InvalidArchitecture(
            "at least one level is required".into(),
        ));
    }
    let last = levels.len() - 1;
    for (i, level) in levels.iter().enumerate() {
        let expected = usize::from(i < last);
        if level.deep.nested_count() != expected || level.shallow.nested_count() != 0 {
            return Err(HourglassError::InvalidArchitecture(format!(
                "level {} must nest {} deeper level(s) in its deep branch",
                i + 1,
                expected
            )));
        }
        if level.shallow.scope == level.deep.scope {
            return Err(HourglassError::InvalidArchitecture(format!(
                "level {} uses scope `{}` for both branches",
                i + 1,
                level.deep.scope
            )));
        }
        for branch in [&level.shallow, &level.deep] {
            let mut slots = HashSet::new();
            if let Some(stage) = branch.stages.iter().find(|s| !slots.insert(s.slot())) {
                return Err(HourglassError::InvalidArchitecture(format!(
                    "level {} reuses slot {} under `{}`",
                    i + 1,
                    stage.slot(),
                    branch.scope
                )));
            }
        }
    }
    Ok(())
}

struct LevelBuilder<'a, B: Backend> {
    levels: &'a [LevelSpec],
    epsilon: f64,
    seeds: &'a dyn WeightSource,
    device: &'a B::Device,
}

impl<B: Backend> LevelBuilder<'_, B> {
    fn block(
        &self,
        in_channels: usize,
        stage: &Stage,
        branch: &ScopePath,
    ) -> Result<Option<InceptionBlock<B>>> {
        match stage {
            Stage::Inception { slot, config } => InceptionBlockConfig::new(in_channels, *config)
                .with_epsilon(self.epsilon)
                .init(self.seeds, &branch.child(slot), self.device)
                .map(Some),
            Stage::Nested { .. } => Ok(None),
        }
    }

    fn chain(
        &self,
        stages: &[Stage],
        mut channels: usize,
        branch: &ScopePath,
    ) -> Result<(Vec<InceptionBlock<B>>, usize)> {
        let mut blocks = Vec::with_capacity(stages.len());
        for stage in stages {
            if let Some(block) = self.block(channels, stage, branch)? {
                channels = block.out_channels();
                blocks.push(block);
            }
        }
        Ok((blocks, channels))
    }

    /// Builds level `depth` and everything below it, pushing each level
    /// into `out` once complete. Returns the level's output channels.
    fn build(
        &self,
        depth: usize,
        in_channels: usize,
        path: &ScopePath,
        out: &mut Vec<ChannelLevel<B>>,
    ) -> Result<usize> {
        let spec = &self.levels[depth];
        let shallow_path = path.join(&spec.shallow.scope);
        let deep_path = path.join(&spec.deep.scope);

        let (shallow, shallow_channels) =
            self.chain(&spec.shallow.stages, in_channels, &shallow_path)?;

        let (head, tail) = split_at_nested(&spec.deep);
        let (deep_head, mut deep_channels) = self.chain(head, in_channels, &deep_path)?;
        let mut deep_tail = Vec::new();
        if let Some((slot, tail)) = tail {
            deep_channels = self.build(depth + 1, deep_channels, &deep_path.child(slot), out)?;
            let (blocks, channels) = self.chain(tail, deep_channels, &deep_path)?;
            deep_tail = blocks;
            deep_channels = channels;
        }

        if shallow_channels != deep_channels {
            return Err(HourglassError::ChannelMismatch {
                path: path.to_string(),
                shallow: shallow_channels,
                deep: deep_channels,
            });
        }

        let (avg_pool, max_pool) = match spec.downsample {
            Pool::Average => (
                Some(AvgPool2dConfig::new([2, 2]).with_strides([2, 2]).init()),
                None,
            ),
            Pool::Max => (
                None,
                Some(MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init()),
            ),
        };
        log::debug!(
            "level {} at `{}`: {} -> {} channels, {} shallow / {} deep blocks",
            depth + 1,
            path,
            in_channels,
            shallow_channels,
            shallow.len(),
            deep_head.len() + deep_tail.len(),
        );

        out.push(ChannelLevel {
            shallow,
            deep_head,
            deep_tail,
            avg_pool,
            max_pool,
            out_channels: shallow_channels,
        });
        Ok(shallow_channels)
    }
}

/// Stages before the nested level, and the nested slot plus the stages after it.
fn split_at_nested(branch: &BranchSpec) -> (&[Stage], Option<(usize, &[Stage])>) {
    match branch
        .stages
        .iter()
        .position(|s| matches!(s, Stage::Nested { .. }))
    {
        Some(at) => (
            &branch.stages[..at],
            Some((branch.stages[at].slot(), &branch.stages[at + 1..])),
        ),
        None => (&branch.stages, None),
    }
}

// ─── Tests ────────────────────────────────────────────────────────
