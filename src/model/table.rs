//! Architecture table of the pretrained Hourglass.
//!
//! Channel counts, kernel sizes and path slots are load-bearing: a
//! pretrained weight file only binds if every block lands on the same key
//! with the same shape as in the network that produced it.

use serde::{Deserialize, Serialize};

use super::inception::InceptionConfig;

pub const A64: InceptionConfig = InceptionConfig::new(64, [[3, 32, 64], [5, 32, 64], [7, 32, 64]]);
pub const B64: InceptionConfig = InceptionConfig::new(64, [[3, 64, 64], [7, 64, 64], [11, 64, 64]]);
pub const C32: InceptionConfig = InceptionConfig::new(32, [[3, 32, 32], [5, 32, 32], [7, 32, 32]]);
pub const D32: InceptionConfig = InceptionConfig::new(32, [[3, 64, 32], [7, 64, 32], [11, 64, 32]]);
pub const E32: InceptionConfig = InceptionConfig::new(32, [[3, 64, 32], [5, 64, 32], [7, 64, 32]]);
pub const F16: InceptionConfig = InceptionConfig::new(16, [[3, 32, 16], [7, 32, 16], [11, 32, 16]]);
pub const G16: InceptionConfig = InceptionConfig::new(16, [[3, 64, 16], [7, 64, 16], [11, 64, 16]]);

/// Downsampling applied at the head of a level's deep branch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Pool {
    Average,
    Max,
}

/// One element of a branch pipeline.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    Inception { slot: usize, config: InceptionConfig },
    /// The next-deeper level.
    Nested { slot: usize },
}

impl Stage {
    pub fn slot(&self) -> usize {
        match self {
            Self::Inception { slot, .. } | Self::Nested { slot } => *slot,
        }
    }
}

/// A pipeline rooted at `scope` under the level's path.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchSpec {
    pub scope: String,
    pub stages: Vec<Stage>,
}

impl BranchSpec {
    pub fn new(scope: &str, stages: Vec<Stage>) -> Self {
        Self {
            scope: scope.to_string(),
            stages,
        }
    }

    pub fn nested_count(&self) -> usize {
        self.stages
            .iter()
            .filter(|s| matches!(s, Stage::Nested { .. }))
            .count()
    }
}

/// Layout of one recursion level.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelSpec {
    pub downsample: Pool,
    /// Same-resolution pipeline.
    pub shallow: BranchSpec,
    /// Pool, stages, then bilinear x2 upsampling.
    pub deep: BranchSpec,
}

fn block(slot: usize, config: InceptionConfig) -> Stage {
    Stage::Inception { slot, config }
}

fn nested(slot: usize) -> Stage {
    Stage::Nested { slot }
}

/// The four levels of the pretrained network, outermost first.
///
/// The two outer levels put their deep branch under `0/0` and the shallow
/// one under `0/1`; the two inner levels do the opposite.
pub fn pretrained_levels() -> Vec<LevelSpec> {
    vec![
        LevelSpec {
            downsample: Pool::Max,
            deep: BranchSpec::new(
                "0/0",
                vec![
                    block(1, C32),
                    block(2, C32),
                    nested(3),
                    block(4, E32),
                    block(5, F16),
                ],
            ),
            shallow: BranchSpec::new("0/1", vec![block(0, G16)]),
        },
        LevelSpec {
            downsample: Pool::Max,
            deep: BranchSpec::new(
                "0/0",
                vec![
                    block(1, C32),
                    block(2, A64),
                    nested(3),
                    block(4, A64),
                    block(5, C32),
                ],
            ),
            shallow: BranchSpec::new("0/1", vec![block(0, C32), block(1, D32)]),
        },
        LevelSpec {
            downsample: Pool::Average,
            shallow: BranchSpec::new("0/0", vec![block(0, A64), block(1, B64)]),
            deep: BranchSpec::new(
                "0/1",
                vec![
                    block(1, A64),
                    block(2, A64),
                    nested(3),
                    block(4, A64),
                    block(5, B64),
                ],
            ),
        },
        LevelSpec {
            downsample: Pool::Average,
            shallow: BranchSpec::new("0/0", vec![block(0, A64), block(1, A64)]),
            deep: BranchSpec::new("0/1", vec![block(1, A64), block(2, A64), block(3, A64)]),
        },
    ]
}
