//! Hierarchical scope paths.
//!
//! Every block receives the path of its position in the recursion tree
//! and passes `child` paths down to the blocks it owns. The rendered form
//! (`"3/0/0/1/"`) is the prefix of every weight key the block resolves.

use std::fmt;

/// Ordered list of path segments identifying a block.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ScopePath {
    segments: Vec<String>,
}

impl ScopePath {
    /// The empty path, rendered as `""`.
    pub fn root() -> Self {
        Self::default()
    }

    /// A new path with one extra segment.
    pub fn child(&self, segment: impl fmt::Display) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.to_string());
        Self { segments }
    }

    /// A new path with every slash-delimited segment of `scope` appended.
    /// Empty segments are skipped, so `"0/1"` and `"0/1/"` are equivalent.
    pub fn join(&self, scope: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.extend(
            scope
                .split('/')
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        );
        Self { segments }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// True if `self` is `other` or lies below it.
    pub fn starts_with(&self, other: &ScopePath) -> bool {
        self.segments.starts_with(&other.segments)
    }
}

impl fmt::Display for ScopePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            write!(f, "{}/", segment)?;
        }
        Ok(())
    }
}
