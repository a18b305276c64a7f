//! # Ownership
//!
//! Attributes historical subtask indices to the workers of the current run.
//!
//! A previous run may have had any parallelism. Index `i` from that run belongs to the
//! current subtask `i mod p`, where `p` is the current parallelism. After a downscale one
//! worker inherits several old indices; after an upscale some workers inherit none. Every
//! old index lands on exactly one current worker, which is what makes concurrent recovery
//! passes touch disjoint sets of transactional ids.

use crate::error::{RecoveryError, Result};
use std::fmt;

/// Position of one worker within the current parallelism.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubtaskPlacement {
    index: u32,
    parallelism: u32,
}

impl SubtaskPlacement {
    pub fn new(index: u32, parallelism: u32) -> Result<Self> {
        if parallelism == 0 {
            return Err(RecoveryError::invalid(
                "parallelism",
                "must be at least 1",
            ));
        }
        if index >= parallelism {
            return Err(RecoveryError::invalid(
                "subtask_index",
                format!("{index} is outside parallelism {parallelism}"),
            ));
        }
        Ok(Self { index, parallelism })
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn parallelism(&self) -> u32 {
        self.parallelism
    }

    /// True if this worker is responsible for ids opened by historical `owner`.
    pub fn owns(&self, owner: u32) -> bool {
        owner_of(owner, self.parallelism) == self.index
    }

    /// Historical indices below `bound` that this worker inherits, in ascending order.
    pub fn inherited_indices(&self, bound: u32) -> impl Iterator<Item = u32> {
        (self.index..bound).step_by(self.parallelism as usize)
    }
}

impl fmt::Display for SubtaskPlacement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.index, self.parallelism)
    }
}

/// Current subtask that owns historical index `owner` under `parallelism`.
///
/// `parallelism` must be non-zero; [`SubtaskPlacement`] enforces that for callers that go
/// through it.
pub fn owner_of(owner: u32, parallelism: u32) -> u32 {
    owner % parallelism
}
