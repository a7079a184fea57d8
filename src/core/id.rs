//! Handles into a document model.
//!
//! Nodes never own each other. Parents, ancestors, targets and sources are
//! all stored as these indices into the single arena kept by the document.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Index of a state node. `StateId(0)` is always the synthetic root and
/// indices follow document pre-order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StateId(pub(crate) u32);

/// Index of a transition node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TransitionId(pub(crate) u32);

/// Index of an invoke node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InvokeId(pub(crate) u32);

impl StateId {
    pub const ROOT: StateId = StateId(0);

    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn is_root(self) -> bool {
        self == Self::ROOT
    }
}

impl TransitionId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl InvokeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
