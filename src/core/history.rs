//! History records for history pseudo-states.
//!
//! When a state that owns history pseudo-states is exited, the interpreter
//! snapshots part of the active configuration into the [`HistoryTable`]:
//! the immediate children for shallow history, the atomic descendants for
//! deep history. Re-entering through the history state replays that set.

use super::id::StateId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Depth of a history pseudo-state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryKind {
    /// Remembers the active immediate children of the home state.
    #[default]
    Shallow,
    /// Remembers the active atomic descendants of the home state.
    Deep,
}

/// The states remembered by one history pseudo-state at the last exit of
/// its home state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub kind: HistoryKind,
    /// Remembered states in document order.
    pub states: Vec<StateId>,
    /// When the home state was last exited.
    pub recorded_at: DateTime<Utc>,
}

/// Table of history records keyed by history pseudo-state.
///
/// # Example
///
/// ```rust
/// use statecharts::core::{HistoryKind, HistoryTable};
///
/// let table = HistoryTable::new();
/// assert!(table.is_empty());
/// assert_eq!(HistoryKind::default(), HistoryKind::Shallow);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryTable {
    records: BTreeMap<StateId, HistoryRecord>,
}

impl HistoryTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the snapshot for a history pseudo-state, replacing any older one.
    pub fn record(&mut self, history: StateId, kind: HistoryKind, mut states: Vec<StateId>) {
        states.sort();
        states.dedup();
        self.records.insert(
            history,
            HistoryRecord {
                kind,
                states,
                recorded_at: Utc::now(),
            },
        );
    }

    /// The remembered states, if the home state has been exited before.
    pub fn get(&self, history: StateId) -> Option<&[StateId]> {
        self.records.get(&history).map(|r| r.states.as_slice())
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}
