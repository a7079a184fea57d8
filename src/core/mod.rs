//! Core statechart types and logic.
//!
//! This module contains the pure building blocks the interpreter runs on:
//! - Events, the queue envelope and event pattern matching
//! - Guard predicates over the data bag and the current event
//! - History records remembered across exits of a region
//! - Document, entry and exit orderings plus an insertion-ordered set
//!
//! Nothing in this module performs I/O or touches a running session.

mod event;
mod guard;
mod history;
mod id;
mod order;

pub use event::{
    name_matches, pattern_matches, Envelope, Event, EventKind, DONE_INVOKE_PREFIX,
    DONE_STATE_PREFIX, ERROR_COMMUNICATION, ERROR_EXECUTION,
};
pub use guard::{Guard, GuardError};
pub use history::{HistoryKind, HistoryRecord, HistoryTable};
pub use id::{InvokeId, StateId, TransitionId};
pub use order::{document_order, entry_order, exit_order, DocumentNode, OrderedSet};
