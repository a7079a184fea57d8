//! Builder API for compiling state trees into documents.
//!
//! This module provides the fluent tree description ([`StateSchema`],
//! [`TransitionSchema`], [`InvokeSchema`]), short constructor functions for
//! each kind of node, and the compiler that resolves a description into an
//! immutable [`Document`].

pub mod document;
pub mod error;
pub mod schema;
mod validate;

pub use document::{
    Document, DocumentBuilder, InvokeNode, StateMode, StateNode, TransitionNode, ROOT_ID,
};
pub use error::{BuildError, DocumentIssue};
pub use schema::{
    DataInit, InvokeSchema, InvokeSource, StateKind, StateSchema, TransitionSchema, TransitionType,
};

use crate::core::{HistoryKind, DONE_INVOKE_PREFIX};
use std::sync::Arc;

/// An ordinary state: atomic without children, compound with them.
///
/// # Example
///
/// ```
/// use statecharts::builder::{state, transition, Document};
///
/// let doc: Document<()> = Document::from_states(vec![
///     state("init").transition(transition("NEXT").to("next")),
///     state("next"),
/// ])
/// .unwrap();
///
/// assert!(doc.lookup("next").is_some());
/// ```
pub fn state<D>(id: impl Into<String>) -> StateSchema<D> {
    StateSchema::new(id, StateKind::State)
}

/// A parallel state whose children are entered together.
pub fn parallel<D>(id: impl Into<String>) -> StateSchema<D> {
    StateSchema::new(id, StateKind::Parallel)
}

/// A final state.
pub fn final_state<D>(id: impl Into<String>) -> StateSchema<D> {
    StateSchema::new(id, StateKind::Final)
}

/// A shallow history pseudo-state.
pub fn history<D>(id: impl Into<String>) -> StateSchema<D> {
    StateSchema::new(id, StateKind::History(HistoryKind::Shallow))
}

/// A deep history pseudo-state.
pub fn history_deep<D>(id: impl Into<String>) -> StateSchema<D> {
    StateSchema::new(id, StateKind::History(HistoryKind::Deep))
}

/// A transition triggered by one event pattern.
pub fn transition<D>(event: impl Into<String>) -> TransitionSchema<D> {
    TransitionSchema::new([event.into()])
}

/// A transition triggered by any of several event patterns.
///
/// # Example
///
/// ```
/// use statecharts::builder::{on, TransitionSchema};
///
/// let t: TransitionSchema<()> = on(["CANCEL", "error.*"]).to("idle");
/// ```
pub fn on<D, I, S>(events: I) -> TransitionSchema<D>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    TransitionSchema::new(events)
}

/// A transition taken as soon as its guard holds, without waiting for an event.
pub fn eventless<D>() -> TransitionSchema<D> {
    TransitionSchema::new(Vec::<String>::new())
}

/// A transition taken when the invocation `invoke_id` completes.
pub fn done_invoke<D>(invoke_id: &str) -> TransitionSchema<D> {
    transition(format!("{DONE_INVOKE_PREFIX}{invoke_id}"))
}

/// Invoke an inline sub-machine.
pub fn invoke_machine<D>(id: impl Into<String>, document: Arc<Document<D>>) -> InvokeSchema<D> {
    InvokeSchema::new(id, InvokeSource::Machine(document))
}

/// Invoke a service resolved by name through the session registry.
pub fn invoke_service<D>(id: impl Into<String>, src: impl Into<String>) -> InvokeSchema<D> {
    InvokeSchema::new(id, InvokeSource::Service(src.into()))
}
