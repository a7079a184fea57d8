//! Tree description consumed by the document builder.
//!
//! These types are plain data with fluent setters. They describe a state
//! tree by id; nothing is resolved until
//! [`DocumentBuilder::build`](super::DocumentBuilder::build) compiles them
//! into a [`Document`](super::Document).

use super::document::Document;
use crate::content::Command;
use crate::core::{Event, Guard, HistoryKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Kind of state being described.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StateKind {
    /// Atomic when it has no children, compound otherwise.
    State,
    Parallel,
    Final,
    History(HistoryKind),
}

/// Whether a transition may avoid exiting its source.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionType {
    Internal,
    #[default]
    External,
}

/// Builds a child's data bag from the parent's when an invocation starts.
pub type DataInit<D> = Arc<dyn Fn(&D) -> D + Send + Sync>;

/// What an invocation starts.
pub enum InvokeSource<D> {
    /// An inline sub-machine.
    Machine(Arc<Document<D>>),
    /// A service resolved through the host registry at invoke time.
    Service(String),
}

impl<D> Clone for InvokeSource<D> {
    fn clone(&self) -> Self {
        match self {
            InvokeSource::Machine(doc) => InvokeSource::Machine(Arc::clone(doc)),
            InvokeSource::Service(src) => InvokeSource::Service(src.clone()),
        }
    }
}

impl<D> fmt::Debug for InvokeSource<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvokeSource::Machine(doc) => f
                .debug_tuple("Machine")
                .field(&format_args!("{} states", doc.len()))
                .finish(),
            InvokeSource::Service(src) => f.debug_tuple("Service").field(src).finish(),
        }
    }
}

/// Description of one transition.
pub struct TransitionSchema<D> {
    pub(crate) events: Vec<String>,
    pub(crate) targets: Vec<String>,
    pub(crate) kind: TransitionType,
    pub(crate) cond: Option<Guard<D>>,
    pub(crate) content: Vec<Command<D>>,
}

impl<D> TransitionSchema<D> {
    /// A transition triggered by any of `events`. An empty list makes it eventless.
    pub fn new<I, S>(events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            events: events.into_iter().map(Into::into).collect(),
            targets: Vec::new(),
            kind: TransitionType::External,
            cond: None,
            content: Vec::new(),
        }
    }

    /// Add a target state id.
    pub fn to(mut self, target: impl Into<String>) -> Self {
        self.targets.push(target.into());
        self
    }

    /// Add several target state ids at once, e.g. one per parallel region.
    pub fn to_all<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.targets.extend(targets.into_iter().map(Into::into));
        self
    }

    /// Guard the transition with a closure.
    pub fn when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&D, &Event) -> bool + Send + Sync + 'static,
    {
        self.cond = Some(Guard::new(predicate));
        self
    }

    /// Guard the transition with a prebuilt guard.
    pub fn guard(mut self, guard: Guard<D>) -> Self {
        self.cond = Some(guard);
        self
    }

    /// Append executable content run when the transition fires.
    pub fn action<I>(mut self, content: I) -> Self
    where
        I: IntoIterator<Item = Command<D>>,
    {
        self.content.extend(content);
        self
    }

    /// Mark the transition internal: it will not exit its compound source
    /// when every target lies inside it.
    pub fn internal(mut self) -> Self {
        self.kind = TransitionType::Internal;
        self
    }
}

/// Description of one invocation.
pub struct InvokeSchema<D> {
    pub(crate) id: String,
    pub(crate) source: InvokeSource<D>,
    pub(crate) autoforward: bool,
    pub(crate) finalize: Vec<Command<D>>,
    pub(crate) data: Option<DataInit<D>>,
}

impl<D> InvokeSchema<D> {
    pub fn new(id: impl Into<String>, source: InvokeSource<D>) -> Self {
        Self {
            id: id.into(),
            source,
            autoforward: false,
            finalize: Vec::new(),
            data: None,
        }
    }

    /// Forward every external event the parent receives to the child.
    pub fn autoforward(mut self) -> Self {
        self.autoforward = true;
        self
    }

    /// Content run against the child's data when an event from the child arrives.
    pub fn finalize<I>(mut self, content: I) -> Self
    where
        I: IntoIterator<Item = Command<D>>,
    {
        self.finalize.extend(content);
        self
    }

    /// Derive the child's initial data from the parent's.
    pub fn with_data<F>(mut self, init: F) -> Self
    where
        F: Fn(&D) -> D + Send + Sync + 'static,
    {
        self.data = Some(Arc::new(init));
        self
    }
}

/// Description of one state and everything nested in it.
pub struct StateSchema<D> {
    pub(crate) id: String,
    pub(crate) kind: StateKind,
    pub(crate) initial_marker: bool,
    pub(crate) initial_targets: Vec<String>,
    pub(crate) initial_content: Vec<Command<D>>,
    pub(crate) children: Vec<StateSchema<D>>,
    pub(crate) transitions: Vec<TransitionSchema<D>>,
    pub(crate) invokes: Vec<InvokeSchema<D>>,
    pub(crate) on_entry: Vec<Command<D>>,
    pub(crate) on_exit: Vec<Command<D>>,
    pub(crate) done_data: Option<Value>,
}

impl<D> StateSchema<D> {
    pub fn new(id: impl Into<String>, kind: StateKind) -> Self {
        Self {
            id: id.into(),
            kind,
            initial_marker: false,
            initial_targets: Vec::new(),
            initial_content: Vec::new(),
            children: Vec::new(),
            transitions: Vec::new(),
            invokes: Vec::new(),
            on_entry: Vec::new(),
            on_exit: Vec::new(),
            done_data: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> StateKind {
        self.kind
    }

    /// Add a nested state.
    pub fn child(mut self, child: StateSchema<D>) -> Self {
        self.children.push(child);
        self
    }

    pub fn children<I>(mut self, children: I) -> Self
    where
        I: IntoIterator<Item = StateSchema<D>>,
    {
        self.children.extend(children);
        self
    }

    pub fn transition(mut self, transition: TransitionSchema<D>) -> Self {
        self.transitions.push(transition);
        self
    }

    pub fn invoke(mut self, invoke: InvokeSchema<D>) -> Self {
        self.invokes.push(invoke);
        self
    }

    pub fn on_entry<I>(mut self, content: I) -> Self
    where
        I: IntoIterator<Item = Command<D>>,
    {
        self.on_entry.extend(content);
        self
    }

    pub fn on_exit<I>(mut self, content: I) -> Self
    where
        I: IntoIterator<Item = Command<D>>,
    {
        self.on_exit.extend(content);
        self
    }

    /// Mark this state as its parent's default child.
    pub fn initial(mut self) -> Self {
        self.initial_marker = true;
        self
    }

    /// Explicit default-entry targets, overriding any marked child.
    pub fn initial_targets<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.initial_targets.extend(targets.into_iter().map(Into::into));
        self
    }

    /// Content run after on-entry whenever this state is entered by default.
    pub fn on_initial<I>(mut self, content: I) -> Self
    where
        I: IntoIterator<Item = Command<D>>,
    {
        self.initial_content.extend(content);
        self
    }

    /// Payload carried by the completion event when this final state is entered.
    pub fn done_data(mut self, data: Value) -> Self {
        self.done_data = Some(data);
        self
    }
}
