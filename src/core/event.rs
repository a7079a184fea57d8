//! Events and the queue envelope that carries them between sessions.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Prefix of the completion event raised when a compound or parallel state is done.
pub const DONE_STATE_PREFIX: &str = "done.state.";

/// Prefix of the event a parent receives when an invoked session finishes.
pub const DONE_INVOKE_PREFIX: &str = "done.invoke.";

/// Raised when executable content or an invocation fails at runtime.
pub const ERROR_EXECUTION: &str = "error.execution";

/// Raised when an event cannot be routed to its target.
pub const ERROR_COMMUNICATION: &str = "error.communication";

/// Origin of an event.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// Generated by the interpreter itself (`done.*`, `error.*`).
    Platform,
    /// Raised by executable content onto the internal queue.
    Internal,
    /// Delivered through a session's external queue.
    #[default]
    External,
}

/// An event processed by a session.
///
/// # Example
///
/// ```rust
/// use statecharts::core::Event;
/// use serde_json::json;
///
/// let event = Event::new("SUBMIT").with_data(json!({ "amount": 3 }));
///
/// assert_eq!(event.name, "SUBMIT");
/// assert_eq!(event.data["amount"], 3);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Event name matched against transition patterns.
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub kind: EventKind,

    /// Payload, `null` when absent.
    #[serde(default)]
    pub data: Value,

    /// Set on events coming from an invoked child session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoke_id: Option<String>,

    /// Id of the session that sent the event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub send_id: Option<String>,

    /// Scheduling hint copied from `send`. The engine never waits on it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<Duration>,
}

impl Event {
    /// Create an external event with the given name and no payload.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    pub fn with_kind(mut self, kind: EventKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_invoke_id(mut self, invoke_id: impl Into<String>) -> Self {
        self.invoke_id = Some(invoke_id.into());
        self
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Completion event for a compound or parallel state.
    pub fn done_state(state_id: &str, data: Value) -> Self {
        Self::new(format!("{DONE_STATE_PREFIX}{state_id}"))
            .with_kind(EventKind::Platform)
            .with_data(data)
    }

    /// Completion event a parent receives from an invoked session.
    pub fn done_invoke(invoke_id: &str, data: Value) -> Self {
        Self::new(format!("{DONE_INVOKE_PREFIX}{invoke_id}"))
            .with_kind(EventKind::Platform)
            .with_invoke_id(invoke_id)
            .with_data(data)
    }

    /// `error.execution` carrying a human readable reason.
    pub fn error_execution(reason: impl Into<String>) -> Self {
        Self::new(ERROR_EXECUTION)
            .with_kind(EventKind::Platform)
            .with_data(serde_json::json!({ "reason": reason.into() }))
    }

    /// `error.communication` for an event that could not be delivered.
    pub fn error_communication(target: &str, event: &str) -> Self {
        Self::new(ERROR_COMMUNICATION)
            .with_kind(EventKind::Platform)
            .with_data(serde_json::json!({ "target": target, "event": event }))
    }

    /// True when this event is the completion of the given invocation.
    pub fn is_done_invoke(&self, invoke_id: &str) -> bool {
        self.invoke_id.as_deref() == Some(invoke_id)
            && self
                .name
                .strip_prefix(DONE_INVOKE_PREFIX)
                .is_some_and(|rest| rest == invoke_id)
    }
}

/// Item carried by a session's external queue.
///
/// Cancellation travels on the same queue as ordinary events so it is
/// observed at the session's next external wait, after the current
/// macrostep has run to completion.
#[derive(Clone, Debug, PartialEq)]
pub enum Envelope {
    Event(Event),
    Cancel,
}

impl From<Event> for Envelope {
    fn from(event: Event) -> Self {
        Envelope::Event(event)
    }
}

/// Match one transition event pattern against an event name.
///
/// `*` matches every event, a pattern ending in `.*` matches any name that
/// starts with the part before the `*`, anything else must be equal.
///
/// # Example
///
/// ```rust
/// use statecharts::core::pattern_matches;
///
/// assert!(pattern_matches("*", "anything"));
/// assert!(pattern_matches("NEXT", "NEXT"));
/// assert!(!pattern_matches("NEXT", "NEXT.more"));
/// assert!(pattern_matches("done.state.*", "done.state.parent"));
/// ```
pub fn pattern_matches(pattern: &str, name: &str) -> bool {
    if pattern == "*" || pattern == name {
        return true;
    }
    match pattern.strip_suffix('*') {
        Some(prefix) if prefix.ends_with('.') => name.starts_with(prefix),
        _ => false,
    }
}

/// True when any pattern in the list matches. An empty list never matches.
pub fn name_matches(patterns: &[String], name: &str) -> bool {
    patterns.iter().any(|p| pattern_matches(p, name))
}
