//! Interpreter for executable content.

use super::command::Command;
use crate::core::{Event, EventKind};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Host-defined callable referenced by `script` commands.
///
/// Scripts observe the data bag and the current event but cannot change
/// them; any state change must go through `assign`.
pub type Script<D> = Arc<dyn Fn(&D, &Event) -> Result<(), String> + Send + Sync>;

/// Receiver for `log` command output.
pub type LogSink = Arc<dyn Fn(&LogEntry) + Send + Sync>;

/// One `log` command execution.
#[derive(Clone, Debug, PartialEq)]
pub struct LogEntry {
    pub session: String,
    pub label: Option<String>,
    /// Name of the event being processed when the command ran.
    pub event: String,
}

/// Errors raised while evaluating executable content.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ContentError {
    #[error("No script registered under '{src}'")]
    UnknownScript { src: String },

    #[error("Script '{src}' failed: {reason}")]
    ScriptFailed { src: String, reason: String },

    #[error("Assignment to '{location}' failed: {reason}")]
    AssignFailed { location: String, reason: String },
}

/// Host hooks consulted by the evaluator.
pub struct Hooks<D> {
    scripts: HashMap<String, Script<D>>,
    log_sink: Option<LogSink>,
}

impl<D> Hooks<D> {
    pub fn new() -> Self {
        Self {
            scripts: HashMap::new(),
            log_sink: None,
        }
    }

    /// Register a script callable under `src`.
    pub fn script<F>(mut self, src: impl Into<String>, script: F) -> Self
    where
        F: Fn(&D, &Event) -> Result<(), String> + Send + Sync + 'static,
    {
        self.scripts.insert(src.into(), Arc::new(script));
        self
    }

    /// Receive every `log` command in addition to the tracing output.
    pub fn log_sink<F>(mut self, sink: F) -> Self
    where
        F: Fn(&LogEntry) + Send + Sync + 'static,
    {
        self.log_sink = Some(Arc::new(sink));
        self
    }

    pub fn has_script(&self, src: &str) -> bool {
        self.scripts.contains_key(src)
    }
}

impl<D> Default for Hooks<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D> Clone for Hooks<D> {
    fn clone(&self) -> Self {
        Self {
            scripts: self.scripts.clone(),
            log_sink: self.log_sink.clone(),
        }
    }
}

impl<D> fmt::Debug for Hooks<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut scripts: Vec<&String> = self.scripts.keys().collect();
        scripts.sort();
        f.debug_struct("Hooks")
            .field("scripts", &scripts)
            .field("log_sink", &self.log_sink.is_some())
            .finish()
    }
}

/// Event produced by content, waiting to be routed by the session.
#[derive(Clone, Debug, PartialEq)]
pub enum Outgoing {
    /// For the session's own internal queue.
    Raise(Event),
    /// For the queue named by `target`.
    Send { event: Event, target: Option<String> },
}

/// Events collected while content runs, in the order they were produced.
#[derive(Debug, Default)]
pub struct Outbox {
    items: Vec<Outgoing>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, item: Outgoing) {
        self.items.push(item);
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn drain(&mut self) -> std::vec::Drain<'_, Outgoing> {
        self.items.drain(..)
    }
}

/// Runs command lists against a data bag.
///
/// The evaluator never touches queues directly: `raise` and `send` land in
/// the [`Outbox`] and the owning session routes them afterwards.
///
/// # Example
///
/// ```rust
/// use statecharts::content::{assign, raise, Evaluator, Hooks, Lens, Outbox, Outgoing};
/// use statecharts::core::Event;
///
/// #[derive(Default)]
/// struct Data { count: u32 }
///
/// let commands = vec![
///     assign("count", Lens::new(|d: &Data| d.count, |d: &mut Data, v| d.count = v), |v, _| v + 1),
///     raise("COUNTED"),
/// ];
///
/// let hooks = Hooks::new();
/// let evaluator = Evaluator::new("session", &hooks);
/// let mut data = Data::default();
/// let mut outbox = Outbox::new();
///
/// evaluator.execute(&commands, &mut data, &Event::new("TICK"), &mut outbox).unwrap();
///
/// assert_eq!(data.count, 1);
/// assert!(matches!(outbox.drain().next(), Some(Outgoing::Raise(e)) if e.name == "COUNTED"));
/// ```
pub struct Evaluator<'a, D> {
    session: &'a str,
    hooks: &'a Hooks<D>,
}

impl<'a, D> Evaluator<'a, D> {
    pub fn new(session: &'a str, hooks: &'a Hooks<D>) -> Self {
        Self { session, hooks }
    }

    /// Execute `commands` in order. The first failure stops evaluation.
    pub fn execute(
        &self,
        commands: &[Command<D>],
        data: &mut D,
        event: &Event,
        outbox: &mut Outbox,
    ) -> Result<(), ContentError> {
        for command in commands {
            match command {
                Command::Assign(assign) => {
                    assign
                        .apply(data, event)
                        .map_err(|reason| ContentError::AssignFailed {
                            location: assign.location().to_string(),
                            reason,
                        })?;
                }
                Command::Send(action) => outbox.push(Outgoing::Send {
                    event: action.to_event(self.session),
                    target: action.target.clone(),
                }),
                Command::Raise(name) => outbox.push(Outgoing::Raise(
                    Event::new(name.clone())
                        .with_kind(EventKind::Internal)
                        .with_origin(self.session),
                )),
                Command::Log(label) => self.log(label.as_deref(), event),
                Command::Script(src) => {
                    let script = self
                        .hooks
                        .scripts
                        .get(src)
                        .ok_or_else(|| ContentError::UnknownScript { src: src.clone() })?;
                    script(data, event).map_err(|reason| ContentError::ScriptFailed {
                        src: src.clone(),
                        reason,
                    })?;
                }
            }
        }
        Ok(())
    }

    fn log(&self, label: Option<&str>, event: &Event) {
        tracing::info!(
            target: "statecharts::log",
            session = %self.session,
            event = %event.name,
            "{}",
            label.unwrap_or("")
        );
        if let Some(sink) = &self.hooks.log_sink {
            sink(&LogEntry {
                session: self.session.to_string(),
                label: label.map(str::to_string),
                event: event.name.clone(),
            });
        }
    }
}
