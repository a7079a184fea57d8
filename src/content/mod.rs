//! Executable content: the small action language run on entry, exit and
//! when a transition fires.
//!
//! Commands are a closed set (`assign`, `send`, `raise`, `log`, `script`).
//! `assign` works through an explicit [`Lens`] so the located value is named
//! by the author rather than inferred at runtime.

mod command;
mod evaluator;

pub use command::{assign, log, raise, script, send, Assign, Command, Lens, SendAction};
pub use evaluator::{ContentError, Evaluator, Hooks, LogEntry, LogSink, Outbox, Outgoing, Script};
