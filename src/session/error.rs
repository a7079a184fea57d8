//! Errors raised by running sessions.

use crate::content::ContentError;
use crate::core::GuardError;
use thiserror::Error;

/// Fatal conditions for a session. Once one is returned the session has
/// stopped advancing.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Content(#[from] ContentError),

    #[error("Guard on a transition of '{state}' failed: {source}")]
    Guard {
        state: String,
        #[source]
        source: GuardError,
    },

    #[error("Macrostep exceeded {limit} microsteps")]
    MicrostepLimit { limit: usize },

    #[error("Session has not been started")]
    NotStarted,

    #[error("Session has already been started")]
    AlreadyStarted,

    #[error("Session queue is closed")]
    Closed,

    #[error("No route to '{target}'")]
    Undeliverable { target: String },

    #[error("No tokio runtime available to spawn the session")]
    NoRuntime,

    #[error("Session task aborted: {0}")]
    Aborted(String),
}

/// Reasons an invocation could not be started. These are reported to the
/// invoking session as `error.execution`, never as a fatal error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvokeError {
    #[error("No service registered under '{src}'")]
    UnknownService { src: String },

    #[error("Invoke '{id}' needs a tokio runtime to start its child session")]
    NoRuntime { id: String },

    #[error("Service '{src}' failed to start: {reason}")]
    ServiceFailed { src: String, reason: String },
}
