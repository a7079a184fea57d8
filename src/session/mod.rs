//! Sessions: running instances of a [`Document`](crate::builder::Document).
//!
//! A [`Session`] owns the active configuration, its queues, the history
//! table and the data bag. It can be driven synchronously with
//! [`Session::run_pending`], awaited with [`Session::run`], or moved onto a
//! tokio task with [`Session::spawn`]. Invoked children are always spawned
//! and talk to their parent only through queues.

mod config;
mod datamodel;
mod error;
mod handle;
mod interpreter;
mod invoke;
mod select;

pub use config::{SessionConfig, DEFAULT_MAX_MICROSTEPS};
pub use datamodel::DataModel;
pub use error::{InvokeError, SessionError};
pub use handle::{EventSender, ParentLink, SessionHandle, SessionOutcome, SessionStatus};
pub use interpreter::Session;
pub use invoke::{
    ChildHandle, ExternalService, InvokeStatus, Registry, Service, ServiceRequest,
};
