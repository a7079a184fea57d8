//! Invocation lifecycle and the host registry of invokable services.
//!
//! An invocation has no handle until its child starts, then moves
//! `Invoked -> (Cancelled | Done)`. The
//! invoking session keeps one [`ChildHandle`] per live invocation and only
//! ever talks to the child through its queue, apart from running `finalize`
//! content against the child's data bag.

use super::error::{InvokeError, SessionError};
use super::handle::{EventSender, ParentLink, SessionOutcome};
use crate::builder::Document;
use crate::content::Hooks;
use crate::core::Event;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// What an externally managed service receives when it is invoked.
#[derive(Clone, Debug)]
pub struct ServiceRequest {
    pub invoke_id: String,
    /// Route back to the invoking session.
    pub parent: ParentLink,
}

/// A host-managed service that can be the target of an invocation.
///
/// `start` hands back the sender the invoking session uses to forward
/// events; cancellation arrives on that same queue as the sentinel.
pub trait ExternalService: Send + Sync {
    fn start(&self, request: ServiceRequest) -> Result<EventSender, InvokeError>;
}

/// A service registered under a `src` name.
pub enum Service<D> {
    Machine(Arc<Document<D>>),
    External(Arc<dyn ExternalService>),
}

impl<D> Clone for Service<D> {
    fn clone(&self) -> Self {
        match self {
            Service::Machine(doc) => Service::Machine(Arc::clone(doc)),
            Service::External(service) => Service::External(Arc::clone(service)),
        }
    }
}

/// Host lookups consumed by sessions: invoke sources and script hooks.
///
/// A registry is shared by a session and every session it invokes.
///
/// # Example
///
/// ```rust
/// use statecharts::builder::{state, Document};
/// use statecharts::content::Hooks;
/// use statecharts::core::Event;
/// use statecharts::session::Registry;
/// use std::sync::Arc;
///
/// let worker = Arc::new(Document::<()>::from_states(vec![state("working")]).unwrap());
///
/// let registry = Registry::new()
///     .machine("worker", worker)
///     .with_hooks(Hooks::new().script("audit", |_: &(), _: &Event| Ok(())));
///
/// assert!(registry.resolve("worker").is_ok());
/// assert!(registry.resolve("missing").is_err());
/// assert!(registry.hooks().has_script("audit"));
/// ```
pub struct Registry<D> {
    services: HashMap<String, Service<D>>,
    hooks: Hooks<D>,
}

impl<D> Registry<D> {
    pub fn new() -> Self {
        Self {
            services: HashMap::new(),
            hooks: Hooks::new(),
        }
    }

    pub fn with_hooks(mut self, hooks: Hooks<D>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Register a sub-machine under `src`.
    pub fn machine(mut self, src: impl Into<String>, document: Arc<Document<D>>) -> Self {
        self.services.insert(src.into(), Service::Machine(document));
        self
    }

    /// Register an externally managed service under `src`.
    pub fn service<S>(mut self, src: impl Into<String>, service: S) -> Self
    where
        S: ExternalService + 'static,
    {
        self.services
            .insert(src.into(), Service::External(Arc::new(service)));
        self
    }

    pub fn hooks(&self) -> &Hooks<D> {
        &self.hooks
    }

    pub fn resolve(&self, src: &str) -> Result<&Service<D>, InvokeError> {
        self.services
            .get(src)
            .ok_or_else(|| InvokeError::UnknownService {
                src: src.to_string(),
            })
    }
}

impl<D> Default for Registry<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D> Clone for Registry<D> {
    fn clone(&self) -> Self {
        Self {
            services: self.services.clone(),
            hooks: self.hooks.clone(),
        }
    }
}

impl<D> fmt::Debug for Registry<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut services: Vec<&String> = self.services.keys().collect();
        services.sort();
        f.debug_struct("Registry")
            .field("services", &services)
            .field("hooks", &self.hooks)
            .finish()
    }
}

/// Lifecycle of one invocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvokeStatus {
    Invoked,
    Cancelled,
    Done,
}

/// The invoking session's view of one child.
pub struct ChildHandle<D> {
    invoke_id: String,
    sender: EventSender,
    data: Option<Arc<Mutex<D>>>,
    status: InvokeStatus,
    task: Option<JoinHandle<Result<SessionOutcome, SessionError>>>,
}

impl<D> ChildHandle<D> {
    /// A child session running as a tokio task.
    pub(crate) fn session(
        invoke_id: impl Into<String>,
        sender: EventSender,
        data: Arc<Mutex<D>>,
        task: JoinHandle<Result<SessionOutcome, SessionError>>,
    ) -> Self {
        Self {
            invoke_id: invoke_id.into(),
            sender,
            data: Some(data),
            status: InvokeStatus::Invoked,
            task: Some(task),
        }
    }

    /// An externally managed service; it has no data bag.
    pub(crate) fn external(invoke_id: impl Into<String>, sender: EventSender) -> Self {
        Self {
            invoke_id: invoke_id.into(),
            sender,
            data: None,
            status: InvokeStatus::Invoked,
            task: None,
        }
    }

    pub fn invoke_id(&self) -> &str {
        &self.invoke_id
    }

    pub fn status(&self) -> InvokeStatus {
        self.status
    }

    pub(crate) fn data(&self) -> Option<&Arc<Mutex<D>>> {
        self.data.as_ref()
    }

    pub(crate) fn forward(&self, event: Event) -> Result<(), SessionError> {
        self.sender.send(event)
    }

    pub(crate) fn mark_done(&mut self) {
        if self.status == InvokeStatus::Invoked {
            self.status = InvokeStatus::Done;
            tracing::info!(invoke = %self.invoke_id, "invoke done");
        }
    }

    /// Deliver the cancellation sentinel. The child tears itself down at its
    /// next external wait; its task is left to finish on its own.
    pub(crate) fn cancel(&mut self) {
        if self.status != InvokeStatus::Invoked {
            return;
        }
        self.status = InvokeStatus::Cancelled;
        if self.sender.cancel().is_err() {
            tracing::debug!(invoke = %self.invoke_id, "child already stopped");
        }
        self.task.take();
        tracing::info!(invoke = %self.invoke_id, "invoke cancelled");
    }
}

impl<D> fmt::Debug for ChildHandle<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChildHandle")
            .field("invoke_id", &self.invoke_id)
            .field("status", &self.status)
            .field("session", &self.data.is_some())
            .finish()
    }
}
