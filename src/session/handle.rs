//! Cross-session senders and handles to spawned sessions.

use super::error::SessionError;
use crate::core::{Envelope, Event};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Sending half of a session's external queue.
///
/// Enqueueing never blocks; it only fails once the session has gone away.
#[derive(Clone, Debug)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<Envelope>,
}

impl EventSender {
    /// A new external queue.
    pub fn channel() -> (EventSender, mpsc::UnboundedReceiver<Envelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (EventSender { tx }, rx)
    }

    pub fn send(&self, event: Event) -> Result<(), SessionError> {
        self.tx
            .send(Envelope::Event(event))
            .map_err(|_| SessionError::Closed)
    }

    /// Deliver the cancellation sentinel.
    pub fn cancel(&self) -> Result<(), SessionError> {
        self.tx.send(Envelope::Cancel).map_err(|_| SessionError::Closed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Route from an invoked session back to the session that invoked it.
///
/// Every event sent through the link is stamped with the invoke id, which
/// is how the parent matches it to `finalize` content.
#[derive(Clone, Debug)]
pub struct ParentLink {
    sender: EventSender,
    invoke_id: String,
}

impl ParentLink {
    pub fn new(sender: EventSender, invoke_id: impl Into<String>) -> Self {
        Self {
            sender,
            invoke_id: invoke_id.into(),
        }
    }

    pub fn invoke_id(&self) -> &str {
        &self.invoke_id
    }

    pub fn send(&self, event: Event) -> Result<(), SessionError> {
        self.sender.send(event.with_invoke_id(self.invoke_id.clone()))
    }
}

/// Lifecycle state of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Built but not started.
    Idle,
    Running,
    /// Reached a top-level final state.
    Done,
    Cancelled,
    /// Stopped by a fatal error.
    Failed,
}

/// Summary of a session that has stopped.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionOutcome {
    pub name: String,
    pub status: SessionStatus,
    /// Done-data of the top-level final state, if one was reached.
    pub done_data: Option<Value>,
    /// Active configuration when the session stopped, in entry order.
    pub configuration: Vec<String>,
}

/// Handle to a session running as a tokio task.
pub struct SessionHandle {
    pub(crate) name: String,
    pub(crate) sender: EventSender,
    pub(crate) snapshot: watch::Receiver<Vec<String>>,
    pub(crate) task: JoinHandle<Result<SessionOutcome, SessionError>>,
}

impl SessionHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sender(&self) -> EventSender {
        self.sender.clone()
    }

    pub fn send(&self, event: Event) -> Result<(), SessionError> {
        self.sender.send(event)
    }

    pub fn cancel(&self) -> Result<(), SessionError> {
        self.sender.cancel()
    }

    /// Active configuration after the last completed macrostep.
    pub fn configuration(&self) -> Vec<String> {
        self.snapshot.borrow().clone()
    }

    /// Wait for the next macrostep to complete and return its configuration.
    pub async fn changed(&mut self) -> Result<Vec<String>, SessionError> {
        self.snapshot
            .changed()
            .await
            .map_err(|_| SessionError::Closed)?;
        Ok(self.snapshot.borrow_and_update().clone())
    }

    /// Wait for the session to stop.
    pub async fn join(self) -> Result<SessionOutcome, SessionError> {
        self.task
            .await
            .map_err(|e| SessionError::Aborted(e.to_string()))?
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("name", &self.name)
            .field("configuration", &*self.snapshot.borrow())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sender_delivers_in_order() {
        let (sender, mut rx) = EventSender::channel();
        sender.send(Event::new("A")).unwrap();
        sender.cancel().unwrap();

        assert_eq!(rx.try_recv().unwrap(), Envelope::Event(Event::new("A")));
        assert_eq!(rx.try_recv().unwrap(), Envelope::Cancel);
    }

    #[test]
    fn send_fails_once_receiver_is_gone() {
        let (sender, rx) = EventSender::channel();
        drop(rx);

        assert!(sender.is_closed());
        assert!(matches!(sender.send(Event::new("A")), Err(SessionError::Closed)));
    }

    #[test]
    fn parent_link_stamps_invoke_id() {
        let (sender, mut rx) = EventSender::channel();
        let link = ParentLink::new(sender, "child");

        link.send(Event::new("RESULT")).unwrap();

        match rx.try_recv().unwrap() {
            Envelope::Event(event) => assert_eq!(event.invoke_id.as_deref(), Some("child")),
            Envelope::Cancel => panic!("Expected an event"),
        }
    }
}
