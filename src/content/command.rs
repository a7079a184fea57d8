//! Executable content commands.
//!
//! The action language is a closed set: [`Command`] has exactly one variant
//! per command kind and the [`Evaluator`](super::Evaluator) matches on it
//! exhaustively, so an unknown kind cannot reach a running session.

use crate::core::{Event, EventKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

type Getter<D, U> = Arc<dyn Fn(&D) -> U + Send + Sync>;
type Setter<D, U> = Arc<dyn Fn(&mut D, U) + Send + Sync>;
type Reducer<D> = Arc<dyn Fn(&mut D, &Event) -> Result<(), String> + Send + Sync>;

/// Read/write accessor pair locating one value inside the data bag.
///
/// # Example
///
/// ```rust
/// use statecharts::content::Lens;
///
/// #[derive(Default)]
/// struct Cart { items: u32 }
///
/// let items = Lens::new(|c: &Cart| c.items, |c: &mut Cart, v| c.items = v);
///
/// let mut cart = Cart::default();
/// items.set(&mut cart, 4);
/// assert_eq!(items.get(&cart), 4);
/// ```
pub struct Lens<D, U> {
    get: Getter<D, U>,
    set: Setter<D, U>,
}

impl<D, U> Lens<D, U> {
    pub fn new<G, S>(get: G, set: S) -> Self
    where
        G: Fn(&D) -> U + Send + Sync + 'static,
        S: Fn(&mut D, U) + Send + Sync + 'static,
    {
        Self {
            get: Arc::new(get),
            set: Arc::new(set),
        }
    }

    pub fn get(&self, data: &D) -> U {
        (self.get)(data)
    }

    pub fn set(&self, data: &mut D, value: U) {
        (self.set)(data, value)
    }
}

impl<D, U> Clone for Lens<D, U> {
    fn clone(&self) -> Self {
        Self {
            get: Arc::clone(&self.get),
            set: Arc::clone(&self.set),
        }
    }
}

/// Replace a located value with one computed from the old value and the event.
pub struct Assign<D> {
    location: String,
    reducer: Reducer<D>,
}

impl<D: 'static> Assign<D> {
    /// Build an assignment from a lens and a pure reducer.
    pub fn new<U, F>(location: impl Into<String>, lens: Lens<D, U>, expr: F) -> Self
    where
        U: 'static,
        F: Fn(U, &Event) -> U + Send + Sync + 'static,
    {
        Self::fallible(location, lens, move |value: U, event: &Event| Ok(expr(value, event)))
    }

    /// Build an assignment whose reducer may fail. A failure is fatal for
    /// the session and leaves the located value untouched.
    pub fn fallible<U, F>(location: impl Into<String>, lens: Lens<D, U>, expr: F) -> Self
    where
        U: 'static,
        F: Fn(U, &Event) -> Result<U, String> + Send + Sync + 'static,
    {
        Self {
            location: location.into(),
            reducer: Arc::new(move |data: &mut D, event: &Event| {
                let next = expr(lens.get(data), event)?;
                lens.set(data, next);
                Ok(())
            }),
        }
    }
}

impl<D> Assign<D> {
    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn apply(&self, data: &mut D, event: &Event) -> Result<(), String> {
        (self.reducer)(data, event)
    }
}

impl<D> Clone for Assign<D> {
    fn clone(&self) -> Self {
        Self {
            location: self.location.clone(),
            reducer: Arc::clone(&self.reducer),
        }
    }
}

/// An event to deliver to another queue.
///
/// `target` follows the routing rules of a session: `None`, `_self` or the
/// session's own id mean its external queue; `_internal` its internal queue;
/// `_parent` the invoking session; anything else an invoke id.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SendAction {
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Passed through on the event for whoever schedules the target queue.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<Duration>,
}

impl SendAction {
    pub fn new(event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            ..Self::default()
        }
    }

    pub fn to(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// The event this action puts on the wire.
    pub fn to_event(&self, origin: &str) -> Event {
        Event {
            name: self.event.clone(),
            kind: EventKind::External,
            data: self.data.clone(),
            invoke_id: None,
            origin: Some(origin.to_string()),
            send_id: self.id.clone(),
            delay: self.delay,
        }
    }
}

/// One executable content command.
pub enum Command<D> {
    Assign(Assign<D>),
    Send(SendAction),
    /// Enqueue an event on the session's own internal queue.
    Raise(String),
    /// Diagnostic output with an optional label.
    Log(Option<String>),
    /// Call a host-registered script by id.
    Script(String),
}

impl<D> Command<D> {
    pub fn kind(&self) -> &'static str {
        match self {
            Command::Assign(_) => "assign",
            Command::Send(_) => "send",
            Command::Raise(_) => "raise",
            Command::Log(_) => "log",
            Command::Script(_) => "script",
        }
    }
}

impl<D> Clone for Command<D> {
    fn clone(&self) -> Self {
        match self {
            Command::Assign(a) => Command::Assign(a.clone()),
            Command::Send(s) => Command::Send(s.clone()),
            Command::Raise(name) => Command::Raise(name.clone()),
            Command::Log(label) => Command::Log(label.clone()),
            Command::Script(src) => Command::Script(src.clone()),
        }
    }
}

impl<D> fmt::Debug for Command<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Assign(a) => f.debug_tuple("Assign").field(&a.location).finish(),
            Command::Send(s) => f.debug_tuple("Send").field(s).finish(),
            Command::Raise(name) => f.debug_tuple("Raise").field(name).finish(),
            Command::Log(label) => f.debug_tuple("Log").field(label).finish(),
            Command::Script(src) => f.debug_tuple("Script").field(src).finish(),
        }
    }
}

/// `assign` command from a lens and a reducer.
pub fn assign<D, U, F>(location: impl Into<String>, lens: Lens<D, U>, expr: F) -> Command<D>
where
    D: 'static,
    U: 'static,
    F: Fn(U, &Event) -> U + Send + Sync + 'static,
{
    Command::Assign(Assign::new(location, lens, expr))
}

/// `send` command.
pub fn send<D>(action: SendAction) -> Command<D> {
    Command::Send(action)
}

/// `raise` command.
pub fn raise<D>(event: impl Into<String>) -> Command<D> {
    Command::Raise(event.into())
}

/// `log` command.
pub fn log<D>(label: impl Into<String>) -> Command<D> {
    Command::Log(Some(label.into()))
}

/// `script` command.
pub fn script<D>(src: impl Into<String>) -> Command<D> {
    Command::Script(src.into())
}
