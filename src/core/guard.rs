//! Guard conditions for transitions.
//!
//! A guard is a predicate over the session's data bag and the event being
//! processed. Guards must not mutate anything; the only effect they may have
//! is failing, which the interpreter treats as fatal for the session.

use super::event::Event;
use std::fmt;

/// Failure reported by a fallible guard.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{0}")]
pub struct GuardError(pub String);

type Predicate<D> = Box<dyn Fn(&D, &Event) -> Result<bool, GuardError> + Send + Sync>;

/// Predicate that decides whether a transition is enabled.
///
/// # Example
///
/// ```rust
/// use statecharts::core::{Event, Guard};
/// use serde_json::json;
///
/// struct Counter { count: u32 }
///
/// let below_limit = Guard::new(|data: &Counter, event: &Event| {
///     data.count < event.data["limit"].as_u64().unwrap_or(0) as u32
/// });
///
/// let event = Event::new("TICK").with_data(json!({ "limit": 3 }));
/// assert_eq!(below_limit.check(&Counter { count: 1 }, &event), Ok(true));
/// assert_eq!(below_limit.check(&Counter { count: 3 }, &event), Ok(false));
/// ```
pub struct Guard<D> {
    predicate: Predicate<D>,
}

impl<D> Guard<D> {
    /// Create a guard from an infallible predicate.
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&D, &Event) -> bool + Send + Sync + 'static,
    {
        Guard {
            predicate: Box::new(move |data: &D, event: &Event| Ok(predicate(data, event))),
        }
    }

    /// Create a guard that can fail.
    ///
    /// A failing guard stops the session; it is never treated as `false`.
    ///
    /// # Example
    ///
    /// ```rust
    /// use statecharts::core::{Event, Guard, GuardError};
    ///
    /// let needs_amount = Guard::fallible(|_: &(), event: &Event| {
    ///     event.data["amount"]
    ///         .as_f64()
    ///         .map(|amount| amount > 0.0)
    ///         .ok_or_else(|| GuardError("amount missing".into()))
    /// });
    ///
    /// assert!(needs_amount.check(&(), &Event::new("PAY")).is_err());
    /// ```
    pub fn fallible<F>(predicate: F) -> Self
    where
        F: Fn(&D, &Event) -> Result<bool, GuardError> + Send + Sync + 'static,
    {
        Guard {
            predicate: Box::new(predicate),
        }
    }

    /// Evaluate the guard against the data bag and the current event.
    pub fn check(&self, data: &D, event: &Event) -> Result<bool, GuardError> {
        (self.predicate)(data, event)
    }
}

impl<D> fmt::Debug for Guard<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Guard(..)")
    }
}
