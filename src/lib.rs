//! Statecharts: a hierarchical state machine runtime with SCXML semantics
//!
//! The crate keeps a pure core apart from an imperative shell. Documents are
//! compiled once into an immutable tree and shared between any number of
//! sessions; sessions own everything that changes.
//!
//! # Core Concepts
//!
//! - **Document**: the resolved state tree with document order, ancestry and
//!   default-entry transitions precomputed
//! - **Session**: one running instance with its configuration, queues,
//!   history table and data bag
//! - **Content**: the small action language (`assign`, `send`, `raise`,
//!   `log`, `script`) run on entry, exit and transitions
//! - **Invoke**: child sessions started on entry and cancelled on exit
//!
//! # Example
//!
//! ```rust
//! use statecharts::builder::{history, state, transition, Document};
//! use statecharts::core::Event;
//! use statecharts::session::Session;
//!
//! let doc = Document::from_states(vec![
//!     state("init").transition(transition("NEXT").to("parent")),
//!     state("parent")
//!         .child(history("h"))
//!         .child(state("first").transition(transition("SECOND").to("second")))
//!         .child(state("second"))
//!         .transition(transition("LEAVE").to("away")),
//!     state("away").transition(transition("RETURN").to("h")),
//! ])
//! .unwrap();
//!
//! let mut session: Session<()> = Session::new(doc).unwrap();
//! session.start(()).unwrap();
//!
//! for name in ["NEXT", "SECOND", "LEAVE", "RETURN"] {
//!     session.send(Event::new(name)).unwrap();
//! }
//! session.run_pending().unwrap();
//!
//! assert_eq!(session.configuration(), vec!["parent", "second"]);
//! ```

pub mod builder;
pub mod content;
pub mod core;
pub mod session;

// Re-export commonly used types
pub use builder::{BuildError, Document};
pub use content::{Command, Hooks, Lens};
pub use core::{Event, Guard};
pub use session::{Registry, Session, SessionConfig, SessionError, SessionHandle};
