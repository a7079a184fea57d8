//! Session configuration.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default bound on microsteps within a single macrostep.
pub const DEFAULT_MAX_MICROSTEPS: usize = 10_000;

/// Tunables for one session.
///
/// # Example
///
/// ```rust
/// use statecharts::session::SessionConfig;
///
/// let config = SessionConfig::from_json(r#"{ "name": "door", "max_microsteps": 50 }"#).unwrap();
///
/// assert_eq!(config.name, "door");
/// assert_eq!(config.max_microsteps, 50);
/// assert!(config.trace_configuration);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// The session's own id: `_self` routing target and event origin.
    pub name: String,
    /// A macrostep taking more microsteps than this fails the session.
    pub max_microsteps: usize,
    /// Emit the active configuration at debug level after each macrostep.
    pub trace_configuration: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            name: Uuid::new_v4().to_string(),
            max_microsteps: DEFAULT_MAX_MICROSTEPS,
            trace_configuration: true,
        }
    }
}

impl SessionConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn with_max_microsteps(mut self, limit: usize) -> Self {
        self.max_microsteps = limit;
        self
    }

    pub fn with_trace_configuration(mut self, enabled: bool) -> Self {
        self.trace_configuration = enabled;
        self
    }
}
