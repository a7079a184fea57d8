//! Build errors for documents.

use thiserror::Error;

/// One structural problem found while compiling a state tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentIssue {
    #[error("State id '{id}' is used more than once")]
    DuplicateStateId { id: String },

    #[error("State id '{id}' is reserved for the document root")]
    ReservedStateId { id: String },

    #[error("Transition in '{state}' targets unknown state '{target}'")]
    UnresolvedTarget { state: String, target: String },

    #[error("Initial target '{target}' of '{state}' does not exist")]
    UnresolvedInitial { state: String, target: String },

    #[error("Initial target '{target}' is not a descendant of '{state}'")]
    InitialNotDescendant { state: String, target: String },

    #[error("Targets {targets:?} of a transition in '{state}' cannot be active together")]
    IllegalTargetSet { state: String, targets: Vec<String> },

    #[error("Final state '{id}' cannot have child states")]
    FinalWithChildren { id: String },

    #[error("History state '{id}' cannot have child states")]
    HistoryWithChildren { id: String },

    #[error("State '{id}' is not compound and cannot declare initial targets")]
    InitialOnNonCompound { id: String },
}

/// Errors that can occur when building a document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("Invalid document: {}", describe(.0))]
    Invalid(Vec<DocumentIssue>),
}

impl BuildError {
    /// Every issue found, in the order the checks ran.
    pub fn issues(&self) -> &[DocumentIssue] {
        match self {
            BuildError::Invalid(issues) => issues,
        }
    }
}

fn describe(issues: &[DocumentIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
