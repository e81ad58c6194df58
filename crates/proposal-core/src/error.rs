//! Error types for the proposal editor
//!
//! [`EditorError`] is the only error a caller of
//! [`ProposalEditor`](crate::ProposalEditor) sees. Collaborator failures keep
//! their own enums so the failure source stays visible.

use crate::conflict::{GenerationTarget, WorkflowState};
use proposal_tree::{NodeId, SectionId, TreeError};
use std::path::PathBuf;

/// Main editor error type
#[derive(Debug, thiserror::Error)]
pub enum EditorError {
    /// Referenced section or task is not in the current snapshot
    #[error("{0} not found")]
    NotFound(NodeId),

    /// Re-parent would make a section its own ancestor
    #[error("moving section {section} under {new_parent} would create a cycle")]
    CyclicMove {
        /// Section being moved
        section: SectionId,
        /// Requested parent
        new_parent: SectionId,
    },

    /// Backend write failed; local state was rolled back or refetched
    #[error("persistence failed: {0}")]
    PersistenceFailure(#[from] PersistenceError),

    /// Generation service failed; the tree was not touched
    #[error("generation failed: {0}")]
    GenerationFailure(#[from] GenerationError),

    /// Conflict workflow was cancelled by the user
    #[error("cancelled by user")]
    UserCancelled,

    /// No task under the section has generated content
    #[error("section {0} has no generated task content to integrate")]
    NothingToIntegrate(SectionId),

    /// Conflict workflow misuse
    #[error("workflow error: {0}")]
    Workflow(#[from] ConflictError),

    /// Local tree rejected the change
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Configuration could not be loaded
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl EditorError {
    /// Whether re-invoking the same operation may succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::PersistenceFailure(e) => e.is_transient(),
            Self::GenerationFailure(e) => e.is_transient(),
            _ => false,
        }
    }

    /// Everything except a user cancel is a failure
    #[inline]
    #[must_use]
    pub fn is_failure(&self) -> bool {
        !matches!(self, Self::UserCancelled)
    }

    /// Whether local state was reverted before this error surfaced
    #[inline]
    #[must_use]
    pub fn rolled_back(&self) -> bool {
        matches!(self, Self::PersistenceFailure(_))
    }
}

impl From<TreeError> for EditorError {
    fn from(err: TreeError) -> Self {
        match err {
            TreeError::NotFound(id) => Self::NotFound(id),
            TreeError::CyclicMove {
                section,
                new_parent,
            } => Self::CyclicMove {
                section,
                new_parent,
            },
            other => Self::InvalidState(other.to_string()),
        }
    }
}

/// Persistence backend failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PersistenceError {
    /// Backend refused the write
    #[error(
        "rejected{}: {message}",
        .code.as_deref().map(|c| format!(" ({c})")).unwrap_or_default()
    )]
    Rejected {
        /// Backend error code, if any
        code: Option<String>,
        /// Backend message
        message: String,
    },

    /// Backend could not be reached
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// Call exceeded the configured timeout
    #[error("persistence timed out after {secs}s")]
    Timeout {
        /// Timeout that elapsed
        secs: u64,
    },
}

impl PersistenceError {
    /// Shorthand for a rejection without code
    #[must_use]
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            code: None,
            message: message.into(),
        }
    }

    /// Whether a retry may succeed
    #[inline]
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout { .. })
    }
}

/// Generation service failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    /// Non-success HTTP status
    #[error("service returned status {status}: {message}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Body text or error field
        message: String,
    },

    /// Successful status with an empty body
    #[error("empty response from generation service")]
    EmptyResponse,

    /// Body was not the expected JSON
    #[error("unreadable response: {0}")]
    InvalidPayload(String),

    /// Payload carried an `error` field or reported no success
    #[error("service error: {0}")]
    Service(String),

    /// Required field absent from an otherwise valid payload
    #[error("response missing `{0}`")]
    MissingField(&'static str),

    /// Transport could not complete the request
    #[error("transport error: {0}")]
    Transport(String),

    /// Call exceeded the configured timeout
    #[error("generation timed out after {secs}s")]
    Timeout {
        /// Timeout that elapsed
        secs: u64,
    },
}

impl GenerationError {
    /// Whether a retry may succeed
    #[inline]
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::Transport(_) | Self::Timeout { .. } | Self::EmptyResponse => true,
            _ => false,
        }
    }
}

/// Conflict workflow misuse
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConflictError {
    /// State machine does not allow this step
    #[error("illegal workflow transition: {from:?} -> {to:?}")]
    IllegalTransition {
        /// Current state
        from: WorkflowState,
        /// Requested state
        to: WorkflowState,
    },

    /// A resolution arrived with no pending conflict
    #[error("no conflict awaiting a choice for {0}")]
    NoPendingConflict(GenerationTarget),

    /// Target already has a workflow in flight
    #[error("generation already in progress for {0}")]
    Busy(GenerationTarget),
}

/// Configuration loading failure
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("cannot read {}: {source}", .path.display())]
    Io {
        /// File path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// File is not valid TOML for this schema
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
}
