//! Error types for vswitch.

use crate::pipeline::RunState;
use thiserror::Error;

/// Result type alias using vswitch's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for vswitch operations.
#[derive(Error, Debug)]
pub enum Error {
    /// The factory name is not registered.
    #[error("unknown stage kind: {0}")]
    UnknownStageKind(String),

    /// A configuration key or value is not valid for the stage.
    #[error("stage '{stage}' rejected property '{key}': {reason}")]
    ConfigRejected {
        /// Stage name.
        stage: String,
        /// Property key.
        key: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// A stage with this name is already owned by the graph.
    #[error("duplicate stage name: {0}")]
    DuplicateStage(String),

    /// The engine refused to take the stage.
    #[error("failed to register stage '{stage}': {reason}")]
    RegistrationFailed {
        /// Stage name.
        stage: String,
        /// Engine-provided reason.
        reason: String,
    },

    /// No stage with this name or id exists.
    #[error("stage not found: {0}")]
    StageNotFound(String),

    /// The stage has no port with this name.
    #[error("stage '{stage}' has no port '{port}'")]
    PortNotFound {
        /// Stage name.
        stage: String,
        /// Port name.
        port: String,
    },

    /// The port already participates in a different link.
    #[error("port '{stage}:{port}' is already linked")]
    PortBusy {
        /// Stage name.
        stage: String,
        /// Port name.
        port: String,
    },

    /// The link could not be established.
    #[error("link rejected: {0}")]
    LinkRejected(String),

    /// Segment or topology structure is invalid.
    #[error("invalid segment: {0}")]
    InvalidSegment(String),

    /// The active port is not one of the two switchable ports.
    #[error("'{0}' is not one of the switchable ports")]
    UnknownActivePort(String),

    /// The run state machine does not allow this transition.
    #[error("invalid run state transition: {from:?} -> {to:?}")]
    InvalidTransition {
        /// Current state.
        from: RunState,
        /// Requested state.
        to: RunState,
    },

    /// Execution engine failure.
    #[error("engine error: {0}")]
    Engine(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for a [`Error::ConfigRejected`].
    pub fn rejected(
        stage: impl Into<String>,
        key: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::ConfigRejected {
            stage: stage.into(),
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error belongs to graph construction (fatal at startup).
    pub fn is_construction(&self) -> bool {
        matches!(
            self,
            Error::UnknownStageKind(_)
                | Error::ConfigRejected { .. }
                | Error::DuplicateStage(_)
                | Error::RegistrationFailed { .. }
                | Error::InvalidSegment(_)
        )
    }
}
