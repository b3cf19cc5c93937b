//! Error types and handling
//!
//! This module provides the error type shared by every Shipwright component.
//! All errors implement the `ErrorExt` trait which provides user-friendly
//! hints, the coarse taxonomy kind, the HTTP-style status code used by the
//! transport envelope, and whether the error is recoverable.
//!
//! Step failures, review failures and validation failures are deliberately
//! absent: those are recorded as data on the step/plan and never surface as
//! an `Err` past the orchestrator.

use thiserror::Error;

/// Coarse error taxonomy used by transports and callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Project, plan, agent or step identity unknown
    NotFound,
    /// Missing or malformed caller input, unknown project type
    InvalidInput,
    /// The requested transition is not legal from the entity's current state
    Conflict,
    /// A required agent is not registered, or the orchestrator is shut down
    AgentUnavailable,
    /// Anything the caller cannot fix
    Internal,
}

/// Trait for Shipwright error extensions
pub trait ErrorExt {
    /// Returns a user-friendly hint for the error
    ///
    /// The hint is safe to display to end users and never contains
    /// internal implementation details.
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors can be retried once the operator fixes the
    /// environment (for example by registering a missing agent).
    fn is_recoverable(&self) -> bool;

    /// Returns the taxonomy kind
    fn kind(&self) -> ErrorKind;

    /// Returns the HTTP-style status code for transports
    fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::NotFound => 404,
            ErrorKind::InvalidInput => 400,
            ErrorKind::Conflict => 409,
            ErrorKind::AgentUnavailable => 503,
            ErrorKind::Internal => 500,
        }
    }
}

/// Main engine error type
///
/// # Examples
///
/// ```
/// use sdk::errors::{EngineError, ErrorExt, ErrorKind};
///
/// let error = EngineError::ProjectNotFound("p-1".to_string());
/// assert_eq!(error.kind(), ErrorKind::NotFound);
/// assert_eq!(error.status_code(), 404);
/// assert!(!error.is_recoverable());
///
/// let missing = EngineError::AgentUnavailable("planner".to_string());
/// assert!(missing.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum EngineError {
    // Lookup errors
    #[error("Project not found: {0}")]
    ProjectNotFound(String),

    #[error("Plan not found: {0}")]
    PlanNotFound(String),

    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("Step not found: {0}")]
    StepNotFound(String),

    // Input errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unknown project type: {0}")]
    UnknownProjectType(String),

    #[error("Invalid {entity} transition: {from} -> {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    // Availability errors
    #[error("Agent unavailable: {0}")]
    AgentUnavailable(String),

    #[error("Orchestrator has been shut down")]
    ShutDown,

    // Internal errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Shorthand for an illegal state transition
    pub fn transition(
        entity: &'static str,
        from: impl std::fmt::Display,
        to: impl std::fmt::Display,
    ) -> Self {
        Self::InvalidTransition {
            entity,
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

impl ErrorExt for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            Self::ProjectNotFound(_) => "No project exists with that id",
            Self::PlanNotFound(_) => "No execution plan exists. Generate one first",
            Self::AgentNotFound(_) => "No agent is registered under that name",
            Self::StepNotFound(_) => "No step exists with that id",

            Self::InvalidInput(_) => "Check the request fields and try again",
            Self::UnknownProjectType(_) => "Supported project types are website and automation",
            Self::InvalidTransition { .. } => "The project or plan is not in a state that allows this",

            Self::AgentUnavailable(_) => "Register the required agent and try again",
            Self::ShutDown => "The orchestrator is shutting down",

            Self::Config(_) => "Check your config.toml file for errors",
            Self::Execution(_) => "Plan execution failed unexpectedly",
            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        matches!(self, Self::AgentUnavailable(_) | Self::Io(_))
    }

    fn kind(&self) -> ErrorKind {
        match self {
            Self::ProjectNotFound(_)
            | Self::PlanNotFound(_)
            | Self::AgentNotFound(_)
            | Self::StepNotFound(_) => ErrorKind::NotFound,

            Self::InvalidInput(_) | Self::UnknownProjectType(_) => ErrorKind::InvalidInput,

            Self::InvalidTransition { .. } => ErrorKind::Conflict,

            Self::AgentUnavailable(_) | Self::ShutDown => ErrorKind::AgentUnavailable,

            Self::Config(_) | Self::Execution(_) | Self::Io(_) => ErrorKind::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_is_404_and_final() {
        for err in [
            EngineError::ProjectNotFound("p".into()),
            EngineError::PlanNotFound("p".into()),
            EngineError::AgentNotFound("a".into()),
        ] {
            assert_eq!(err.status_code(), 404);
            assert!(!err.is_recoverable());
        }
    }

    #[test]
    fn test_input_errors_are_400() {
        assert_eq!(EngineError::InvalidInput("x".into()).status_code(), 400);
        assert_eq!(
            EngineError::UnknownProjectType("mobile".into()).status_code(),
            400
        );
    }

    #[test]
    fn test_transition_message() {
        let err = EngineError::transition("project", "completed", "active");
        assert_eq!(
            err.to_string(),
            "Invalid project transition: completed -> active"
        );
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn test_agent_unavailable_names_agent() {
        let err = EngineError::AgentUnavailable("planner".into());
        assert!(err.to_string().contains("planner"));
        assert_eq!(err.status_code(), 503);
    }
}
