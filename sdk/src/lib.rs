//! Shipwright SDK
//!
//! Shared vocabulary for Shipwright components: the project/plan/step model,
//! the agent capability and role traits, worker results, the error taxonomy
//! and the transport envelope. Used by the engine, the API server and any
//! out-of-tree agent implementation.

/// Agent capability trait and worker roles
pub mod agent;

/// Transport envelope
pub mod envelope;

/// Error types and handling
pub mod errors;

/// Worker results (execution, review, validation)
pub mod reports;

/// Requirement maps and complexity scaling
pub mod requirements;

/// Question sessions
pub mod session;

/// Project, plan and step types
pub mod types;

// Re-export commonly used types
pub use agent::{
    names, Agent, AgentHealth, AgentInfo, ExecutionAgent, HealthStatus, PlanningAgent,
    QuestioningAgent, ReviewAgent, ValidationAgent,
};
pub use envelope::ApiResponse;
pub use errors::{EngineError, ErrorExt, ErrorKind};
pub use reports::{
    ReviewResult, StepResult, ValidationReport, REVIEW_PASS_SCORE, VALIDATION_PASS_SCORE,
};
pub use requirements::{Complexity, Requirements};
pub use session::{QuestionPattern, QuestionSession, SessionStatus};
pub use types::{
    ExecutionPlan, ExecutionStep, PlanStatus, Project, ProjectStatus, ProjectType, StepStatus,
    StepType,
};
