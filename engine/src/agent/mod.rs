//! Agent registration
//!
//! Workers (planner, executor, reviewer, validator, questioner) are registered
//! by name and looked up by the orchestrator when an operation needs them.

pub mod registry;

pub use registry::AgentRegistry;
