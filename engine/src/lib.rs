//! Shipwright Engine Library
//!
//! This library provides the orchestration core of Shipwright: projects,
//! plans and the agents that plan, execute, review and validate them.
//! It is used by the main binary, the API server and integration tests.

/// Configuration management module
pub mod config;

/// Message bus for lifecycle notifications
pub mod message_bus;

/// Agent registry
pub mod agent;

/// Planning, scheduling and execution
pub mod conductor;

/// Telemetry and Observability
pub mod telemetry;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;

pub use conductor::Orchestrator;
