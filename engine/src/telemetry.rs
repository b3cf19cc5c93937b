//! Telemetry and Observability
//!
//! Handles setting up `tracing-subscriber` for structured logging, and the
//! in-process telemetry sink that records the structured events components
//! emit (registration, plan creation, step start/finish, reviews). Project
//! log queries are answered from this sink.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the tracing subscriber with the given log level from config.
///
/// Priority: `RUST_LOG` env var > `log_level` parameter > default "info"
///
/// In debug builds: pretty-printed terminal output.
/// In release builds: JSON structured output with spans.
pub fn init_telemetry_with_level(log_level: &str) {
    let default_filter = format!("{},shipwright_engine={}", log_level, log_level);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&default_filter));

    #[cfg(debug_assertions)]
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().pretty().with_target(false))
            .try_init()
            .ok();
    }

    #[cfg(not(debug_assertions))]
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_current_span(true))
            .try_init()
            .ok();
    }
}

/// Initialize the tracing subscriber with default settings.
pub fn init_telemetry() {
    init_telemetry_with_level("info");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// What the event reports about the action it describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Started,
    Success,
    Failure,
    Info,
}

/// A structured telemetry record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub timestamp: DateTime<Utc>,
    pub level: EventLevel,
    pub outcome: Outcome,
    /// Emitting component (`planner`, `orchestrator`, ...)
    pub source: String,
    pub action: String,
    pub project_id: Option<String>,
    pub context: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

impl TelemetryEvent {
    pub fn new(source: impl Into<String>, action: impl Into<String>, outcome: Outcome) -> Self {
        let level = match outcome {
            Outcome::Failure => EventLevel::Warn,
            _ => EventLevel::Info,
        };
        Self {
            timestamp: Utc::now(),
            level,
            outcome,
            source: source.into(),
            action: action.into(),
            project_id: None,
            context: None,
            metadata: None,
        }
    }

    pub fn project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn level(mut self, level: EventLevel) -> Self {
        self.level = level;
        self
    }
}

/// Destination for telemetry events. Recording must never fail the caller.
pub trait TelemetrySink: Send + Sync {
    fn record(&self, event: TelemetryEvent);

    /// Most recent `limit` events for a project, oldest first.
    fn recent_for_project(&self, project_id: &str, limit: usize) -> Vec<TelemetryEvent>;

    /// Drop everything buffered.
    fn clear(&self) {}
}

/// Bounded in-memory sink that mirrors every event to `tracing`
pub struct MemorySink {
    capacity: usize,
    events: Mutex<VecDeque<TelemetryEvent>>,
}

impl MemorySink {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            events: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
        }
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<TelemetryEvent> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl TelemetrySink for MemorySink {
    fn record(&self, event: TelemetryEvent) {
        let project = event.project_id.as_deref().unwrap_or("-");
        match event.level {
            EventLevel::Debug => {
                tracing::debug!(source = %event.source, project, "{}", event.action)
            }
            EventLevel::Info => {
                tracing::info!(source = %event.source, project, "{}", event.action)
            }
            EventLevel::Warn => {
                tracing::warn!(source = %event.source, project, "{}", event.action)
            }
            EventLevel::Error => {
                tracing::error!(source = %event.source, project, "{}", event.action)
            }
        }

        // A poisoned buffer is still a usable buffer
        let mut events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        if events.len() >= self.capacity {
            events.pop_front();
        }
        events.push_back(event);
    }

    fn recent_for_project(&self, project_id: &str, limit: usize) -> Vec<TelemetryEvent> {
        let events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        let mut matching: Vec<TelemetryEvent> = events
            .iter()
            .rev()
            .filter(|e| e.project_id.as_deref() == Some(project_id))
            .take(limit)
            .cloned()
            .collect();
        matching.reverse();
        matching
    }

    fn clear(&self) {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}
