//! Message Bus for lifecycle notifications
//!
//! The MessageBus provides a pub/sub pattern so observers (transports, CLIs,
//! tests) can follow project, plan and step transitions without coupling to
//! the orchestrator. It uses bounded channels to prevent unbounded memory
//! growth and supports both specific event subscriptions and a global "All"
//! subscription.
//!
//! Publishing never waits: a subscriber whose channel is full or closed
//! misses the event.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

use sdk::types::{PlanStatus, ProjectStatus, StepStatus};

/// Channel buffer size for bounded channels
const CHANNEL_BUFFER_SIZE: usize = 100;

/// Event types that can be published on the message bus
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum EventType {
    ProjectCreated,
    ProjectStatusChanged,
    PlanGenerated,
    StepStarted,
    StepFinished,
    PlanFinished,
    AgentRegistered,
    ShuttingDown,
    /// Subscribe to all event types
    All,
}

/// Events that can be published on the message bus
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    ProjectCreated {
        project_id: String,
    },
    ProjectStatusChanged {
        project_id: String,
        from: ProjectStatus,
        to: ProjectStatus,
    },
    PlanGenerated {
        project_id: String,
        plan_id: String,
    },
    StepStarted {
        plan_id: String,
        step_id: String,
    },
    StepFinished {
        plan_id: String,
        step_id: String,
        status: StepStatus,
    },
    PlanFinished {
        project_id: String,
        plan_id: String,
        status: PlanStatus,
    },
    AgentRegistered {
        name: String,
    },
    ShuttingDown,
}

impl Event {
    /// Get the event type for this event
    pub fn event_type(&self) -> EventType {
        match self {
            Event::ProjectCreated { .. } => EventType::ProjectCreated,
            Event::ProjectStatusChanged { .. } => EventType::ProjectStatusChanged,
            Event::PlanGenerated { .. } => EventType::PlanGenerated,
            Event::StepStarted { .. } => EventType::StepStarted,
            Event::StepFinished { .. } => EventType::StepFinished,
            Event::PlanFinished { .. } => EventType::PlanFinished,
            Event::AgentRegistered { .. } => EventType::AgentRegistered,
            Event::ShuttingDown => EventType::ShuttingDown,
        }
    }
}

/// Message bus for pub/sub communication between components
pub struct MessageBus {
    /// Map of event types to lists of subscribers
    /// Each subscriber gets a bounded channel with CHANNEL_BUFFER_SIZE capacity
    channels: Arc<Mutex<HashMap<EventType, Vec<mpsc::Sender<Event>>>>>,
}

impl MessageBus {
    /// Create a new MessageBus
    pub fn new() -> Self {
        Self {
            channels: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Subscribe to a specific event type, or EventType::All for all events
    pub async fn subscribe(&self, event_type: EventType) -> mpsc::Receiver<Event> {
        let (tx, rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
        let mut channels = self.channels.lock().await;
        channels.entry(event_type).or_default().push(tx);
        rx
    }

    /// Publish an event to all subscribers of its type and of EventType::All.
    ///
    /// Closed subscribers are pruned.
    pub async fn publish(&self, event: Event) {
        let mut channels = self.channels.lock().await;
        let event_type = event.event_type();

        for key in [event_type, EventType::All] {
            if let Some(subscribers) = channels.get_mut(&key) {
                subscribers.retain(|tx| match tx.try_send(event.clone()) {
                    Ok(()) => true,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        tracing::debug!("Subscriber lagging, dropped {:?}", key);
                        true
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => false,
                });
            }
        }
    }

    /// Number of live subscriptions across all event types
    pub async fn subscriber_count(&self) -> usize {
        self.channels.lock().await.values().map(Vec::len).sum()
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}
