//! Agent Registry
//!
//! Holds named, polymorphic workers. Lookup and registration only; the
//! orchestrator decides what a worker is used for.

use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::telemetry::{Outcome, TelemetryEvent, TelemetrySink};
use sdk::agent::Agent;
use sdk::errors::EngineError;

/// Registry of agents keyed by their unique name, in registration order
pub struct AgentRegistry {
    agents: RwLock<Vec<Arc<dyn Agent>>>,
    telemetry: Arc<dyn TelemetrySink>,
}

impl AgentRegistry {
    pub fn new(telemetry: Arc<dyn TelemetrySink>) -> Self {
        Self {
            agents: RwLock::new(Vec::new()),
            telemetry,
        }
    }

    /// Store `agent` under its name.
    ///
    /// Re-using a name silently replaces the previous agent in its original
    /// position. Returns `true` when an agent was replaced.
    pub async fn register(&self, agent: Arc<dyn Agent>) -> bool {
        let name = agent.name().to_string();
        let version = agent.version().to_string();

        let replaced = {
            let mut agents = self.agents.write().await;
            match agents.iter().position(|a| a.name() == name) {
                Some(idx) => {
                    agents[idx] = agent;
                    true
                }
                None => {
                    agents.push(agent);
                    false
                }
            }
        };

        debug!("Registered agent '{}' v{} (replaced: {})", name, version, replaced);
        self.telemetry.record(
            TelemetryEvent::new("registry", "agent_registered", Outcome::Success)
                .context(name)
                .metadata(serde_json::json!({ "version": version, "replaced": replaced })),
        );

        replaced
    }

    pub async fn lookup(&self, name: &str) -> Result<Arc<dyn Agent>, EngineError> {
        self.agents
            .read()
            .await
            .iter()
            .find(|a| a.name() == name)
            .cloned()
            .ok_or_else(|| EngineError::AgentNotFound(name.to_string()))
    }

    /// All agents in registration order
    pub async fn list(&self) -> Vec<Arc<dyn Agent>> {
        self.agents.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.agents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Release every registered agent
    pub async fn clear(&self) {
        self.agents.write().await.clear();
    }
}
