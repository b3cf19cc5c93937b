//! Requirement questioner
//!
//! Opens question sessions whose answers feed the planner's requirement map.

use std::sync::Arc;

use crate::telemetry::{Outcome, TelemetryEvent, TelemetrySink};
use sdk::agent::{names, Agent, QuestioningAgent};
use sdk::requirements::COMPLEXITY_KEY;
use sdk::session::{QuestionPattern, QuestionSession};
use sdk::types::ProjectType;

/// Questions asked for each project type, in order
pub fn patterns_for(project_type: ProjectType) -> Vec<QuestionPattern> {
    match project_type {
        ProjectType::Website => vec![
            QuestionPattern::new(
                "website_cms",
                "Will editors manage content through a CMS?",
                "cms",
                true,
            ),
            QuestionPattern::new(
                "website_analytics",
                "Should visitor analytics be collected?",
                "analytics",
                true,
            ),
            QuestionPattern::new(
                "website_complexity",
                "How complex is the site (high, low)?",
                COMPLEXITY_KEY,
                false,
            ),
        ],
        ProjectType::Automation => vec![
            QuestionPattern::new(
                "automation_monitoring",
                "Does the workflow need monitoring and alerting?",
                "monitoring",
                true,
            ),
            QuestionPattern::new(
                "automation_notifications",
                "Should runs send notifications?",
                "notifications",
                true,
            ),
            QuestionPattern::new(
                "automation_complexity",
                "How complex is the workflow (high, low)?",
                COMPLEXITY_KEY,
                false,
            ),
        ],
    }
}

pub struct Questioner {
    telemetry: Arc<dyn TelemetrySink>,
}

impl Questioner {
    pub fn new(telemetry: Arc<dyn TelemetrySink>) -> Self {
        Self { telemetry }
    }
}

impl Agent for Questioner {
    fn name(&self) -> &str {
        names::QUESTIONER
    }

    fn description(&self) -> &str {
        "Gathers project requirements through question sessions"
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn as_questioner(&self) -> Option<&dyn QuestioningAgent> {
        Some(self)
    }
}

impl QuestioningAgent for Questioner {
    fn start_session(&self, project_id: &str, project_type: ProjectType) -> QuestionSession {
        let session = QuestionSession::new(project_id, project_type, patterns_for(project_type));
        self.telemetry.record(
            TelemetryEvent::new(names::QUESTIONER, "session_started", Outcome::Started)
                .project(project_id)
                .context(session.id.clone()),
        );
        session
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::MemorySink;

    #[test]
    fn test_session_answers_map_to_gates() {
        let q = Questioner::new(Arc::new(MemorySink::default()));
        let mut session = q.start_session("p-1", ProjectType::Automation);

        session.answer("automation_monitoring", "yes").unwrap();
        session.answer("automation_notifications", false).unwrap();
        session.complete().unwrap();

        let reqs = session.requirements();
        assert!(reqs.is_enabled("monitoring"));
        assert!(!reqs.is_enabled("notifications"));
    }

    #[test]
    fn test_every_type_asks_complexity() {
        for t in ProjectType::ALL {
            assert!(patterns_for(t)
                .iter()
                .any(|p| p.requirement_key == COMPLEXITY_KEY && !p.required));
        }
    }
}
