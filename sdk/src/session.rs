//! Question sessions
//!
//! A question session gathers requirement answers for a project before a plan
//! is generated. The orchestrator never mutates a session; it only reads the
//! collected answers of a completed one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use crate::errors::EngineError;
use crate::requirements::Requirements;
use crate::types::ProjectType;

/// One question, and the requirement key its answer feeds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionPattern {
    pub id: String,
    pub question: String,
    pub requirement_key: String,
    pub required: bool,
}

impl QuestionPattern {
    pub fn new(
        id: impl Into<String>,
        question: impl Into<String>,
        requirement_key: impl Into<String>,
        required: bool,
    ) -> Self {
        Self {
            id: id.into(),
            question: question.into(),
            requirement_key: requirement_key.into(),
            required,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Completed,
    Cancelled,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SessionStatus::Active => "active",
            SessionStatus::Completed => "completed",
            SessionStatus::Cancelled => "cancelled",
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionSession {
    pub id: String,
    pub project_id: String,
    pub project_type: ProjectType,
    pub patterns: Vec<QuestionPattern>,
    /// Answers keyed by pattern id
    pub answers: BTreeMap<String, Value>,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl QuestionSession {
    pub fn new(
        project_id: impl Into<String>,
        project_type: ProjectType,
        patterns: Vec<QuestionPattern>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            project_id: project_id.into(),
            project_type,
            patterns,
            answers: BTreeMap::new(),
            status: SessionStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    fn ensure_active(&self, to: SessionStatus) -> Result<(), EngineError> {
        if self.status != SessionStatus::Active {
            return Err(EngineError::transition("session", self.status, to));
        }
        Ok(())
    }

    pub fn answer(&mut self, pattern_id: &str, value: impl Into<Value>) -> Result<(), EngineError> {
        self.ensure_active(SessionStatus::Active)?;
        if !self.patterns.iter().any(|p| p.id == pattern_id) {
            return Err(EngineError::InvalidInput(format!(
                "unknown question '{}'",
                pattern_id
            )));
        }
        self.answers.insert(pattern_id.to_string(), value.into());
        self.updated_at = Utc::now();
        Ok(())
    }

    /// First unanswered question in pattern order.
    pub fn next_question(&self) -> Option<&QuestionPattern> {
        self.patterns
            .iter()
            .find(|p| !self.answers.contains_key(&p.id))
    }

    pub fn is_ready(&self) -> bool {
        self.patterns
            .iter()
            .filter(|p| p.required)
            .all(|p| self.answers.contains_key(&p.id))
    }

    pub fn complete(&mut self) -> Result<(), EngineError> {
        self.ensure_active(SessionStatus::Completed)?;
        if let Some(missing) = self
            .patterns
            .iter()
            .find(|p| p.required && !self.answers.contains_key(&p.id))
        {
            return Err(EngineError::InvalidInput(format!(
                "question '{}' is unanswered",
                missing.id
            )));
        }
        self.status = SessionStatus::Completed;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn cancel(&mut self) -> Result<(), EngineError> {
        self.ensure_active(SessionStatus::Cancelled)?;
        self.status = SessionStatus::Cancelled;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Collected answers mapped onto their requirement keys.
    pub fn requirements(&self) -> Requirements {
        self.patterns
            .iter()
            .filter_map(|p| {
                self.answers
                    .get(&p.id)
                    .map(|v| (p.requirement_key.clone(), v.clone()))
            })
            .collect()
    }
}
