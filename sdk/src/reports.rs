//! Results returned by workers
//!
//! Workers never write shared state. They hand one of these back and the
//! orchestrator decides what it means for the step, plan and project.

use serde::{Deserialize, Serialize};

/// Minimum review score for a step to pass
pub const REVIEW_PASS_SCORE: u8 = 80;

/// Minimum validation score for a plan to pass
pub const VALIDATION_PASS_SCORE: u8 = 85;

/// Outcome of executing one step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub step_id: String,
    pub success: bool,
    pub error: Option<String>,
    /// Names of the artifacts the work unit produced
    pub artifacts: Vec<String>,
    pub duration_ms: u64,
}

impl StepResult {
    pub fn succeeded(step_id: impl Into<String>, artifacts: Vec<String>, duration_ms: u64) -> Self {
        Self {
            step_id: step_id.into(),
            success: true,
            error: None,
            artifacts,
            duration_ms,
        }
    }

    pub fn failed(step_id: impl Into<String>, error: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            step_id: step_id.into(),
            success: false,
            error: Some(error.into()),
            artifacts: Vec::new(),
            duration_ms,
        }
    }
}

/// Outcome of reviewing one completed step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewResult {
    pub step_id: String,
    pub score: u8,
    pub passed: bool,
    pub issues: Vec<String>,
}

impl ReviewResult {
    /// Build a result from a score; pass/fail follows [`REVIEW_PASS_SCORE`].
    pub fn from_score(step_id: impl Into<String>, score: u8, issues: Vec<String>) -> Self {
        let score = score.min(100);
        Self {
            step_id: step_id.into(),
            score,
            passed: score >= REVIEW_PASS_SCORE,
            issues,
        }
    }
}

/// Completeness verdict for a whole plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub plan_id: String,
    pub project_id: String,
    pub score: u8,
    pub passed: bool,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
    pub required_completed: usize,
    pub required_total: usize,
}

impl ValidationReport {
    pub fn is_passing(score: u8) -> bool {
        score >= VALIDATION_PASS_SCORE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_review_threshold_boundary() {
        assert!(ReviewResult::from_score("s", 80, vec![]).passed);
        assert!(!ReviewResult::from_score("s", 79, vec![]).passed);
        assert_eq!(ReviewResult::from_score("s", 250, vec![]).score, 100);
    }

    #[test]
    fn test_validation_threshold_boundary() {
        assert!(ValidationReport::is_passing(85));
        assert!(!ValidationReport::is_passing(84));
    }
}
