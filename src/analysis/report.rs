use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::executor::{ParallelDecision, TestExecutionResult};
use crate::hypothesis::Hypothesis;
use crate::workspace::DegradedWorkspace;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NextAction {
    /// Exactly one hypothesis explains the defect.
    ImplementFix { hypothesis_id: String },
    /// Several hypotheses survive; tests do not yet discriminate between them.
    NarrowFurther { hypothesis_ids: Vec<String> },
    /// Nothing explains the defect.
    RegenerateHypotheses,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendedAction {
    pub action: NextAction,
    pub investigate_inconclusive: bool,
}

impl fmt::Display for RecommendedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.action {
            NextAction::ImplementFix { hypothesis_id } => {
                write!(f, "implement a fix for {}", hypothesis_id)?
            }
            NextAction::NarrowFurther { .. } => {
                write!(f, "narrow further, hypotheses are not yet discriminating")?
            }
            NextAction::RegenerateHypotheses => {
                write!(f, "regenerate hypotheses, none explain the defect")?
            }
        }
        if self.investigate_inconclusive {
            write!(f, "; investigate inconclusive cases")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedHypothesis {
    pub id: String,
    pub violations: Vec<String>,
}

/// Session inputs the analyzer does not derive from results.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    pub session_id: String,
    pub bug_description: String,
    pub parallel: Option<ParallelDecision>,
    pub degraded: Vec<DegradedWorkspace>,
    pub rejected: Vec<RejectedHypothesis>,
    pub deferred: Vec<String>,
}

/// Outcome of one falsification session. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FalsificationReport {
    pub session_id: String,
    pub bug_description: String,
    pub total_hypotheses: usize,
    pub falsified: Vec<Hypothesis>,
    pub supported: Vec<Hypothesis>,
    pub inconclusive: Vec<Hypothesis>,
    pub recommended_action: String,
    pub next_action: RecommendedAction,
    pub next_steps: Vec<String>,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel: Option<ParallelDecision>,
    #[serde(default)]
    pub degraded: Vec<DegradedWorkspace>,
    #[serde(default)]
    pub rejected: Vec<RejectedHypothesis>,
    #[serde(default)]
    pub deferred: Vec<String>,
    #[serde(default)]
    pub test_results: Vec<TestExecutionResult>,
    pub created_at: DateTime<Utc>,
}

impl FalsificationReport {
    pub fn is_degraded(&self) -> bool {
        !self.degraded.is_empty()
    }

    pub fn result_for(&self, hypothesis_id: &str) -> Option<&TestExecutionResult> {
        self.test_results
            .iter()
            .find(|r| r.hypothesis_id == hypothesis_id)
    }

    pub fn ids(list: &[Hypothesis]) -> Vec<&str> {
        list.iter().map(|h| h.id.as_str()).collect()
    }
}
