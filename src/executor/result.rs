use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::ExecutionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestOutcome {
    /// Exit code 0: the defect did not reproduce.
    Pass,
    /// Non-zero exit: the defect reproduced.
    Fail,
    Timeout,
    Error,
}

impl fmt::Display for TestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
            Self::Timeout => "TIMEOUT",
            Self::Error => "ERROR",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestExecutionResult {
    pub hypothesis_id: String,
    pub outcome: TestOutcome,
    pub duration_ms: u64,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ExecutionError>,
    pub confidence: f64,
    /// Runs performed; more than one when repeated runs are enabled.
    #[serde(default = "default_runs")]
    pub runs: u32,
    /// Fraction of runs agreeing with `outcome`.
    #[serde(default = "default_consistency")]
    pub consistency: f64,
}

fn default_runs() -> u32 {
    1
}

fn default_consistency() -> f64 {
    1.0
}

impl TestExecutionResult {
    /// Result for a hypothesis that never produced a completed run.
    pub fn errored(hypothesis_id: impl Into<String>, error: ExecutionError) -> Self {
        let outcome = match error {
            ExecutionError::Timeout { .. } => TestOutcome::Timeout,
            _ => TestOutcome::Error,
        };
        Self {
            hypothesis_id: hypothesis_id.into(),
            outcome,
            duration_ms: 0,
            stdout: String::new(),
            stderr: String::new(),
            exit_code: None,
            workspace_path: None,
            error: Some(error),
            confidence: 0.0,
            runs: 0,
            consistency: default_consistency(),
        }
    }

    pub fn with_workspace(mut self, path: impl Into<PathBuf>) -> Self {
        self.workspace_path = Some(path.into());
        self
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.outcome, TestOutcome::Pass | TestOutcome::Fail)
    }

    pub fn was_cancelled(&self) -> bool {
        matches!(self.error, Some(ExecutionError::Cancelled))
    }
}
