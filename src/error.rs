use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure of a single test run.
///
/// Carried as data inside `TestExecutionResult`; the executor never
/// propagates it as an `Err`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionError {
    Timeout { duration_secs: u64 },
    Launch { message: String },
    Cancelled,
    MissingWorkspace { hypothesis_id: String },
    Setup { message: String },
}

impl ExecutionError {
    pub fn timeout(duration: Duration) -> Self {
        Self::Timeout {
            duration_secs: duration.as_secs(),
        }
    }

    pub fn launch(message: impl Into<String>) -> Self {
        Self::Launch {
            message: message.into(),
        }
    }

    /// Errors caused by the run being cut short rather than by the test itself.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Cancelled)
    }
}

impl std::fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout { duration_secs } => {
                write!(f, "Test exceeded {}s timeout", duration_secs)
            }
            Self::Launch { message } => write!(f, "Failed to launch test: {}", message),
            Self::Cancelled => write!(f, "Cancelled before completion"),
            Self::MissingWorkspace { hypothesis_id } => {
                write!(f, "No workspace assigned to hypothesis {}", hypothesis_id)
            }
            Self::Setup { message } => write!(f, "Environment setup failed: {}", message),
        }
    }
}

impl std::error::Error for ExecutionError {}

#[derive(Error, Debug)]
pub enum FalsifyError {
    #[error("Hypothesis {id} rejected: {}", violations.join("; "))]
    Validation { id: String, violations: Vec<String> },

    #[error("Hypothesis not found: {0}")]
    HypothesisNotFound(String),

    #[error("Invalid status transition for {id}: {from} → {to} (allowed: {allowed})")]
    InvalidStatusTransition {
        id: String,
        from: String,
        to: String,
        allowed: String,
    },

    #[error("Failed to create workspace at {}: {message}", path.display())]
    WorkspaceCreation { message: String, path: PathBuf },

    #[error("Failed to reset workspace at {}: {message}", path.display())]
    WorkspaceReset { message: String, path: PathBuf },

    #[error("Workspace pool exhausted: {allocated} of {max_size} slots in use")]
    PoolExhausted { allocated: usize, max_size: usize },

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("Not a git repository: {}", .0.display())]
    NotInGitRepo(PathBuf),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml_bw::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("{0}")]
    Other(String),
}

impl FalsifyError {
    /// Errors that should send the orchestrator down the direct-creation path
    /// instead of failing the hypothesis outright.
    pub fn allows_fallback(&self) -> bool {
        matches!(
            self,
            Self::PoolExhausted { .. } | Self::WorkspaceCreation { .. } | Self::WorkspaceReset { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, FalsifyError>;
