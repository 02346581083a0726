use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::SessionWorkspaces;
use crate::pool::{WorkspaceBackend, WorkspacePool};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkspaceMode {
    Pooled,
    Direct,
}

impl fmt::Display for WorkspaceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pooled => write!(f, "pooled"),
            Self::Direct => write!(f, "direct"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveWorkspace {
    pub hypothesis_id: String,
    pub path: PathBuf,
    pub mode: WorkspaceMode,
}

/// Hypothesis that fell back to a direct workspace because the pool could not serve it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DegradedWorkspace {
    pub hypothesis_id: String,
    pub reason: String,
}

/// Hypothesis left without any workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedWorkspace {
    pub hypothesis_id: String,
    pub error: String,
}

/// Source of per-session workspace sets.
///
/// Pooled slots are preferred; any pool failure falls back to a worktree
/// created directly under `worktrees_dir`. Each session gets its own
/// `SessionWorkspaces`, so sessions running side by side never see or tear
/// down each other's workspaces.
pub struct WorkspaceOrchestrator {
    pool: Option<Arc<WorkspacePool>>,
    backend: Arc<dyn WorkspaceBackend>,
    worktrees_dir: PathBuf,
    branch_prefix: String,
}

impl WorkspaceOrchestrator {
    pub fn pooled(pool: Arc<WorkspacePool>, worktrees_dir: PathBuf, branch_prefix: &str) -> Self {
        let backend = pool.backend();
        Self {
            pool: Some(pool),
            backend,
            worktrees_dir,
            branch_prefix: branch_prefix.to_string(),
        }
    }

    /// Orchestrator that never uses a pool.
    pub fn direct(
        backend: Arc<dyn WorkspaceBackend>,
        worktrees_dir: PathBuf,
        branch_prefix: &str,
    ) -> Self {
        Self {
            pool: None,
            backend,
            worktrees_dir,
            branch_prefix: branch_prefix.to_string(),
        }
    }

    pub fn pool(&self) -> Option<&Arc<WorkspacePool>> {
        self.pool.as_ref()
    }

    /// Empty workspace set for `session_id`.
    pub fn session(&self, session_id: &str) -> SessionWorkspaces {
        SessionWorkspaces::new(
            session_id,
            self.pool.clone(),
            Arc::clone(&self.backend),
            self.worktrees_dir.clone(),
            &self.branch_prefix,
        )
    }
}
