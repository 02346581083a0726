use std::path::{Path, PathBuf};
use std::process::Output;

use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{FalsifyError, Result};

/// Entry from `git worktree list --porcelain`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorktreeEntry {
    pub path: PathBuf,
    pub head: Option<String>,
    pub branch: Option<String>,
}

pub struct GitRunner {
    working_dir: PathBuf,
}

impl GitRunner {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
        }
    }

    pub fn with_dir(&self, dir: &Path) -> Self {
        Self::new(dir)
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub async fn run(&self, args: &[&str]) -> Result<Output> {
        debug!(args = ?args, dir = %self.working_dir.display(), "Running git command");

        let output = Command::new("git")
            .args(args)
            .current_dir(&self.working_dir)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(args = ?args, stderr = %stderr, "Git command failed");
        }

        Ok(output)
    }

    pub async fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args).await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FalsifyError::Git(git2::Error::from_str(stderr.trim())));
        }

        Ok(output)
    }

    pub async fn head_commit(&self) -> Result<String> {
        let output = self.run_checked(&["rev-parse", "HEAD"]).await?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Add a detached worktree at `path` checked out at `rev`.
    pub async fn worktree_add_detached(&self, path: &Path, rev: &str) -> Result<()> {
        let path_str = path
            .to_str()
            .ok_or_else(|| FalsifyError::Other("Invalid path encoding".into()))?;

        let output = self
            .run(&["worktree", "add", "--detach", path_str, rev])
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FalsifyError::WorkspaceCreation {
                message: stderr.trim().to_string(),
                path: path.to_path_buf(),
            });
        }

        Ok(())
    }

    pub async fn worktree_remove(&self, path: &Path) -> Result<()> {
        let path_str = path
            .to_str()
            .ok_or_else(|| FalsifyError::Other("Invalid path encoding".into()))?;

        let output = self
            .run(&["worktree", "remove", "--force", path_str])
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FalsifyError::Git(git2::Error::from_str(stderr.trim())));
        }

        Ok(())
    }

    pub async fn worktree_prune(&self) -> Result<()> {
        self.run_checked(&["worktree", "prune"]).await?;
        Ok(())
    }

    pub async fn worktree_list(&self) -> Result<Vec<WorktreeEntry>> {
        let output = self.run_checked(&["worktree", "list", "--porcelain"]).await?;
        Ok(parse_worktree_list(&String::from_utf8_lossy(&output.stdout)))
    }

    /// Discard tracked changes and remove untracked files in this worktree.
    pub async fn reset_clean(&self) -> Result<()> {
        self.run_checked(&["reset", "--hard", "HEAD"]).await?;
        self.run_checked(&["clean", "-fd"]).await?;
        Ok(())
    }

    /// Resolve a path inside the git directory, e.g. `info/exclude`.
    pub async fn git_path(&self, name: &str) -> Result<PathBuf> {
        let output = self.run_checked(&["rev-parse", "--git-path", name]).await?;
        let path = PathBuf::from(String::from_utf8_lossy(&output.stdout).trim());
        Ok(if path.is_absolute() {
            path
        } else {
            self.working_dir.join(path)
        })
    }

    pub async fn is_clean(&self) -> Result<bool> {
        let output = self.run_checked(&["status", "--porcelain"]).await?;
        Ok(output.stdout.iter().all(|b| b.is_ascii_whitespace()))
    }
}

fn parse_worktree_list(stdout: &str) -> Vec<WorktreeEntry> {
    let mut entries = Vec::new();
    let mut current: Option<WorktreeEntry> = None;

    for line in stdout.lines() {
        if line.is_empty() {
            if let Some(entry) = current.take() {
                entries.push(entry);
            }
            continue;
        }

        if let Some(path) = line.strip_prefix("worktree ") {
            if let Some(entry) = current.take() {
                entries.push(entry);
            }
            current = Some(WorktreeEntry {
                path: PathBuf::from(path),
                ..Default::default()
            });
        } else if let Some(entry) = current.as_mut() {
            if let Some(head) = line.strip_prefix("HEAD ") {
                entry.head = Some(head.to_string());
            } else if let Some(branch) = line.strip_prefix("branch ") {
                entry.branch = Some(branch.to_string());
            }
        }
    }

    if let Some(entry) = current {
        entries.push(entry);
    }
    entries
}
