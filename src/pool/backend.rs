use std::path::{Path, PathBuf};

use async_trait::async_trait;
use git2::Repository;
use tokio::fs;
use tracing::{debug, warn};

use crate::error::{FalsifyError, Result};
use crate::git::GitRunner;

/// Filesystem operations behind a pooled or direct workspace.
#[async_trait]
pub trait WorkspaceBackend: Send + Sync {
    /// Repository the workspaces are checked out from.
    fn base_repo(&self) -> &Path;

    /// Materialise a clean workspace at `path`.
    async fn create(&self, path: &Path) -> Result<()>;

    /// Return an existing workspace to its clean base state.
    async fn reset(&self, path: &Path) -> Result<()>;

    async fn destroy(&self, path: &Path) -> Result<()>;
}

/// Workspaces as detached git worktrees of one repository.
pub struct GitWorktreeBackend {
    repo_path: PathBuf,
    base_ref: String,
}

impl GitWorktreeBackend {
    /// Open `repo_path`, failing with `NotInGitRepo` when it is not a git checkout.
    pub fn open(repo_path: impl Into<PathBuf>) -> Result<Self> {
        let repo_path = repo_path.into();
        let repo = Repository::open(&repo_path)
            .map_err(|_| FalsifyError::NotInGitRepo(repo_path.clone()))?;
        if repo.is_bare() {
            return Err(FalsifyError::NotInGitRepo(repo_path));
        }
        Ok(Self {
            repo_path,
            base_ref: String::from("HEAD"),
        })
    }

    fn git(&self) -> GitRunner {
        GitRunner::new(&self.repo_path)
    }

    /// Commit the base ref points at in the main checkout.
    async fn resolve_base(&self) -> Result<String> {
        let output = self
            .git()
            .run_checked(&["rev-parse", "--verify", self.base_ref.as_str()])
            .await?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn checkout_base(&self, path: &Path) -> Result<()> {
        let base = self.resolve_base().await?;
        let git = self.git().with_dir(path);
        git.run_checked(&["checkout", "--force", "--detach", base.as_str()])
            .await?;
        git.reset_clean().await
    }
}

#[async_trait]
impl WorkspaceBackend for GitWorktreeBackend {
    fn base_repo(&self) -> &Path {
        &self.repo_path
    }

    async fn create(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        if path.exists() {
            // Leftover from a crashed run; git refuses to add over it.
            debug!(path = %path.display(), "Removing stale workspace directory");
            let _ = self.git().worktree_remove(path).await;
            if path.exists() {
                fs::remove_dir_all(path).await?;
            }
            let _ = self.git().worktree_prune().await;
        }
        let base = self.resolve_base().await?;
        self.git().worktree_add_detached(path, &base).await
    }

    async fn reset(&self, path: &Path) -> Result<()> {
        if !path.is_dir() {
            return Err(FalsifyError::WorkspaceReset {
                message: "workspace directory is missing".into(),
                path: path.to_path_buf(),
            });
        }
        self.checkout_base(path)
            .await
            .map_err(|e| FalsifyError::WorkspaceReset {
                message: e.to_string(),
                path: path.to_path_buf(),
            })
    }

    async fn destroy(&self, path: &Path) -> Result<()> {
        if let Err(e) = self.git().worktree_remove(path).await {
            debug!(path = %path.display(), error = %e, "Git worktree remove failed, using force remove");
            if path.exists()
                && let Err(e) = fs::remove_dir_all(path).await
            {
                warn!(path = %path.display(), error = %e, "Force remove failed");
                return Err(e.into());
            }
            let _ = self.git().worktree_prune().await;
        }
        Ok(())
    }
}
