use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{ActiveWorkspace, DegradedWorkspace, FailedWorkspace, WorkspaceMode};
use crate::hypothesis::Hypothesis;
use crate::pool::{WorkspaceBackend, WorkspacePool};

/// Workspace whose acquire or creation has started but not finished.
enum InFlight {
    Pooled(String),
    Direct(PathBuf),
}

/// One workspace per hypothesis for a single session.
///
/// Pool owners are namespaced by session id, so two sessions testing the
/// same hypothesis id get different slots. Anything still held on drop is
/// handed back: pooled slots are released immediately, direct workspaces are
/// destroyed from a background task.
pub struct SessionWorkspaces {
    session_id: String,
    pool: Option<Arc<WorkspacePool>>,
    backend: Arc<dyn WorkspaceBackend>,
    worktrees_dir: PathBuf,
    branch_prefix: String,
    active: HashMap<String, ActiveWorkspace>,
    in_flight: Option<InFlight>,
    degraded: Vec<DegradedWorkspace>,
    failed: Vec<FailedWorkspace>,
}

impl SessionWorkspaces {
    pub(crate) fn new(
        session_id: &str,
        pool: Option<Arc<WorkspacePool>>,
        backend: Arc<dyn WorkspaceBackend>,
        worktrees_dir: PathBuf,
        branch_prefix: &str,
    ) -> Self {
        Self {
            session_id: session_id.to_string(),
            pool,
            backend,
            worktrees_dir,
            branch_prefix: branch_prefix.to_string(),
            active: HashMap::new(),
            in_flight: None,
            degraded: Vec::new(),
            failed: Vec::new(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Pool owner key for a hypothesis of this session.
    pub fn owner_of(&self, hypothesis_id: &str) -> String {
        format!("{}/{}", self.session_id, hypothesis_id)
    }

    /// Direct workspace path, suffixed with the session's random tag.
    pub fn direct_path(&self, hypothesis_id: &str) -> PathBuf {
        let tag = self
            .session_id
            .rsplit('_')
            .next()
            .unwrap_or(&self.session_id);
        self.worktrees_dir
            .join(format!("{}-{}-{}", self.branch_prefix, hypothesis_id, tag))
    }

    /// Workspace path per hypothesis id. Hypotheses missing from the map
    /// are listed in `failed()`.
    pub async fn create_workspaces(&mut self, hypotheses: &[Hypothesis]) -> HashMap<String, PathBuf> {
        let mut workspaces = HashMap::new();
        for hypothesis in hypotheses {
            if let Some(path) = self.create_one(&hypothesis.id).await {
                workspaces.insert(hypothesis.id.clone(), path);
            }
        }
        info!(
            session = %self.session_id,
            requested = hypotheses.len(),
            created = workspaces.len(),
            degraded = self.degraded.len(),
            "Workspaces ready"
        );
        workspaces
    }

    async fn create_one(&mut self, hypothesis_id: &str) -> Option<PathBuf> {
        if let Some(existing) = self.path_for(hypothesis_id) {
            return Some(existing);
        }

        if let Some(pool) = self.pool.clone() {
            let owner = self.owner_of(hypothesis_id);
            self.in_flight = Some(InFlight::Pooled(owner.clone()));
            let acquired = pool.acquire(&owner).await;
            self.in_flight = None;
            match acquired {
                Ok(path) => {
                    self.track(hypothesis_id, path.clone(), WorkspaceMode::Pooled);
                    return Some(path);
                }
                Err(e) if e.allows_fallback() => {
                    warn!(id = hypothesis_id, error = %e, "Pool unavailable, creating workspace directly");
                    self.degraded.push(DegradedWorkspace {
                        hypothesis_id: hypothesis_id.to_string(),
                        reason: e.to_string(),
                    });
                }
                Err(e) => {
                    self.record_failure(hypothesis_id, e.to_string());
                    return None;
                }
            }
        }

        let path = self.direct_path(hypothesis_id);
        self.in_flight = Some(InFlight::Direct(path.clone()));
        let created = self.backend.create(&path).await;
        self.in_flight = None;
        match created {
            Ok(()) => {
                debug!(id = hypothesis_id, path = %path.display(), "Created direct workspace");
                self.track(hypothesis_id, path.clone(), WorkspaceMode::Direct);
                Some(path)
            }
            Err(e) => {
                self.record_failure(hypothesis_id, e.to_string());
                None
            }
        }
    }

    fn track(&mut self, hypothesis_id: &str, path: PathBuf, mode: WorkspaceMode) {
        self.active.insert(
            hypothesis_id.to_string(),
            ActiveWorkspace {
                hypothesis_id: hypothesis_id.to_string(),
                path,
                mode,
            },
        );
    }

    fn record_failure(&mut self, hypothesis_id: &str, error: String) {
        warn!(id = hypothesis_id, error = %error, "No workspace for hypothesis");
        self.failed.push(FailedWorkspace {
            hypothesis_id: hypothesis_id.to_string(),
            error,
        });
    }

    fn release_pooled(&self, owner: &str) -> bool {
        self.pool.as_ref().is_some_and(|pool| pool.release(owner))
    }

    /// Give back the workspaces of `ids`: pooled ones are released, direct ones destroyed.
    pub async fn teardown(&mut self, ids: &[String]) -> usize {
        let mut torn_down = 0;
        for id in ids {
            let Some(entry) = self.active.get(id).cloned() else {
                continue;
            };
            match entry.mode {
                WorkspaceMode::Pooled => {
                    self.active.remove(id);
                    if self.release_pooled(&self.owner_of(id)) {
                        torn_down += 1;
                    }
                }
                WorkspaceMode::Direct => {
                    // Stays tracked until destroyed, so a drop mid-teardown still cleans it up.
                    match self.backend.destroy(&entry.path).await {
                        Ok(()) => torn_down += 1,
                        Err(e) => warn!(
                            id = %entry.hypothesis_id,
                            path = %entry.path.display(),
                            error = %e,
                            "Failed to remove direct workspace"
                        ),
                    }
                    self.active.remove(id);
                }
            }
        }

        if let Some(pool) = &self.pool
            && let Err(e) = pool.persist().await
        {
            warn!(error = %e, "Failed to persist pool state after teardown");
        }

        debug!(session = %self.session_id, requested = ids.len(), torn_down, "Tore down workspaces");
        torn_down
    }

    pub async fn teardown_all(&mut self) -> usize {
        let ids: Vec<String> = self.active.keys().cloned().collect();
        self.teardown(&ids).await
    }

    /// Degraded-mode notes for this session.
    pub fn degraded(&self) -> Vec<DegradedWorkspace> {
        self.degraded.clone()
    }

    pub fn failed(&self) -> Vec<FailedWorkspace> {
        self.failed.clone()
    }

    /// Workspaces currently held, sorted by hypothesis id.
    pub fn active(&self) -> Vec<ActiveWorkspace> {
        let mut active: Vec<ActiveWorkspace> = self.active.values().cloned().collect();
        active.sort_by(|a, b| a.hypothesis_id.cmp(&b.hypothesis_id));
        active
    }

    pub fn path_for(&self, hypothesis_id: &str) -> Option<PathBuf> {
        self.active
            .get(hypothesis_id)
            .map(|entry| entry.path.clone())
    }
}

impl Drop for SessionWorkspaces {
    fn drop(&mut self) {
        if self.active.is_empty() && self.in_flight.is_none() {
            return;
        }

        let mut direct = Vec::new();
        let mut released = 0usize;
        let entries: Vec<ActiveWorkspace> = self.active.drain().map(|(_, entry)| entry).collect();
        for entry in entries {
            match entry.mode {
                WorkspaceMode::Pooled => {
                    if self.release_pooled(&self.owner_of(&entry.hypothesis_id)) {
                        released += 1;
                    }
                }
                WorkspaceMode::Direct => direct.push(entry.path),
            }
        }
        match self.in_flight.take() {
            Some(InFlight::Pooled(owner)) => {
                if self.release_pooled(&owner) {
                    released += 1;
                }
            }
            Some(InFlight::Direct(path)) => direct.push(path),
            None => {}
        }

        warn!(
            session = %self.session_id,
            released,
            direct = direct.len(),
            "Session ended before teardown, handing workspaces back"
        );

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            if !direct.is_empty() {
                warn!(count = direct.len(), "No runtime left to remove direct workspaces");
            }
            return;
        };
        let pool = self.pool.clone();
        let backend = Arc::clone(&self.backend);
        handle.spawn(async move {
            for path in direct {
                if let Err(e) = backend.destroy(&path).await {
                    warn!(path = %path.display(), error = %e, "Failed to remove direct workspace");
                }
            }
            if let Some(pool) = pool
                && let Err(e) = pool.persist().await
            {
                warn!(error = %e, "Failed to persist pool state after dropped session");
            }
        });
    }
}
