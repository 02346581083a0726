use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, info, warn};

use super::book::{Claim, PoolBook};
use super::{PoolRecord, SlotId, SlotState, WorkspaceBackend, WorkspaceSlot};
use crate::config::PoolConfig;
use crate::error::{FalsifyError, Result};
use crate::utils::ratio_to_percent;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolStats {
    pub total: usize,
    pub available: usize,
    pub allocated: usize,
    pub max_size: usize,
    pub capacity_used_percent: f64,
}

/// Bounded set of reusable workspaces.
///
/// Acquire never blocks: it hands out a free slot, creates one while under
/// `max_size`, or fails with `PoolExhausted`. Slow backend work runs after the
/// bookkeeping lock is released, on a slot that is already claimed.
pub struct WorkspacePool {
    backend: Arc<dyn WorkspaceBackend>,
    pool_dir: PathBuf,
    book: Mutex<PoolBook>,
    persist_lock: tokio::sync::Mutex<()>,
}

impl WorkspacePool {
    pub fn new(backend: Arc<dyn WorkspaceBackend>, pool_dir: PathBuf, max_size: usize) -> Self {
        Self {
            backend,
            pool_dir,
            book: Mutex::new(PoolBook::new(max_size)),
            persist_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Restore the pool from its record in `pool_dir`, or start empty.
    pub async fn load(
        backend: Arc<dyn WorkspaceBackend>,
        pool_dir: PathBuf,
        config: &PoolConfig,
    ) -> Self {
        let pool = Self::new(backend, pool_dir, config.max_size);
        let Some(record) = PoolRecord::read(&pool.record_path()).await else {
            return pool;
        };

        if record.base_repo != pool.backend.base_repo() {
            warn!(
                recorded = %record.base_repo.display(),
                actual = %pool.backend.base_repo().display(),
                "Pool record belongs to another repository, discarding"
            );
            return pool;
        }

        let exists = |id: &SlotId| pool.slot_path(*id).is_dir();
        let available: Vec<SlotId> = record.available_ids.iter().copied().filter(exists).collect();
        let allocated: Vec<(String, SlotId)> = record
            .allocated
            .iter()
            .filter(|(_, id)| exists(*id))
            .map(|(owner, id)| (owner.clone(), *id))
            .collect();
        let dropped = record.available_ids.len() + record.allocated.len()
            - available.len()
            - allocated.len();
        if dropped > 0 {
            warn!(dropped, "Dropped pool slots whose directories no longer exist");
        }

        let max_size = config.max_size.max(record.max_size);
        let mut book = PoolBook::restore(max_size, available, allocated, record.next_index);
        if config.reclaim_on_load {
            let reclaimed = book.reclaim_all();
            if reclaimed > 0 {
                info!(reclaimed, "Reclaimed allocations from a previous run");
            }
        }

        info!(
            total = book.total(),
            available = book.available_count(),
            max_size,
            "Loaded workspace pool"
        );
        *pool.book.lock() = book;
        pool
    }

    pub fn base_repo(&self) -> &Path {
        self.backend.base_repo()
    }

    pub fn backend(&self) -> Arc<dyn WorkspaceBackend> {
        Arc::clone(&self.backend)
    }

    pub fn record_path(&self) -> PathBuf {
        PoolRecord::path_in(&self.pool_dir)
    }

    pub fn slot_path(&self, id: SlotId) -> PathBuf {
        self.pool_dir.join(id.to_string())
    }

    /// Workspace for `owner`, reset to the base state.
    pub async fn acquire(&self, owner: &str) -> Result<PathBuf> {
        let claim = self.book.lock().claim(owner)?;
        let id = claim.slot();
        let path = self.slot_path(id);

        match claim {
            Claim::Held(_) => {
                debug!(slot = %id, owner, "Owner already holds workspace");
                Ok(path)
            }
            Claim::Reuse(_) => match self.backend.reset(&path).await {
                Ok(()) => {
                    info!(slot = %id, owner, "Reused pooled workspace");
                    Ok(path)
                }
                Err(e) => {
                    warn!(slot = %id, error = %e, "Reset failed, recreating workspace");
                    self.recreate(owner, id, &path, e).await
                }
            },
            Claim::Create(_) => match self.backend.create(&path).await {
                Ok(()) => {
                    info!(slot = %id, owner, path = %path.display(), "Created pooled workspace");
                    Ok(path)
                }
                Err(e) => {
                    self.book.lock().abandon(owner);
                    warn!(slot = %id, error = %e, "Failed to create pooled workspace");
                    Err(match e {
                        FalsifyError::WorkspaceCreation { .. } => e,
                        other => FalsifyError::WorkspaceCreation {
                            message: other.to_string(),
                            path,
                        },
                    })
                }
            },
        }
    }

    async fn recreate(
        &self,
        owner: &str,
        id: SlotId,
        path: &Path,
        reset_error: FalsifyError,
    ) -> Result<PathBuf> {
        if let Err(e) = self.backend.destroy(path).await {
            debug!(slot = %id, error = %e, "Destroy before recreate failed");
        }
        match self.backend.create(path).await {
            Ok(()) => {
                info!(slot = %id, owner, "Recreated pooled workspace");
                Ok(path.to_path_buf())
            }
            Err(e) => {
                self.book.lock().abandon(owner);
                warn!(slot = %id, error = %e, "Recreate failed, dropping slot from pool");
                Err(FalsifyError::WorkspaceReset {
                    message: format!("{}; recreate failed: {}", reset_error, e),
                    path: path.to_path_buf(),
                })
            }
        }
    }

    /// Return the owner's workspace to the pool. Never destroys it.
    pub fn release(&self, owner: &str) -> bool {
        match self.book.lock().release(owner) {
            Some(id) => {
                debug!(slot = %id, owner, "Released workspace");
                true
            }
            None => {
                debug!(owner, "Release for owner without a workspace");
                false
            }
        }
    }

    /// Pre-create up to `n` available slots. Returns how many were created.
    pub async fn expand(&self, n: usize) -> usize {
        let mut created = 0;
        for _ in 0..n {
            let Some(id) = self.book.lock().reserve() else {
                break;
            };
            let path = self.slot_path(id);
            match self.backend.create(&path).await {
                Ok(()) => {
                    self.book.lock().settle(id, true);
                    created += 1;
                }
                Err(e) => {
                    self.book.lock().settle(id, false);
                    warn!(slot = %id, error = %e, "Failed to create workspace while expanding");
                    break;
                }
            }
        }
        info!(requested = n, created, "Expanded workspace pool");
        created
    }

    /// Destroy up to `n` available slots. Allocated slots are never touched.
    pub async fn shrink(&self, n: usize) -> usize {
        let mut removed = 0;
        for _ in 0..n {
            let Some(id) = self.book.lock().take_available() else {
                break;
            };
            if let Err(e) = self.backend.destroy(&self.slot_path(id)).await {
                warn!(slot = %id, error = %e, "Failed to destroy workspace while shrinking");
            }
            removed += 1;
        }
        info!(requested = n, removed, "Shrank workspace pool");
        removed
    }

    /// Destroy every slot and delete the record.
    pub async fn cleanup_all(&self) -> Result<usize> {
        let _guard = self.persist_lock.lock().await;
        let ids = self.book.lock().drain();

        for id in &ids {
            if let Err(e) = self.backend.destroy(&self.slot_path(*id)).await {
                warn!(slot = %id, error = %e, "Failed to destroy workspace during cleanup");
            }
        }

        let record = self.record_path();
        if record.exists() {
            fs::remove_file(&record).await?;
        }
        info!(destroyed = ids.len(), "Cleaned up workspace pool");
        Ok(ids.len())
    }

    /// Write the pool record atomically.
    pub async fn persist(&self) -> Result<()> {
        let _guard = self.persist_lock.lock().await;
        let record = {
            let book = self.book.lock();
            PoolRecord {
                pool_dir: self.pool_dir.clone(),
                base_repo: self.backend.base_repo().to_path_buf(),
                max_size: book.max_size(),
                available_ids: book.available_ids(),
                allocated: book.allocations().into_iter().collect::<BTreeMap<_, _>>(),
                total_created: book.total(),
                next_index: book.next_index(),
                updated_at: Some(Utc::now()),
            }
        };
        record.write(&self.record_path()).await?;
        debug!(total = record.total_created, "Persisted pool record");
        Ok(())
    }

    pub fn stats(&self) -> PoolStats {
        let book = self.book.lock();
        let max_size = book.max_size();
        let ratio = if max_size == 0 {
            0.0
        } else {
            book.total() as f64 / max_size as f64
        };
        PoolStats {
            total: book.total(),
            available: book.available_count(),
            allocated: book.allocated_count(),
            max_size,
            capacity_used_percent: ratio_to_percent(ratio),
        }
    }

    pub fn slots(&self) -> Vec<WorkspaceSlot> {
        let (available, allocated) = {
            let book = self.book.lock();
            (book.available_ids(), book.allocations())
        };

        let mut slots: Vec<WorkspaceSlot> = available
            .into_iter()
            .map(|id| WorkspaceSlot {
                id,
                path: self.slot_path(id),
                state: SlotState::Available,
                owner: None,
            })
            .chain(allocated.into_iter().map(|(owner, id)| WorkspaceSlot {
                id,
                path: self.slot_path(id),
                state: SlotState::Allocated,
                owner: Some(owner),
            }))
            .collect();
        slots.sort_by_key(|slot| slot.id);
        slots
    }

    pub fn path_of(&self, owner: &str) -> Option<PathBuf> {
        self.book.lock().slot_of(owner).map(|id| self.slot_path(id))
    }

    pub fn max_size(&self) -> usize {
        self.book.lock().max_size()
    }
}
