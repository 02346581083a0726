use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, warn};

use super::SlotId;
use crate::error::Result;
use crate::utils::write_atomic;

pub const RECORD_FILE: &str = ".worktree_pool.json";

/// Durable snapshot of the pool, stored in the pool directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolRecord {
    pub pool_dir: PathBuf,
    pub base_repo: PathBuf,
    pub max_size: usize,
    pub available_ids: Vec<SlotId>,
    /// Owner hypothesis id to slot.
    pub allocated: BTreeMap<String, SlotId>,
    pub total_created: usize,
    #[serde(default)]
    pub next_index: u32,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl PoolRecord {
    pub fn path_in(pool_dir: &Path) -> PathBuf {
        pool_dir.join(RECORD_FILE)
    }

    /// Read the record, treating a missing or unreadable file as absent.
    pub async fn read(path: &Path) -> Option<Self> {
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No pool record, starting fresh");
                return None;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read pool record, starting fresh");
                return None;
            }
        };

        match serde_json::from_str(&content) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Corrupt pool record, starting fresh");
                None
            }
        }
    }

    pub async fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(self)?;
        write_atomic(path, &content).await
    }
}
