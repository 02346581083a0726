use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, info};

use super::FalsificationReport;
use crate::error::{FalsifyError, Result};
use crate::utils::{remove_interrupted_writes, write_atomic};

/// Durable storage for session reports.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn save(&self, report: &FalsificationReport) -> Result<()>;

    async fn load(&self, session_id: &str) -> Result<FalsificationReport>;

    /// Stored session ids, oldest first.
    async fn list(&self) -> Result<Vec<String>>;
}

/// One YAML file per session: `<dir>/<prefix>_session_<id>.yaml`.
pub struct FileSessionStore {
    sessions_dir: PathBuf,
    prefix: String,
}

impl FileSessionStore {
    pub fn new(sessions_dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            sessions_dir: sessions_dir.into(),
            prefix: prefix.into(),
        }
    }

    pub async fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.sessions_dir).await?;
        let removed = remove_interrupted_writes(&self.sessions_dir).await;
        if removed > 0 {
            info!(removed, "Removed interrupted session writes");
        }
        Ok(())
    }

    pub fn sessions_dir(&self) -> &Path {
        &self.sessions_dir
    }

    fn file_prefix(&self) -> String {
        format!("{}_session_", self.prefix)
    }

    pub fn session_path(&self, session_id: &str) -> PathBuf {
        self.sessions_dir
            .join(format!("{}{}.yaml", self.file_prefix(), session_id))
    }

    fn checked_path(&self, session_id: &str) -> Result<PathBuf> {
        let valid = !session_id.is_empty()
            && session_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
            && !session_id.contains("..");
        if !valid {
            return Err(FalsifyError::SessionNotFound(session_id.to_string()));
        }
        Ok(self.session_path(session_id))
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn save(&self, report: &FalsificationReport) -> Result<()> {
        let path = self.checked_path(&report.session_id)?;
        fs::create_dir_all(&self.sessions_dir).await?;
        let content = serde_yaml_bw::to_string(report)?;
        write_atomic(&path, &content).await?;
        debug!(session = %report.session_id, path = %path.display(), "Saved session report");
        Ok(())
    }

    async fn load(&self, session_id: &str) -> Result<FalsificationReport> {
        let path = self.checked_path(session_id)?;
        if !path.exists() {
            return Err(FalsifyError::SessionNotFound(session_id.to_string()));
        }
        let content = fs::read_to_string(&path).await?;
        Ok(serde_yaml_bw::from_str(&content)?)
    }

    async fn list(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        let Ok(mut entries) = fs::read_dir(&self.sessions_dir).await else {
            return Ok(ids);
        };
        let prefix = self.file_prefix();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(id) = name
                .strip_prefix(&prefix)
                .and_then(|rest| rest.strip_suffix(".yaml"))
            {
                ids.push(id.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}
