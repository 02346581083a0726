//! In-memory workspace backend that materialises plain directories.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use falsify_pilot::error::{FalsifyError, Result};
use falsify_pilot::pool::WorkspaceBackend;

pub struct FakeBackend {
    base: PathBuf,
    pub creates: AtomicUsize,
    pub resets: AtomicUsize,
    pub destroys: AtomicUsize,
    fail_create: AtomicBool,
    fail_reset: Mutex<HashSet<PathBuf>>,
}

impl FakeBackend {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self {
            base: base.into(),
            creates: AtomicUsize::new(0),
            resets: AtomicUsize::new(0),
            destroys: AtomicUsize::new(0),
            fail_create: AtomicBool::new(false),
            fail_reset: Mutex::new(HashSet::new()),
        }
    }

    pub fn fail_creates(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn fail_reset_of(&self, path: impl Into<PathBuf>) {
        self.fail_reset.lock().insert(path.into());
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkspaceBackend for FakeBackend {
    fn base_repo(&self) -> &Path {
        &self.base
    }

    async fn create(&self, path: &Path) -> Result<()> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(FalsifyError::WorkspaceCreation {
                message: "backend refused to create".into(),
                path: path.to_path_buf(),
            });
        }
        tokio::fs::create_dir_all(path).await?;
        self.creates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn reset(&self, path: &Path) -> Result<()> {
        if self.fail_reset.lock().remove(path) {
            return Err(FalsifyError::WorkspaceReset {
                message: "backend refused to reset".into(),
                path: path.to_path_buf(),
            });
        }
        if !path.is_dir() {
            return Err(FalsifyError::WorkspaceReset {
                message: "workspace missing".into(),
                path: path.to_path_buf(),
            });
        }
        // Mimic `git clean`: drop everything inside the workspace.
        let mut entries = tokio::fs::read_dir(path).await?;
        while let Some(entry) = entries.next_entry().await? {
            let p = entry.path();
            if p.is_dir() {
                tokio::fs::remove_dir_all(&p).await?;
            } else {
                tokio::fs::remove_file(&p).await?;
            }
        }
        self.resets.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn destroy(&self, path: &Path) -> Result<()> {
        if path.exists() {
            tokio::fs::remove_dir_all(path).await?;
        }
        self.destroys.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
