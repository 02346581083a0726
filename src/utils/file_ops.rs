use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, warn};

use crate::error::Result;

/// Sibling temp file unique to this write, still ending in `.tmp`.
fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    name.push(format!(".{}.{}.tmp", std::process::id(), &suffix[..8]));
    path.with_file_name(name)
}

/// Write `content` to `path` through a synced temp file and a rename.
///
/// Concurrent writers each use their own temp file, so the rename always
/// publishes one writer's complete content.
pub async fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let tmp_path = temp_path(path);
    fs::write(&tmp_path, content).await?;

    let sync_path = tmp_path.clone();
    match tokio::task::spawn_blocking(move || {
        std::fs::File::open(&sync_path).and_then(|file| file.sync_all())
    })
    .await
    {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "Failed to sync temp file to disk"),
        Err(e) => warn!(error = %e, "Failed to sync temp file to disk"),
    }

    fs::rename(&tmp_path, path).await?;
    debug!(path = %path.display(), "Atomic write completed");
    Ok(())
}

/// Remove `*.tmp` files left behind by writes interrupted before the rename.
pub async fn remove_interrupted_writes(dir: &Path) -> usize {
    let mut removed = 0;
    if let Ok(mut entries) = fs::read_dir(dir).await {
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "tmp") {
                debug!(path = %path.display(), "Removing interrupted write");
                if fs::remove_file(&path).await.is_ok() {
                    removed += 1;
                }
            }
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_atomic_replaces_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");

        write_atomic(&path, "{\"v\":1}").await.unwrap();
        write_atomic(&path, "{\"v\":2}").await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{\"v\":2}");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_temp_paths_are_unique_per_write() {
        let path = Path::new("/pool/.worktree_pool.json");
        let a = temp_path(path);
        let b = temp_path(path);

        assert_ne!(a, b);
        assert_eq!(a.parent(), path.parent());
        assert!(a.extension().is_some_and(|ext| ext == "tmp"));
    }

    #[tokio::test]
    async fn test_concurrent_writers_never_publish_partial_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("record.json");
        let contents: Vec<String> = (0..8)
            .map(|i| format!("{{\"writer\":{},\"pad\":\"{}\"}}", i, "x".repeat(64 * 1024)))
            .collect();

        let writes = contents.iter().map(|c| write_atomic(&path, c));
        for result in futures::future::join_all(writes).await {
            result.unwrap();
        }

        let published = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains(&published));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_remove_interrupted_writes() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.yaml.tmp"), "partial").unwrap();
        std::fs::write(dir.path().join("b.yaml"), "done").unwrap();

        assert_eq!(remove_interrupted_writes(dir.path()).await, 1);
        assert!(dir.path().join("b.yaml").exists());
    }
}
