//! Temporary git repositories with a single initial commit.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;

pub struct TestRepo {
    pub dir: TempDir,
}

impl TestRepo {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("temp dir");
        let repo = Self { dir };
        repo.git(&["init", "-q"]);
        repo.write(".git/info/exclude", "/.worktrees/\n/.falsify/\n");
        repo.write("README.md", "# fixture\n");
        repo.write("src/value.txt", "42\n");
        repo.commit("initial commit");
        repo
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Canonical root, matching what git reports for worktrees.
    pub fn root(&self) -> PathBuf {
        self.dir.path().canonicalize().expect("canonical root")
    }

    pub fn write(&self, relative: &str, content: &str) {
        let path = self.path().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent");
        }
        fs::write(path, content).expect("write file");
    }

    pub fn commit(&self, message: &str) {
        self.git(&["add", "-A"]);
        self.git(&[
            "-c",
            "user.email=tests@example.com",
            "-c",
            "user.name=Tests",
            "-c",
            "commit.gpgsign=false",
            "commit",
            "-q",
            "-m",
            message,
        ]);
    }

    pub fn head(&self) -> String {
        self.git(&["rev-parse", "HEAD"])
    }

    pub fn git(&self, args: &[&str]) -> String {
        let output = Command::new("git")
            .args(args)
            .current_dir(self.path())
            .output()
            .expect("git is installed");
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    }
}

/// Write a hypotheses file in the JSON shape the CLI accepts.
pub fn write_hypotheses(dir: &Path, bug: &str, hypotheses: serde_json::Value) -> PathBuf {
    let path = dir.join("hypotheses.json");
    let doc = serde_json::json!({
        "bug_description": bug,
        "hypotheses": hypotheses,
    });
    fs::write(&path, serde_json::to_string_pretty(&doc).expect("json")).expect("write");
    path
}
