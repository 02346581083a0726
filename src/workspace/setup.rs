use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::debug;

use crate::error::Result;
use crate::executor::{RUNNER_DIR, runner_script_path};
use crate::hypothesis::Hypothesis;
use crate::utils::shell_quote;

/// Per-hypothesis metadata written next to the runner script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerConfig {
    pub hypothesis_id: String,
    pub description: String,
    pub test_strategy: String,
    pub expected_behavior: String,
    pub estimated_test_secs: f64,
    pub workspace: PathBuf,
    pub created_at: DateTime<Utc>,
}

pub fn runner_config_path(workspace: &Path, hypothesis_id: &str) -> PathBuf {
    workspace
        .join(RUNNER_DIR)
        .join(format!("config_{}.json", hypothesis_id))
}

/// Shell script that runs the hypothesis's test strategy inside `workspace`.
///
/// Every interpolated value is single-quoted, and the strategy itself is
/// passed to `eval` as one quoted word.
pub fn render_runner_script(workspace: &Path, hypothesis: &Hypothesis) -> String {
    let workspace = workspace.to_string_lossy();
    let mut script = String::from("#!/bin/sh\n");
    script.push_str(&format!("HYPOTHESIS_ID={}\n", shell_quote(&hypothesis.id)));
    script.push_str(&format!(
        "HYPOTHESIS_DESCRIPTION={}\n",
        shell_quote(&hypothesis.description)
    ));
    script.push_str(&format!(
        "EXPECTED_BEHAVIOR={}\n",
        shell_quote(&hypothesis.expected_behavior)
    ));
    script.push_str("export HYPOTHESIS_ID HYPOTHESIS_DESCRIPTION EXPECTED_BEHAVIOR\n");
    script.push_str(&format!("cd {} || exit 125\n", shell_quote(&workspace)));
    script.push_str(&format!("eval {}\n", shell_quote(&hypothesis.test_strategy)));
    script
}

/// Write the runner script and its JSON config into the workspace.
pub async fn setup_environment(workspace: &Path, hypothesis: &Hypothesis) -> Result<PathBuf> {
    fs::create_dir_all(workspace.join(RUNNER_DIR)).await?;

    let script_path = runner_script_path(workspace, &hypothesis.id);
    fs::write(&script_path, render_runner_script(workspace, hypothesis)).await?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&script_path, std::fs::Permissions::from_mode(0o755)).await?;
    }

    let config = RunnerConfig {
        hypothesis_id: hypothesis.id.clone(),
        description: hypothesis.description.clone(),
        test_strategy: hypothesis.test_strategy.clone(),
        expected_behavior: hypothesis.expected_behavior.clone(),
        estimated_test_secs: hypothesis.estimated_test_secs,
        workspace: workspace.to_path_buf(),
        created_at: Utc::now(),
    };
    fs::write(
        runner_config_path(workspace, &hypothesis.id),
        serde_json::to_string_pretty(&config)?,
    )
    .await?;

    debug!(id = %hypothesis.id, script = %script_path.display(), "Test environment ready");
    Ok(script_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_setup_writes_script_and_config() {
        let dir = TempDir::new().unwrap();
        let h = Hypothesis::new("H1", "cache is stale", "test -f marker").with_expected("marker exists");

        let script = setup_environment(dir.path(), &h).await.unwrap();
        assert!(script.ends_with(".falsification/test_H1.sh"));

        let config: RunnerConfig = serde_json::from_str(
            &std::fs::read_to_string(runner_config_path(dir.path(), "H1")).unwrap(),
        )
        .unwrap();
        assert_eq!(config.test_strategy, "test -f marker");
        assert_eq!(config.workspace, dir.path());
    }

    #[tokio::test]
    async fn test_injected_metacharacters_stay_inert() {
        let dir = TempDir::new().unwrap();
        let h = Hypothesis::new(
            "H2",
            "quote ' breaks $(touch pwned-desc) `touch pwned-tick`",
            "echo \"$HYPOTHESIS_DESCRIPTION\"",
        )
        .with_expected("'; touch pwned-expected; '");

        let script = setup_environment(dir.path(), &h).await.unwrap();
        let output = std::process::Command::new("sh")
            .arg(&script)
            .current_dir(dir.path())
            .output()
            .unwrap();

        assert!(output.status.success());
        assert_eq!(
            String::from_utf8_lossy(&output.stdout).trim_end(),
            h.description
        );
        for marker in ["pwned-desc", "pwned-tick", "pwned-expected"] {
            assert!(!dir.path().join(marker).exists(), "{} was created", marker);
        }
    }

    #[tokio::test]
    async fn test_script_propagates_exit_status() {
        let dir = TempDir::new().unwrap();
        let h = Hypothesis::new("H3", "d", "exit 7");
        let script = setup_environment(dir.path(), &h).await.unwrap();

        let status = std::process::Command::new("sh").arg(&script).status().unwrap();
        assert_eq!(status.code(), Some(7));
    }
}
