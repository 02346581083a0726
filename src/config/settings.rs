use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::{FalsifyError, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FalsifyConfig {
    pub hypothesis: HypothesisConfig,
    pub execution: ExecutionConfig,
    pub pool: PoolConfig,
    pub session: SessionConfig,
}

impl FalsifyConfig {
    pub async fn load(config_dir: &Path) -> Result<Self> {
        let config_path = config_dir.join("config.toml");
        let config = if config_path.exists() {
            let content = fs::read_to_string(&config_path).await?;
            toml::from_str(&content)?
        } else {
            Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub async fn save(&self, config_dir: &Path) -> Result<()> {
        self.validate()?;
        fs::create_dir_all(config_dir).await?;
        let config_path = config_dir.join("config.toml");
        let content =
            toml::to_string_pretty(self).map_err(|e| FalsifyError::Config(e.to_string()))?;
        fs::write(&config_path, content).await?;
        Ok(())
    }

    /// Validate configuration values for consistency and safety.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if self.hypothesis.max_hypotheses == 0 {
            errors.push("hypothesis.max_hypotheses must be greater than 0");
        }
        let w = &self.hypothesis.weights;
        if [w.probability, w.impact, w.complexity]
            .iter()
            .any(|v| !v.is_finite() || *v < 0.0)
        {
            errors.push("hypothesis.weights must be finite and non-negative");
        }

        let ex = &self.execution;
        if ex.test_timeout_secs == 0 {
            errors.push("execution.test_timeout_secs must be greater than 0");
        }
        if ex.max_concurrency == 0 {
            errors.push("execution.max_concurrency must be greater than 0");
        }
        if ex.repeat_runs == 0 {
            errors.push("execution.repeat_runs must be at least 1");
        }
        if ex.min_parallel_secs < 0.0 {
            errors.push("execution.min_parallel_secs must not be negative");
        }
        let o = &ex.overhead;
        if [o.base_secs, o.per_workspace_secs, o.merge_secs]
            .iter()
            .any(|v| !v.is_finite() || *v < 0.0)
        {
            errors.push("execution.overhead values must be finite and non-negative");
        }

        let c = &ex.confidence;
        if [c.full_run, c.short_run, c.timeout, c.error, c.consistency_weight]
            .iter()
            .any(|v| !(0.0..=1.0).contains(v))
        {
            errors.push("execution.confidence values must be between 0.0 and 1.0");
        }

        if self.pool.max_size == 0 {
            errors.push("pool.max_size must be greater than 0");
        }
        if self.pool.pool_dir.trim().is_empty() || self.pool.worktrees_dir.trim().is_empty() {
            errors.push("pool.pool_dir and pool.worktrees_dir must not be empty");
        }
        if self.pool.branch_prefix.trim().is_empty() {
            errors.push("pool.branch_prefix must not be empty");
        }
        if self.session.prefix.trim().is_empty() {
            errors.push("session.prefix must not be empty");
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(FalsifyError::Config(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HypothesisConfig {
    /// Number of top-ranked hypotheses tested per session.
    pub max_hypotheses: usize,
    pub weights: RankingWeights,
}

impl Default for HypothesisConfig {
    fn default() -> Self {
        Self {
            max_hypotheses: 5,
            weights: RankingWeights::default(),
        }
    }
}

/// Weights for `probability * p + impact * i - complexity * c`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingWeights {
    pub probability: f64,
    pub impact: f64,
    pub complexity: f64,
}

impl Default for RankingWeights {
    fn default() -> Self {
        Self {
            probability: 0.5,
            impact: 0.3,
            complexity: 0.2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub test_timeout_secs: u64,
    /// Longest estimated test must reach this before parallel runs are considered.
    pub min_parallel_secs: f64,
    pub max_concurrency: usize,
    /// Runs per hypothesis; extra runs only happen after a completed first run.
    pub repeat_runs: u32,
    /// Cap on captured stdout/stderr per run, in bytes.
    pub max_output_bytes: usize,
    pub overhead: OverheadModel,
    pub confidence: ConfidenceModel,
}

impl ExecutionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.test_timeout_secs)
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            test_timeout_secs: 300,
            min_parallel_secs: 60.0,
            max_concurrency: 5,
            repeat_runs: 1,
            max_output_bytes: 64 * 1024,
            overhead: OverheadModel::default(),
            confidence: ConfidenceModel::default(),
        }
    }
}

/// Projected cost of running in parallel, in seconds.
///
/// `base + per_workspace * active + merge * count`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverheadModel {
    pub base_secs: f64,
    /// Workspace creation plus environment setup.
    pub per_workspace_secs: f64,
    /// Result collection and workspace teardown per hypothesis.
    pub merge_secs: f64,
}

impl OverheadModel {
    pub fn zero() -> Self {
        Self {
            base_secs: 0.0,
            per_workspace_secs: 0.0,
            merge_secs: 0.0,
        }
    }

    pub fn total(&self, active: usize, count: usize) -> f64 {
        self.base_secs + self.per_workspace_secs * active as f64 + self.merge_secs * count as f64
    }
}

impl Default for OverheadModel {
    fn default() -> Self {
        Self {
            base_secs: 7.0,
            per_workspace_secs: 13.0,
            merge_secs: 3.0,
        }
    }
}

/// Confidence assigned to a test outcome.
///
/// Base value by outcome, then scaled by run-to-run consistency:
/// `base * (1 - consistency_weight + consistency_weight * consistency)`.
/// With a single run consistency is 1.0 and the base value is returned as is.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceModel {
    /// Completed run lasting at least `short_run_secs`.
    pub full_run: f64,
    /// Completed run shorter than `short_run_secs` (tests may have been skipped).
    pub short_run: f64,
    pub short_run_secs: f64,
    pub timeout: f64,
    pub error: f64,
    pub consistency_weight: f64,
}

impl Default for ConfidenceModel {
    fn default() -> Self {
        Self {
            full_run: 0.85,
            short_run: 0.6,
            short_run_secs: 5.0,
            timeout: 0.3,
            error: 0.2,
            consistency_weight: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub enabled: bool,
    pub max_size: usize,
    /// Relative to the repository root.
    pub pool_dir: String,
    /// Parent directory for direct (unpooled) worktrees, relative to the repository root.
    pub worktrees_dir: String,
    pub branch_prefix: String,
    /// Return allocations left behind by a previous process to the available set.
    pub reclaim_on_load: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_size: 10,
            pool_dir: String::from(".worktrees/pool"),
            worktrees_dir: String::from(".worktrees"),
            branch_prefix: String::from("hyp"),
            reclaim_on_load: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub sessions_dir: String,
    pub prefix: String,
    pub persist: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sessions_dir: String::from(".falsify/sessions"),
            prefix: String::from("falsification"),
            persist: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EnginePaths {
    pub root: PathBuf,
    pub config_dir: PathBuf,
    pub pool_dir: PathBuf,
    pub worktrees_dir: PathBuf,
    pub sessions_dir: PathBuf,
}

impl EnginePaths {
    pub fn new(root: PathBuf, config: &FalsifyConfig) -> Self {
        Self {
            config_dir: root.join(".falsify"),
            pool_dir: root.join(&config.pool.pool_dir),
            worktrees_dir: root.join(&config.pool.worktrees_dir),
            sessions_dir: root.join(&config.session.sessions_dir),
            root,
        }
    }

    pub async fn ensure_dirs(&self) -> Result<()> {
        for dir in [&self.config_dir, &self.sessions_dir] {
            fs::create_dir_all(dir).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_valid() {
        assert!(FalsifyConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validation_collects_all_errors() {
        let mut config = FalsifyConfig::default();
        config.execution.max_concurrency = 0;
        config.pool.max_size = 0;
        config.execution.confidence.timeout = 1.5;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("max_concurrency"));
        assert!(err.contains("pool.max_size"));
        assert!(err.contains("confidence"));
    }

    #[test]
    fn test_overhead_total() {
        let model = OverheadModel {
            base_secs: 7.0,
            per_workspace_secs: 10.0,
            merge_secs: 1.0,
        };
        assert_eq!(model.total(3, 5), 7.0 + 30.0 + 5.0);
        assert_eq!(OverheadModel::zero().total(10, 10), 0.0);
    }

    #[tokio::test]
    async fn test_load_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = FalsifyConfig::load(dir.path()).await.unwrap();
        assert_eq!(config.pool.max_size, 10);
        assert_eq!(config.hypothesis.weights, RankingWeights::default());
    }

    #[tokio::test]
    async fn test_save_then_load_partial_override() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("config.toml"),
            "[pool]\nmax_size = 3\n\n[execution]\ntest_timeout_secs = 30\n",
        )
        .unwrap();

        let config = FalsifyConfig::load(dir.path()).await.unwrap();
        assert_eq!(config.pool.max_size, 3);
        assert_eq!(config.execution.test_timeout_secs, 30);
        assert_eq!(config.execution.max_concurrency, 5);

        config.save(dir.path()).await.unwrap();
        let reloaded = FalsifyConfig::load(dir.path()).await.unwrap();
        assert_eq!(reloaded.pool.max_size, 3);
    }

    #[test]
    fn test_engine_paths_resolve_under_root() {
        let config = FalsifyConfig::default();
        let paths = EnginePaths::new(PathBuf::from("/repo"), &config);
        assert_eq!(paths.pool_dir, PathBuf::from("/repo/.worktrees/pool"));
        assert_eq!(paths.sessions_dir, PathBuf::from("/repo/.falsify/sessions"));
    }
}
