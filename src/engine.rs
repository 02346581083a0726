//! Session driver tying ranking, workspaces, execution and analysis together.

use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;

use futures::FutureExt;
use tracing::{error, info, warn};

use crate::analysis::{
    FalsificationReport, FileSessionStore, RejectedHypothesis, ResultsAnalyzer, SessionContext,
    SessionStore, new_session_id,
};
use crate::config::{EnginePaths, FalsifyConfig};
use crate::error::{ExecutionError, FalsifyError, Result};
use crate::executor::{CancelSignal, ParallelDecision, TestExecutionResult, TestExecutor, classify};
use crate::hypothesis::{Hypothesis, HypothesisManager, HypothesisStatus};
use crate::pool::{GitWorktreeBackend, PoolStats, WorkspaceBackend, WorkspacePool};
use crate::workspace::{SessionWorkspaces, WorkspaceOrchestrator, setup_environment};

pub struct FalsificationEngine {
    config: FalsifyConfig,
    paths: EnginePaths,
    orchestrator: WorkspaceOrchestrator,
    executor: TestExecutor,
    analyzer: ResultsAnalyzer,
    cancel: CancelSignal,
}

impl FalsificationEngine {
    /// Engine over git worktrees of the repository at `paths.root`.
    pub async fn new(config: FalsifyConfig, paths: EnginePaths) -> Result<Self> {
        let backend = Arc::new(GitWorktreeBackend::open(&paths.root)?);
        Self::with_backend(config, paths, backend).await
    }

    pub async fn with_backend(
        config: FalsifyConfig,
        paths: EnginePaths,
        backend: Arc<dyn WorkspaceBackend>,
    ) -> Result<Self> {
        config.validate()?;
        paths.ensure_dirs().await?;

        let orchestrator = if config.pool.enabled {
            let pool =
                WorkspacePool::load(Arc::clone(&backend), paths.pool_dir.clone(), &config.pool)
                    .await;
            WorkspaceOrchestrator::pooled(
                Arc::new(pool),
                paths.worktrees_dir.clone(),
                &config.pool.branch_prefix,
            )
        } else {
            WorkspaceOrchestrator::direct(
                backend,
                paths.worktrees_dir.clone(),
                &config.pool.branch_prefix,
            )
        };

        let analyzer = if config.session.persist {
            let store = FileSessionStore::new(&paths.sessions_dir, &config.session.prefix);
            store.init().await?;
            ResultsAnalyzer::new(Arc::new(store) as Arc<dyn SessionStore>)
        } else {
            ResultsAnalyzer::ephemeral()
        };

        Ok(Self {
            executor: TestExecutor::new(config.execution.clone()),
            config,
            paths,
            orchestrator,
            analyzer,
            cancel: CancelSignal::new(),
        })
    }

    pub fn paths(&self) -> &EnginePaths {
        &self.paths
    }

    pub fn pool(&self) -> Option<&Arc<WorkspacePool>> {
        self.orchestrator.pool()
    }

    pub fn pool_stats(&self) -> Option<PoolStats> {
        self.orchestrator.pool().map(|pool| pool.stats())
    }

    /// Handle for cancelling the running session from another task.
    pub fn cancel_signal(&self) -> CancelSignal {
        self.cancel.clone()
    }

    pub async fn resume(&self, session_id: &str) -> Result<FalsificationReport> {
        self.analyzer.resume(session_id).await
    }

    pub async fn sessions(&self) -> Result<Vec<String>> {
        self.analyzer.sessions().await
    }

    /// Test the top-ranked hypotheses and report which explain the defect.
    ///
    /// Workspaces are always handed back: on return, when a test panics, and
    /// when the caller drops this future. Sessions may run concurrently on one
    /// engine. Per-hypothesis failures end up in the report, not in the error.
    pub async fn run_session(
        &self,
        bug_description: &str,
        hypotheses: Vec<Hypothesis>,
    ) -> Result<FalsificationReport> {
        let session_id = new_session_id();
        info!(session = %session_id, submitted = hypotheses.len(), "Starting falsification session");

        let mut manager = HypothesisManager::new(self.config.hypothesis.weights);
        let rejected: Vec<RejectedHypothesis> = manager
            .accept_all(hypotheses)
            .into_iter()
            .filter_map(|e| match e {
                FalsifyError::Validation { id, violations } => {
                    Some(RejectedHypothesis { id, violations })
                }
                other => {
                    warn!(error = %other, "Unexpected error while accepting hypothesis");
                    None
                }
            })
            .collect();

        let ranked = manager.rank();
        let k = self.config.hypothesis.max_hypotheses;
        let selected: Vec<Hypothesis> = ranked.iter().take(k).cloned().collect();
        let deferred: Vec<String> = ranked.iter().skip(k).map(|h| h.id.clone()).collect();
        if !deferred.is_empty() {
            info!(deferred = deferred.len(), k, "Testing only the top-ranked hypotheses");
        }

        let decision = self.executor.should_parallelize(&selected);
        info!(parallel = decision.parallel, reason = %decision.reason, "Execution mode chosen");

        let mut workspaces = self.orchestrator.session(&session_id);
        let outcome = AssertUnwindSafe(self.test_selected(
            &selected,
            &decision,
            &mut manager,
            &mut workspaces,
        ))
        .catch_unwind()
        .await;
        let released = workspaces.teardown_all().await;
        info!(released, "Workspaces handed back");

        let results = match outcome {
            Ok(results) => results,
            Err(panic) => {
                error!(session = %session_id, "Session panicked after workspaces were handed back");
                std::panic::resume_unwind(panic);
            }
        };

        self.record_outcomes(&mut manager, &selected, &results);

        let context = SessionContext {
            session_id,
            bug_description: bug_description.to_string(),
            parallel: Some(decision),
            degraded: workspaces.degraded(),
            rejected,
            deferred,
        };
        let report = self.analyzer.aggregate(&selected, &results, context);

        if let Err(e) = self.analyzer.persist(&report).await {
            warn!(session = %report.session_id, error = %e, "Failed to persist session report");
        }

        Ok(report)
    }

    async fn test_selected(
        &self,
        selected: &[Hypothesis],
        decision: &ParallelDecision,
        manager: &mut HypothesisManager,
        session: &mut SessionWorkspaces,
    ) -> Vec<TestExecutionResult> {
        if selected.is_empty() {
            return Vec::new();
        }

        let mut workspaces = session.create_workspaces(selected).await;
        let mut results = Vec::new();

        for failed in session.failed() {
            results.push(TestExecutionResult::errored(
                failed.hypothesis_id,
                ExecutionError::Setup {
                    message: failed.error,
                },
            ));
        }

        for hypothesis in selected {
            let Some(path) = workspaces.get(&hypothesis.id).cloned() else {
                continue;
            };
            if let Err(e) = setup_environment(&path, hypothesis).await {
                warn!(id = %hypothesis.id, error = %e, "Environment setup failed");
                workspaces.remove(&hypothesis.id);
                results.push(
                    TestExecutionResult::errored(
                        &hypothesis.id,
                        ExecutionError::Setup {
                            message: e.to_string(),
                        },
                    )
                    .with_workspace(path),
                );
            }
        }

        for hypothesis in selected {
            if let Err(e) = manager.update_status(&hypothesis.id, HypothesisStatus::Testing, None) {
                warn!(id = %hypothesis.id, error = %e, "Could not mark hypothesis as testing");
            }
        }

        let runnable: Vec<Hypothesis> = selected
            .iter()
            .filter(|h| workspaces.contains_key(&h.id))
            .cloned()
            .collect();
        let concurrency = self.effective_concurrency(decision, &workspaces);

        let executed = self
            .executor
            .execute(
                &runnable,
                &workspaces,
                self.config.execution.timeout(),
                concurrency,
                &self.cancel,
            )
            .await;
        results.extend(executed);
        results
    }

    fn effective_concurrency(
        &self,
        decision: &ParallelDecision,
        workspaces: &HashMap<String, PathBuf>,
    ) -> usize {
        if decision.parallel {
            self.config
                .execution
                .max_concurrency
                .min(workspaces.len())
                .max(1)
        } else {
            1
        }
    }

    fn record_outcomes(
        &self,
        manager: &mut HypothesisManager,
        selected: &[Hypothesis],
        results: &[TestExecutionResult],
    ) {
        let mut seen = HashSet::new();
        for result in results {
            seen.insert(result.hypothesis_id.as_str());
            if let Err(e) =
                manager.update_status(&result.hypothesis_id, classify(result), Some(result.clone()))
            {
                warn!(id = %result.hypothesis_id, error = %e, "Could not record test outcome");
            }
        }
        for hypothesis in selected {
            if !seen.contains(hypothesis.id.as_str())
                && let Err(e) =
                    manager.update_status(&hypothesis.id, HypothesisStatus::Inconclusive, None)
            {
                warn!(id = %hypothesis.id, error = %e, "Could not mark untested hypothesis");
            }
        }
    }
}
