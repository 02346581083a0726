use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::{CancelSignal, ParallelDecision, TestExecutionResult, TestOutcome, should_parallelize};
use crate::config::ExecutionConfig;
use crate::error::ExecutionError;
use crate::hypothesis::{Hypothesis, HypothesisStatus};
use crate::utils::truncate_output;

/// Directory inside a workspace holding generated runner scripts.
pub const RUNNER_DIR: &str = ".falsification";

pub fn runner_script_path(workspace: &Path, hypothesis_id: &str) -> PathBuf {
    workspace
        .join(RUNNER_DIR)
        .join(format!("test_{}.sh", hypothesis_id))
}

/// Map a test outcome onto the hypothesis lifecycle.
///
/// A passing test means the defect did not reproduce, which falsifies the
/// hypothesis. A failing test reproduces it and supports the hypothesis.
pub fn classify(result: &TestExecutionResult) -> HypothesisStatus {
    match result.outcome {
        TestOutcome::Pass => HypothesisStatus::Falsified,
        TestOutcome::Fail => HypothesisStatus::Supported,
        TestOutcome::Timeout | TestOutcome::Error => HypothesisStatus::Inconclusive,
    }
}

struct RunOutcome {
    outcome: TestOutcome,
    exit_code: Option<i32>,
    stdout: String,
    stderr: String,
    duration: Duration,
    error: Option<ExecutionError>,
}

#[derive(Clone)]
pub struct TestExecutor {
    config: ExecutionConfig,
}

impl TestExecutor {
    pub fn new(config: ExecutionConfig) -> Self {
        Self { config }
    }

    pub fn should_parallelize(&self, hypotheses: &[Hypothesis]) -> ParallelDecision {
        should_parallelize(
            hypotheses,
            &self.config.overhead,
            self.config.min_parallel_secs,
            self.config.max_concurrency,
        )
    }

    /// Run every hypothesis's test in its workspace, at most `max_concurrency` at once.
    ///
    /// Results come back in completion order. Individual failures are
    /// reported in the result, never as an error.
    pub async fn execute(
        &self,
        hypotheses: &[Hypothesis],
        workspaces: &HashMap<String, PathBuf>,
        timeout: Duration,
        max_concurrency: usize,
        cancel: &CancelSignal,
    ) -> Vec<TestExecutionResult> {
        let concurrency = max_concurrency.max(1);
        info!(
            count = hypotheses.len(),
            concurrency,
            timeout_secs = timeout.as_secs(),
            "Executing hypothesis tests"
        );

        let semaphore = Arc::new(Semaphore::new(concurrency));
        let mut pending: FuturesUnordered<_> = hypotheses
            .iter()
            .map(|hypothesis| {
                let semaphore = Arc::clone(&semaphore);
                let workspace = workspaces.get(&hypothesis.id).cloned();
                async move {
                    let Ok(_permit) = semaphore.acquire().await else {
                        return self.failed(hypothesis, ExecutionError::launch("executor closed"));
                    };
                    self.run_hypothesis(hypothesis, workspace.as_deref(), timeout, cancel)
                        .await
                }
            })
            .collect();

        let mut results = Vec::with_capacity(hypotheses.len());
        while let Some(result) = pending.next().await {
            info!(
                id = %result.hypothesis_id,
                outcome = %result.outcome,
                duration_ms = result.duration_ms,
                confidence = result.confidence,
                "Test finished"
            );
            results.push(result);
        }
        results
    }

    /// Confidence for an outcome, scaled by run-to-run consistency.
    pub fn confidence(&self, outcome: TestOutcome, duration: Duration, consistency: f64) -> f64 {
        let model = &self.config.confidence;
        let base = match outcome {
            TestOutcome::Pass | TestOutcome::Fail => {
                if duration.as_secs_f64() < model.short_run_secs {
                    model.short_run
                } else {
                    model.full_run
                }
            }
            TestOutcome::Timeout => model.timeout,
            TestOutcome::Error => model.error,
        };
        let w = model.consistency_weight;
        base * (1.0 - w + w * consistency.clamp(0.0, 1.0))
    }

    fn failed(&self, hypothesis: &Hypothesis, error: ExecutionError) -> TestExecutionResult {
        let mut result = TestExecutionResult::errored(&hypothesis.id, error);
        result.confidence = self.confidence(result.outcome, Duration::ZERO, 1.0);
        result
    }

    async fn run_hypothesis(
        &self,
        hypothesis: &Hypothesis,
        workspace: Option<&Path>,
        timeout: Duration,
        cancel: &CancelSignal,
    ) -> TestExecutionResult {
        let Some(workspace) = workspace else {
            warn!(id = %hypothesis.id, "No workspace for hypothesis");
            return self.failed(
                hypothesis,
                ExecutionError::MissingWorkspace {
                    hypothesis_id: hypothesis.id.clone(),
                },
            );
        };

        if cancel.is_cancelled() {
            return self
                .failed(hypothesis, ExecutionError::Cancelled)
                .with_workspace(workspace);
        }

        let first = self.run_once(hypothesis, workspace, timeout, cancel).await;
        let mut runs = 1u32;
        let mut agreeing = 1u32;

        if first.error.is_none() {
            while runs < self.config.repeat_runs && !cancel.is_cancelled() {
                let repeat = self.run_once(hypothesis, workspace, timeout, cancel).await;
                if repeat.error == Some(ExecutionError::Cancelled) {
                    break;
                }
                runs += 1;
                if repeat.outcome == first.outcome {
                    agreeing += 1;
                }
            }
            if runs > 1 {
                debug!(id = %hypothesis.id, runs, agreeing, "Repeated runs finished");
            }
        }

        let consistency = f64::from(agreeing) / f64::from(runs);
        let confidence = self.confidence(first.outcome, first.duration, consistency);

        TestExecutionResult {
            hypothesis_id: hypothesis.id.clone(),
            outcome: first.outcome,
            duration_ms: first.duration.as_millis() as u64,
            stdout: truncate_output(&first.stdout, self.config.max_output_bytes),
            stderr: truncate_output(&first.stderr, self.config.max_output_bytes),
            exit_code: first.exit_code,
            workspace_path: Some(workspace.to_path_buf()),
            error: first.error,
            confidence,
            runs,
            consistency,
        }
    }

    async fn run_once(
        &self,
        hypothesis: &Hypothesis,
        workspace: &Path,
        timeout: Duration,
        cancel: &CancelSignal,
    ) -> RunOutcome {
        let mut command = build_test_command(hypothesis, workspace);
        command
            .current_dir(workspace)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(id = %hypothesis.id, dir = %workspace.display(), "Starting test");
        let start = Instant::now();

        let child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(id = %hypothesis.id, error = %e, "Failed to launch test");
                return RunOutcome::error(ExecutionError::launch(e.to_string()), start.elapsed());
            }
        };
        #[cfg(unix)]
        let _group = ProcessGroupGuard::for_child(&child);

        // Dropping the wait future drops the child, and kill_on_drop terminates it.
        // Its descendants go with the process group when `_group` drops.
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(id = %hypothesis.id, "Test cancelled");
                RunOutcome::error(ExecutionError::Cancelled, start.elapsed())
            }
            waited = tokio::time::timeout(timeout, child.wait_with_output()) => {
                let duration = start.elapsed();
                match waited {
                    Ok(Ok(output)) => {
                        let outcome = if output.status.success() {
                            TestOutcome::Pass
                        } else {
                            TestOutcome::Fail
                        };
                        RunOutcome {
                            outcome,
                            exit_code: output.status.code(),
                            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                            duration,
                            error: None,
                        }
                    }
                    Ok(Err(e)) => {
                        warn!(id = %hypothesis.id, error = %e, "Test execution error");
                        RunOutcome::error(ExecutionError::launch(e.to_string()), duration)
                    }
                    Err(_) => {
                        warn!(id = %hypothesis.id, timeout_secs = timeout.as_secs(), "Test timed out");
                        RunOutcome {
                            outcome: TestOutcome::Timeout,
                            exit_code: None,
                            stdout: String::new(),
                            stderr: String::new(),
                            duration,
                            error: Some(ExecutionError::timeout(timeout)),
                        }
                    }
                }
            }
        }
    }
}

impl RunOutcome {
    fn error(error: ExecutionError, duration: Duration) -> Self {
        Self {
            outcome: TestOutcome::Error,
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            duration,
            error: Some(error),
        }
    }
}

/// Kills a test's whole process group on drop.
///
/// Each test shell leads its own group, so a timeout, a cancellation or a
/// dropped session also takes down whatever the shell started.
#[cfg(unix)]
struct ProcessGroupGuard {
    pgid: Option<i32>,
}

#[cfg(unix)]
impl ProcessGroupGuard {
    fn for_child(child: &tokio::process::Child) -> Self {
        Self {
            pgid: child.id().and_then(|id| i32::try_from(id).ok()),
        }
    }
}

#[cfg(unix)]
impl Drop for ProcessGroupGuard {
    fn drop(&mut self) {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        let Some(pgid) = self.pgid else {
            return;
        };
        match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
            Ok(()) => debug!(pgid, "Killed leftover test processes"),
            Err(nix::errno::Errno::ESRCH) => {}
            Err(e) => warn!(pgid, error = %e, "Failed to kill test process group"),
        }
    }
}

/// Generated runner script if setup wrote one, else the raw strategy through the shell.
#[cfg(not(windows))]
fn build_test_command(hypothesis: &Hypothesis, workspace: &Path) -> Command {
    let script = runner_script_path(workspace, &hypothesis.id);
    let mut command = Command::new("sh");
    #[cfg(unix)]
    command.process_group(0);
    if script.is_file() {
        command.arg(script);
    } else {
        command.args(["-c", hypothesis.test_strategy.as_str()]);
    }
    command
}

#[cfg(windows)]
fn build_test_command(hypothesis: &Hypothesis, _workspace: &Path) -> Command {
    let mut command = Command::new("cmd");
    command.args(["/C", hypothesis.test_strategy.as_str()]);
    command
}
