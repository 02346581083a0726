//! End-to-end falsification sessions against temporary git repositories.

mod fixtures;

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::TempDir;

use falsify_pilot::analysis::{NextAction, ReportFormat, ResultsAnalyzer};
use falsify_pilot::config::{EnginePaths, FalsifyConfig};
use falsify_pilot::engine::FalsificationEngine;
use falsify_pilot::error::{ExecutionError, FalsifyError};
use falsify_pilot::executor::TestOutcome;
use falsify_pilot::hypothesis::{Hypothesis, HypothesisStatus};
use falsify_pilot::pool::{WorkspaceBackend, WorkspacePool};
use falsify_pilot::workspace::{WorkspaceMode, WorkspaceOrchestrator};

use fixtures::backend::FakeBackend;
use fixtures::repo::TestRepo;

fn fast_config() -> FalsifyConfig {
    let mut config = FalsifyConfig::default();
    config.execution.test_timeout_secs = 20;
    config
}

async fn engine_for(repo: &TestRepo, config: FalsifyConfig) -> FalsificationEngine {
    let paths = EnginePaths::new(repo.root(), &config);
    FalsificationEngine::new(config, paths).await.unwrap()
}

fn ids(list: &[Hypothesis]) -> Vec<&str> {
    list.iter().map(|h| h.id.as_str()).collect()
}

mod scenarios {
    use super::*;

    #[tokio::test]
    async fn test_single_reproducing_hypothesis_is_supported() {
        let repo = TestRepo::new();
        let engine = engine_for(&repo, fast_config()).await;

        let report = engine
            .run_session(
                "value file reads 42 instead of 43",
                vec![
                    Hypothesis::new("H1", "cache is stale", "exit 0"),
                    Hypothesis::new("H2", "value is hardcoded", "grep -q 43 src/value.txt"),
                    Hypothesis::new("H3", "wrong file is read", "exit 0"),
                ],
            )
            .await
            .unwrap();

        assert_eq!(ids(&report.supported), vec!["H2"]);
        assert_eq!(ids(&report.falsified), vec!["H1", "H3"]);
        assert!(report.inconclusive.is_empty());
        assert_eq!(report.total_hypotheses, 3);
        assert_eq!(report.recommended_action, "implement a fix for H2");
        assert_eq!(
            report.next_action.action,
            NextAction::ImplementFix {
                hypothesis_id: "H2".into()
            }
        );
        assert!(report.confidence > 0.0);
        assert_eq!(report.supported[0].status, HypothesisStatus::Supported);

        let stats = engine.pool_stats().unwrap();
        assert_eq!(stats.allocated, 0);
        assert_eq!(stats.total, 3);
    }

    #[tokio::test]
    async fn test_pool_overflow_falls_back_to_direct_workspace() {
        let repo = TestRepo::new();
        let mut config = fast_config();
        config.pool.max_size = 2;
        let engine = engine_for(&repo, config).await;

        let report = engine
            .run_session(
                "flaky failure",
                vec![
                    Hypothesis::new("H1", "a", "test -f README.md"),
                    Hypothesis::new("H2", "b", "test -f README.md"),
                    Hypothesis::new("H3", "c", "test -f README.md"),
                ],
            )
            .await
            .unwrap();

        assert_eq!(report.test_results.len(), 3);
        assert!(
            report
                .test_results
                .iter()
                .all(|r| r.outcome == TestOutcome::Pass)
        );
        let paths: HashSet<&PathBuf> = report
            .test_results
            .iter()
            .filter_map(|r| r.workspace_path.as_ref())
            .collect();
        assert_eq!(paths.len(), 3);

        assert!(report.is_degraded());
        assert_eq!(report.degraded.len(), 1);
        assert_eq!(report.degraded[0].hypothesis_id, "H3");

        let direct = report
            .result_for("H3")
            .and_then(|r| r.workspace_path.clone())
            .unwrap();
        assert!(direct.starts_with(&engine.paths().worktrees_dir));
        assert!(!direct.starts_with(&engine.paths().pool_dir));
        assert!(!direct.exists());
        assert_eq!(engine.pool_stats().unwrap().allocated, 0);
    }

    #[tokio::test]
    async fn test_timed_out_hypothesis_is_inconclusive() {
        let repo = TestRepo::new();
        let mut config = fast_config();
        config.execution.test_timeout_secs = 1;
        let engine = engine_for(&repo, config).await;

        let report = engine
            .run_session(
                "hang on startup",
                vec![
                    Hypothesis::new("H1", "deadlock", "sleep 30"),
                    Hypothesis::new("H2", "fine", "exit 0"),
                ],
            )
            .await
            .unwrap();

        assert_eq!(ids(&report.inconclusive), vec!["H1"]);
        assert_eq!(ids(&report.falsified), vec!["H2"]);
        let timed_out = report.result_for("H1").unwrap();
        assert_eq!(timed_out.outcome, TestOutcome::Timeout);
        assert!(timed_out.duration_ms < 5000);
        assert_eq!(
            report.recommended_action,
            "regenerate hypotheses, none explain the defect; investigate inconclusive cases"
        );
    }

    #[tokio::test]
    async fn test_several_supported_hypotheses_need_narrowing() {
        let repo = TestRepo::new();
        let engine = engine_for(&repo, fast_config()).await;

        let report = engine
            .run_session(
                "crash",
                vec![
                    Hypothesis::new("H1", "a", "exit 1").with_scores(0.9, 0.5, 0.5),
                    Hypothesis::new("H2", "b", "exit 2").with_scores(0.6, 0.5, 0.5),
                ],
            )
            .await
            .unwrap();

        assert_eq!(ids(&report.supported), vec!["H1", "H2"]);
        assert!(matches!(
            report.next_action.action,
            NextAction::NarrowFurther { .. }
        ));
        assert_eq!(
            report.recommended_action,
            "narrow further, hypotheses are not yet discriminating"
        );
    }
}

mod selection {
    use super::*;

    #[tokio::test]
    async fn test_invalid_hypotheses_are_rejected_not_fatal() {
        let repo = TestRepo::new();
        let engine = engine_for(&repo, fast_config()).await;

        let report = engine
            .run_session(
                "bug",
                vec![
                    Hypothesis::new("H1", "valid", "exit 0"),
                    Hypothesis::new("H2", "no strategy", ""),
                    Hypothesis::new("H1", "duplicate id", "exit 1"),
                ],
            )
            .await
            .unwrap();

        assert_eq!(report.total_hypotheses, 1);
        assert_eq!(ids(&report.falsified), vec!["H1"]);
        let rejected: Vec<&str> = report.rejected.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(rejected, vec!["H2", "H1"]);
        assert!(
            report
                .next_steps
                .iter()
                .any(|s| s.contains("rejected hypothesis"))
        );
    }

    #[tokio::test]
    async fn test_only_top_k_are_tested() {
        let repo = TestRepo::new();
        let mut config = fast_config();
        config.hypothesis.max_hypotheses = 2;
        let engine = engine_for(&repo, config).await;

        let report = engine
            .run_session(
                "bug",
                vec![
                    Hypothesis::new("low", "unlikely", "exit 1").with_scores(0.1, 0.1, 0.9),
                    Hypothesis::new("high", "likely", "exit 1").with_scores(0.9, 0.9, 0.1),
                    Hypothesis::new("mid", "maybe", "exit 0").with_scores(0.5, 0.5, 0.5),
                ],
            )
            .await
            .unwrap();

        assert_eq!(report.total_hypotheses, 2);
        assert_eq!(report.deferred, vec!["low".to_string()]);
        assert!(report.result_for("low").is_none());
        let tested: Vec<&str> = report
            .test_results
            .iter()
            .map(|r| r.hypothesis_id.as_str())
            .collect();
        assert_eq!(tested, vec!["high", "mid"]);
    }

    #[tokio::test]
    async fn test_empty_session_recommends_regeneration() {
        let repo = TestRepo::new();
        let engine = engine_for(&repo, fast_config()).await;

        let report = engine.run_session("bug", Vec::new()).await.unwrap();

        assert_eq!(report.total_hypotheses, 0);
        assert_eq!(report.next_action.action, NextAction::RegenerateHypotheses);
        assert_eq!(report.confidence, 0.0);
    }
}

mod workspaces {
    use super::*;

    async fn fake_engine(dir: &TempDir, backend: Arc<FakeBackend>) -> FalsificationEngine {
        let config = fast_config();
        let paths = EnginePaths::new(dir.path().to_path_buf(), &config);
        FalsificationEngine::with_backend(config, paths, backend as Arc<dyn WorkspaceBackend>)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_workspace_failures_become_inconclusive() {
        let dir = TempDir::new().unwrap();
        let backend = Arc::new(FakeBackend::new(dir.path()));
        backend.fail_creates(true);
        let engine = fake_engine(&dir, Arc::clone(&backend)).await;

        let report = engine
            .run_session("bug", vec![Hypothesis::new("H1", "a", "exit 1")])
            .await
            .unwrap();

        assert_eq!(ids(&report.inconclusive), vec!["H1"]);
        let result = report.result_for("H1").unwrap();
        assert_eq!(result.outcome, TestOutcome::Error);
        assert!(matches!(result.error, Some(ExecutionError::Setup { .. })));
        assert!(report.next_action.investigate_inconclusive);
    }

    #[tokio::test]
    async fn test_runner_script_sees_hypothesis_environment() {
        let dir = TempDir::new().unwrap();
        let backend = Arc::new(FakeBackend::new(dir.path()));
        let engine = fake_engine(&dir, backend).await;

        let report = engine
            .run_session(
                "bug",
                vec![
                    Hypothesis::new("H1", "it's the quote's fault", r#"test "$HYPOTHESIS_ID" = H1"#),
                    Hypothesis::new("H2", "env", r#"test "$HYPOTHESIS_DESCRIPTION" = env"#),
                ],
            )
            .await
            .unwrap();

        assert_eq!(ids(&report.falsified), vec!["H1", "H2"]);
    }

    #[tokio::test]
    async fn test_orchestrator_tracks_pooled_and_direct_workspaces() {
        let dir = TempDir::new().unwrap();
        let backend = Arc::new(FakeBackend::new(dir.path()));
        let pool = WorkspacePool::new(
            Arc::clone(&backend) as Arc<dyn WorkspaceBackend>,
            dir.path().join(".worktrees/pool"),
            1,
        );
        let orchestrator = WorkspaceOrchestrator::pooled(
            Arc::new(pool),
            dir.path().join(".worktrees"),
            "hyp",
        );

        let mut session = orchestrator.session("20240101_000000_cafef00d");
        let workspaces = session
            .create_workspaces(&[
                Hypothesis::new("H1", "a", "exit 0"),
                Hypothesis::new("H2", "b", "exit 0"),
            ])
            .await;
        assert_eq!(workspaces.len(), 2);

        let modes: Vec<(String, WorkspaceMode)> = session
            .active()
            .into_iter()
            .map(|w| (w.hypothesis_id, w.mode))
            .collect();
        assert_eq!(
            modes,
            vec![
                ("H1".to_string(), WorkspaceMode::Pooled),
                ("H2".to_string(), WorkspaceMode::Direct),
            ]
        );
        assert_eq!(session.degraded().len(), 1);

        let direct = session.path_for("H2").unwrap();
        assert_eq!(direct, dir.path().join(".worktrees/hyp-H2-cafef00d"));
        assert_eq!(
            orchestrator.pool().unwrap().slots()[0].owner.as_deref(),
            Some("20240101_000000_cafef00d/H1")
        );

        assert_eq!(session.teardown_all().await, 2);
        assert!(session.active().is_empty());
        assert!(!direct.exists());
        let stats = orchestrator.pool().unwrap().stats();
        assert_eq!((stats.total, stats.available), (1, 1));
    }

    #[tokio::test]
    async fn test_pooled_workspaces_are_reused_across_sessions() {
        let dir = TempDir::new().unwrap();
        let backend = Arc::new(FakeBackend::new(dir.path()));
        let engine = fake_engine(&dir, Arc::clone(&backend)).await;

        for _ in 0..3 {
            engine
                .run_session("bug", vec![Hypothesis::new("H1", "a", "exit 0")])
                .await
                .unwrap();
        }

        assert_eq!(FakeBackend::count(&backend.creates), 1);
        assert_eq!(FakeBackend::count(&backend.resets), 2);
        assert_eq!(engine.pool_stats().unwrap().total, 1);
    }
}

mod lifecycle {
    use super::*;

    async fn engine_with(
        dir: &TempDir,
        backend: Arc<FakeBackend>,
        config: FalsifyConfig,
    ) -> FalsificationEngine {
        let paths = EnginePaths::new(dir.path().to_path_buf(), &config);
        FalsificationEngine::with_backend(config, paths, backend as Arc<dyn WorkspaceBackend>)
            .await
            .unwrap()
    }

    async fn wait_until(mut ready: impl FnMut() -> bool) {
        for _ in 0..200 {
            if ready() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("condition not reached within 4s");
    }

    #[tokio::test]
    async fn test_cancelled_session_is_inconclusive_and_hands_back_workspaces() {
        let dir = TempDir::new().unwrap();
        let backend = Arc::new(FakeBackend::new(dir.path()));
        let engine = engine_with(&dir, backend, fast_config()).await;
        let cancel = engine.cancel_signal();

        let start = Instant::now();
        let (report, ()) = tokio::join!(
            engine.run_session(
                "hangs",
                vec![
                    Hypothesis::new("H1", "deadlock", "sleep 30"),
                    Hypothesis::new("H2", "livelock", "sleep 30"),
                ],
            ),
            async {
                tokio::time::sleep(Duration::from_millis(500)).await;
                cancel.cancel();
            }
        );
        let report = report.unwrap();

        assert!(start.elapsed() < Duration::from_secs(10));
        assert_eq!(ids(&report.inconclusive), vec!["H1", "H2"]);
        assert!(
            report
                .inconclusive
                .iter()
                .all(|h| h.status == HypothesisStatus::Inconclusive)
        );
        for id in ["H1", "H2"] {
            assert_eq!(
                report.result_for(id).unwrap().error,
                Some(ExecutionError::Cancelled)
            );
        }
        assert!(
            report
                .recommended_action
                .contains("investigate inconclusive cases")
        );
        assert_eq!(engine.pool_stats().unwrap().allocated, 0);
    }

    #[tokio::test]
    async fn test_dropped_session_releases_pooled_workspace() {
        let dir = TempDir::new().unwrap();
        let backend = Arc::new(FakeBackend::new(dir.path()));
        let engine = engine_with(&dir, Arc::clone(&backend), fast_config()).await;

        let outcome = tokio::time::timeout(
            Duration::from_millis(500),
            engine.run_session("bug", vec![Hypothesis::new("H1", "slow", "sleep 5")]),
        )
        .await;
        assert!(outcome.is_err());

        let stats = engine.pool_stats().unwrap();
        assert_eq!((stats.allocated, stats.available), (0, 1));

        let report = engine
            .run_session("bug", vec![Hypothesis::new("H1", "fast", "exit 0")])
            .await
            .unwrap();
        assert_eq!(ids(&report.falsified), vec!["H1"]);
        assert_eq!(FakeBackend::count(&backend.creates), 1);
    }

    #[tokio::test]
    async fn test_dropped_session_removes_direct_workspace() {
        let dir = TempDir::new().unwrap();
        let backend = Arc::new(FakeBackend::new(dir.path()));
        let mut config = fast_config();
        config.pool.enabled = false;
        let engine = engine_with(&dir, Arc::clone(&backend), config).await;

        let outcome = tokio::time::timeout(
            Duration::from_millis(500),
            engine.run_session("bug", vec![Hypothesis::new("H1", "slow", "sleep 5")]),
        )
        .await;
        assert!(outcome.is_err());
        assert_eq!(FakeBackend::count(&backend.creates), 1);

        wait_until(|| FakeBackend::count(&backend.destroys) == 1).await;
        let leftovers = std::fs::read_dir(&engine.paths().worktrees_dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with("hyp-"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn test_concurrent_sessions_keep_their_own_workspaces() {
        let dir = TempDir::new().unwrap();
        let backend = Arc::new(FakeBackend::new(dir.path()));
        let engine = engine_with(&dir, backend, fast_config()).await;

        let slow = engine.run_session("b", vec![Hypothesis::new("H1", "slow", "sleep 2")]);
        let fast = async {
            wait_until(|| engine.pool_stats().unwrap().allocated == 1).await;
            let report = engine
                .run_session("a", vec![Hypothesis::new("H1", "fast", "exit 0")])
                .await
                .unwrap();
            (report, engine.pool_stats().unwrap())
        };
        let (slow_report, (fast_report, during)) = tokio::join!(slow, fast);
        let slow_report = slow_report.unwrap();

        assert_eq!(during.total, 2);
        assert_eq!(during.allocated, 1);
        assert_ne!(
            slow_report.result_for("H1").unwrap().workspace_path,
            fast_report.result_for("H1").unwrap().workspace_path
        );
        assert_eq!(ids(&slow_report.falsified), vec!["H1"]);
        assert!(slow_report.degraded.is_empty());
        assert_eq!(engine.pool_stats().unwrap().allocated, 0);
    }
}

mod persistence {
    use super::*;

    #[tokio::test]
    async fn test_report_can_be_resumed() {
        let repo = TestRepo::new();
        let engine = engine_for(&repo, fast_config()).await;

        let report = engine
            .run_session("bug", vec![Hypothesis::new("H1", "a", "exit 1")])
            .await
            .unwrap();

        let sessions = engine.sessions().await.unwrap();
        assert_eq!(sessions, vec![report.session_id.clone()]);

        let resumed = engine.resume(&report.session_id).await.unwrap();
        assert_eq!(resumed, report);

        let markdown = ResultsAnalyzer::export(&resumed, ReportFormat::Markdown).unwrap();
        assert!(markdown.contains("implement a fix for H1"));
    }

    #[tokio::test]
    async fn test_unknown_session_is_not_found() {
        let repo = TestRepo::new();
        let engine = engine_for(&repo, fast_config()).await;

        let err = engine.resume("20240101_000000_deadbeef").await.unwrap_err();
        assert!(matches!(err, FalsifyError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn test_pool_survives_engine_restart() {
        let repo = TestRepo::new();
        {
            let engine = engine_for(&repo, fast_config()).await;
            engine
                .run_session(
                    "bug",
                    vec![
                        Hypothesis::new("H1", "a", "exit 0"),
                        Hypothesis::new("H2", "b", "exit 0"),
                    ],
                )
                .await
                .unwrap();
        }

        let engine = engine_for(&repo, fast_config()).await;
        let stats = engine.pool_stats().unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.available, 2);

        if let Some(pool) = engine.pool() {
            pool.cleanup_all().await.unwrap();
        }
    }
}
