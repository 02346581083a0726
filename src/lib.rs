pub mod analysis;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod git;
pub mod hypothesis;
pub mod output;
pub mod pool;
pub mod utils;
pub mod workspace;

pub use analysis::{FalsificationReport, NextAction, ResultsAnalyzer};
pub use config::{EnginePaths, FalsifyConfig};
pub use engine::FalsificationEngine;
pub use error::{ExecutionError, FalsifyError, Result};
pub use executor::{TestExecutionResult, TestExecutor, TestOutcome};
pub use git::GitRunner;
pub use hypothesis::{Hypothesis, HypothesisManager, HypothesisStatus};
pub use pool::{GitWorktreeBackend, WorkspaceBackend, WorkspacePool};
pub use workspace::WorkspaceOrchestrator;
