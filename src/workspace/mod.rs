//! Per-hypothesis workspaces on top of the pool.

mod orchestrator;
mod session;
mod setup;

pub use orchestrator::{
    ActiveWorkspace, DegradedWorkspace, FailedWorkspace, WorkspaceMode, WorkspaceOrchestrator,
};
pub use session::SessionWorkspaces;
pub use setup::{RunnerConfig, render_runner_script, runner_config_path, setup_environment};
