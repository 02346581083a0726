//! Concurrent test execution.
//!
//! Decides whether parallel runs pay for their overhead, runs each
//! hypothesis's test in its own workspace under a concurrency limit, and
//! classifies outcomes.

mod planner;
mod result;
mod runner;
mod signal;

pub use planner::{ParallelDecision, should_parallelize};
pub use result::{TestExecutionResult, TestOutcome};
pub use runner::{RUNNER_DIR, TestExecutor, classify, runner_script_path};
pub use signal::CancelSignal;
