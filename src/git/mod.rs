//! Git command execution.
//!
//! `GitRunner` wraps the git CLI for worktree creation, reset and removal.

mod runner;

pub use runner::{GitRunner, WorktreeEntry};
