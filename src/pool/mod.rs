//! Pool of reusable git worktrees.
//!
//! Slots are created lazily, reset on every acquire, returned on release
//! and destroyed only by shrink or cleanup. The bookkeeping is persisted as
//! JSON so a later process can pick the workspaces up again.

mod backend;
mod book;
mod manager;
mod slot;
mod state;

pub use backend::{GitWorktreeBackend, WorkspaceBackend};
pub use manager::{PoolStats, WorkspacePool};
pub use slot::{SlotId, SlotState, WorkspaceSlot};
pub use state::{PoolRecord, RECORD_FILE};
