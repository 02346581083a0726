use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::analysis::ReportFormat;

#[derive(Parser)]
#[command(name = "falsify")]
#[command(author, version, about = "Rank bug hypotheses and try to falsify them in isolated worktrees", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(short, long, global = true, value_enum, default_value = "text")]
    pub output: OutputFormat,

    /// Repository root (default: nearest ancestor containing .git)
    #[arg(long, global = true, env = "FALSIFY_ROOT")]
    pub root: Option<PathBuf>,
}

/// Output format for CLI results.
/// - Text: Human-readable text output (default)
/// - Json: Single JSON document
/// - Markdown: Report rendered as a Markdown document
#[derive(Debug, Clone, Copy, Default, ValueEnum, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Markdown,
}

impl From<OutputFormat> for ReportFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Text => Self::Text,
            OutputFormat::Json => Self::Json,
            OutputFormat::Markdown => Self::Markdown,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a default configuration for this repository
    Init {
        /// Overwrite an existing configuration
        #[arg(long)]
        force: bool,
    },

    /// Run a falsification session
    Run {
        /// JSON file with the hypotheses to test
        #[arg(long, short = 'H')]
        hypotheses: PathBuf,

        /// Bug description (defaults to the one in the hypotheses file)
        #[arg(long, short)]
        bug: Option<String>,

        /// Test only the N highest-ranked hypotheses
        #[arg(long)]
        top: Option<usize>,

        /// Per-hypothesis timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Force sequential execution
        #[arg(long)]
        sequential: bool,

        /// Create a fresh worktree per hypothesis instead of using the pool
        #[arg(long)]
        no_pool: bool,
    },

    /// Show a stored session report
    Resume {
        /// Session ID
        session_id: String,
    },

    /// List stored sessions
    Sessions,

    /// Manage the workspace pool
    Pool {
        #[command(subcommand)]
        action: PoolAction,
    },
}

#[derive(Subcommand)]
pub enum PoolAction {
    /// Show pool occupancy
    Stats,
    /// Pre-create available workspaces
    Expand {
        /// Number of workspaces to add
        count: usize,
    },
    /// Destroy available workspaces
    Shrink {
        /// Number of workspaces to remove
        count: usize,
    },
    /// Destroy every workspace in the pool
    Cleanup,
}
