use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use falsify_pilot::analysis::{FileSessionStore, SessionStore};
use falsify_pilot::cli::{Cli, Commands, Display, PoolAction};
use falsify_pilot::config::{EnginePaths, FalsifyConfig};
use falsify_pilot::engine::FalsificationEngine;
use falsify_pilot::error::{FalsifyError, Result};
use falsify_pilot::git::GitRunner;
use falsify_pilot::hypothesis::{HypothesisSource, JsonFileSource};
use falsify_pilot::output::OutputWriter;
use falsify_pilot::pool::{GitWorktreeBackend, WorkspacePool};

const CONFIG_DIR: &str = ".falsify";

/// Context for command output handling.
struct OutputContext<'a> {
    display: &'a Display,
    writer: &'a OutputWriter,
}

/// Overrides for a single `run` invocation.
struct RunOptions {
    hypotheses: PathBuf,
    bug: Option<String>,
    top: Option<usize>,
    timeout: Option<u64>,
    sequential: bool,
    no_pool: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            Display::new().print_error(&e.to_string());
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("falsify_pilot=debug,falsify=debug")
    } else {
        EnvFilter::new("falsify_pilot=info,falsify=info")
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .without_time()
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let display = Display::new();
    let writer = OutputWriter::new(cli.output);
    let out = OutputContext {
        display: &display,
        writer: &writer,
    };
    let root = match cli.root {
        Some(root) => root,
        None => find_project_root()?,
    };

    match cli.command {
        Commands::Init { force } => cmd_init(&out, &root, force).await,
        Commands::Run {
            hypotheses,
            bug,
            top,
            timeout,
            sequential,
            no_pool,
        } => {
            let options = RunOptions {
                hypotheses,
                bug,
                top,
                timeout,
                sequential,
                no_pool,
            };
            cmd_run(&out, &root, options).await
        }
        Commands::Resume { session_id } => cmd_resume(&out, &root, &session_id).await,
        Commands::Sessions => cmd_sessions(&out, &root).await,
        Commands::Pool { action } => cmd_pool(&out, &root, action).await,
    }
}

fn find_project_root() -> Result<PathBuf> {
    let current = std::env::current_dir()?;

    let mut path = current.as_path();
    loop {
        if path.join(".git").exists() {
            return Ok(path.to_path_buf());
        }
        path = path
            .parent()
            .ok_or_else(|| FalsifyError::NotInGitRepo(current.clone()))?;
    }
}

async fn load_config(root: &Path) -> Result<(FalsifyConfig, EnginePaths)> {
    let config = FalsifyConfig::load(&root.join(CONFIG_DIR)).await?;
    let paths = EnginePaths::new(root.to_path_buf(), &config);
    Ok((config, paths))
}

async fn cmd_init(out: &OutputContext<'_>, root: &Path, force: bool) -> Result<()> {
    let config = FalsifyConfig::default();
    let paths = EnginePaths::new(root.to_path_buf(), &config);
    let config_path = paths.config_dir.join("config.toml");

    if config_path.exists() && !force {
        if out.writer.is_text() {
            out.display
                .print_warning("falsify is already initialized in this repository.");
        }
        return Ok(());
    }

    paths.ensure_dirs().await?;
    config.save(&paths.config_dir).await?;

    let excluded = match exclude_engine_dirs(root, &config).await {
        Ok(added) => added,
        Err(e) => {
            warn!(error = %e, "Could not update .git/info/exclude");
            0
        }
    };

    if out.writer.is_text() {
        out.display.print_success("Initialized falsify.");
        out.display
            .print_info(&format!("Configuration: {}", config_path.display()));
        out.display
            .print_info(&format!("Sessions: {}", paths.sessions_dir.display()));
        if excluded > 0 {
            out.display
                .print_info(&format!("Added {} entries to .git/info/exclude", excluded));
        }
    } else {
        out.writer.emit_message("Initialized falsify");
    }

    Ok(())
}

/// Keep engine directories out of `git status` without touching `.gitignore`.
async fn exclude_engine_dirs(root: &Path, config: &FalsifyConfig) -> Result<usize> {
    let exclude = GitRunner::new(root).git_path("info/exclude").await?;
    let existing = tokio::fs::read_to_string(&exclude)
        .await
        .unwrap_or_default();

    let wanted = [
        format!("/{}/", config.pool.worktrees_dir.trim_matches('/')),
        format!("/{}/", CONFIG_DIR),
    ];
    let missing: Vec<&String> = wanted
        .iter()
        .filter(|entry| !existing.lines().any(|line| line.trim() == entry.as_str()))
        .collect();
    if missing.is_empty() {
        return Ok(0);
    }

    let mut content = existing.clone();
    if !content.is_empty() && !content.ends_with('\n') {
        content.push('\n');
    }
    for entry in &missing {
        content.push_str(entry);
        content.push('\n');
    }
    if let Some(parent) = exclude.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&exclude, content).await?;
    Ok(missing.len())
}

async fn cmd_run(out: &OutputContext<'_>, root: &Path, options: RunOptions) -> Result<()> {
    let (mut config, paths) = load_config(root).await?;
    if let Some(top) = options.top {
        config.hypothesis.max_hypotheses = top;
    }
    if let Some(secs) = options.timeout {
        config.execution.test_timeout_secs = secs;
    }
    if options.sequential {
        config.execution.max_concurrency = 1;
    }
    if options.no_pool {
        config.pool.enabled = false;
    }

    let source = JsonFileSource::new(&options.hypotheses);
    let bug = match options.bug {
        Some(bug) => bug,
        None => source.bug_description().await?.ok_or_else(|| {
            FalsifyError::Config(format!(
                "No bug description given and none found in {}",
                options.hypotheses.display()
            ))
        })?,
    };
    let hypotheses = source.generate(&bug).await?;

    let engine = FalsificationEngine::new(config, paths).await?;

    let cancel = engine.cancel_signal();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling running tests");
            cancel.cancel();
        }
    });

    let spinner = out
        .writer
        .is_text()
        .then(|| out.display.create_spinner("Testing hypotheses..."));

    let result = engine.run_session(&bug, hypotheses).await;

    if let Some(s) = spinner {
        s.finish_and_clear();
    }
    interrupt.abort();

    let report = result?;
    info!(session = %report.session_id, "Session complete");
    out.writer.emit_report(out.display, &report)
}

async fn cmd_resume(out: &OutputContext<'_>, root: &Path, session_id: &str) -> Result<()> {
    let (config, paths) = load_config(root).await?;
    let store = FileSessionStore::new(&paths.sessions_dir, &config.session.prefix);
    let report = store.load(session_id).await?;
    out.writer.emit_report(out.display, &report)
}

async fn cmd_sessions(out: &OutputContext<'_>, root: &Path) -> Result<()> {
    let (config, paths) = load_config(root).await?;
    let store = FileSessionStore::new(&paths.sessions_dir, &config.session.prefix);
    let sessions = store.list().await?;
    out.writer.emit_sessions(out.display, &sessions);
    Ok(())
}

async fn cmd_pool(out: &OutputContext<'_>, root: &Path, action: PoolAction) -> Result<()> {
    let (config, paths) = load_config(root).await?;
    let backend = Arc::new(GitWorktreeBackend::open(root)?);
    let pool = WorkspacePool::load(backend, paths.pool_dir.clone(), &config.pool).await;

    match action {
        PoolAction::Stats => {}
        PoolAction::Expand { count } => {
            let created = pool.expand(count).await;
            pool.persist().await?;
            report_change(out, &format!("Created {} workspace(s)", created));
        }
        PoolAction::Shrink { count } => {
            let removed = pool.shrink(count).await;
            pool.persist().await?;
            report_change(out, &format!("Removed {} workspace(s)", removed));
        }
        PoolAction::Cleanup => {
            let removed = pool.cleanup_all().await?;
            report_change(out, &format!("Destroyed {} workspace(s)", removed));
        }
    }

    out.writer
        .emit_pool(out.display, &pool.stats(), &pool.slots());
    Ok(())
}

fn report_change(out: &OutputContext<'_>, message: &str) {
    if out.writer.is_text() {
        out.display.print_success(message);
    }
}
