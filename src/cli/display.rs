use std::time::Duration;

use console::{Style, style};
use indicatif::{ProgressBar, ProgressStyle};

use crate::analysis::{FalsificationReport, NextAction};
use crate::executor::TestOutcome;
use crate::pool::{PoolStats, SlotState, WorkspaceSlot};
use crate::utils::{format_duration, ratio_to_percent, truncate_with_marker};

pub struct Display;

impl Display {
    pub fn new() -> Self {
        Self
    }

    pub fn print_header(&self, text: &str) {
        println!();
        println!("{}", style(text).bold().cyan());
        println!("{}", style("═".repeat(60)).dim());
        println!();
    }

    pub fn print_report(&self, report: &FalsificationReport) {
        self.print_header("Falsification Report");

        println!("{} {}", style("Session:").bold(), report.session_id);
        println!(
            "{} {}",
            style("Bug:").bold(),
            truncate_with_marker(&report.bug_description, 200)
        );
        if let Some(decision) = &report.parallel {
            println!(
                "{} {}",
                style("Mode:").bold(),
                style(&decision.reason).dim()
            );
        }
        println!();

        println!(
            "Falsified: {}  Supported: {}  Inconclusive: {}",
            style(report.falsified.len()).dim(),
            style(report.supported.len()).green().bold(),
            style(report.inconclusive.len()).yellow()
        );
        println!();

        if !report.test_results.is_empty() {
            println!(
                "{:<16} {:<10} {:>10} {:>11}",
                style("Hypothesis").bold(),
                style("Outcome").bold(),
                style("Duration").bold(),
                style("Confidence").bold()
            );
            println!("{}", style("─".repeat(50)).dim());
            for result in &report.test_results {
                println!(
                    "{:<16} {:<10} {:>10} {:>10.1}%",
                    truncate_with_marker(&result.hypothesis_id, 16),
                    self.outcome_style(result.outcome)
                        .apply_to(result.outcome.to_string()),
                    format_duration(Duration::from_millis(result.duration_ms)),
                    ratio_to_percent(result.confidence)
                );
            }
            println!();
        }

        let action_style = match report.next_action.action {
            NextAction::ImplementFix { .. } => Style::new().green().bold(),
            NextAction::NarrowFurther { .. } => Style::new().yellow().bold(),
            NextAction::RegenerateHypotheses => Style::new().red().bold(),
        };
        println!(
            "{} {}",
            style("Recommended:").bold(),
            action_style.apply_to(&report.recommended_action)
        );
        for (i, step) in report.next_steps.iter().enumerate() {
            println!("  {}. {}", i + 1, step);
        }

        if report.is_degraded() {
            println!();
            self.print_warning(&format!(
                "{} workspace(s) were created outside the pool",
                report.degraded.len()
            ));
        }
        for rejected in &report.rejected {
            self.print_warning(&format!(
                "Rejected {}: {}",
                rejected.id,
                rejected.violations.join("; ")
            ));
        }

        println!();
        println!(
            "{} {:.1}%",
            style("Confidence:").bold(),
            ratio_to_percent(report.confidence)
        );
    }

    pub fn print_pool(&self, stats: &PoolStats, slots: &[WorkspaceSlot]) {
        self.print_header("Workspace Pool");

        println!(
            "Total: {}  Available: {}  Allocated: {}  Max: {}",
            style(stats.total).bold(),
            style(stats.available).green(),
            style(stats.allocated).yellow(),
            stats.max_size
        );
        println!(
            "Capacity: {} {:.1}%",
            self.capacity_bar(stats.capacity_used_percent, 20),
            stats.capacity_used_percent
        );

        if slots.is_empty() {
            return;
        }
        println!();
        for slot in slots {
            let state = match slot.state {
                SlotState::Available => style("available").green(),
                SlotState::Allocated => style("allocated").yellow(),
            };
            println!(
                "  {:<12} {:<10} {} {}",
                slot.id.to_string(),
                state,
                slot.owner.as_deref().unwrap_or("-"),
                style(slot.path.display()).dim()
            );
        }
    }

    pub fn print_sessions(&self, sessions: &[String]) {
        if sessions.is_empty() {
            println!("{}", style("No sessions found.").dim());
            return;
        }
        for id in sessions {
            println!("  {}", id);
        }
    }

    pub fn print_success(&self, message: &str) {
        println!("{} {}", style("✓").green().bold(), message);
    }

    pub fn print_error(&self, message: &str) {
        eprintln!("{} {}", style("✗").red().bold(), message);
    }

    pub fn print_warning(&self, message: &str) {
        println!("{} {}", style("!").yellow().bold(), message);
    }

    pub fn print_info(&self, message: &str) {
        println!("{} {}", style("→").cyan(), message);
    }

    pub fn create_spinner(&self, message: &str) -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        if let Ok(spinner) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            pb.set_style(spinner.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"));
        }
        pb.set_message(message.to_string());
        pb.enable_steady_tick(Duration::from_millis(80));
        pb
    }

    fn outcome_style(&self, outcome: TestOutcome) -> Style {
        match outcome {
            TestOutcome::Pass => Style::new().dim(),
            TestOutcome::Fail => Style::new().green().bold(),
            TestOutcome::Timeout => Style::new().yellow(),
            TestOutcome::Error => Style::new().red(),
        }
    }

    fn capacity_bar(&self, percent: f64, width: usize) -> String {
        let filled = ((width as f64 * percent / 100.0) as usize).min(width);
        let empty = width - filled;

        format!(
            "{}{}",
            style("█".repeat(filled)).yellow(),
            style("░".repeat(empty)).dim()
        )
    }
}

impl Default for Display {
    fn default() -> Self {
        Self::new()
    }
}
