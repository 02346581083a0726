use std::io::{self, Write};

use serde::Serialize;

use crate::analysis::{FalsificationReport, ResultsAnalyzer};
use crate::cli::{Display, OutputFormat};
use crate::error::Result;
use crate::pool::{PoolStats, WorkspaceSlot};

/// Writes command results in the format selected on the command line.
///
/// Text goes through `Display`; JSON and Markdown are written to stdout as a
/// single document so they can be piped.
pub struct OutputWriter {
    format: OutputFormat,
}

impl OutputWriter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn is_text(&self) -> bool {
        self.format == OutputFormat::Text
    }

    pub fn emit_report(&self, display: &Display, report: &FalsificationReport) -> Result<()> {
        match self.format {
            OutputFormat::Text => display.print_report(report),
            OutputFormat::Json | OutputFormat::Markdown => {
                let rendered = ResultsAnalyzer::export(report, self.format.into())?;
                self.write_line(&rendered);
            }
        }
        Ok(())
    }

    pub fn emit_pool(&self, display: &Display, stats: &PoolStats, slots: &[WorkspaceSlot]) {
        match self.format {
            OutputFormat::Text => display.print_pool(stats, slots),
            OutputFormat::Json => self.write_json(&PoolOutput { stats, slots }),
            OutputFormat::Markdown => {
                let mut out = String::from("# Workspace Pool\n\n");
                out.push_str(&format!(
                    "- **Total**: {}\n- **Available**: {}\n- **Allocated**: {}\n- **Max size**: {}\n",
                    stats.total, stats.available, stats.allocated, stats.max_size
                ));
                if !slots.is_empty() {
                    out.push_str("\n| Slot | State | Owner |\n|---|---|---|\n");
                    for slot in slots {
                        out.push_str(&format!(
                            "| {} | {} | {} |\n",
                            slot.id,
                            slot.state,
                            slot.owner.as_deref().unwrap_or("-")
                        ));
                    }
                }
                self.write_line(out.trim_end());
            }
        }
    }

    pub fn emit_sessions(&self, display: &Display, sessions: &[String]) {
        match self.format {
            OutputFormat::Text => display.print_sessions(sessions),
            OutputFormat::Json => self.write_json(&sessions),
            OutputFormat::Markdown => {
                let list: Vec<String> = sessions.iter().map(|s| format!("- {}", s)).collect();
                self.write_line(&list.join("\n"));
            }
        }
    }

    /// Emit a simple message. Text mode leaves messages to `Display`.
    pub fn emit_message(&self, message: &str) {
        match self.format {
            OutputFormat::Text => {}
            OutputFormat::Json => self.write_json(&MessageOutput { message }),
            OutputFormat::Markdown => self.write_line(message),
        }
    }

    fn write_json<T: Serialize>(&self, value: &T) {
        if let Ok(json) = serde_json::to_string_pretty(value) {
            self.write_line(&json);
        }
    }

    fn write_line(&self, content: &str) {
        let mut stdout = io::stdout().lock();
        let _ = writeln!(stdout, "{}", content);
        let _ = stdout.flush();
    }
}

#[derive(Serialize)]
struct PoolOutput<'a> {
    #[serde(flatten)]
    stats: &'a PoolStats,
    slots: &'a [WorkspaceSlot],
}

#[derive(Serialize)]
struct MessageOutput<'a> {
    message: &'a str,
}
