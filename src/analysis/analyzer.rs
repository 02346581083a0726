use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{
    FalsificationReport, NextAction, RecommendedAction, SessionContext, SessionStore,
};
use crate::error::{FalsifyError, Result};
use crate::executor::{TestExecutionResult, classify};
use crate::hypothesis::{Hypothesis, HypothesisStatus};
use crate::utils::{format_duration, ratio_to_percent, truncate_with_marker};

const RULE: &str = "============================================================";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
    Markdown,
}

/// Session id: UTC timestamp plus a short random suffix.
pub fn new_session_id() -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}_{}", Utc::now().format("%Y%m%d_%H%M%S"), &suffix[..8])
}

/// Turns raw test results into a report and a recommended next action.
pub struct ResultsAnalyzer {
    store: Option<Arc<dyn SessionStore>>,
}

impl ResultsAnalyzer {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store: Some(store) }
    }

    /// Analyzer that keeps nothing between sessions.
    pub fn ephemeral() -> Self {
        Self { store: None }
    }

    /// Build the session report. `ranked` fixes the order of every list.
    pub fn aggregate(
        &self,
        ranked: &[Hypothesis],
        results: &[TestExecutionResult],
        context: SessionContext,
    ) -> FalsificationReport {
        let by_id: HashMap<&str, &TestExecutionResult> = results
            .iter()
            .map(|r| (r.hypothesis_id.as_str(), r))
            .collect();

        let mut falsified = Vec::new();
        let mut supported = Vec::new();
        let mut inconclusive = Vec::new();
        let mut supported_confidence = Vec::new();

        for hypothesis in ranked {
            let mut entry = hypothesis.clone();
            entry.last_result = None;
            let Some(result) = by_id.get(hypothesis.id.as_str()) else {
                entry.status = HypothesisStatus::Inconclusive;
                inconclusive.push(entry);
                continue;
            };

            entry.status = classify(result);
            entry.confidence = Some(result.confidence);
            match entry.status {
                HypothesisStatus::Falsified => falsified.push(entry),
                HypothesisStatus::Supported => {
                    supported_confidence.push(result.confidence);
                    supported.push(entry);
                }
                _ => inconclusive.push(entry),
            }
        }

        for result in results {
            if !ranked.iter().any(|h| h.id == result.hypothesis_id) {
                warn!(id = %result.hypothesis_id, "Result for unknown hypothesis ignored");
            }
        }

        let confidence = if supported_confidence.is_empty() {
            0.0
        } else {
            supported_confidence.iter().sum::<f64>() / supported_confidence.len() as f64
        };

        let next_action = Self::decide_next_action(&supported, inconclusive.len());
        let next_steps = Self::next_steps(&supported, &inconclusive, &context);

        let mut test_results: Vec<TestExecutionResult> = Vec::with_capacity(results.len());
        for hypothesis in ranked {
            if let Some(result) = by_id.get(hypothesis.id.as_str()) {
                test_results.push((*result).clone());
            }
        }

        info!(
            session = %context.session_id,
            falsified = falsified.len(),
            supported = supported.len(),
            inconclusive = inconclusive.len(),
            confidence,
            "Report generated"
        );

        FalsificationReport {
            session_id: context.session_id,
            bug_description: context.bug_description,
            total_hypotheses: ranked.len(),
            falsified,
            supported,
            inconclusive,
            recommended_action: next_action.to_string(),
            next_action,
            next_steps,
            confidence,
            parallel: context.parallel,
            degraded: context.degraded,
            rejected: context.rejected,
            deferred: context.deferred,
            test_results,
            created_at: Utc::now(),
        }
    }

    pub fn decide_next_action(supported: &[Hypothesis], inconclusive: usize) -> RecommendedAction {
        let action = match supported {
            [] => NextAction::RegenerateHypotheses,
            [only] => NextAction::ImplementFix {
                hypothesis_id: only.id.clone(),
            },
            many => NextAction::NarrowFurther {
                hypothesis_ids: many.iter().map(|h| h.id.clone()).collect(),
            },
        };
        RecommendedAction {
            action,
            investigate_inconclusive: inconclusive > 0,
        }
    }

    pub fn next_steps(
        supported: &[Hypothesis],
        inconclusive: &[Hypothesis],
        context: &SessionContext,
    ) -> Vec<String> {
        let mut steps = Vec::new();

        if let Some(top) = supported.first() {
            steps.push(format!(
                "Review supported hypothesis {}: {}",
                top.id, top.description
            ));
            steps.push("Design a fix for the root cause".to_string());
            steps.push("Implement and verify the fix".to_string());
        }

        if !inconclusive.is_empty() {
            steps.push(format!(
                "Investigate {} inconclusive result(s)",
                inconclusive.len()
            ));
            steps.push("Improve the test strategy or environment".to_string());
        }

        if supported.is_empty() && inconclusive.is_empty() {
            steps.push("Gather more information about the defect".to_string());
            steps.push("Generate new hypotheses".to_string());
            steps.push("Adjust test timeouts or strategy".to_string());
        }

        if supported.len() > 1 {
            steps.push(format!(
                "Create refined hypotheses to distinguish between {} supported options",
                supported.len()
            ));
        }

        if !context.rejected.is_empty() {
            steps.push(format!(
                "Fix {} rejected hypothesis record(s)",
                context.rejected.len()
            ));
        }

        if !context.degraded.is_empty() {
            steps.push("Raise pool.max_size to avoid direct workspace fallback".to_string());
        }

        steps
    }

    pub async fn persist(&self, report: &FalsificationReport) -> Result<()> {
        match &self.store {
            Some(store) => {
                store.save(report).await?;
                info!(session = %report.session_id, "Session persisted");
                Ok(())
            }
            None => {
                debug!(session = %report.session_id, "No session store, skipping persistence");
                Ok(())
            }
        }
    }

    pub async fn resume(&self, session_id: &str) -> Result<FalsificationReport> {
        match &self.store {
            Some(store) => store.load(session_id).await,
            None => Err(FalsifyError::SessionNotFound(session_id.to_string())),
        }
    }

    pub async fn sessions(&self) -> Result<Vec<String>> {
        match &self.store {
            Some(store) => store.list().await,
            None => Ok(Vec::new()),
        }
    }

    pub fn export(report: &FalsificationReport, format: ReportFormat) -> Result<String> {
        match format {
            ReportFormat::Json => Ok(serde_json::to_string_pretty(report)?),
            ReportFormat::Markdown => Ok(export_markdown(report)),
            ReportFormat::Text => Ok(export_text(report)),
        }
    }
}

fn percent(ratio: f64) -> String {
    format!("{:.1}%", ratio_to_percent(ratio))
}

fn export_markdown(report: &FalsificationReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Falsification Report\n");
    let _ = writeln!(out, "## Session: {}\n", report.session_id);
    let _ = writeln!(out, "## Bug Description\n{}\n", report.bug_description);

    let _ = writeln!(out, "## Results");
    let _ = writeln!(out, "- **Falsified**: {}", report.falsified.len());
    let _ = writeln!(out, "- **Supported**: {}", report.supported.len());
    let _ = writeln!(out, "- **Inconclusive**: {}\n", report.inconclusive.len());

    if !report.test_results.is_empty() {
        let _ = writeln!(out, "| Hypothesis | Outcome | Duration | Confidence |");
        let _ = writeln!(out, "|---|---|---|---|");
        for result in &report.test_results {
            let _ = writeln!(
                out,
                "| {} | {} | {} | {} |",
                result.hypothesis_id,
                result.outcome,
                format_duration(std::time::Duration::from_millis(result.duration_ms)),
                percent(result.confidence)
            );
        }
        out.push('\n');
    }

    let _ = writeln!(out, "## Recommended Action\n{}\n", report.recommended_action);
    let _ = writeln!(out, "## Next Steps");
    for (i, step) in report.next_steps.iter().enumerate() {
        let _ = writeln!(out, "{}. {}", i + 1, step);
    }

    if !report.degraded.is_empty() {
        let _ = writeln!(out, "\n## Degraded Mode");
        for note in &report.degraded {
            let _ = writeln!(out, "- {}: {}", note.hypothesis_id, note.reason);
        }
    }
    if !report.rejected.is_empty() {
        let _ = writeln!(out, "\n## Rejected Hypotheses");
        for rejected in &report.rejected {
            let _ = writeln!(out, "- {}: {}", rejected.id, rejected.violations.join("; "));
        }
    }

    let _ = write!(out, "\n## Confidence Score\n{}", percent(report.confidence));
    out
}

fn export_text(report: &FalsificationReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}\nFALSIFICATION REPORT\n{}", RULE, RULE);
    let _ = writeln!(out, "\nSession: {}", report.session_id);
    let _ = writeln!(out, "Bug: {}", truncate_with_marker(&report.bug_description, 200));

    let _ = writeln!(out, "\nResults:");
    for (label, list) in [
        ("Falsified", &report.falsified),
        ("Supported", &report.supported),
        ("Inconclusive", &report.inconclusive),
    ] {
        let _ = writeln!(out, "  {:<14} {}", format!("{}:", label), list.len());
        for h in list {
            let _ = writeln!(out, "    - {} {}", h.id, truncate_with_marker(&h.description, 60));
        }
    }

    let _ = writeln!(out, "\nRecommended Action:\n  {}", report.recommended_action);
    let _ = writeln!(out, "\nNext Steps:");
    for (i, step) in report.next_steps.iter().enumerate() {
        let _ = writeln!(out, "  {}. {}", i + 1, step);
    }

    if !report.degraded.is_empty() {
        let _ = writeln!(out, "\nDegraded: {} workspace(s) created outside the pool", report.degraded.len());
    }
    if !report.rejected.is_empty() {
        let _ = writeln!(out, "Rejected: {}", report.rejected.len());
    }

    let _ = writeln!(out, "\nConfidence: {}", percent(report.confidence));
    let _ = write!(out, "\n{}", RULE);
    out
}
