use tracing::{debug, info, warn};

use super::{Hypothesis, HypothesisStatus, RankingAdvisor, WeightedScore};
use crate::config::RankingWeights;
use crate::error::{FalsifyError, Result};
use crate::executor::TestExecutionResult;

/// Hypothesis pool with validation, ranking and lifecycle tracking.
///
/// The pool keeps insertion order; ranking never reorders it in place.
pub struct HypothesisManager {
    pool: Vec<Hypothesis>,
    advisor: Box<dyn RankingAdvisor>,
}

impl HypothesisManager {
    pub fn new(weights: RankingWeights) -> Self {
        Self::with_advisor(WeightedScore::new(weights))
    }

    pub fn with_advisor(advisor: impl RankingAdvisor + 'static) -> Self {
        Self {
            pool: Vec::new(),
            advisor: Box::new(advisor),
        }
    }

    /// Every rule the hypothesis violates; empty when it is acceptable.
    pub fn validate(&self, hypothesis: &Hypothesis) -> Vec<String> {
        let mut violations = Vec::new();

        if hypothesis.id.trim().is_empty() {
            violations.push("id is empty".to_string());
        } else {
            if !hypothesis
                .id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
            {
                violations.push(format!(
                    "id '{}' may only contain ASCII letters, digits, '.', '_' or '-'",
                    hypothesis.id
                ));
            }
            if self.get(&hypothesis.id).is_some() {
                violations.push(format!("id '{}' is already in the pool", hypothesis.id));
            }
        }

        if hypothesis.description.trim().is_empty() {
            violations.push("description is empty".to_string());
        }
        if hypothesis.test_strategy.trim().is_empty() {
            violations.push("test strategy is empty".to_string());
        }
        if !hypothesis.estimated_test_secs.is_finite() || hypothesis.estimated_test_secs <= 0.0 {
            violations.push(format!(
                "estimated test duration {} must be greater than 0",
                hypothesis.estimated_test_secs
            ));
        }

        for (name, value) in [
            ("probability", hypothesis.probability),
            ("impact", hypothesis.impact),
            ("test complexity", hypothesis.test_complexity),
        ] {
            if !(0.0..=1.0).contains(&value) {
                violations.push(format!("{} {} outside [0, 1]", name, value));
            }
        }

        violations
    }

    pub fn accept(&mut self, mut hypothesis: Hypothesis) -> Result<()> {
        let violations = self.validate(&hypothesis);
        if !violations.is_empty() {
            warn!(id = %hypothesis.id, violations = ?violations, "Hypothesis rejected");
            return Err(FalsifyError::Validation {
                id: hypothesis.id,
                violations,
            });
        }

        hypothesis.status = HypothesisStatus::Pending;
        hypothesis.last_result = None;
        info!(id = %hypothesis.id, description = %hypothesis.description, "Accepted hypothesis");
        self.pool.push(hypothesis);
        Ok(())
    }

    /// Accept each hypothesis independently, returning the rejections.
    pub fn accept_all(&mut self, hypotheses: impl IntoIterator<Item = Hypothesis>) -> Vec<FalsifyError> {
        hypotheses
            .into_iter()
            .filter_map(|h| self.accept(h).err())
            .collect()
    }

    fn ranked_indices(&self) -> Vec<(usize, f64)> {
        let mut scored: Vec<(usize, f64)> = self
            .pool
            .iter()
            .enumerate()
            .map(|(i, h)| (i, self.advisor.score(h)))
            .collect();

        // Stable sort: equal scores keep insertion order.
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored
    }

    /// Hypotheses sorted by score, highest first. Does not touch the pool.
    pub fn rank(&self) -> Vec<Hypothesis> {
        let ranked: Vec<Hypothesis> = self
            .ranked_indices()
            .into_iter()
            .map(|(i, _)| self.pool[i].clone())
            .collect();

        debug!(
            advisor = self.advisor.name(),
            order = ?ranked.iter().map(|h| h.id.as_str()).collect::<Vec<_>>(),
            "Ranked hypotheses"
        );
        ranked
    }

    pub fn score(&self, id: &str) -> Option<f64> {
        self.get(id).map(|h| self.advisor.score(h))
    }

    pub fn top_k(&self, k: usize) -> Vec<Hypothesis> {
        self.rank().into_iter().take(k).collect()
    }

    /// Replace the pool with its top `k` hypotheses. Returns how many were dropped.
    pub fn trim_to_top_k(&mut self, k: usize) -> usize {
        let keep: Vec<usize> = self
            .ranked_indices()
            .into_iter()
            .take(k)
            .map(|(i, _)| i)
            .collect();

        let before = self.pool.len();
        let mut old: Vec<Option<Hypothesis>> = std::mem::take(&mut self.pool)
            .into_iter()
            .map(Some)
            .collect();
        self.pool = keep.into_iter().filter_map(|i| old[i].take()).collect();

        let dropped = before - self.pool.len();
        info!(k, dropped, "Trimmed hypothesis pool");
        dropped
    }

    pub fn update_status(
        &mut self,
        id: &str,
        status: HypothesisStatus,
        result: Option<TestExecutionResult>,
    ) -> Result<()> {
        let hypothesis = self
            .pool
            .iter_mut()
            .find(|h| h.id == id)
            .ok_or_else(|| FalsifyError::HypothesisNotFound(id.to_string()))?;

        if !hypothesis.status.can_transition_to(status) {
            return Err(FalsifyError::InvalidStatusTransition {
                id: id.to_string(),
                from: hypothesis.status.to_string(),
                to: status.to_string(),
                allowed: hypothesis
                    .status
                    .allowed_transitions()
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", "),
            });
        }

        debug!(id, from = %hypothesis.status, to = %status, "Hypothesis status updated");
        hypothesis.status = status;
        if let Some(result) = result {
            hypothesis.confidence = Some(result.confidence);
            hypothesis.last_result = Some(result);
        }
        Ok(())
    }

    /// First pending hypothesis in ranked order.
    pub fn next_untested(&self) -> Option<&Hypothesis> {
        self.ranked_indices()
            .into_iter()
            .map(|(i, _)| &self.pool[i])
            .find(|h| h.status == HypothesisStatus::Pending)
    }

    pub fn get(&self, id: &str) -> Option<&Hypothesis> {
        self.pool.iter().find(|h| h.id == id)
    }

    pub fn all(&self) -> &[Hypothesis] {
        &self.pool
    }

    pub fn by_status(&self, status: HypothesisStatus) -> Vec<&Hypothesis> {
        self.pool.iter().filter(|h| h.status == status).collect()
    }

    pub fn len(&self) -> usize {
        self.pool.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }

    pub fn clear(&mut self) {
        self.pool.clear();
        info!("Cleared hypothesis pool");
    }
}

impl Default for HypothesisManager {
    fn default() -> Self {
        Self::new(RankingWeights::default())
    }
}
