use super::Hypothesis;
use crate::config::RankingWeights;

/// Scores a hypothesis for ranking. Higher scores are tested first.
pub trait RankingAdvisor: Send + Sync {
    fn score(&self, hypothesis: &Hypothesis) -> f64;

    fn name(&self) -> &'static str {
        "custom"
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WeightedScore {
    weights: RankingWeights,
}

impl WeightedScore {
    pub fn new(weights: RankingWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> RankingWeights {
        self.weights
    }
}

impl RankingAdvisor for WeightedScore {
    fn score(&self, hypothesis: &Hypothesis) -> f64 {
        hypothesis.ranking_score(&self.weights)
    }

    fn name(&self) -> &'static str {
        "weighted"
    }
}
