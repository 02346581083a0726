use serde::{Deserialize, Serialize};

use super::HypothesisStatus;
use crate::config::RankingWeights;
use crate::executor::TestExecutionResult;

fn default_score() -> f64 {
    0.5
}

/// A candidate explanation for a defect, paired with a test that can falsify it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hypothesis {
    pub id: String,
    pub description: String,
    /// Shell command run inside the workspace. Exit 0 means the defect did not reproduce.
    #[serde(alias = "test_command")]
    pub test_strategy: String,
    #[serde(default)]
    pub expected_behavior: String,
    #[serde(alias = "estimated_test_time")]
    pub estimated_test_secs: f64,
    #[serde(default = "default_score")]
    pub probability: f64,
    #[serde(default = "default_score")]
    pub impact: f64,
    #[serde(default = "default_score")]
    pub test_complexity: f64,
    #[serde(default)]
    pub status: HypothesisStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_result: Option<TestExecutionResult>,
}

impl Hypothesis {
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        test_strategy: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            test_strategy: test_strategy.into(),
            expected_behavior: String::new(),
            estimated_test_secs: 30.0,
            probability: default_score(),
            impact: default_score(),
            test_complexity: default_score(),
            status: HypothesisStatus::Pending,
            confidence: None,
            dependencies: Vec::new(),
            last_result: None,
        }
    }

    pub fn with_expected(mut self, expected_behavior: impl Into<String>) -> Self {
        self.expected_behavior = expected_behavior.into();
        self
    }

    pub fn with_estimate(mut self, secs: f64) -> Self {
        self.estimated_test_secs = secs;
        self
    }

    pub fn with_scores(mut self, probability: f64, impact: f64, test_complexity: f64) -> Self {
        self.probability = probability;
        self.impact = impact;
        self.test_complexity = test_complexity;
        self
    }

    pub fn ranking_score(&self, weights: &RankingWeights) -> f64 {
        self.probability * weights.probability + self.impact * weights.impact
            - self.test_complexity * weights.complexity
    }
}
