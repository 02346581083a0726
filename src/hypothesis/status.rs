use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HypothesisStatus {
    #[default]
    Pending,
    Testing,
    /// Test passed: the defect did not reproduce under this hypothesis.
    Falsified,
    /// Test failed: the defect reproduced.
    Supported,
    Inconclusive,
}

impl HypothesisStatus {
    pub fn allowed_transitions(&self) -> &'static [HypothesisStatus] {
        use HypothesisStatus::*;
        match self {
            // Pending -> Inconclusive covers hypotheses cancelled before they ran.
            Pending => &[Testing, Inconclusive],
            Testing => &[Falsified, Supported, Inconclusive],
            Falsified => &[],
            Supported => &[],
            Inconclusive => &[],
        }
    }

    pub fn can_transition_to(&self, target: HypothesisStatus) -> bool {
        self.allowed_transitions().contains(&target)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            HypothesisStatus::Falsified | HypothesisStatus::Supported | HypothesisStatus::Inconclusive
        )
    }
}

impl fmt::Display for HypothesisStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::Testing => "TESTING",
            Self::Falsified => "FALSIFIED",
            Self::Supported => "SUPPORTED",
            Self::Inconclusive => "INCONCLUSIVE",
        };
        write!(f, "{}", s)
    }
}
