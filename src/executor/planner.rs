use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::OverheadModel;
use crate::hypothesis::Hypothesis;

/// Outcome of the break-even check, with both projections in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParallelDecision {
    pub parallel: bool,
    pub reason: String,
    pub sequential_secs: f64,
    pub parallel_secs: f64,
    /// Hypotheses that would run at once.
    pub active: usize,
}

impl ParallelDecision {
    fn sequential(reason: impl Into<String>, sequential_secs: f64) -> Self {
        Self {
            parallel: false,
            reason: reason.into(),
            sequential_secs,
            parallel_secs: sequential_secs,
            active: 1,
        }
    }

    /// Projected seconds saved by running in parallel; negative when slower.
    pub fn savings_secs(&self) -> f64 {
        self.sequential_secs - self.parallel_secs
    }
}

/// Decide whether running `hypotheses` concurrently beats running them one by one.
///
/// Parallel wall time is the longest test when everything fits in one wave,
/// otherwise the larger of the longest test and `sum / active`. Overhead
/// is added on top, and parallel is chosen only when strictly cheaper.
pub fn should_parallelize(
    hypotheses: &[Hypothesis],
    overhead: &OverheadModel,
    min_parallel_secs: f64,
    max_concurrency: usize,
) -> ParallelDecision {
    let count = hypotheses.len();
    let sequential_secs: f64 = hypotheses.iter().map(|h| h.estimated_test_secs).sum();

    if count <= 1 {
        return ParallelDecision::sequential("single hypothesis", sequential_secs);
    }

    let longest = hypotheses
        .iter()
        .map(|h| h.estimated_test_secs)
        .fold(0.0_f64, f64::max);

    if longest < min_parallel_secs {
        return ParallelDecision::sequential(
            format!(
                "longest test {:.1}s is below the {:.1}s parallel threshold",
                longest, min_parallel_secs
            ),
            sequential_secs,
        );
    }

    let active = count.min(max_concurrency.max(1));
    let wall = if active < count {
        longest.max(sequential_secs / active as f64)
    } else {
        longest
    };
    let parallel_secs = wall + overhead.total(active, count);

    let decision = if parallel_secs < sequential_secs {
        ParallelDecision {
            parallel: true,
            reason: format!(
                "parallel {:.1}s beats sequential {:.1}s",
                parallel_secs, sequential_secs
            ),
            sequential_secs,
            parallel_secs,
            active,
        }
    } else {
        ParallelDecision {
            parallel: false,
            reason: format!(
                "parallel {:.1}s does not beat sequential {:.1}s",
                parallel_secs, sequential_secs
            ),
            sequential_secs,
            parallel_secs,
            active: 1,
        }
    };

    debug!(
        parallel = decision.parallel,
        sequential_secs,
        parallel_secs,
        active,
        "Parallel break-even decision"
    );
    decision
}
