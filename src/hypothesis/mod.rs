//! Hypothesis model, validation and ranking.

mod manager;
mod ranking;
mod source;
mod status;
mod types;

pub use manager::HypothesisManager;
pub use ranking::{RankingAdvisor, WeightedScore};
pub use source::{HypothesisSource, JsonFileSource, StaticSource};
pub use status::HypothesisStatus;
pub use types::Hypothesis;
