//! Configuration types and loading.
//!
//! - `FalsifyConfig`: top-level configuration with validation
//! - `RankingWeights`, `OverheadModel`, `ConfidenceModel`: tunable formulas
//! - `EnginePaths`: directories resolved from the repository root

mod settings;

pub use settings::{
    ConfidenceModel, EnginePaths, ExecutionConfig, FalsifyConfig, HypothesisConfig, OverheadModel,
    PoolConfig, RankingWeights, SessionConfig,
};
