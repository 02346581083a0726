//! Session reports: aggregation, recommendation, persistence and export.

mod analyzer;
mod report;
mod store;

pub use analyzer::{ReportFormat, ResultsAnalyzer, new_session_id};
pub use report::{
    FalsificationReport, NextAction, RecommendedAction, RejectedHypothesis, SessionContext,
};
pub use store::{FileSessionStore, SessionStore};
