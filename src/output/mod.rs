//! Format-aware writing of command results.

mod writer;

pub use writer::OutputWriter;
