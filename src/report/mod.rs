//! Run reporting
//!
//! Artifact files and human-readable summaries.

pub mod artifacts;
pub mod summary;

pub use artifacts::ArtifactWriter;
pub use summary::{ablation_markdown, backtest_summary, picks_summary};
