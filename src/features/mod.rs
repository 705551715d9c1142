//! Feature construction
//!
//! Base context and market-line columns, backward-looking rolling
//! aggregates, leakage guards and the final design matrix.

pub mod base;
pub mod leakage;
pub mod matrix;
pub mod rolling;

pub use base::build_frame;
pub use matrix::{finalize_matrix, FeatureMatrix, FeatureSpec};
pub use rolling::{RollingFeatureEngine, RollingOutput, TemporalValidity};
