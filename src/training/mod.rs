//! Walk-forward evaluation
//!
//! Fold scheduling, per-fold training and calibration, metrics, variant
//! selection, feature-set ablation and pick-policy analysis.

pub mod ablation;
pub mod backtest;
pub mod folds;
pub mod metrics;
pub mod picks;
pub mod runner;
pub mod selection;

pub use ablation::{run_ablation, AblationReport, AblationRow, FeatureSubset};
pub use backtest::{BacktestReport, PredictionRecord, RunWarning, WalkForward, WarningKind};
pub use folds::{schedule_folds, Fold, FoldPlan};
pub use metrics::{calibration_table, evaluate, CalibrationBin, ClassificationMetrics};
pub use picks::{analyze_picks, PicksReport};
pub use runner::{RunOutput, Runner};
pub use selection::{select_variant, Selection};
