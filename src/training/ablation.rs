//! Feature-set ablation
//!
//! Re-runs the full walk-forward protocol on nested feature subsets. Columns
//! outside a subset are removed before any fold is scheduled.

use serde::{Deserialize, Serialize};

use crate::data::FeatureGroup;
use crate::features::FeatureMatrix;
use crate::model::CalibrationVariant;
use crate::training::backtest::WalkForward;
use crate::training::selection::is_eligible;
use crate::{OverlineError, Result};

/// Rolling sources counted as "totals" for the limited rolling subset
pub const ROLLING_TOTAL_SOURCES: [&str; 2] = ["TEAM_TOTAL", "GAME_TOTAL"];

/// Nested feature subsets, evaluated in this order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureSubset {
    LineOnly,
    LinePlusContext,
    LinePlusRollingTotals,
    FullModel,
}

impl FeatureSubset {
    pub const ALL: [FeatureSubset; 4] = [
        FeatureSubset::LineOnly,
        FeatureSubset::LinePlusContext,
        FeatureSubset::LinePlusRollingTotals,
        FeatureSubset::FullModel,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            FeatureSubset::LineOnly => "A: line_only",
            FeatureSubset::LinePlusContext => "B: line_plus_context",
            FeatureSubset::LinePlusRollingTotals => "C: line_plus_rolling_totals",
            FeatureSubset::FullModel => "D: full_model",
        }
    }

    /// Column names of this subset, in matrix order
    pub fn columns(&self, matrix: &FeatureMatrix) -> Vec<String> {
        match self {
            FeatureSubset::LineOnly => matrix.names_where(|g| *g == FeatureGroup::MarketLine),
            FeatureSubset::LinePlusContext => matrix.names_where(|g| {
                matches!(g, FeatureGroup::MarketLine | FeatureGroup::Context)
            }),
            FeatureSubset::LinePlusRollingTotals => matrix.names_where(|g| match g {
                FeatureGroup::MarketLine => true,
                FeatureGroup::Rolling(spec) => ROLLING_TOTAL_SOURCES
                    .iter()
                    .any(|s| spec.source.starts_with(s)),
                _ => false,
            }),
            FeatureSubset::FullModel => matrix.feature_names(),
        }
    }
}

/// Metrics for one (subset, variant) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AblationRow {
    pub feature_set: String,
    pub subset: FeatureSubset,
    pub n_features: usize,
    pub variant: CalibrationVariant,
    pub accuracy: f64,
    pub log_loss: f64,
    pub roc_auc: Option<f64>,
    /// False for variants excluded as unstable
    pub eligible: bool,
}

/// A subset that produced no results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedSubset {
    pub feature_set: String,
    pub reason: String,
}

/// Ranked ablation results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AblationReport {
    /// Sorted by log loss ascending (stable)
    pub rows: Vec<AblationRow>,
    /// Best eligible (subset, variant) pair
    pub recommended: Option<AblationRow>,
    pub skipped: Vec<SkippedSubset>,
}

/// Evaluate every subset and rank (subset, variant) pairs by log loss
///
/// A subset whose run fails is recorded as skipped, except for leakage,
/// which aborts the whole ablation.
pub fn run_ablation(
    walk_forward: &WalkForward,
    matrix: &FeatureMatrix,
    isotonic_max_log_loss: f64,
) -> Result<AblationReport> {
    log::info!("Ablation over {} feature sets", FeatureSubset::ALL.len());
    let mut rows = Vec::new();
    let mut skipped = Vec::new();

    for subset in FeatureSubset::ALL {
        let columns = subset.columns(matrix);
        if columns.is_empty() {
            log::info!("Skipping {}: no features", subset.label());
            skipped.push(SkippedSubset {
                feature_set: subset.label().to_string(),
                reason: "no features".to_string(),
            });
            continue;
        }
        log::info!("Evaluating {} ({} features)", subset.label(), columns.len());

        let restricted = matrix.select(&columns)?;
        let report = match walk_forward.run(&restricted) {
            Ok(report) => report,
            Err(e @ OverlineError::LeakageDetected { .. }) => return Err(e),
            Err(e) => {
                log::warn!("{} failed: {}", subset.label(), e);
                skipped.push(SkippedSubset {
                    feature_set: subset.label().to_string(),
                    reason: e.to_string(),
                });
                continue;
            }
        };

        for evaluation in &report.variants {
            rows.push(AblationRow {
                feature_set: subset.label().to_string(),
                subset,
                n_features: columns.len(),
                variant: evaluation.variant,
                accuracy: evaluation.metrics.accuracy,
                log_loss: evaluation.metrics.log_loss,
                roc_auc: evaluation.metrics.roc_auc,
                eligible: is_eligible(
                    evaluation.variant,
                    evaluation.metrics.log_loss,
                    isotonic_max_log_loss,
                ),
            });
        }
    }

    rows.sort_by(|a, b| a.log_loss.total_cmp(&b.log_loss));
    let recommended = rows.iter().find(|r| r.eligible).cloned();
    if let Some(best) = &recommended {
        log::info!(
            "Recommended configuration: {} / {} (log loss {:.4})",
            best.feature_set,
            best.variant,
            best.log_loss
        );
    }

    Ok(AblationReport {
        rows,
        recommended,
        skipped,
    })
}
