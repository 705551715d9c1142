//! Walk-forward backtest
//!
//! Each fold fits the base model on the earlier part of its training prefix,
//! calibrates on the later part, and scores the next unseen chunk. Fold
//! predictions are concatenated and scored per calibration variant.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::data::FeatureGroup;
use crate::features::{leakage, FeatureMatrix, FeatureSpec};
use crate::model::{CalibrationVariant, Calibrator, LogisticConfig, ModelPipeline};
use crate::training::folds::{schedule_folds, Fold};
use crate::training::metrics::{calibration_table, evaluate, CalibrationBin, ClassificationMetrics};
use crate::training::selection::{select_variant, Selection};
use crate::{BacktestConfig, Config, GameId, ModelConfig, OverlineError, Result, TeamId};

/// Probability assigned by the constant baseline
pub const CONSTANT_BASELINE: f64 = 0.5;

/// One scored test row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub date: Option<NaiveDate>,
    pub team_id: TeamId,
    pub game_id: GameId,
    pub line: Option<f64>,
    pub y_true: u8,
    /// Probability from the selected variant
    pub p_hat: f64,
    pub p_uncalibrated: f64,
    pub p_sigmoid: f64,
    pub p_isotonic: f64,
    pub p_baseline_line: f64,
    pub fold: usize,
}

impl PredictionRecord {
    pub fn probability(&self, variant: CalibrationVariant) -> f64 {
        match variant {
            CalibrationVariant::Uncalibrated => self.p_uncalibrated,
            CalibrationVariant::Sigmoid => self.p_sigmoid,
            CalibrationVariant::Isotonic => self.p_isotonic,
        }
    }
}

/// Overall metrics for one calibration variant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantEvaluation {
    pub variant: CalibrationVariant,
    pub metrics: ClassificationMetrics,
    pub calibration: Vec<CalibrationBin>,
}

/// Reference baselines, never selected as the canonical model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineMetrics {
    pub constant: ClassificationMetrics,
    pub line_only: ClassificationMetrics,
}

/// Per-fold summary (uncalibrated metrics)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldSummary {
    pub fold: usize,
    pub train_size: usize,
    pub test_size: usize,
    /// True only when both the sigmoid and the isotonic calibrator were fit
    pub calibrated: bool,
    pub metrics: ClassificationMetrics,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// Base model could not be fit; the fold contributes no predictions
    FoldSkipped,
    /// A calibrator could not be fit; that variant uses raw probabilities
    CalibrationFallback,
    /// Line-only baseline could not be fit; it predicts 0.5 for the fold
    BaselineFallback,
}

/// A recovered per-fold failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunWarning {
    pub fold: usize,
    pub kind: WarningKind,
    pub message: String,
}

/// Everything produced by one walk-forward run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestReport {
    pub feature_names: Vec<String>,
    pub n_rows: usize,
    pub effective_min_train: usize,
    pub fallback_schedule: bool,
    pub n_folds: usize,
    pub folds: Vec<FoldSummary>,
    pub variants: Vec<VariantEvaluation>,
    pub baselines: BaselineMetrics,
    pub selection: Selection,
    pub predictions: Vec<PredictionRecord>,
    pub warnings: Vec<RunWarning>,
}

impl BacktestReport {
    pub fn variant(&self, variant: CalibrationVariant) -> Option<&VariantEvaluation> {
        self.variants.iter().find(|v| v.variant == variant)
    }

    /// Metrics of the selected variant
    pub fn selected(&self) -> Option<&VariantEvaluation> {
        self.variant(self.selection.variant)
    }
}

/// Probabilities produced for one fold's test rows
struct FoldOutput {
    raw: Vec<f64>,
    sigmoid: Vec<f64>,
    isotonic: Vec<f64>,
    calibrated: bool,
}

/// Expanding-window evaluation driver
#[derive(Debug, Clone)]
pub struct WalkForward {
    backtest: BacktestConfig,
    model: ModelConfig,
}

impl WalkForward {
    pub fn new(backtest: BacktestConfig, model: ModelConfig) -> Self {
        WalkForward { backtest, model }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.backtest.clone(), config.model.clone())
    }

    pub fn run(&self, matrix: &FeatureMatrix) -> Result<BacktestReport> {
        let names = matrix.feature_names();
        leakage::check_names(&names)?;
        if names.is_empty() {
            return Err(OverlineError::InsufficientData("no feature columns selected".into()));
        }

        let n = matrix.len();
        let plan = schedule_folds(n, self.backtest.min_train_size, self.backtest.test_chunk_size);
        if plan.is_empty() {
            return Err(OverlineError::InsufficientData(format!(
                "{} rows cannot form a train/test split",
                n
            )));
        }
        log::info!(
            "Walk-forward: {} rows, {} features, {} folds (min train {}, chunk {})",
            n,
            names.len(),
            plan.folds.len(),
            plan.effective_min_train,
            self.backtest.test_chunk_size
        );

        let base_config = LogisticConfig::from_model(&self.model);
        let line_features: Vec<usize> = matrix
            .features()
            .iter()
            .enumerate()
            .filter(|(_, f)| f.group == FeatureGroup::MarketLine)
            .map(|(j, _)| j)
            .collect();

        let mut predictions = Vec::new();
        let mut folds = Vec::new();
        let mut warnings = Vec::new();

        for fold in &plan.folds {
            log::info!(
                "Fold {}: train [0, {}), test [{}, {})",
                fold.id,
                fold.train.end,
                fold.test.start,
                fold.test.end
            );

            let output = match self.run_fold(matrix, fold, &base_config, &mut warnings) {
                Ok(output) => output,
                Err(e) => {
                    log::warn!("Fold {} skipped: {}", fold.id, e);
                    warnings.push(RunWarning {
                        fold: fold.id,
                        kind: WarningKind::FoldSkipped,
                        message: e.to_string(),
                    });
                    continue;
                }
            };
            let line_probs =
                self.line_baseline(matrix, fold, &line_features, &base_config, &mut warnings);

            let test_labels = &matrix.labels()[fold.test.clone()];
            let metrics = evaluate(test_labels, &output.raw, self.backtest.decision_threshold)?;
            log::info!("  {}", metrics);
            folds.push(FoldSummary {
                fold: fold.id,
                train_size: fold.train_len(),
                test_size: fold.test_len(),
                calibrated: output.calibrated,
                metrics,
            });

            for (k, row) in fold.test.clone().enumerate() {
                let meta = &matrix.meta()[row];
                predictions.push(PredictionRecord {
                    date: meta.date,
                    team_id: meta.team_id.clone(),
                    game_id: meta.game_id.clone(),
                    line: meta.line,
                    y_true: matrix.labels()[row],
                    p_hat: output.raw[k],
                    p_uncalibrated: output.raw[k],
                    p_sigmoid: output.sigmoid[k],
                    p_isotonic: output.isotonic[k],
                    p_baseline_line: line_probs[k],
                    fold: fold.id,
                });
            }
        }

        if predictions.is_empty() {
            return Err(OverlineError::NoCompletedFolds);
        }

        let labels: Vec<u8> = predictions.iter().map(|p| p.y_true).collect();
        let threshold = self.backtest.decision_threshold;
        let bins = self.backtest.calibration_bins;

        let mut variants = Vec::new();
        for variant in CalibrationVariant::ALL {
            let probs: Vec<f64> = predictions.iter().map(|p| p.probability(variant)).collect();
            variants.push(VariantEvaluation {
                variant,
                metrics: evaluate(&labels, &probs, threshold)?,
                calibration: calibration_table(&labels, &probs, bins),
            });
        }

        let constant = vec![CONSTANT_BASELINE; labels.len()];
        let line_probs: Vec<f64> = predictions.iter().map(|p| p.p_baseline_line).collect();
        let baselines = BaselineMetrics {
            constant: evaluate(&labels, &constant, threshold)?,
            line_only: evaluate(&labels, &line_probs, threshold)?,
        };

        let scores: Vec<(CalibrationVariant, f64)> = variants
            .iter()
            .map(|v| (v.variant, v.metrics.log_loss))
            .collect();
        let selection = select_variant(&scores, self.backtest.isotonic_max_log_loss)
            .ok_or(OverlineError::NoCompletedFolds)?;
        for p in &mut predictions {
            p.p_hat = p.probability(selection.variant);
        }

        log::info!("Baseline 0.5:       {}", baselines.constant);
        log::info!("Baseline line-only: {}", baselines.line_only);
        for v in &variants {
            log::info!("{:<13} {}", v.variant.name(), v.metrics);
        }
        log::info!(
            "Selected variant: {} (log loss {:.4})",
            selection.variant,
            selection.log_loss
        );

        Ok(BacktestReport {
            feature_names: names,
            n_rows: n,
            effective_min_train: plan.effective_min_train,
            fallback_schedule: plan.fallback,
            n_folds: plan.folds.len(),
            folds,
            variants,
            baselines,
            selection,
            predictions,
            warnings,
        })
    }

    /// Fit, calibrate and predict one fold
    fn run_fold(
        &self,
        matrix: &FeatureMatrix,
        fold: &Fold,
        base_config: &LogisticConfig,
        warnings: &mut Vec<RunWarning>,
    ) -> Result<FoldOutput> {
        let rows = matrix.rows();
        let labels = matrix.labels();
        let fit_end = fold.train.start
            + (fold.train_len() as f64 * self.backtest.fit_fraction).floor() as usize;
        let fit = fold.train.start..fit_end;
        let cal = fit_end..fold.train.end;

        let model = ModelPipeline::fit(
            matrix.features(),
            &rows[fit.clone()],
            &labels[fit],
            base_config,
        )?;
        let raw = model.predict_proba(&rows[fold.test.clone()]);

        let mut sigmoid = raw.clone();
        let mut isotonic = raw.clone();
        let mut calibrated = cal.len() >= self.backtest.min_calibration_samples;
        if calibrated {
            let cal_raw = model.predict_proba(&rows[cal.clone()]);
            let cal_labels = &labels[cal];
            let cal_config = LogisticConfig::calibration(&self.model);
            for (variant, target) in [
                (CalibrationVariant::Sigmoid, &mut sigmoid),
                (CalibrationVariant::Isotonic, &mut isotonic),
            ] {
                match Calibrator::fit(variant, &cal_raw, cal_labels, &cal_config) {
                    Ok(calibrator) => *target = calibrator.apply_all(&raw),
                    Err(e) => {
                        calibrated = false;
                        log::warn!("Fold {}: {} calibration failed: {}", fold.id, variant, e);
                        warnings.push(RunWarning {
                            fold: fold.id,
                            kind: WarningKind::CalibrationFallback,
                            message: format!("{} calibration failed: {}", variant, e),
                        });
                    }
                }
            }
        } else {
            log::info!(
                "Fold {}: {} calibration rows (< {}), calibration skipped",
                fold.id,
                cal.len(),
                self.backtest.min_calibration_samples
            );
        }

        Ok(FoldOutput {
            raw,
            sigmoid,
            isotonic,
            calibrated,
        })
    }

    /// Line-only baseline fit on the full training prefix
    fn line_baseline(
        &self,
        matrix: &FeatureMatrix,
        fold: &Fold,
        line_features: &[usize],
        config: &LogisticConfig,
        warnings: &mut Vec<RunWarning>,
    ) -> Vec<f64> {
        let fallback = vec![CONSTANT_BASELINE; fold.test_len()];
        if line_features.is_empty() {
            return fallback;
        }
        let project = |range: std::ops::Range<usize>| -> Vec<Vec<Option<f64>>> {
            matrix.rows()[range]
                .iter()
                .map(|r| line_features.iter().map(|&j| r[j]).collect())
                .collect()
        };
        let specs: Vec<FeatureSpec> = line_features
            .iter()
            .map(|&j| matrix.features()[j].clone())
            .collect();

        match ModelPipeline::fit(
            &specs,
            &project(fold.train.clone()),
            &matrix.labels()[fold.train.clone()],
            config,
        ) {
            Ok(model) => model.predict_proba(&project(fold.test.clone())),
            Err(e) => {
                log::warn!("Fold {}: line-only baseline failed: {}", fold.id, e);
                warnings.push(RunWarning {
                    fold: fold.id,
                    kind: WarningKind::BaselineFallback,
                    message: e.to_string(),
                });
                fallback
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::synthetic::{generate, SyntheticConfig};
    use crate::data::RowMeta;
    use crate::features::{build_frame, finalize_matrix, RollingFeatureEngine};

    fn synthetic_matrix(games: usize) -> FeatureMatrix {
        let config = Config::default();
        let records = generate(&SyntheticConfig {
            games,
            ..Default::default()
        });
        let frame = build_frame(&records, &config.features).unwrap();
        let rolled = RollingFeatureEngine::new(&config.features.rolling_windows)
            .augment(&frame)
            .unwrap();
        finalize_matrix(&rolled.frame, &config.features.label_field, None).unwrap()
    }

    fn tiny_matrix(labels: Vec<u8>) -> FeatureMatrix {
        let n = labels.len();
        let features = vec![FeatureSpec {
            name: "TEAM_TOTAL_LINE".into(),
            group: FeatureGroup::MarketLine,
        }];
        let x = (0..n).map(|i| vec![Some(100.0 + (i % 7) as f64)]).collect();
        let meta = (0..n)
            .map(|i| RowMeta {
                date: NaiveDate::from_ymd_opt(2024, 1, 1)
                    .map(|d| d + chrono::Duration::days(i as i64)),
                team_id: "A".into(),
                game_id: format!("{:04}", i).as_str().into(),
                line: Some(100.0),
            })
            .collect();
        FeatureMatrix::new(features, x, labels, meta).unwrap()
    }

    #[test]
    fn test_end_to_end_synthetic() {
        let matrix = synthetic_matrix(500);
        assert_eq!(matrix.len(), 1000);

        let report = WalkForward::from_config(&Config::default()).run(&matrix).unwrap();
        assert_eq!(report.n_folds, 6);
        assert_eq!(report.folds.len(), 6);
        assert_eq!(report.predictions.len(), 600);
        assert_eq!(report.folds[0].train_size, 400);
        assert_eq!(report.folds[5].train_size, 900);

        let selected = report.selected().unwrap();
        assert!(selected.metrics.log_loss.is_finite());
        assert!(selected.metrics.log_loss < report.baselines.constant.log_loss);
        assert!((report.baselines.constant.log_loss - 2.0_f64.ln()).abs() < 1e-12);

        // Canonical column follows the selected variant
        for p in &report.predictions {
            assert_eq!(p.p_hat, p.probability(report.selection.variant));
        }
    }

    #[test]
    fn test_selection_is_deterministic() {
        let matrix = synthetic_matrix(300);
        let runner = WalkForward::from_config(&Config::default());
        let a = runner.run(&matrix).unwrap();
        let b = runner.run(&matrix).unwrap();
        assert_eq!(a.selection, b.selection);
        for (va, vb) in a.variants.iter().zip(&b.variants) {
            assert_eq!(va.metrics.log_loss, vb.metrics.log_loss);
        }
    }

    #[test]
    fn test_isotonic_monotone_within_fold() {
        let matrix = synthetic_matrix(500);
        let report = WalkForward::from_config(&Config::default()).run(&matrix).unwrap();
        for fold in &report.folds {
            let mut rows: Vec<&PredictionRecord> = report
                .predictions
                .iter()
                .filter(|p| p.fold == fold.fold)
                .collect();
            rows.sort_by(|a, b| a.p_uncalibrated.total_cmp(&b.p_uncalibrated));
            for w in rows.windows(2) {
                assert!(w[0].p_isotonic <= w[1].p_isotonic + 1e-12);
            }
        }
    }

    #[test]
    fn test_small_dataset_single_fold() {
        let labels: Vec<u8> = (0..50).map(|i| (i % 3 == 0) as u8).collect();
        let report = WalkForward::from_config(&Config::default())
            .run(&tiny_matrix(labels))
            .unwrap();
        assert!(report.fallback_schedule);
        assert_eq!(report.n_folds, 1);
        assert_eq!(report.predictions.len(), 10);
        assert_eq!(report.effective_min_train, 40);
    }

    #[test]
    fn test_short_calibration_slice_keeps_raw_probabilities() {
        // 40 training rows split 32 / 8, below the 10-row calibration minimum
        let labels: Vec<u8> = (0..50).map(|i| (i % 3 == 0) as u8).collect();
        let report = WalkForward::from_config(&Config::default())
            .run(&tiny_matrix(labels))
            .unwrap();

        assert!(!report.folds[0].calibrated);
        assert!(report.warnings.is_empty());
        for p in &report.predictions {
            assert_eq!(p.p_sigmoid, p.p_uncalibrated);
            assert_eq!(p.p_isotonic, p.p_uncalibrated);
        }
    }

    #[test]
    fn test_failed_calibrator_falls_back_to_raw() {
        let mut config = Config::default();
        config.backtest.min_train_size = 60;
        config.backtest.test_chunk_size = 10;
        // Fit rows [0, 48) hold both classes, calibration rows [48, 60) are all zeros
        let labels: Vec<u8> = (0..70)
            .map(|i| match i {
                0..=47 => (i % 3 == 0) as u8,
                48..=59 => 0,
                _ => (i % 2 == 0) as u8,
            })
            .collect();
        let report = WalkForward::from_config(&config).run(&tiny_matrix(labels)).unwrap();

        assert_eq!(report.folds.len(), 1);
        assert!(!report.folds[0].calibrated);
        let fallback = report
            .warnings
            .iter()
            .find(|w| w.kind == WarningKind::CalibrationFallback)
            .unwrap();
        assert_eq!(fallback.fold, 0);
        assert!(fallback.message.starts_with("sigmoid"));
        for p in &report.predictions {
            assert_eq!(p.p_sigmoid, p.p_uncalibrated);
        }
    }

    #[test]
    fn test_single_class_fold_is_skipped() {
        let mut config = Config::default();
        config.backtest.min_train_size = 20;
        config.backtest.test_chunk_size = 10;
        // First 20 rows are all zeros, so fold 0 cannot be fit
        let labels: Vec<u8> = (0..40).map(|i| (i >= 20 && i % 2 == 0) as u8).collect();
        let report = WalkForward::from_config(&config).run(&tiny_matrix(labels)).unwrap();

        assert_eq!(report.n_folds, 2);
        assert_eq!(report.folds.len(), 1);
        assert_eq!(report.folds[0].fold, 1);
        assert!(report
            .warnings
            .iter()
            .any(|w| w.fold == 0 && w.kind == WarningKind::FoldSkipped));
    }

    #[test]
    fn test_no_completed_folds_is_fatal() {
        let labels = vec![0u8; 50];
        let err = WalkForward::from_config(&Config::default())
            .run(&tiny_matrix(labels))
            .unwrap_err();
        assert!(matches!(err, OverlineError::NoCompletedFolds));
    }

    #[test]
    fn test_too_few_rows_is_insufficient_data() {
        let err = WalkForward::from_config(&Config::default())
            .run(&tiny_matrix(vec![0, 1, 0, 1, 1]))
            .unwrap_err();
        assert!(matches!(err, OverlineError::InsufficientData(_)));
    }

    #[test]
    fn test_actual_column_rejected_before_training() {
        let config = Config::default();
        let records = generate(&SyntheticConfig {
            games: 100,
            ..Default::default()
        });
        let frame = build_frame(&records, &config.features).unwrap();
        let rolled = RollingFeatureEngine::new(&config.features.rolling_windows)
            .augment(&frame)
            .unwrap();
        let mut names = rolled.frame.feature_names();
        names.push("TEAM_TOTAL_ACTUAL".into());

        let err = finalize_matrix(&rolled.frame, &config.features.label_field, Some(&names))
            .unwrap_err();
        match err {
            OverlineError::LeakageDetected { columns } => {
                assert_eq!(columns, vec!["TEAM_TOTAL_ACTUAL".to_string()])
            }
            other => panic!("expected leakage error, got {:?}", other),
        }
    }
}
