//! End-to-end backtest run
//!
//! Load records, build features, evaluate walk-forward, run the ablation
//! and fit the final model on every usable row.

use crate::data::RecordSource;
use crate::features::{build_frame, finalize_matrix, leakage, FeatureMatrix, RollingFeatureEngine, TemporalValidity};
use crate::model::{Coefficient, LogisticConfig, ModelPipeline};
use crate::training::ablation::{run_ablation, AblationReport};
use crate::training::backtest::{BacktestReport, WalkForward};
use crate::training::picks::{analyze_picks, PicksReport};
use crate::{Config, OverlineError, Result};

/// Seed of the rolling-feature spot check
pub const LEAKAGE_CHECK_SEED: u64 = 42;
/// Rows sampled per rolling column by the spot check
pub const LEAKAGE_CHECK_ROWS: usize = 10;

/// Everything a backtest run produces
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub n_records: usize,
    pub date_coverage: f64,
    pub temporal: TemporalValidity,
    pub rolling_features: Vec<String>,
    pub matrix_rows: usize,
    pub positive_rate: f64,
    pub backtest: BacktestReport,
    pub ablation: Option<AblationReport>,
    pub picks: PicksReport,
    /// Uncalibrated pipeline fit on the whole matrix
    pub model: ModelPipeline,
    pub coefficients: Vec<Coefficient>,
}

pub struct Runner<'a> {
    source: &'a dyn RecordSource,
    config: Config,
    skip_ablation: bool,
}

impl<'a> Runner<'a> {
    pub fn new(source: &'a dyn RecordSource, config: Config) -> Self {
        Runner {
            source,
            config,
            skip_ablation: false,
        }
    }

    pub fn skip_ablation(mut self, skip: bool) -> Self {
        self.skip_ablation = skip;
        self
    }

    /// Build the final feature matrix without training anything
    pub fn prepare(&self) -> Result<(FeatureMatrix, PreparedInfo)> {
        let features = &self.config.features;

        log::info!("Loading records from {}", self.source.describe());
        let records = self.source.load_records()?;
        let frame = build_frame(&records, features)?;

        let date_coverage = frame.dated_rows() as f64 / frame.len() as f64;
        if date_coverage >= features.date_coverage_threshold {
            log::info!("Date coverage {:.1}%, ordering by game date", date_coverage * 100.0);
        } else {
            log::warn!(
                "Date coverage {:.1}% is below {:.1}%, dated rows are ordered before undated ones",
                date_coverage * 100.0,
                features.date_coverage_threshold * 100.0
            );
        }
        log::info!(
            "{} rows, {} games, {} teams",
            frame.len(),
            frame.unique_games(),
            frame.unique_teams()
        );

        let engine = RollingFeatureEngine::new(&features.rolling_windows);
        let rolled = engine.augment(&frame)?;
        if rolled.temporal.is_reduced() {
            log::warn!(
                "Rolling features computed with reduced temporal validity: {:?}",
                rolled.temporal
            );
        }

        for name in &rolled.added {
            leakage::verify_no_leakage(&rolled.frame, name, LEAKAGE_CHECK_ROWS, LEAKAGE_CHECK_SEED)?;
        }

        let matrix = finalize_matrix(&rolled.frame, &features.label_field, None)?;
        log::info!(
            "Feature matrix: {} rows x {} features, label mean {:.3}",
            matrix.len(),
            matrix.features().len(),
            matrix.positive_rate()
        );

        Ok((
            matrix,
            PreparedInfo {
                n_records: records.len(),
                date_coverage,
                temporal: rolled.temporal,
                rolling_features: rolled.added,
            },
        ))
    }

    pub fn run(&self) -> Result<RunOutput> {
        let (matrix, info) = self.prepare()?;
        if matrix.is_empty() {
            return Err(OverlineError::InsufficientData(
                "no rows with both a label and a market line".into(),
            ));
        }

        let walk_forward = WalkForward::from_config(&self.config);
        let backtest = walk_forward.run(&matrix)?;

        let ablation = if self.skip_ablation {
            log::info!("Skipping ablation");
            None
        } else {
            Some(run_ablation(
                &walk_forward,
                &matrix,
                self.config.backtest.isotonic_max_log_loss,
            )?)
        };

        let picks = analyze_picks(&backtest.predictions, &self.config.policy);

        log::info!("Training final model on {} rows", matrix.len());
        let model = ModelPipeline::fit(
            matrix.features(),
            matrix.rows(),
            matrix.labels(),
            &LogisticConfig::from_model(&self.config.model),
        )?;
        let coefficients = model.coefficients();

        Ok(RunOutput {
            n_records: info.n_records,
            date_coverage: info.date_coverage,
            temporal: info.temporal,
            rolling_features: info.rolling_features,
            matrix_rows: matrix.len(),
            positive_rate: matrix.positive_rate(),
            backtest,
            ablation,
            picks,
            model,
            coefficients,
        })
    }
}

/// Facts gathered while preparing the matrix
#[derive(Debug, Clone)]
pub struct PreparedInfo {
    pub n_records: usize,
    pub date_coverage: f64,
    pub temporal: TemporalValidity,
    pub rolling_features: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::synthetic::{generate, SyntheticConfig};
    use crate::data::{Database, InMemorySource};

    fn records(games: usize) -> Vec<crate::EventRecord> {
        generate(&SyntheticConfig {
            games,
            ..Default::default()
        })
    }

    #[test]
    fn test_full_run_without_ablation() {
        let source = InMemorySource::new(records(300));
        let output = Runner::new(&source, Config::default())
            .skip_ablation(true)
            .run()
            .unwrap();

        assert_eq!(output.n_records, 600);
        assert_eq!(output.matrix_rows, 600);
        assert_eq!(output.temporal, TemporalValidity::Full);
        assert!((output.date_coverage - 1.0).abs() < 1e-12);
        assert!(output.ablation.is_none());
        assert_eq!(output.backtest.predictions.len(), 200);
        assert_eq!(output.model.trained_rows, 600);
        assert_eq!(output.coefficients.len(), output.backtest.feature_names.len());
        assert_eq!(output.picks.threshold_policy.len(), 4);

        let summary = crate::report::backtest_summary(&output);
        assert!(summary.starts_with("Backtest Summary"));
        assert!(summary.contains("Selected model"));
    }

    #[test]
    fn test_run_reads_from_database() {
        let db = Database::in_memory().unwrap();
        db.upsert_events(&records(260)).unwrap();

        let output = Runner::new(&db, Config::default()).run().unwrap();
        let ablation = output.ablation.unwrap();
        assert!(!ablation.rows.is_empty());
        assert!(ablation.recommended.is_some());
        assert_eq!(output.backtest.predictions.len(), 120);
    }

    #[test]
    fn test_prepare_rejects_missing_label() {
        let mut config = Config::default();
        config.features.label_field = "GAME_TOTAL_UNDER_HIT".to_string();
        let source = InMemorySource::new(records(20));
        let err = Runner::new(&source, config).prepare().unwrap_err();
        assert!(matches!(err, OverlineError::MissingColumn(_)));
    }

    #[test]
    fn test_empty_source_is_insufficient() {
        let source = InMemorySource::new(Vec::new());
        let err = Runner::new(&source, Config::default()).run().unwrap_err();
        assert!(matches!(err, OverlineError::InsufficientData(_)));
    }
}
