//! Run artifacts on disk
//!
//! CSV for row-shaped outputs, pretty JSON for everything else.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::model::CalibrationVariant;
use crate::report::summary::ablation_markdown;
use crate::training::ablation::AblationReport;
use crate::training::backtest::{BacktestReport, PredictionRecord};
use crate::training::picks::PicksReport;
use crate::training::runner::RunOutput;
use crate::{OverlineError, Result};

pub const PREDICTIONS_FILE: &str = "predictions.csv";
pub const METRICS_FILE: &str = "metrics.json";
pub const CALIBRATION_FILE: &str = "calibration.csv";
pub const ABLATION_RESULTS_FILE: &str = "ablation_results.json";
pub const ABLATION_SUMMARY_FILE: &str = "ablation_summary.md";
pub const MODEL_FILE: &str = "model.json";
pub const PICKS_SUMMARY_FILE: &str = "picks_summary.json";
pub const PICKS_DECILE_FILE: &str = "picks_by_decile.csv";
pub const COEFFICIENTS_FILE: &str = "coefficients.json";

/// Number of coefficients listed on each side in coefficients.json
const TOP_COEFFICIENTS: usize = 10;

/// One reliability bin of one variant, as written to calibration.csv
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct CalibrationRow {
    variant: CalibrationVariant,
    selected: bool,
    bin: usize,
    bin_low: f64,
    bin_high: f64,
    count: usize,
    mean_pred: f64,
    mean_true: f64,
    diff: f64,
}

/// Writes artifacts into a single output directory
pub struct ArtifactWriter {
    dir: PathBuf,
}

impl ArtifactWriter {
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(ArtifactWriter { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    /// Write every artifact of a backtest run; returns the paths written
    pub fn write_run(&self, output: &RunOutput) -> Result<Vec<PathBuf>> {
        let mut written = vec![
            self.write_predictions(&output.backtest.predictions)?,
            self.write_metrics(output)?,
            self.write_calibration(&output.backtest)?,
        ];
        if let Some(ablation) = &output.ablation {
            written.push(self.write_ablation(ablation)?);
            written.push(self.write_ablation_summary(ablation)?);
        }
        let model_path = self.path(MODEL_FILE);
        output.model.save(&model_path)?;
        written.push(model_path);
        written.push(self.write_coefficients(output)?);
        written.extend(self.write_picks(&output.picks)?);

        for path in &written {
            log::info!("Wrote {}", path.display());
        }
        Ok(written)
    }

    pub fn write_predictions(&self, predictions: &[PredictionRecord]) -> Result<PathBuf> {
        let path = self.path(PREDICTIONS_FILE);
        let mut writer = csv::Writer::from_path(&path)?;
        for p in predictions {
            writer.serialize(p)?;
        }
        writer.flush()?;
        Ok(path)
    }

    pub fn read_predictions(&self) -> Result<Vec<PredictionRecord>> {
        let path = self.path(PREDICTIONS_FILE);
        if !path.exists() {
            return Err(OverlineError::NoModel);
        }
        let mut reader = csv::Reader::from_path(&path)?;
        let mut predictions = Vec::new();
        for row in reader.deserialize() {
            predictions.push(row?);
        }
        Ok(predictions)
    }

    pub fn write_metrics(&self, output: &RunOutput) -> Result<PathBuf> {
        let report = &output.backtest;
        let selected = report.selected().map(|v| &v.metrics);
        let metrics = serde_json::json!({
            "selected_model": report.selection.variant,
            "selected_model_metrics": selected,
            "selection": report.selection,
            "variants": report
                .variants
                .iter()
                .map(|v| (v.variant.name(), &v.metrics))
                .collect::<std::collections::BTreeMap<_, _>>(),
            "baselines": report.baselines,
            "n_rows": report.n_rows,
            "n_folds": report.n_folds,
            "effective_min_train": report.effective_min_train,
            "fallback_schedule": report.fallback_schedule,
            "fold_metrics": report.folds,
            "warnings": report.warnings,
            "feature_names": report.feature_names,
            "temporal_validity": output.temporal,
            "date_coverage": output.date_coverage,
            "n_records": output.n_records,
            "label_mean": output.positive_rate,
        });
        self.write_json(METRICS_FILE, &metrics)
    }

    /// Reliability tables of all variants, the selected one flagged
    pub fn write_calibration(&self, report: &BacktestReport) -> Result<PathBuf> {
        let path = self.path(CALIBRATION_FILE);
        let mut writer = csv::Writer::from_path(&path)?;
        for evaluation in &report.variants {
            for bin in &evaluation.calibration {
                writer.serialize(CalibrationRow {
                    variant: evaluation.variant,
                    selected: evaluation.variant == report.selection.variant,
                    bin: bin.bin,
                    bin_low: bin.bin_low,
                    bin_high: bin.bin_high,
                    count: bin.count,
                    mean_pred: bin.mean_pred,
                    mean_true: bin.mean_true,
                    diff: bin.diff,
                })?;
            }
        }
        writer.flush()?;
        Ok(path)
    }

    pub fn write_ablation(&self, ablation: &AblationReport) -> Result<PathBuf> {
        self.write_json(ABLATION_RESULTS_FILE, ablation)
    }

    pub fn write_ablation_summary(&self, ablation: &AblationReport) -> Result<PathBuf> {
        let path = self.path(ABLATION_SUMMARY_FILE);
        std::fs::write(&path, ablation_markdown(ablation))?;
        Ok(path)
    }

    pub fn write_coefficients(&self, output: &RunOutput) -> Result<PathBuf> {
        let (top_positive, top_negative) = output.model.top_coefficients(TOP_COEFFICIENTS);
        let value = serde_json::json!({
            "intercept": output.model.intercept(),
            "coefficients": output.coefficients,
            "top_positive": top_positive,
            "top_negative": top_negative,
        });
        self.write_json(COEFFICIENTS_FILE, &value)
    }

    /// picks_summary.json and picks_by_decile.csv
    pub fn write_picks(&self, picks: &PicksReport) -> Result<Vec<PathBuf>> {
        let summary = self.write_json(PICKS_SUMMARY_FILE, picks)?;

        let deciles = self.path(PICKS_DECILE_FILE);
        let mut writer = csv::Writer::from_path(&deciles)?;
        for row in &picks.decile_analysis {
            writer.serialize(row)?;
        }
        writer.flush()?;
        Ok(vec![summary, deciles])
    }

    fn write_json<T: Serialize + ?Sized>(&self, file: &str, value: &T) -> Result<PathBuf> {
        let path = self.path(file);
        std::fs::write(&path, serde_json::to_string_pretty(value)?)?;
        Ok(path)
    }
}
