//! Preprocessing + classifier pipeline
//!
//! The unit that is fit per fold and once more on the full dataset for
//! inference. Serialized as a single JSON artifact.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::features::FeatureSpec;
use crate::model::logistic::{LogisticConfig, LogisticRegression};
use crate::model::preprocess::Preprocessor;
use crate::{OverlineError, Result};

/// A feature and its coefficient on the standardized scale
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coefficient {
    pub feature: String,
    pub coefficient: f64,
}

/// Imputer, scaler and logistic model, bound to a feature list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPipeline {
    pub features: Vec<FeatureSpec>,
    pub preprocessor: Preprocessor,
    pub model: LogisticRegression,
    pub trained_rows: usize,
}

impl ModelPipeline {
    pub fn fit(
        features: &[FeatureSpec],
        rows: &[Vec<Option<f64>>],
        labels: &[u8],
        config: &LogisticConfig,
    ) -> Result<Self> {
        let preprocessor = Preprocessor::fit(rows)?;
        let x = preprocessor.transform(rows);
        let model = LogisticRegression::fit(&x, labels, config)?;
        log::debug!(
            "Fit pipeline on {} rows x {} features in {} iterations",
            rows.len(),
            features.len(),
            model.iterations
        );
        Ok(ModelPipeline {
            features: features.to_vec(),
            preprocessor,
            model,
            trained_rows: rows.len(),
        })
    }

    pub fn feature_names(&self) -> Vec<String> {
        self.features.iter().map(|f| f.name.clone()).collect()
    }

    pub fn predict_row(&self, row: &[Option<f64>]) -> f64 {
        self.model
            .predict_proba_row(&self.preprocessor.transform_row(row))
    }

    pub fn predict_proba(&self, rows: &[Vec<Option<f64>>]) -> Vec<f64> {
        rows.iter().map(|r| self.predict_row(r)).collect()
    }

    /// All coefficients, largest first
    pub fn coefficients(&self) -> Vec<Coefficient> {
        let mut coefs: Vec<Coefficient> = self
            .features
            .iter()
            .zip(&self.model.weights)
            .map(|(f, w)| Coefficient {
                feature: f.name.clone(),
                coefficient: *w,
            })
            .collect();
        coefs.sort_by(|a, b| b.coefficient.total_cmp(&a.coefficient));
        coefs
    }

    pub fn intercept(&self) -> f64 {
        self.model.intercept
    }

    /// Up to `n` strictly positive (largest first) and strictly negative
    /// (most negative first) coefficients
    pub fn top_coefficients(&self, n: usize) -> (Vec<Coefficient>, Vec<Coefficient>) {
        let all = self.coefficients();
        let positive = all
            .iter()
            .filter(|c| c.coefficient > 0.0)
            .take(n)
            .cloned()
            .collect();
        let negative = all
            .iter()
            .rev()
            .filter(|c| c.coefficient < 0.0)
            .take(n)
            .cloned()
            .collect();
        (positive, negative)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        if !path.as_ref().exists() {
            return Err(OverlineError::NoModel);
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::FeatureGroup;

    fn specs() -> Vec<FeatureSpec> {
        ["signal", "noise", "anti"]
            .iter()
            .map(|n| FeatureSpec {
                name: n.to_string(),
                group: FeatureGroup::Other,
            })
            .collect()
    }

    fn training_rows() -> (Vec<Vec<Option<f64>>>, Vec<u8>) {
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for i in 0..120 {
            let s = (i % 10) as f64;
            let label = (i % 10 >= 5) != (i % 13 == 0);
            let noise = if i % 4 == 0 { None } else { Some(((i * 7) % 5) as f64) };
            rows.push(vec![Some(s), noise, Some(-s * 2.0)]);
            labels.push(label as u8);
        }
        (rows, labels)
    }

    #[test]
    fn test_fit_and_predict_with_missing_values() {
        let (rows, labels) = training_rows();
        let pipeline = ModelPipeline::fit(&specs(), &rows, &labels, &LogisticConfig::default()).unwrap();
        let high = pipeline.predict_row(&[Some(9.0), None, Some(-18.0)]);
        let low = pipeline.predict_row(&[Some(0.0), None, Some(0.0)]);
        assert!(high > 0.5 && low < 0.5);
        assert_eq!(pipeline.trained_rows, 120);
    }

    #[test]
    fn test_top_coefficients_split_by_sign() {
        let (rows, labels) = training_rows();
        let pipeline = ModelPipeline::fit(&specs(), &rows, &labels, &LogisticConfig::default()).unwrap();
        let (pos, neg) = pipeline.top_coefficients(1);
        assert_eq!(pos.len(), 1);
        assert_eq!(neg.len(), 1);
        assert_eq!(pos[0].feature, "signal");
        assert_eq!(neg[0].feature, "anti");
        assert_eq!(pipeline.coefficients().len(), 3);
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        let (rows, labels) = training_rows();
        let pipeline = ModelPipeline::fit(&specs(), &rows, &labels, &LogisticConfig::default()).unwrap();
        pipeline.save(&path).unwrap();
        let loaded = ModelPipeline::load(&path).unwrap();
        // Reloaded statistics and weights must match bit for bit
        assert_eq!(loaded, pipeline);
        let row = [Some(3.0), Some(1.0), Some(-6.0)];
        assert_eq!(loaded.predict_row(&row), pipeline.predict_row(&row));
    }

    #[test]
    fn test_load_missing_is_no_model() {
        let dir = tempfile::tempdir().unwrap();
        let err = ModelPipeline::load(dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, OverlineError::NoModel));
    }
}
