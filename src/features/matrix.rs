//! Final (X, y, metadata) matrix
//!
//! Rows without a label or a market line are dropped, the rest are put in
//! chronological order, and the selected feature columns are checked for
//! outcome leakage before anything is trained on them.

use serde::{Deserialize, Serialize};

use crate::data::{ColumnRole, FeatureGroup, Frame, RowMeta};
use crate::features::leakage;
use crate::{OverlineError, Result};

/// A feature column and the family it belongs to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSpec {
    pub name: String,
    pub group: FeatureGroup,
}

/// Time-ordered design matrix with aligned labels and row metadata
#[derive(Debug, Clone)]
pub struct FeatureMatrix {
    features: Vec<FeatureSpec>,
    /// Row-major values; `None` is missing and imputed downstream
    x: Vec<Vec<Option<f64>>>,
    y: Vec<u8>,
    meta: Vec<RowMeta>,
}

impl FeatureMatrix {
    /// Assemble a matrix, rejecting misaligned inputs and outcome-named features
    pub fn new(
        features: Vec<FeatureSpec>,
        x: Vec<Vec<Option<f64>>>,
        y: Vec<u8>,
        meta: Vec<RowMeta>,
    ) -> Result<Self> {
        let names: Vec<&str> = features.iter().map(|f| f.name.as_str()).collect();
        leakage::check_names(&names)?;

        if x.len() != y.len() || x.len() != meta.len() {
            return Err(OverlineError::InsufficientData(format!(
                "misaligned matrix: {} rows, {} labels, {} metadata rows",
                x.len(),
                y.len(),
                meta.len()
            )));
        }
        if let Some(row) = x.iter().position(|r| r.len() != features.len()) {
            return Err(OverlineError::InsufficientData(format!(
                "row {} has {} values for {} features",
                row,
                x[row].len(),
                features.len()
            )));
        }
        Ok(FeatureMatrix {
            features,
            x,
            y,
            meta,
        })
    }

    pub fn len(&self) -> usize {
        self.y.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }

    pub fn features(&self) -> &[FeatureSpec] {
        &self.features
    }

    pub fn feature_names(&self) -> Vec<String> {
        self.features.iter().map(|f| f.name.clone()).collect()
    }

    pub fn rows(&self) -> &[Vec<Option<f64>>] {
        &self.x
    }

    pub fn labels(&self) -> &[u8] {
        &self.y
    }

    pub fn meta(&self) -> &[RowMeta] {
        &self.meta
    }

    /// Share of positive labels
    pub fn positive_rate(&self) -> f64 {
        if self.y.is_empty() {
            0.0
        } else {
            self.y.iter().map(|&v| v as f64).sum::<f64>() / self.y.len() as f64
        }
    }

    /// Feature names whose group satisfies `pred`, in matrix order
    pub fn names_where<F>(&self, pred: F) -> Vec<String>
    where
        F: Fn(&FeatureGroup) -> bool,
    {
        self.features
            .iter()
            .filter(|f| pred(&f.group))
            .map(|f| f.name.clone())
            .collect()
    }

    /// New matrix restricted to the named columns, in the order given
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<FeatureMatrix> {
        let indices = names
            .iter()
            .map(|n| {
                self.features
                    .iter()
                    .position(|f| f.name == n.as_ref())
                    .ok_or_else(|| OverlineError::MissingColumn(n.as_ref().to_string()))
            })
            .collect::<Result<Vec<usize>>>()?;

        FeatureMatrix::new(
            indices.iter().map(|&j| self.features[j].clone()).collect(),
            self.x
                .iter()
                .map(|row| indices.iter().map(|&j| row[j]).collect())
                .collect(),
            self.y.clone(),
            self.meta.clone(),
        )
    }
}

/// Build the final matrix from an augmented frame
///
/// With `requested` unset every feature-role column is used, in frame order.
pub fn finalize_matrix(
    frame: &Frame,
    label_field: &str,
    requested: Option<&[String]>,
) -> Result<FeatureMatrix> {
    let label = frame
        .column(label_field)
        .filter(|c| c.role == ColumnRole::Label)
        .ok_or_else(|| OverlineError::MissingColumn(label_field.to_string()))?;

    let mut names: Vec<String> = Vec::new();
    for name in requested
        .map(|r| r.to_vec())
        .unwrap_or_else(|| frame.feature_names())
    {
        if !names.contains(&name) {
            names.push(name);
        }
    }
    leakage::check_feature_columns(frame, &names)?;

    let mut missing_label = 0;
    let mut missing_line = 0;
    let mut kept = Vec::with_capacity(frame.len());
    for i in frame.chronological_order() {
        if label.values[i].is_none() {
            missing_label += 1;
        } else if frame.meta()[i].line.is_none() {
            missing_line += 1;
        } else {
            kept.push(i);
        }
    }
    if missing_label > 0 {
        log::info!("Dropped {} rows with missing label", missing_label);
    }
    if missing_line > 0 {
        log::info!("Dropped {} rows with missing market line", missing_line);
    }

    let columns = names
        .iter()
        .map(|n| {
            frame
                .column(n)
                .ok_or_else(|| OverlineError::MissingColumn(n.clone()))
        })
        .collect::<Result<Vec<_>>>()?;
    let features = columns
        .iter()
        .map(|c| FeatureSpec {
            name: c.name.clone(),
            group: c.role.group().cloned().unwrap_or(FeatureGroup::Other),
        })
        .collect();
    let x = kept
        .iter()
        .map(|&i| columns.iter().map(|c| c.values[i]).collect())
        .collect();
    let y = kept
        .iter()
        .map(|&i| match label.values[i] {
            Some(v) if v != 0.0 => 1,
            _ => 0,
        })
        .collect();
    let meta = kept.iter().map(|&i| frame.meta()[i].clone()).collect();

    let matrix = FeatureMatrix::new(features, x, y, meta)?;
    log::info!(
        "Final matrix: {} rows x {} features, positive rate {:.3}",
        matrix.len(),
        matrix.features().len(),
        matrix.positive_rate()
    );
    Ok(matrix)
}
