//! Median imputation and standard scaling
//!
//! Statistics are fit on training rows only and then applied unchanged to
//! any later rows.

use serde::{Deserialize, Serialize};

use crate::{OverlineError, Result};

/// Per-column imputation and scaling parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preprocessor {
    /// Fill value for missing entries (0.0 for columns never observed)
    pub medians: Vec<f64>,
    pub means: Vec<f64>,
    /// Population std of the imputed column, 1.0 where it is zero
    pub scales: Vec<f64>,
}

impl Preprocessor {
    pub fn fit(rows: &[Vec<Option<f64>>]) -> Result<Self> {
        let width = match rows.first() {
            Some(r) => r.len(),
            None => {
                return Err(OverlineError::InsufficientData(
                    "cannot fit preprocessing on zero rows".into(),
                ))
            }
        };

        let mut medians = Vec::with_capacity(width);
        let mut means = Vec::with_capacity(width);
        let mut scales = Vec::with_capacity(width);
        for j in 0..width {
            let present: Vec<f64> = rows
                .iter()
                .filter_map(|r| r.get(j).copied().flatten())
                .filter(|v| v.is_finite())
                .collect();
            let median = median(&present).unwrap_or(0.0);

            let n = rows.len() as f64;
            let filled = rows
                .iter()
                .map(|r| r.get(j).copied().flatten().filter(|v| v.is_finite()).unwrap_or(median));
            let mean = filled.clone().sum::<f64>() / n;
            let var = filled.map(|v| (v - mean).powi(2)).sum::<f64>() / n;
            let std = var.sqrt();

            medians.push(median);
            means.push(mean);
            scales.push(if std > 0.0 && std.is_finite() { std } else { 1.0 });
        }

        Ok(Preprocessor {
            medians,
            means,
            scales,
        })
    }

    pub fn width(&self) -> usize {
        self.medians.len()
    }

    pub fn transform_row(&self, row: &[Option<f64>]) -> Vec<f64> {
        (0..self.width())
            .map(|j| {
                let v = row
                    .get(j)
                    .copied()
                    .flatten()
                    .filter(|v| v.is_finite())
                    .unwrap_or(self.medians[j]);
                (v - self.means[j]) / self.scales[j]
            })
            .collect()
    }

    pub fn transform(&self, rows: &[Vec<Option<f64>>]) -> Vec<Vec<f64>> {
        rows.iter().map(|r| self.transform_row(r)).collect()
    }
}

fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}
