//! Probability calibration variants
//!
//! A calibrator maps a base-model probability to a recalibrated one. It is
//! fit on a held-out slice that precedes the rows it is applied to.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::logistic::{LogisticConfig, LogisticRegression};
use crate::{OverlineError, Result};

/// Calibration strategy, listed in tie-break preference order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalibrationVariant {
    Uncalibrated,
    Sigmoid,
    Isotonic,
}

impl CalibrationVariant {
    pub const ALL: [CalibrationVariant; 3] = [
        CalibrationVariant::Uncalibrated,
        CalibrationVariant::Sigmoid,
        CalibrationVariant::Isotonic,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            CalibrationVariant::Uncalibrated => "uncalibrated",
            CalibrationVariant::Sigmoid => "sigmoid",
            CalibrationVariant::Isotonic => "isotonic",
        }
    }
}

impl fmt::Display for CalibrationVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A fitted calibration mapping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Calibrator {
    Uncalibrated,
    /// Logistic recalibration with the raw probability as its only input
    Sigmoid { model: LogisticRegression },
    /// Monotone step points, linearly interpolated and clipped at the ends
    Isotonic { xs: Vec<f64>, ys: Vec<f64> },
}

impl Calibrator {
    /// Fit the given variant on raw probabilities and their labels
    pub fn fit(
        variant: CalibrationVariant,
        raw: &[f64],
        labels: &[u8],
        config: &LogisticConfig,
    ) -> Result<Calibrator> {
        if raw.len() != labels.len() {
            return Err(OverlineError::InsufficientData(format!(
                "calibration has {} probabilities for {} labels",
                raw.len(),
                labels.len()
            )));
        }
        match variant {
            CalibrationVariant::Uncalibrated => Ok(Calibrator::Uncalibrated),
            CalibrationVariant::Sigmoid => {
                let x: Vec<Vec<f64>> = raw.iter().map(|&p| vec![p]).collect();
                let model = LogisticRegression::fit(&x, labels, config)?;
                Ok(Calibrator::Sigmoid { model })
            }
            CalibrationVariant::Isotonic => {
                let (xs, ys) = fit_isotonic(raw, labels)?;
                Ok(Calibrator::Isotonic { xs, ys })
            }
        }
    }

    pub fn variant(&self) -> CalibrationVariant {
        match self {
            Calibrator::Uncalibrated => CalibrationVariant::Uncalibrated,
            Calibrator::Sigmoid { .. } => CalibrationVariant::Sigmoid,
            Calibrator::Isotonic { .. } => CalibrationVariant::Isotonic,
        }
    }

    pub fn apply(&self, p: f64) -> f64 {
        match self {
            Calibrator::Uncalibrated => p,
            Calibrator::Sigmoid { model } => model.predict_proba_row(&[p]),
            Calibrator::Isotonic { xs, ys } => interpolate(xs, ys, p).clamp(0.0, 1.0),
        }
    }

    pub fn apply_all(&self, probs: &[f64]) -> Vec<f64> {
        probs.iter().map(|&p| self.apply(p)).collect()
    }
}

/// Pool-adjacent-violators fit of a non-decreasing step function
fn fit_isotonic(raw: &[f64], labels: &[u8]) -> Result<(Vec<f64>, Vec<f64>)> {
    let mut pairs: Vec<(f64, f64)> = raw
        .iter()
        .zip(labels)
        .filter(|(p, _)| p.is_finite())
        .map(|(&p, &y)| (p, if y != 0 { 1.0 } else { 0.0 }))
        .collect();
    if pairs.is_empty() {
        return Err(OverlineError::InsufficientData(
            "isotonic calibration needs at least one finite probability".into(),
        ));
    }
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

    // Merge tied inputs into weighted points
    let mut xs: Vec<f64> = Vec::new();
    let mut sums: Vec<f64> = Vec::new();
    let mut weights: Vec<f64> = Vec::new();
    for (x, y) in pairs {
        match xs.last() {
            Some(&last) if last == x => {
                if let (Some(s), Some(w)) = (sums.last_mut(), weights.last_mut()) {
                    *s += y;
                    *w += 1.0;
                }
            }
            _ => {
                xs.push(x);
                sums.push(y);
                weights.push(1.0);
            }
        }
    }

    // Blocks of (sum, weight, point count)
    let mut blocks: Vec<(f64, f64, usize)> = Vec::with_capacity(xs.len());
    for (s, w) in sums.iter().zip(&weights) {
        blocks.push((*s, *w, 1));
        while blocks.len() > 1 {
            let (s2, w2, c2) = blocks[blocks.len() - 1];
            let (s1, w1, c1) = blocks[blocks.len() - 2];
            if s1 / w1 <= s2 / w2 {
                break;
            }
            blocks.pop();
            if let Some(prev) = blocks.last_mut() {
                *prev = (s1 + s2, w1 + w2, c1 + c2);
            }
        }
    }

    let ys: Vec<f64> = blocks
        .iter()
        .flat_map(|&(s, w, count)| std::iter::repeat(s / w).take(count))
        .collect();
    Ok((xs, ys))
}

fn interpolate(xs: &[f64], ys: &[f64], x: f64) -> f64 {
    let (first, last) = match (ys.first(), ys.last()) {
        (Some(f), Some(l)) => (*f, *l),
        _ => return x,
    };
    if x.is_nan() {
        return first;
    }
    let idx = xs.partition_point(|&v| v <= x);
    if idx == 0 {
        first
    } else if idx >= xs.len() {
        last
    } else {
        let (x0, x1) = (xs[idx - 1], xs[idx]);
        let (y0, y1) = (ys[idx - 1], ys[idx]);
        y0 + (y1 - y0) * (x - x0) / (x1 - x0)
    }
}
