//! Classification metrics and reliability tables

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{OverlineError, Result};

/// Probabilities are clipped to [EPS, 1 - EPS] before taking logs
pub const LOG_LOSS_EPS: f64 = 1e-15;

/// Scalar metrics for one set of predictions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub accuracy: f64,
    pub log_loss: f64,
    /// Undefined unless both classes are present
    pub roc_auc: Option<f64>,
    pub threshold: f64,
    pub n_samples: usize,
}

impl fmt::Display for ClassificationMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LogLoss: {:.4} | Acc: {:.2}% | AUC: {} | n={}",
            self.log_loss,
            self.accuracy * 100.0,
            self.roc_auc
                .map(|a| format!("{:.4}", a))
                .unwrap_or_else(|| "n/a".to_string()),
            self.n_samples
        )
    }
}

/// One row of a reliability table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationBin {
    /// 1-based bin number
    pub bin: usize,
    pub bin_low: f64,
    pub bin_high: f64,
    pub count: usize,
    pub mean_pred: f64,
    pub mean_true: f64,
    /// mean_pred - mean_true; positive means overconfident
    pub diff: f64,
}

/// Accuracy, log loss and ROC-AUC
pub fn evaluate(labels: &[u8], probs: &[f64], threshold: f64) -> Result<ClassificationMetrics> {
    if labels.is_empty() || labels.len() != probs.len() {
        return Err(OverlineError::InsufficientData(format!(
            "cannot score {} predictions against {} labels",
            probs.len(),
            labels.len()
        )));
    }
    let n = labels.len();
    let correct = labels
        .iter()
        .zip(probs)
        .filter(|(&y, &p)| (p >= threshold) == (y != 0))
        .count();

    Ok(ClassificationMetrics {
        accuracy: correct as f64 / n as f64,
        log_loss: log_loss(labels, probs),
        roc_auc: roc_auc(labels, probs),
        threshold,
        n_samples: n,
    })
}

/// Mean binary cross-entropy with clipped probabilities
pub fn log_loss(labels: &[u8], probs: &[f64]) -> f64 {
    if labels.is_empty() {
        return f64::NAN;
    }
    let total: f64 = labels
        .iter()
        .zip(probs)
        .map(|(&y, &p)| {
            let p = p.clamp(LOG_LOSS_EPS, 1.0 - LOG_LOSS_EPS);
            if y != 0 {
                -p.ln()
            } else {
                -(1.0 - p).ln()
            }
        })
        .sum();
    total / labels.len() as f64
}

/// Area under the ROC curve via average ranks (ties share their mean rank)
pub fn roc_auc(labels: &[u8], probs: &[f64]) -> Option<f64> {
    let positives = labels.iter().filter(|&&y| y != 0).count();
    let negatives = labels.len() - positives;
    if positives == 0 || negatives == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..probs.len()).collect();
    order.sort_by(|&a, &b| probs[a].total_cmp(&probs[b]));

    let mut rank_sum_pos = 0.0;
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && probs[order[j + 1]] == probs[order[i]] {
            j += 1;
        }
        // Ranks i+1..=j+1 share their average
        let avg_rank = (i + j + 2) as f64 / 2.0;
        for &idx in &order[i..=j] {
            if labels[idx] != 0 {
                rank_sum_pos += avg_rank;
            }
        }
        i = j + 1;
    }

    let pos = positives as f64;
    let neg = negatives as f64;
    Some((rank_sum_pos - pos * (pos + 1.0) / 2.0) / (pos * neg))
}

/// Equal-width reliability bins over [0, 1]; empty bins are omitted
///
/// Bin `i` holds `edges[i] < p <= edges[i + 1]`, with everything at or
/// below the first inner edge in bin 1.
pub fn calibration_table(labels: &[u8], probs: &[f64], n_bins: usize) -> Vec<CalibrationBin> {
    if n_bins == 0 {
        return Vec::new();
    }
    let width = 1.0 / n_bins as f64;
    let mut sums = vec![(0usize, 0.0f64, 0.0f64); n_bins];

    for (&y, &p) in labels.iter().zip(probs) {
        if !p.is_finite() || p > 1.0 {
            continue;
        }
        let bin = (1..=n_bins)
            .position(|k| p <= k as f64 * width)
            .unwrap_or(n_bins - 1);
        let entry = &mut sums[bin];
        entry.0 += 1;
        entry.1 += p;
        entry.2 += y as f64;
    }

    sums.iter()
        .enumerate()
        .filter(|(_, (count, _, _))| *count > 0)
        .map(|(i, &(count, sum_p, sum_y))| {
            let mean_pred = sum_p / count as f64;
            let mean_true = sum_y / count as f64;
            CalibrationBin {
                bin: i + 1,
                bin_low: i as f64 * width,
                bin_high: (i + 1) as f64 * width,
                count,
                mean_pred,
                mean_true,
                diff: mean_pred - mean_true,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_half_log_loss() {
        let labels = [1, 0, 1, 1];
        let m = evaluate(&labels, &[0.5; 4], 0.5).unwrap();
        assert!((m.log_loss - 2.0_f64.ln()).abs() < 1e-12);
        // p >= 0.5 predicts the positive class
        assert!((m.accuracy - 0.75).abs() < 1e-12);
        assert_eq!(m.roc_auc, Some(0.5));
    }

    #[test]
    fn test_log_loss_is_clipped() {
        let loss = log_loss(&[1], &[0.0]);
        assert!(loss.is_finite());
        assert!((loss - (-LOG_LOSS_EPS.ln())).abs() < 1e-6);
    }

    #[test]
    fn test_roc_auc_perfect_and_single_class() {
        assert_eq!(roc_auc(&[0, 0, 1, 1], &[0.1, 0.2, 0.8, 0.9]), Some(1.0));
        assert_eq!(roc_auc(&[0, 0, 1, 1], &[0.9, 0.8, 0.2, 0.1]), Some(0.0));
        assert_eq!(roc_auc(&[1, 1], &[0.3, 0.4]), None);
    }

    #[test]
    fn test_roc_auc_ties() {
        // One positive tied with one negative counts as half
        let auc = roc_auc(&[0, 1, 0, 1], &[0.2, 0.5, 0.5, 0.9]).unwrap();
        assert!((auc - 0.875).abs() < 1e-12);
    }

    #[test]
    fn test_calibration_table_bins() {
        let labels = [0, 1, 1, 0, 1];
        let probs = [0.05, 0.1, 0.15, 0.55, 1.0];
        let table = calibration_table(&labels, &probs, 10);

        let bins: Vec<usize> = table.iter().map(|b| b.bin).collect();
        assert_eq!(bins, vec![1, 2, 6, 10]);
        assert_eq!(table[0].count, 2);
        assert!((table[0].mean_pred - 0.075).abs() < 1e-12);
        assert!((table[0].mean_true - 0.5).abs() < 1e-12);
        assert!((table[0].diff - (0.075 - 0.5)).abs() < 1e-12);
        assert!((table[2].bin_low - 0.5).abs() < 1e-12);
        assert_eq!(table[3].count, 1);
    }

    #[test]
    fn test_evaluate_rejects_empty() {
        assert!(evaluate(&[], &[], 0.5).is_err());
    }
}
