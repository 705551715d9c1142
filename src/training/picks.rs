//! Decision-policy analysis over backtest predictions
//!
//! Turns canonical probabilities into pick rules and reports how often each
//! rule would have hit. Expected values are hypothetical and assume a fixed
//! payout on every pick.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::training::backtest::PredictionRecord;
use crate::training::metrics::calibration_table;
use crate::{PolicyConfig, Side};

/// z-score of a two-sided 95% normal interval
pub const Z_95: f64 = 1.96;

pub const HYPOTHETICAL_NOTE: &str = "HYPOTHETICAL: assumes a fixed payout on every pick. Not a profitability claim.";

/// Hit rate with a normal-approximation interval clipped to [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HitRate {
    pub rate: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
}

impl HitRate {
    /// `None` when there are no picks
    pub fn from_counts(picks: usize, hits: usize) -> Option<Self> {
        if picks == 0 {
            return None;
        }
        let n = picks as f64;
        let p = hits as f64 / n;
        let se = (p * (1.0 - p) / n).sqrt();
        Some(HitRate {
            rate: p,
            ci_lower: (p - Z_95 * se).max(0.0),
            ci_upper: (p + Z_95 * se).min(1.0),
        })
    }
}

/// Counts for one pick rule, split by side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyResult {
    pub num_picks: usize,
    pub hit_rate: Option<HitRate>,
    pub over_picks: usize,
    pub over_hit_rate: Option<HitRate>,
    pub under_picks: usize,
    pub under_hit_rate: Option<HitRate>,
}

#[derive(Default)]
struct Tally {
    over: usize,
    over_hits: usize,
    under: usize,
    under_hits: usize,
    /// Picks with no side (p exactly 0.5); never a hit
    neutral: usize,
}

impl Tally {
    fn add(&mut self, side: Option<Side>, y_true: u8) {
        match side {
            Some(Side::Over) => {
                self.over += 1;
                self.over_hits += usize::from(y_true != 0);
            }
            Some(Side::Under) => {
                self.under += 1;
                self.under_hits += usize::from(y_true == 0);
            }
            None => self.neutral += 1,
        }
    }

    fn result(&self) -> PolicyResult {
        let total = self.over + self.under + self.neutral;
        PolicyResult {
            num_picks: total,
            hit_rate: HitRate::from_counts(total, self.over_hits + self.under_hits),
            over_picks: self.over,
            over_hit_rate: HitRate::from_counts(self.over, self.over_hits),
            under_picks: self.under,
            under_hit_rate: HitRate::from_counts(self.under, self.under_hits),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdPolicy {
    pub threshold: f64,
    #[serde(flatten)]
    pub result: PolicyResult,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopKPolicy {
    pub k: usize,
    #[serde(flatten)]
    pub result: PolicyResult,
}

/// Probability decile with its realised hit rate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecileRow {
    pub decile: usize,
    pub bin_low: f64,
    pub bin_high: f64,
    pub count: usize,
    pub mean_pred: f64,
    pub mean_true: f64,
    /// mean_true - mean_pred
    pub calibration_diff: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HypotheticalEv {
    pub num_ev_positive_picks: usize,
    pub avg_ev: Option<f64>,
    pub hit_rate: Option<f64>,
    pub assumed_payout: f64,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PicksReport {
    pub decile_analysis: Vec<DecileRow>,
    pub threshold_policy: Vec<ThresholdPolicy>,
    pub topk_policy: Vec<TopKPolicy>,
    pub hypothetical_ev: HypotheticalEv,
}

/// Expected value per unit staked on `side` at probability `p` of Over
pub fn expected_value(p: f64, side: Side, payout: f64) -> f64 {
    let win = match side {
        Side::Over => p,
        Side::Under => 1.0 - p,
    };
    win * payout - (1.0 - win)
}

fn confident_side(p: f64) -> Option<Side> {
    if p > 0.5 {
        Some(Side::Over)
    } else if p < 0.5 {
        Some(Side::Under)
    } else {
        None
    }
}

pub fn analyze_deciles(predictions: &[PredictionRecord]) -> Vec<DecileRow> {
    let labels: Vec<u8> = predictions.iter().map(|p| p.y_true).collect();
    let probs: Vec<f64> = predictions.iter().map(|p| p.p_hat).collect();
    calibration_table(&labels, &probs, 10)
        .into_iter()
        .map(|b| DecileRow {
            decile: b.bin,
            bin_low: b.bin_low,
            bin_high: b.bin_high,
            count: b.count,
            mean_pred: b.mean_pred,
            mean_true: b.mean_true,
            calibration_diff: -b.diff,
        })
        .collect()
}

/// Over when `p >= t`, Under when `p <= 1 - t`, otherwise no pick
pub fn analyze_thresholds(predictions: &[PredictionRecord], thresholds: &[f64]) -> Vec<ThresholdPolicy> {
    thresholds
        .iter()
        .map(|&t| {
            let mut tally = Tally::default();
            for p in predictions {
                if p.p_hat >= t {
                    tally.add(Some(Side::Over), p.y_true);
                } else if p.p_hat <= 1.0 - t {
                    tally.add(Some(Side::Under), p.y_true);
                }
            }
            ThresholdPolicy {
                threshold: t,
                result: tally.result(),
            }
        })
        .collect()
}

/// The `k` most confident predictions (largest |p - 0.5|) of every fold
pub fn analyze_top_k(predictions: &[PredictionRecord], k_values: &[usize]) -> Vec<TopKPolicy> {
    let mut by_fold: BTreeMap<usize, Vec<&PredictionRecord>> = BTreeMap::new();
    for p in predictions {
        by_fold.entry(p.fold).or_default().push(p);
    }
    for rows in by_fold.values_mut() {
        // Stable sort keeps earlier rows first on ties
        rows.sort_by(|a, b| (b.p_hat - 0.5).abs().total_cmp(&(a.p_hat - 0.5).abs()));
    }

    k_values
        .iter()
        .map(|&k| {
            let mut tally = Tally::default();
            for rows in by_fold.values() {
                for p in rows.iter().take(k) {
                    tally.add(confident_side(p.p_hat), p.y_true);
                }
            }
            TopKPolicy {
                k,
                result: tally.result(),
            }
        })
        .collect()
}

/// Picks whose recommended side has positive hypothetical EV
pub fn analyze_ev(predictions: &[PredictionRecord], payout: f64) -> HypotheticalEv {
    let mut count = 0usize;
    let mut hits = 0usize;
    let mut ev_sum = 0.0;
    for p in predictions {
        let side = Side::from_probability(p.p_hat);
        let ev = expected_value(p.p_hat, side, payout);
        if ev > 0.0 {
            count += 1;
            ev_sum += ev;
            let hit = match side {
                Side::Over => p.y_true != 0,
                Side::Under => p.y_true == 0,
            };
            hits += usize::from(hit);
        }
    }

    HypotheticalEv {
        num_ev_positive_picks: count,
        avg_ev: (count > 0).then(|| ev_sum / count as f64),
        hit_rate: (count > 0).then(|| hits as f64 / count as f64),
        assumed_payout: payout,
        note: HYPOTHETICAL_NOTE.to_string(),
    }
}

pub fn analyze_picks(predictions: &[PredictionRecord], policy: &PolicyConfig) -> PicksReport {
    log::info!("Analyzing pick policies over {} predictions", predictions.len());
    PicksReport {
        decile_analysis: analyze_deciles(predictions),
        threshold_policy: analyze_thresholds(predictions, &policy.thresholds),
        topk_policy: analyze_top_k(predictions, &policy.top_k),
        hypothetical_ev: analyze_ev(predictions, policy.assumed_payout),
    }
}
