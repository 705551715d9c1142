//! Variant selection by log loss

use serde::{Deserialize, Serialize};

use crate::model::CalibrationVariant;

/// Outcome of choosing the canonical variant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub variant: CalibrationVariant,
    pub log_loss: f64,
    /// Variants left out as numerically unstable
    pub excluded: Vec<CalibrationVariant>,
}

/// Isotonic results above `isotonic_max_log_loss` are treated as unstable
pub fn is_eligible(variant: CalibrationVariant, log_loss: f64, isotonic_max_log_loss: f64) -> bool {
    if !log_loss.is_finite() {
        return false;
    }
    !(variant == CalibrationVariant::Isotonic && log_loss > isotonic_max_log_loss)
}

/// First entry with the strictly lowest score; earlier entries win ties
pub fn lowest<T>(items: &[(T, f64)]) -> Option<&(T, f64)> {
    let mut best: Option<&(T, f64)> = None;
    for item in items {
        if !item.1.is_finite() {
            continue;
        }
        match best {
            Some(b) if item.1 >= b.1 => {}
            _ => best = Some(item),
        }
    }
    best
}

/// Pick the canonical variant from per-variant overall log losses
///
/// Candidates are considered in preference order (uncalibrated, sigmoid,
/// isotonic) regardless of the order given.
pub fn select_variant(
    scores: &[(CalibrationVariant, f64)],
    isotonic_max_log_loss: f64,
) -> Option<Selection> {
    let mut ordered: Vec<(CalibrationVariant, f64)> = scores.to_vec();
    ordered.sort_by_key(|(v, _)| *v);

    let (eligible, excluded): (Vec<_>, Vec<_>) = ordered
        .into_iter()
        .partition(|(v, loss)| is_eligible(*v, *loss, isotonic_max_log_loss));
    let excluded: Vec<CalibrationVariant> = excluded.into_iter().map(|(v, _)| v).collect();
    for v in &excluded {
        log::warn!("Excluding {} variant from selection (unstable log loss)", v);
    }

    lowest(&eligible).map(|&(variant, log_loss)| Selection {
        variant,
        log_loss,
        excluded,
    })
}
