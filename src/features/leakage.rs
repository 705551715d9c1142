//! Outcome leakage guards
//!
//! The authoritative check is the column role assigned at creation. A name
//! check on outcome patterns runs on top of it for inputs whose role cannot
//! be trusted, such as feature lists read back from a saved model.

use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::SeedableRng;

use crate::data::{ColumnRole, FeatureGroup, Frame};
use crate::features::rolling::aggregate;
use crate::{OverlineError, Result};

/// Substrings that mark a column as describing the game's outcome
pub const OUTCOME_PATTERNS: [&str; 4] = ["_ACTUAL", "_OVER_HIT", "_MARGIN", "_STRONG_HIT"];

/// Prefix of backward-looking columns exempt from the name check
pub const ROLLING_PREFIX: &str = "rolling_";

/// True if a column name looks like an outcome statistic
///
/// Substring matching also catches legitimate names that merely contain a
/// pattern (e.g. `PREV_GAME_MARGIN_LINE`); such inputs have to be renamed.
pub fn is_outcome_name(name: &str) -> bool {
    !name.starts_with(ROLLING_PREFIX) && OUTCOME_PATTERNS.iter().any(|p| name.contains(p))
}

/// Fail if any name matches an outcome pattern
pub fn check_names<S: AsRef<str>>(names: &[S]) -> Result<()> {
    let leaky: Vec<String> = names
        .iter()
        .map(|n| n.as_ref())
        .filter(|n| is_outcome_name(n))
        .map(str::to_string)
        .collect();
    if leaky.is_empty() {
        Ok(())
    } else {
        Err(OverlineError::LeakageDetected { columns: leaky })
    }
}

/// Fail if any selected column is not a pre-game feature
///
/// Every offending column is listed, not just the first.
pub fn check_feature_columns<S: AsRef<str>>(frame: &Frame, names: &[S]) -> Result<()> {
    let mut leaky = Vec::new();
    for name in names.iter().map(|n| n.as_ref()) {
        let column = frame
            .column(name)
            .ok_or_else(|| OverlineError::MissingColumn(name.to_string()))?;
        if !column.role.is_feature() || is_outcome_name(name) {
            leaky.push(name.to_string());
        }
    }
    if leaky.is_empty() {
        Ok(())
    } else {
        Err(OverlineError::LeakageDetected { columns: leaky })
    }
}

/// Spot-check a rolling column on a seeded sample of rows
///
/// Each sampled value is recomputed from scratch using only same-team rows
/// that come strictly earlier, and must match what the engine produced.
pub fn verify_no_leakage(frame: &Frame, column: &str, n_check: usize, seed: u64) -> Result<()> {
    let col = frame
        .column(column)
        .ok_or_else(|| OverlineError::MissingColumn(column.to_string()))?;
    let spec = match &col.role {
        ColumnRole::Feature(FeatureGroup::Rolling(spec)) => spec,
        _ => {
            log::warn!("{} is not a rolling column, skipping leakage check", column);
            return Ok(());
        }
    };
    let source = frame
        .column(&spec.source)
        .ok_or_else(|| OverlineError::MissingColumn(spec.source.clone()))?;

    let mut rng = StdRng::seed_from_u64(seed);
    let meta = frame.meta();
    for row in sample(&mut rng, frame.len(), n_check.min(frame.len())).into_vec() {
        let current = &meta[row];
        let mut earlier: Vec<usize> = (0..frame.len())
            .filter(|&j| {
                meta[j].team_id == current.team_id && meta[j].team_cmp(current).is_lt()
            })
            .collect();
        earlier.sort_by(|&a, &b| meta[a].team_cmp(&meta[b]));
        let start = earlier.len().saturating_sub(spec.window);
        let window: Vec<Option<f64>> = earlier[start..].iter().map(|&j| source.values[j]).collect();

        let expected = aggregate(&window, spec.agg);
        let matches = match (expected, col.values[row]) {
            (None, None) => true,
            (Some(a), Some(b)) => (a - b).abs() <= 1e-9 * a.abs().max(1.0),
            _ => false,
        };
        if !matches {
            log::error!(
                "{} at row {} ({} / {}) does not match its earlier-rows value",
                column,
                row,
                current.team_id,
                current.game_id
            );
            return Err(OverlineError::LeakageDetected {
                columns: vec![column.to_string()],
            });
        }
    }
    log::debug!("Leakage spot check passed for {}", column);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Column, RowMeta};
    use crate::features::rolling::RollingFeatureEngine;
    use chrono::NaiveDate;

    fn sample_frame() -> Frame {
        let meta = (0..12)
            .map(|i| RowMeta {
                date: NaiveDate::from_ymd_opt(2024, 3, 1 + i / 2),
                team_id: if i % 2 == 0 { "A".into() } else { "B".into() },
                game_id: format!("{:03}", i / 2).as_str().into(),
                line: Some(100.0),
            })
            .collect();
        let mut frame = Frame::new(meta);
        frame
            .add_column(Column::new(
                "TEAM_TOTAL_MARGIN",
                ColumnRole::OutcomeOnly,
                (0..12).map(|i| Some((i as f64 * 1.7).sin() * 10.0)).collect(),
            ))
            .unwrap();
        frame
            .add_column(Column::new(
                "TEAM_TOTAL_LINE",
                ColumnRole::Feature(FeatureGroup::MarketLine),
                vec![Some(100.0); 12],
            ))
            .unwrap();
        frame
    }

    #[test]
    fn test_outcome_names() {
        assert!(is_outcome_name("TEAM_TOTAL_ACTUAL"));
        assert!(is_outcome_name("PTS_STRONG_HIT"));
        assert!(!is_outcome_name("rolling_TEAM_TOTAL_margin_mean_5"));
        assert!(!is_outcome_name("TEAM_TOTAL_LINE"));
    }

    #[test]
    fn test_check_names_lists_every_offender() {
        let names = ["TEAM_TOTAL_LINE", "X_ACTUAL", "Y_MARGIN", "is_home"];
        match check_names(&names) {
            Err(OverlineError::LeakageDetected { columns }) => {
                assert_eq!(columns, vec!["X_ACTUAL", "Y_MARGIN"]);
            }
            other => panic!("expected leakage error, got {:?}", other),
        }
    }

    #[test]
    fn test_role_check_rejects_outcome_columns() {
        let frame = sample_frame();
        assert!(check_feature_columns(&frame, &["TEAM_TOTAL_LINE"]).is_ok());
        let err = check_feature_columns(&frame, &["TEAM_TOTAL_LINE", "TEAM_TOTAL_MARGIN"]);
        assert!(matches!(err, Err(OverlineError::LeakageDetected { .. })));
        let err = check_feature_columns(&frame, &["nope"]);
        assert!(matches!(err, Err(OverlineError::MissingColumn(_))));
    }

    #[test]
    fn test_spot_check_passes_on_engine_output() {
        let out = RollingFeatureEngine::new(&[3]).augment(&sample_frame()).unwrap();
        for name in &out.added {
            verify_no_leakage(&out.frame, name, 12, 7).unwrap();
        }
    }

    #[test]
    fn test_spot_check_catches_same_row_values() {
        // A "rolling" column that includes the current row's own margin
        let frame = sample_frame();
        let out = RollingFeatureEngine::new(&[3]).augment(&frame).unwrap();
        let name = "rolling_TEAM_TOTAL_margin_mean_3";
        let role = out.frame.column(name).unwrap().role.clone();
        let leaky = out
            .frame
            .with_column(Column::new(
                name,
                role,
                frame.column("TEAM_TOTAL_MARGIN").unwrap().values.clone(),
            ))
            .unwrap();
        let err = verify_no_leakage(&leaky, name, 12, 7);
        assert!(matches!(err, Err(OverlineError::LeakageDetected { .. })));
    }
}
