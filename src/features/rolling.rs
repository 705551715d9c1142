//! Backward-looking rolling aggregates
//!
//! For each team, the value at a row is an aggregate over that team's most
//! recent earlier rows only. The row itself and anything after it never
//! contribute, so the columns are safe to use as pre-game features.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::data::{Column, ColumnRole, FeatureGroup, Frame, RollingAgg, RollingSpec};
use crate::{Result, TeamId};

/// How much the per-team ordering can be trusted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TemporalValidity {
    /// Every row carries a date
    Full,
    /// Some rows lack a date and were ordered after all dated rows
    Partial { undated: usize },
    /// No dates at all; order falls back to game id within each team
    Fallback,
}

impl TemporalValidity {
    pub fn is_reduced(&self) -> bool {
        !matches!(self, TemporalValidity::Full)
    }
}

/// Result of [`RollingFeatureEngine::augment`]
#[derive(Debug, Clone)]
pub struct RollingOutput {
    pub frame: Frame,
    pub temporal: TemporalValidity,
    /// Names of the columns that were added
    pub added: Vec<String>,
}

/// Computes `rolling_<stat>_<agg>_<w>` columns
#[derive(Debug, Clone)]
pub struct RollingFeatureEngine {
    windows: Vec<usize>,
}

impl RollingFeatureEngine {
    pub fn new(windows: &[usize]) -> Self {
        let mut windows: Vec<usize> = windows.iter().copied().filter(|w| *w > 0).collect();
        windows.sort_unstable();
        windows.dedup();
        RollingFeatureEngine { windows }
    }

    /// Rolling specs derived from a frame's outcome and label columns
    ///
    /// `*_MARGIN` statistics get a mean and a standard deviation, `*_OVER_HIT`
    /// flags get a hit rate.
    pub fn specs_for(&self, frame: &Frame) -> Vec<(String, RollingSpec)> {
        let mut specs = Vec::new();
        for column in frame.columns() {
            if !matches!(column.role, ColumnRole::Label | ColumnRole::OutcomeOnly) {
                continue;
            }
            let aggs: &[(RollingAgg, &str)] = if column.name.ends_with("_MARGIN") {
                &[(RollingAgg::Mean, "margin_mean"), (RollingAgg::Std, "margin_std")]
            } else if column.name.ends_with("_OVER_HIT") {
                &[(RollingAgg::Rate, "over_rate")]
            } else {
                continue;
            };
            let base = source_base(&column.name);
            for &window in &self.windows {
                for (agg, label) in aggs {
                    specs.push((
                        format!("rolling_{}_{}_{}", base, label, window),
                        RollingSpec {
                            source: column.name.clone(),
                            agg: *agg,
                            window,
                        },
                    ));
                }
            }
        }
        specs
    }

    /// Return a copy of `frame` with rolling columns added
    ///
    /// Rows keep their input order; the per-team ordering is established
    /// internally.
    pub fn augment(&self, frame: &Frame) -> Result<RollingOutput> {
        let temporal = temporal_validity(frame);
        match temporal {
            TemporalValidity::Full => {}
            TemporalValidity::Partial { undated } => log::warn!(
                "{} of {} rows have no date; they are ordered last within each team",
                undated,
                frame.len()
            ),
            TemporalValidity::Fallback => log::warn!(
                "No game dates available; ordering teams by game id, temporal validity is reduced"
            ),
        }

        let groups = team_sequences(frame);
        let mut out = frame.clone();
        let mut added = Vec::new();

        for (name, spec) in self.specs_for(frame) {
            let source = match frame.column(&spec.source) {
                Some(c) => c,
                None => continue,
            };
            let mut values = vec![None; frame.len()];
            for rows in groups.values() {
                let series: Vec<Option<f64>> = rows.iter().map(|&i| source.values[i]).collect();
                for (k, &row) in rows.iter().enumerate() {
                    let start = k.saturating_sub(spec.window);
                    values[row] = aggregate(&series[start..k], spec.agg);
                }
            }
            out.add_column(Column::new(
                name.as_str(),
                ColumnRole::Feature(FeatureGroup::Rolling(spec)),
                values,
            ))?;
            added.push(name);
        }

        log::info!(
            "Added {} rolling features (windows {:?})",
            added.len(),
            self.windows
        );
        Ok(RollingOutput {
            frame: out,
            temporal,
            added,
        })
    }
}

/// Strip the statistic suffix: `TEAM_TOTAL_MARGIN` -> `TEAM_TOTAL`
fn source_base(name: &str) -> &str {
    name.strip_suffix("_MARGIN")
        .or_else(|| name.strip_suffix("_OVER_HIT"))
        .unwrap_or(name)
}

fn temporal_validity(frame: &Frame) -> TemporalValidity {
    let dated = frame.dated_rows();
    if dated == frame.len() {
        TemporalValidity::Full
    } else if dated == 0 {
        TemporalValidity::Fallback
    } else {
        TemporalValidity::Partial {
            undated: frame.len() - dated,
        }
    }
}

/// Row indices per team, each in (date, undated last, game id) order
pub(crate) fn team_sequences(frame: &Frame) -> HashMap<TeamId, Vec<usize>> {
    let mut groups: HashMap<TeamId, Vec<usize>> = HashMap::new();
    for row in frame.team_order() {
        groups
            .entry(frame.meta()[row].team_id.clone())
            .or_default()
            .push(row);
    }
    groups
}

/// Aggregate a window of prior values, ignoring missing entries
///
/// Mean and rate need one observation; the sample standard deviation needs
/// two. An empty window yields `None`.
pub fn aggregate(window: &[Option<f64>], agg: RollingAgg) -> Option<f64> {
    let present: Vec<f64> = window.iter().flatten().copied().collect();
    let n = present.len();
    match agg {
        RollingAgg::Mean | RollingAgg::Rate => {
            if n == 0 {
                None
            } else {
                Some(present.iter().sum::<f64>() / n as f64)
            }
        }
        RollingAgg::Std => {
            if n < 2 {
                return None;
            }
            let mean = present.iter().sum::<f64>() / n as f64;
            let var = present.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
            Some(var.sqrt())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::RowMeta;
    use chrono::NaiveDate;

    fn frame_with_margins(rows: &[(&str, &str, Option<u32>, f64, f64)]) -> Frame {
        let meta = rows
            .iter()
            .map(|(team, game, day, _, _)| RowMeta {
                date: day.and_then(|d| NaiveDate::from_ymd_opt(2024, 1, d)),
                team_id: (*team).into(),
                game_id: (*game).into(),
                line: Some(100.0),
            })
            .collect();
        let mut frame = Frame::new(meta);
        frame
            .add_column(Column::new(
                "TEAM_TOTAL_MARGIN",
                ColumnRole::OutcomeOnly,
                rows.iter().map(|r| Some(r.3)).collect(),
            ))
            .unwrap();
        frame
            .add_column(Column::new(
                "TEAM_TOTAL_OVER_HIT",
                ColumnRole::Label,
                rows.iter().map(|r| Some(r.4)).collect(),
            ))
            .unwrap();
        frame
    }

    fn values(frame: &Frame, name: &str) -> Vec<Option<f64>> {
        frame.column(name).unwrap().values.clone()
    }

    #[test]
    fn test_shift_by_one_and_window() {
        // Team A plays days 1..4, team B interleaved
        let frame = frame_with_margins(&[
            ("A", "1", Some(1), 2.0, 1.0),
            ("B", "1", Some(1), -5.0, 0.0),
            ("A", "2", Some(2), 4.0, 1.0),
            ("A", "3", Some(3), -3.0, 0.0),
            ("B", "2", Some(2), 7.0, 1.0),
            ("A", "4", Some(4), 10.0, 1.0),
        ]);
        let out = RollingFeatureEngine::new(&[2]).augment(&frame).unwrap();
        assert_eq!(out.temporal, TemporalValidity::Full);

        let mean = values(&out.frame, "rolling_TEAM_TOTAL_margin_mean_2");
        assert_eq!(mean[0], None);
        assert_eq!(mean[1], None);
        assert_eq!(mean[2], Some(2.0));
        assert_eq!(mean[3], Some(3.0));
        assert_eq!(mean[4], Some(-5.0));
        assert_eq!(mean[5], Some(0.5));

        let rate = values(&out.frame, "rolling_TEAM_TOTAL_over_rate_2");
        assert_eq!(rate[0], None);
        assert_eq!(rate[3], Some(1.0));
        assert_eq!(rate[5], Some(0.5));

        let std = values(&out.frame, "rolling_TEAM_TOTAL_margin_std_2");
        assert_eq!(std[2], None);
        assert!((std[3].unwrap() - 2.0_f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_input_order_does_not_matter() {
        let rows = [
            ("A", "1", Some(1), 2.0, 1.0),
            ("A", "2", Some(2), 4.0, 1.0),
            ("A", "3", Some(3), -3.0, 0.0),
        ];
        let forward = frame_with_margins(&rows);
        let reversed = frame_with_margins(&[rows[2], rows[1], rows[0]]);

        let engine = RollingFeatureEngine::new(&[5]);
        let a = values(&engine.augment(&forward).unwrap().frame, "rolling_TEAM_TOTAL_margin_mean_5");
        let b = values(&engine.augment(&reversed).unwrap().frame, "rolling_TEAM_TOTAL_margin_mean_5");
        assert_eq!(a, vec![b[2], b[1], b[0]]);
    }

    #[test]
    fn test_later_rows_do_not_change_earlier_values() {
        let base = [
            ("A", "1", Some(1), 2.0, 1.0),
            ("A", "2", Some(2), 4.0, 1.0),
            ("A", "3", Some(3), -3.0, 0.0),
            ("A", "4", Some(4), 6.0, 1.0),
        ];
        let mut perturbed = base;
        perturbed[2].3 = 99.0;
        perturbed[3].3 = -99.0;
        perturbed[2].4 = 1.0;

        let engine = RollingFeatureEngine::new(&[5, 10]);
        let a = engine.augment(&frame_with_margins(&base)).unwrap();
        let b = engine.augment(&frame_with_margins(&perturbed)).unwrap();
        for name in &a.added {
            let (va, vb) = (values(&a.frame, name), values(&b.frame, name));
            assert_eq!(va[..3], vb[..3], "{} changed at or before row 2", name);
        }
    }

    #[test]
    fn test_undated_rows_report_reduced_validity() {
        let partial = frame_with_margins(&[
            ("A", "1", Some(1), 1.0, 1.0),
            ("A", "2", None, 3.0, 0.0),
        ]);
        let out = RollingFeatureEngine::new(&[5]).augment(&partial).unwrap();
        assert_eq!(out.temporal, TemporalValidity::Partial { undated: 1 });
        assert!(out.temporal.is_reduced());

        let undated = frame_with_margins(&[
            ("A", "2", None, 3.0, 0.0),
            ("A", "1", None, 1.0, 1.0),
        ]);
        let out = RollingFeatureEngine::new(&[5]).augment(&undated).unwrap();
        assert_eq!(out.temporal, TemporalValidity::Fallback);
        // Game "1" sorts first, so game "2" sees its margin
        assert_eq!(values(&out.frame, "rolling_TEAM_TOTAL_margin_mean_5")[0], Some(1.0));
    }

    #[test]
    fn test_aggregate_skips_missing() {
        let window = [Some(1.0), None, Some(3.0)];
        assert_eq!(aggregate(&window, RollingAgg::Mean), Some(2.0));
        assert_eq!(aggregate(&[None], RollingAgg::Rate), None);
        assert_eq!(aggregate(&[Some(4.0)], RollingAgg::Std), None);
        assert_eq!(aggregate(&[], RollingAgg::Mean), None);
    }

    #[test]
    fn test_rolling_columns_are_tagged_features() {
        let frame = frame_with_margins(&[("A", "1", Some(1), 1.0, 1.0)]);
        let out = RollingFeatureEngine::new(&[5]).augment(&frame).unwrap();
        let col = out.frame.column("rolling_TEAM_TOTAL_margin_std_5").unwrap();
        match &col.role {
            ColumnRole::Feature(FeatureGroup::Rolling(spec)) => {
                assert_eq!(spec.source, "TEAM_TOTAL_MARGIN");
                assert_eq!(spec.agg, RollingAgg::Std);
                assert_eq!(spec.window, 5);
            }
            other => panic!("unexpected role {:?}", other),
        }
        assert_eq!(out.added.len(), 3);
    }
}
