//! Column-tagged frame of per-team game rows
//!
//! Every column carries its role from the moment it is created, so feature
//! selection never has to guess from a column's name whether it describes
//! the game's outcome.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;

use crate::{EventRecord, GameId, OverlineError, Result, TeamId};

/// Aggregation applied over a rolling window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RollingAgg {
    Mean,
    Std,
    Rate,
}

/// How a rolling column was derived
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollingSpec {
    /// Source statistic, e.g. `TEAM_TOTAL_MARGIN`
    pub source: String,
    pub agg: RollingAgg,
    pub window: usize,
}

/// Feature family, used to build nested ablation subsets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeatureGroup {
    MarketLine,
    Context,
    Rolling(RollingSpec),
    Other,
}

/// Classification assigned when a column is created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnRole {
    /// Known before the game; may be used for prediction
    Feature(FeatureGroup),
    /// The prediction target
    Label,
    /// Observed only after the game; never a feature
    OutcomeOnly,
    /// Bookkeeping (ids, date flags); never a feature
    Metadata,
}

impl ColumnRole {
    pub fn is_feature(&self) -> bool {
        matches!(self, ColumnRole::Feature(_))
    }

    pub fn group(&self) -> Option<&FeatureGroup> {
        match self {
            ColumnRole::Feature(group) => Some(group),
            _ => None,
        }
    }
}

/// A named numeric column; `None` marks a missing value
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub role: ColumnRole,
    pub values: Vec<Option<f64>>,
}

impl Column {
    pub fn new(name: impl Into<String>, role: ColumnRole, values: Vec<Option<f64>>) -> Self {
        Column {
            name: name.into(),
            role,
            values,
        }
    }
}

/// Row identity carried alongside the columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowMeta {
    pub date: Option<NaiveDate>,
    pub team_id: TeamId,
    pub game_id: GameId,
    /// Posted market line for the row's label
    pub line: Option<f64>,
}

impl RowMeta {
    pub fn from_record(record: &EventRecord, line_field: &str) -> Self {
        RowMeta {
            date: record.date,
            team_id: record.team_id.clone(),
            game_id: record.game_id.clone(),
            line: record.pregame_value(line_field),
        }
    }

    /// Dated rows first in date order, then game and team id
    pub fn chronological_cmp(&self, other: &RowMeta) -> Ordering {
        self.date
            .is_none()
            .cmp(&other.date.is_none())
            .then(self.date.cmp(&other.date))
            .then_with(|| self.game_id.cmp(&other.game_id))
            .then_with(|| self.team_id.cmp(&other.team_id))
    }

    /// Grouped by team, then dated rows in date order, then game id
    pub fn team_cmp(&self, other: &RowMeta) -> Ordering {
        self.team_id
            .cmp(&other.team_id)
            .then(self.date.is_none().cmp(&other.date.is_none()))
            .then(self.date.cmp(&other.date))
            .then_with(|| self.game_id.cmp(&other.game_id))
    }
}

/// In-memory table of rows with tagged columns
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    meta: Vec<RowMeta>,
    columns: Vec<Column>,
}

impl Frame {
    pub fn new(meta: Vec<RowMeta>) -> Self {
        Frame {
            meta,
            columns: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.meta.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meta.is_empty()
    }

    pub fn meta(&self) -> &[RowMeta] {
        &self.meta
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Names of all feature-role columns in insertion order
    pub fn feature_names(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| c.role.is_feature())
            .map(|c| c.name.clone())
            .collect()
    }

    /// Add a column, replacing any existing column of the same name
    pub fn add_column(&mut self, column: Column) -> Result<()> {
        if column.values.len() != self.meta.len() {
            return Err(OverlineError::InsufficientData(format!(
                "column {} has {} values for {} rows",
                column.name,
                column.values.len(),
                self.meta.len()
            )));
        }
        match self.columns.iter_mut().find(|c| c.name == column.name) {
            Some(existing) => *existing = column,
            None => self.columns.push(column),
        }
        Ok(())
    }

    /// Copy of this frame with one more column
    pub fn with_column(&self, column: Column) -> Result<Frame> {
        let mut frame = self.clone();
        frame.add_column(column)?;
        Ok(frame)
    }

    /// Row indices in chronological order (stable)
    pub fn chronological_order(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.sort_by(|&a, &b| self.meta[a].chronological_cmp(&self.meta[b]));
        order
    }

    /// Row indices grouped by team, each team in time order (stable)
    pub fn team_order(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.sort_by(|&a, &b| self.meta[a].team_cmp(&self.meta[b]));
        order
    }

    pub fn dated_rows(&self) -> usize {
        self.meta.iter().filter(|m| m.date.is_some()).count()
    }

    pub fn unique_teams(&self) -> usize {
        self.meta.iter().map(|m| &m.team_id).collect::<HashSet<_>>().len()
    }

    pub fn unique_games(&self) -> usize {
        self.meta.iter().map(|m| &m.game_id).collect::<HashSet<_>>().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(team: &str, game: &str, date: Option<u32>) -> RowMeta {
        RowMeta {
            date: date.and_then(|d| NaiveDate::from_ymd_opt(2024, 1, d)),
            team_id: team.into(),
            game_id: game.into(),
            line: Some(100.0),
        }
    }

    fn sample_frame() -> Frame {
        let mut frame = Frame::new(vec![
            meta("B", "g3", Some(3)),
            meta("A", "g9", None),
            meta("A", "g1", Some(1)),
            meta("B", "g1", Some(1)),
        ]);
        frame
            .add_column(Column::new(
                "x",
                ColumnRole::Feature(FeatureGroup::Other),
                vec![Some(3.0), Some(9.0), Some(1.0), Some(1.5)],
            ))
            .unwrap();
        frame
    }

    #[test]
    fn test_chronological_order_puts_undated_last() {
        let frame = sample_frame();
        assert_eq!(frame.chronological_order(), vec![2, 3, 0, 1]);
    }

    #[test]
    fn test_team_order_groups_teams() {
        let frame = sample_frame();
        assert_eq!(frame.team_order(), vec![2, 1, 3, 0]);
    }

    #[test]
    fn test_add_column_rejects_wrong_length() {
        let mut frame = sample_frame();
        let err = frame.add_column(Column::new("bad", ColumnRole::Metadata, vec![None]));
        assert!(err.is_err());
    }

    #[test]
    fn test_with_column_replaces_same_name() {
        let frame = sample_frame();
        let replaced = frame
            .with_column(Column::new("x", ColumnRole::OutcomeOnly, vec![None; 4]))
            .unwrap();
        assert_eq!(replaced.columns().len(), 1);
        assert!(replaced.feature_names().is_empty());
        assert_eq!(frame.feature_names(), vec!["x".to_string()]);
    }

    #[test]
    fn test_unique_counts() {
        let frame = sample_frame();
        assert_eq!(frame.unique_teams(), 2);
        assert_eq!(frame.unique_games(), 3);
        assert_eq!(frame.dated_rows(), 3);
    }
}
