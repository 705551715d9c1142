//! Base feature frame
//!
//! Turns event records into a [`Frame`] with context flags, market lines,
//! the label and the observed outcome statistics, each tagged with its role.

use std::collections::BTreeSet;

use crate::data::{Column, ColumnRole, FeatureGroup, Frame, RowMeta};
use crate::{EventRecord, FeatureConfig, OverlineError, PaceBucket, Result};

/// Name of the metadata flag marking rows with a real game date
pub const HAS_REAL_DATE: &str = "has_real_date";

/// Build the base frame from records in the order given
pub fn build_frame(records: &[EventRecord], config: &FeatureConfig) -> Result<Frame> {
    if records.is_empty() {
        return Err(OverlineError::InsufficientData("no event records".into()));
    }
    if !records.iter().any(|r| r.pregame.contains_key(&config.line_field)) {
        return Err(OverlineError::MissingColumn(config.line_field.clone()));
    }
    if !records.iter().any(|r| r.outcomes.contains_key(&config.label_field)) {
        return Err(OverlineError::MissingColumn(config.label_field.clone()));
    }

    let meta = records
        .iter()
        .map(|r| RowMeta::from_record(r, &config.line_field))
        .collect();
    let mut frame = Frame::new(meta);

    // Context flags default to 0 when unknown
    let flag = |v: Option<bool>| Some(if v.unwrap_or(false) { 1.0 } else { 0.0 });
    let context = ColumnRole::Feature(FeatureGroup::Context);
    frame.add_column(Column::new(
        "is_home",
        context.clone(),
        records.iter().map(|r| flag(r.is_home)).collect(),
    ))?;
    frame.add_column(Column::new(
        "is_competitive",
        context.clone(),
        records.iter().map(|r| flag(r.is_competitive)).collect(),
    ))?;
    for (name, bucket) in [
        ("pace_low", PaceBucket::Low),
        ("pace_mid", PaceBucket::Mid),
        ("pace_high", PaceBucket::High),
    ] {
        frame.add_column(Column::new(
            name,
            context.clone(),
            records
                .iter()
                .map(|r| flag(Some(r.pace_bucket == Some(bucket))))
                .collect(),
        ))?;
    }

    // Market lines; the game line may be absent everywhere and is imputed later
    let market = ColumnRole::Feature(FeatureGroup::MarketLine);
    for field in [&config.line_field, &config.game_line_field] {
        frame.add_column(Column::new(
            field.as_str(),
            market.clone(),
            records.iter().map(|r| r.pregame_value(field)).collect(),
        ))?;
    }

    // Any other registered pre-game inputs
    let extra_pregame: BTreeSet<&String> = records
        .iter()
        .flat_map(|r| r.pregame.keys())
        .filter(|k| **k != config.line_field && **k != config.game_line_field)
        .collect();
    for key in extra_pregame {
        frame.add_column(Column::new(
            key.as_str(),
            ColumnRole::Feature(FeatureGroup::Other),
            records.iter().map(|r| r.pregame_value(key)).collect(),
        ))?;
    }

    frame.add_column(Column::new(
        config.label_field.as_str(),
        ColumnRole::Label,
        records
            .iter()
            .map(|r| r.label(&config.label_field).map(|hit| if hit { 1.0 } else { 0.0 }))
            .collect(),
    ))?;

    let outcome_keys: BTreeSet<&String> = records
        .iter()
        .flat_map(|r| r.outcomes.keys())
        .filter(|k| **k != config.label_field)
        .collect();
    for key in outcome_keys {
        frame.add_column(Column::new(
            key.as_str(),
            ColumnRole::OutcomeOnly,
            records
                .iter()
                .map(|r| r.outcomes.get(key).copied().filter(|v| v.is_finite()))
                .collect(),
        ))?;
    }

    frame.add_column(Column::new(
        HAS_REAL_DATE,
        ColumnRole::Metadata,
        records
            .iter()
            .map(|r| Some(if r.date.is_some() { 1.0 } else { 0.0 }))
            .collect(),
    ))?;

    log::debug!(
        "Built base frame: {} rows, {} columns",
        frame.len(),
        frame.columns().len()
    );
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Config;

    fn record(game: &str, team: &str) -> EventRecord {
        let mut r = EventRecord::new(game.into(), team.into(), None);
        r.is_home = Some(true);
        r.pace_bucket = Some(PaceBucket::High);
        r.pregame.insert("TEAM_TOTAL_LINE".into(), 110.5);
        r.pregame.insert("REST_DAYS".into(), 2.0);
        r.outcomes.insert("TEAM_TOTAL_OVER_HIT".into(), 1.0);
        r.outcomes.insert("TEAM_TOTAL_MARGIN".into(), 4.5);
        r
    }

    #[test]
    fn test_columns_carry_roles() {
        let config = Config::default().features;
        let frame = build_frame(&[record("1", "A"), record("1", "B")], &config).unwrap();

        let role = |name: &str| frame.column(name).unwrap().role.clone();
        assert_eq!(role("is_home"), ColumnRole::Feature(FeatureGroup::Context));
        assert_eq!(role("pace_high"), ColumnRole::Feature(FeatureGroup::Context));
        assert_eq!(role("TEAM_TOTAL_LINE"), ColumnRole::Feature(FeatureGroup::MarketLine));
        assert_eq!(role("GAME_TOTAL_LINE"), ColumnRole::Feature(FeatureGroup::MarketLine));
        assert_eq!(role("REST_DAYS"), ColumnRole::Feature(FeatureGroup::Other));
        assert_eq!(role("TEAM_TOTAL_OVER_HIT"), ColumnRole::Label);
        assert_eq!(role("TEAM_TOTAL_MARGIN"), ColumnRole::OutcomeOnly);
        assert_eq!(role(HAS_REAL_DATE), ColumnRole::Metadata);

        assert_eq!(frame.column("pace_high").unwrap().values[0], Some(1.0));
        assert_eq!(frame.column("pace_low").unwrap().values[0], Some(0.0));
        assert_eq!(frame.column("is_competitive").unwrap().values[0], Some(0.0));
        assert_eq!(frame.column("GAME_TOTAL_LINE").unwrap().values[0], None);
    }

    #[test]
    fn test_missing_line_field_is_error() {
        let mut r = record("1", "A");
        r.pregame.remove("TEAM_TOTAL_LINE");
        let err = build_frame(&[r], &Config::default().features).unwrap_err();
        assert!(matches!(err, OverlineError::MissingColumn(ref c) if c == "TEAM_TOTAL_LINE"));
    }

    #[test]
    fn test_missing_label_field_is_error() {
        let mut r = record("1", "A");
        r.outcomes.remove("TEAM_TOTAL_OVER_HIT");
        let err = build_frame(&[r], &Config::default().features).unwrap_err();
        assert!(matches!(err, OverlineError::MissingColumn(ref c) if c == "TEAM_TOTAL_OVER_HIT"));
    }
}
