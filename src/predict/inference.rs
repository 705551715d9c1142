//! Inference for upcoming games

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::features::{build_frame, leakage, RollingFeatureEngine};
use crate::model::ModelPipeline;
use crate::training::picks::expected_value;
use crate::{Config, EventRecord, FeatureConfig, GameId, OverlineError, Result, Side, TeamId};

/// Model output for one upcoming team-game
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuturePick {
    pub game_id: GameId,
    pub team_id: TeamId,
    pub date: Option<NaiveDate>,
    pub line: Option<f64>,
    pub game_line: Option<f64>,
    pub p_hat: f64,
    /// Distance of `p_hat` from 0.5
    pub confidence: f64,
    pub side: Side,
    /// Hypothetical EV of the recommended side at the assumed payout
    pub hypothetical_ev: f64,
}

/// Scores upcoming games with a saved pipeline
pub struct Predictor {
    pipeline: ModelPipeline,
    features: FeatureConfig,
    engine: RollingFeatureEngine,
    payout: f64,
}

impl Predictor {
    pub fn new(pipeline: ModelPipeline, config: &Config) -> Result<Self> {
        leakage::check_names(&pipeline.feature_names())?;
        Ok(Predictor {
            pipeline,
            features: config.features.clone(),
            engine: RollingFeatureEngine::new(&config.features.rolling_windows),
            payout: config.policy.assumed_payout,
        })
    }

    /// Load the pipeline written by a backtest run
    pub fn load<P: AsRef<Path>>(model_path: P, config: &Config) -> Result<Self> {
        Self::new(ModelPipeline::load(model_path)?, config)
    }

    pub fn pipeline(&self) -> &ModelPipeline {
        &self.pipeline
    }

    /// Score `future` records using `history` for rolling features
    ///
    /// Future rows are appended after the history, so their rolling values
    /// only ever see completed games. History rows sharing a key with a
    /// future row are dropped.
    pub fn predict(&self, history: &[EventRecord], future: &[EventRecord]) -> Result<Vec<FuturePick>> {
        if future.is_empty() {
            return Ok(Vec::new());
        }
        let future_keys: HashSet<(&GameId, &TeamId)> =
            future.iter().map(|r| (&r.game_id, &r.team_id)).collect();

        let mut combined: Vec<EventRecord> = history
            .iter()
            .filter(|r| !future_keys.contains(&(&r.game_id, &r.team_id)))
            .cloned()
            .collect();
        if combined.is_empty() {
            return Err(OverlineError::InsufficientData(
                "no completed games to compute rolling features from".into(),
            ));
        }
        let offset = combined.len();
        combined.extend(future.iter().map(|r| {
            let mut r = r.clone();
            // Nothing observed after tip-off may reach an upcoming game
            r.outcomes.clear();
            r
        }));

        let frame = build_frame(&combined, &self.features)?;
        let rolled = self.engine.augment(&frame)?;

        let names = self.pipeline.feature_names();
        let columns: Vec<_> = names.iter().map(|n| rolled.frame.column(n)).collect();
        let missing: Vec<&String> = names
            .iter()
            .zip(&columns)
            .filter(|(_, c)| c.is_none())
            .map(|(n, _)| n)
            .collect();
        if !missing.is_empty() {
            log::warn!(
                "{} model features unavailable, imputing training medians: {:?}",
                missing.len(),
                missing
            );
        }

        let meta = rolled.frame.meta();
        let picks = (offset..combined.len())
            .map(|i| {
                let row: Vec<Option<f64>> = columns
                    .iter()
                    .map(|c| c.and_then(|c| c.values[i]))
                    .collect();
                let p_hat = self.pipeline.predict_row(&row);
                let side = Side::from_probability(p_hat);
                let record = &combined[i];
                FuturePick {
                    game_id: record.game_id.clone(),
                    team_id: record.team_id.clone(),
                    date: record.date,
                    line: meta[i].line,
                    game_line: record.pregame_value(&self.features.game_line_field),
                    p_hat,
                    confidence: (p_hat - 0.5).abs(),
                    side,
                    hypothetical_ev: expected_value(p_hat, side, self.payout),
                }
            })
            .collect();
        Ok(picks)
    }
}

/// Format a pick for display
pub fn format_pick(pick: &FuturePick) -> String {
    let line = pick
        .line
        .map(|l| format!("{:.1}", l))
        .unwrap_or_else(|| "n/a".to_string());
    let side_prob = match pick.side {
        Side::Over => pick.p_hat,
        Side::Under => 1.0 - pick.p_hat,
    };
    let date = pick
        .date
        .map(|d| d.to_string())
        .unwrap_or_else(|| "undated".to_string());

    format!(
        r#"
┌─────────────────────────────────────────────────┐
│  {} in game {} ({})
├─────────────────────────────────────────────────┤
│  Team total line:  {}
│  Pick:             {} {:.1}%
│  Confidence:       {:.3}
│  EV (hypothetical): {:+.4}
└─────────────────────────────────────────────────┘
"#,
        pick.team_id,
        pick.game_id,
        date,
        line,
        pick.side,
        side_prob * 100.0,
        pick.confidence,
        pick.hypothetical_ev
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::synthetic::{generate, SyntheticConfig};
    use crate::training::Runner;
    use crate::data::InMemorySource;

    fn trained(history: &[EventRecord]) -> (Predictor, Config) {
        let config = Config::default();
        let source = InMemorySource::new(history.to_vec());
        let output = Runner::new(&source, config.clone())
            .skip_ablation(true)
            .run()
            .unwrap();
        (Predictor::new(output.model, &config).unwrap(), config)
    }

    fn upcoming(history: &[EventRecord]) -> Vec<EventRecord> {
        let last = history.iter().filter_map(|r| r.date).max().unwrap();
        let date = last.succ_opt().unwrap();
        let mut home = EventRecord::new("FUTURE-1".into(), history[0].team_id.clone(), Some(date));
        home.is_home = Some(true);
        home.pregame.insert("TEAM_TOTAL_LINE".into(), 112.5);
        home.pregame.insert("GAME_TOTAL_LINE".into(), 224.0);
        let mut away = EventRecord::new("FUTURE-1".into(), history[1].team_id.clone(), Some(date));
        away.is_home = Some(false);
        away.pregame.insert("TEAM_TOTAL_LINE".into(), 111.5);
        away.pregame.insert("GAME_TOTAL_LINE".into(), 224.0);
        vec![home, away]
    }

    #[test]
    fn test_predicts_future_games() {
        let history = generate(&SyntheticConfig {
            games: 250,
            ..Default::default()
        });
        let (predictor, _) = trained(&history);
        let picks = predictor.predict(&history, &upcoming(&history)).unwrap();

        assert_eq!(picks.len(), 2);
        for pick in &picks {
            assert!(pick.p_hat > 0.0 && pick.p_hat < 1.0);
            assert!((pick.confidence - (pick.p_hat - 0.5).abs()).abs() < 1e-12);
            assert_eq!(pick.side, Side::from_probability(pick.p_hat));
            assert_eq!(pick.game_line, Some(224.0));
        }
        assert_eq!(picks[0].line, Some(112.5));
        // Home teams go over more often in the generated data
        assert!(picks[0].p_hat > picks[1].p_hat);
        assert!(format_pick(&picks[0]).contains("FUTURE-1"));
    }

    #[test]
    fn test_future_outcomes_are_ignored() {
        let history = generate(&SyntheticConfig {
            games: 250,
            ..Default::default()
        });
        let (predictor, _) = trained(&history);
        let clean = predictor.predict(&history, &upcoming(&history)).unwrap();

        let mut leaky = upcoming(&history);
        for r in &mut leaky {
            r.outcomes.insert("TEAM_TOTAL_OVER_HIT".into(), 1.0);
            r.outcomes.insert("TEAM_TOTAL_MARGIN".into(), 30.0);
        }
        let scored = predictor.predict(&history, &leaky).unwrap();
        assert_eq!(clean, scored);
    }

    #[test]
    fn test_model_round_trip_and_missing_history() {
        let history = generate(&SyntheticConfig {
            games: 250,
            ..Default::default()
        });
        let (predictor, config) = trained(&history);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        predictor.pipeline().save(&path).unwrap();
        let reloaded = Predictor::load(&path, &config).unwrap();

        let future = upcoming(&history);
        assert_eq!(
            reloaded.predict(&history, &future).unwrap(),
            predictor.predict(&history, &future).unwrap()
        );
        assert!(matches!(
            reloaded.predict(&[], &future),
            Err(OverlineError::InsufficientData(_))
        ));
        assert!(matches!(
            Predictor::load(dir.path().join("absent.json"), &config),
            Err(OverlineError::NoModel)
        ));
    }
}
