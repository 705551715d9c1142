//! Seeded synthetic event records
//!
//! Generates a league of games with a known home advantage on the over rate,
//! used for smoke runs (`overline data synth`) and end-to-end tests.

use chrono::{Duration, NaiveDate};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::{EventRecord, GameId, PaceBucket, TeamId};

/// Shape of the generated league
#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    pub games: usize,
    pub teams: usize,
    /// Probability that the home side goes over its line
    pub home_over_rate: f64,
    /// Probability that the away side goes over its line
    pub away_over_rate: f64,
    pub start_date: NaiveDate,
    pub seed: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        SyntheticConfig {
            games: 500,
            teams: 12,
            home_over_rate: 0.7,
            away_over_rate: 0.4,
            start_date: NaiveDate::from_ymd_opt(2023, 10, 24).unwrap_or_default(),
            seed: 42,
        }
    }
}

/// Generate two records (home, away) per game, one game per day
pub fn generate(config: &SyntheticConfig) -> Vec<EventRecord> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let teams: Vec<TeamId> = (0..config.teams.max(2))
        .map(|i| TeamId(format!("T{:02}", i + 1)))
        .collect();

    let mut records = Vec::with_capacity(config.games * 2);
    for game in 0..config.games {
        let game_id = GameId(format!("{:010}", game + 1));
        let date = config.start_date + Duration::days(game as i64);
        let pace = match rng.gen_range(0..3) {
            0 => PaceBucket::Low,
            1 => PaceBucket::Mid,
            _ => PaceBucket::High,
        };
        let competitive = rng.gen_bool(0.6);

        let pair: Vec<&TeamId> = teams.choose_multiple(&mut rng, 2).collect();
        let lines = [rng.gen_range(98.0..122.0), rng.gen_range(98.0..122.0)];
        let game_line: f64 = lines.iter().sum();
        let game_over = rng.gen_bool(0.5);

        for (slot, team) in pair.into_iter().enumerate() {
            let is_home = slot == 0;
            let rate = if is_home {
                config.home_over_rate
            } else {
                config.away_over_rate
            };
            let over = rng.gen_bool(rate.clamp(0.0, 1.0));
            let magnitude = rng.gen_range(0.5..14.0);
            let margin = if over { magnitude } else { -magnitude };
            let line = (lines[slot] * 2.0_f64).round() / 2.0;

            let mut record = EventRecord::new(game_id.clone(), team.clone(), Some(date));
            record.is_home = Some(is_home);
            record.is_competitive = Some(competitive);
            record.pace_bucket = Some(pace);
            record.pregame.insert("TEAM_TOTAL_LINE".into(), line);
            record.pregame.insert("GAME_TOTAL_LINE".into(), game_line.round());
            record.outcomes.insert("TEAM_TOTAL_ACTUAL".into(), line + margin);
            record.outcomes.insert("TEAM_TOTAL_MARGIN".into(), margin);
            record
                .outcomes
                .insert("TEAM_TOTAL_OVER_HIT".into(), if over { 1.0 } else { 0.0 });
            record
                .outcomes
                .insert("GAME_TOTAL_OVER_HIT".into(), if game_over { 1.0 } else { 0.0 });
            records.push(record);
        }
    }

    log::debug!(
        "Generated {} synthetic records over {} games",
        records.len(),
        config.games
    );
    records
}
