//! SQLite storage for event records

use crate::data::source::RecordSource;
use crate::{EventRecord, GameId, OverlineError, PaceBucket, Result, TeamId};
use chrono::NaiveDate;
use rusqlite::{params, Connection};
use std::collections::BTreeMap;
use std::path::Path;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Database connection and operations
pub struct Database {
    conn: Connection,
}

/// Summary of stored events
#[derive(Debug, Clone, PartialEq)]
pub struct DataStats {
    pub rows: usize,
    pub games: usize,
    pub teams: usize,
    pub dated_rows: usize,
    pub earliest: Option<NaiveDate>,
    pub latest: Option<NaiveDate>,
}

impl DataStats {
    /// Share of rows carrying a real game date (0-1)
    pub fn date_coverage(&self) -> f64 {
        if self.rows == 0 {
            0.0
        } else {
            self.dated_rows as f64 / self.rows as f64
        }
    }
}

/// Raw row as stored, before JSON decoding
struct StoredEvent {
    game_id: String,
    team_id: String,
    date: Option<String>,
    is_home: Option<bool>,
    is_competitive: Option<bool>,
    pace_bucket: Option<String>,
    pregame: String,
    outcomes: String,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let db = Database { conn };
        db.init_schema()?;
        Ok(db)
    }

    /// Create an in-memory database (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                game_id TEXT NOT NULL,
                team_id TEXT NOT NULL,
                game_date TEXT,
                is_home INTEGER,
                is_competitive INTEGER,
                pace_bucket TEXT,
                pregame TEXT NOT NULL DEFAULT '{}',
                outcomes TEXT NOT NULL DEFAULT '{}',
                PRIMARY KEY (game_id, team_id)
            );

            CREATE INDEX IF NOT EXISTS idx_events_date ON events(game_date);
            CREATE INDEX IF NOT EXISTS idx_events_team ON events(team_id);
            "#,
        )?;
        Ok(())
    }

    /// Insert or replace records keyed by (game_id, team_id)
    pub fn upsert_events(&self, records: &[EventRecord]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let mut count = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO events
                    (game_id, team_id, game_date, is_home, is_competitive, pace_bucket, pregame, outcomes)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(game_id, team_id) DO UPDATE SET
                    game_date = excluded.game_date,
                    is_home = excluded.is_home,
                    is_competitive = excluded.is_competitive,
                    pace_bucket = excluded.pace_bucket,
                    pregame = excluded.pregame,
                    outcomes = excluded.outcomes",
            )?;

            for record in records {
                let game_id = GameId::normalized(&record.game_id.0);
                let pace = record.pace_bucket.map(pace_code);
                count += stmt.execute(params![
                    game_id.0,
                    record.team_id.0,
                    record.date.map(|d| d.format(DATE_FORMAT).to_string()),
                    record.is_home,
                    record.is_competitive,
                    pace,
                    serde_json::to_string(&record.pregame)?,
                    serde_json::to_string(&record.outcomes)?,
                ])?;
            }
        }
        tx.commit()?;
        Ok(count)
    }

    /// All events ordered by date (undated last), then game, then team
    pub fn get_all_events(&self) -> Result<Vec<EventRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT game_id, team_id, game_date, is_home, is_competitive, pace_bucket, pregame, outcomes
             FROM events
             ORDER BY game_date IS NULL, game_date, game_id, team_id",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok(StoredEvent {
                    game_id: row.get(0)?,
                    team_id: row.get(1)?,
                    date: row.get(2)?,
                    is_home: row.get(3)?,
                    is_competitive: row.get(4)?,
                    pace_bucket: row.get(5)?,
                    pregame: row.get(6)?,
                    outcomes: row.get(7)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter().map(decode_event).collect()
    }

    /// Summary statistics over stored events
    pub fn get_stats(&self) -> Result<DataStats> {
        let (rows, games, teams, dated_rows, earliest, latest): (
            i64,
            i64,
            i64,
            i64,
            Option<String>,
            Option<String>,
        ) = self.conn.query_row(
            "SELECT COUNT(*), COUNT(DISTINCT game_id), COUNT(DISTINCT team_id),
                    COUNT(game_date), MIN(game_date), MAX(game_date)
             FROM events",
            [],
            |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                ))
            },
        )?;

        Ok(DataStats {
            rows: rows as usize,
            games: games as usize,
            teams: teams as usize,
            dated_rows: dated_rows as usize,
            earliest: earliest.as_deref().map(parse_date).transpose()?,
            latest: latest.as_deref().map(parse_date).transpose()?,
        })
    }
}

impl RecordSource for Database {
    fn load_records(&self) -> Result<Vec<EventRecord>> {
        self.get_all_events()
    }

    fn describe(&self) -> String {
        "sqlite events table".to_string()
    }
}

fn pace_code(pace: PaceBucket) -> &'static str {
    match pace {
        PaceBucket::Low => "LOW",
        PaceBucket::Mid => "MID",
        PaceBucket::High => "HIGH",
    }
}

fn parse_pace(code: &str) -> Option<PaceBucket> {
    match code.to_uppercase().as_str() {
        "LOW" => Some(PaceBucket::Low),
        "MID" => Some(PaceBucket::Mid),
        "HIGH" => Some(PaceBucket::High),
        _ => None,
    }
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FORMAT)
        .map_err(|e| OverlineError::Parse(format!("Invalid game date {:?}: {}", s, e)))
}

fn decode_event(stored: StoredEvent) -> Result<EventRecord> {
    let pregame: BTreeMap<String, f64> = serde_json::from_str(&stored.pregame)?;
    let outcomes: BTreeMap<String, f64> = serde_json::from_str(&stored.outcomes)?;

    Ok(EventRecord {
        game_id: GameId(stored.game_id),
        team_id: TeamId(stored.team_id),
        date: stored.date.as_deref().map(parse_date).transpose()?,
        is_home: stored.is_home,
        is_competitive: stored.is_competitive,
        pace_bucket: stored.pace_bucket.as_deref().and_then(parse_pace),
        pregame,
        outcomes,
    })
}
