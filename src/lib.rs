//! Team-total over/under backtesting
//!
//! Leakage-safe rolling features, walk-forward evaluation with per-fold
//! probability calibration, and feature-set ablation.

pub mod data;
pub mod features;
pub mod model;
pub mod predict;
pub mod report;
pub mod training;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Unique identifier for a team
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TeamId(pub String);

impl fmt::Display for TeamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TeamId {
    fn from(s: &str) -> Self {
        TeamId(s.to_string())
    }
}

/// Unique identifier for a game
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameId(pub String);

impl GameId {
    /// Numeric game ids shorter than ten digits are zero-padded so that
    /// lexical order matches schedule order ("22300010" -> "0022300010").
    pub fn normalized(raw: &str) -> Self {
        let trimmed = raw.trim();
        if !trimmed.is_empty() && trimmed.len() < 10 && trimmed.chars().all(|c| c.is_ascii_digit()) {
            GameId(format!("{:0>10}", trimmed))
        } else {
            GameId(trimmed.to_string())
        }
    }
}

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for GameId {
    fn from(s: &str) -> Self {
        GameId(s.to_string())
    }
}

/// Pace bucket assigned to a game before tip-off
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PaceBucket {
    Low,
    Mid,
    High,
}

/// Side of a posted line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Over,
    Under,
}

impl Side {
    pub fn from_probability(p: f64) -> Self {
        if p >= 0.5 {
            Side::Over
        } else {
            Side::Under
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Over => write!(f, "OVER"),
            Side::Under => write!(f, "UNDER"),
        }
    }
}

/// One team's participation in one game
///
/// `pregame` holds values known before tip-off (market lines and any other
/// registered inputs). `outcomes` holds everything observed after the game:
/// actuals, margins, hit flags and the label itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub game_id: GameId,
    pub team_id: TeamId,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub is_home: Option<bool>,
    #[serde(default)]
    pub is_competitive: Option<bool>,
    #[serde(default)]
    pub pace_bucket: Option<PaceBucket>,
    #[serde(default, deserialize_with = "data::import::numeric_map")]
    pub pregame: BTreeMap<String, f64>,
    #[serde(default, deserialize_with = "data::import::numeric_map")]
    pub outcomes: BTreeMap<String, f64>,
}

impl EventRecord {
    pub fn new(game_id: GameId, team_id: TeamId, date: Option<NaiveDate>) -> Self {
        EventRecord {
            game_id,
            team_id,
            date,
            is_home: None,
            is_competitive: None,
            pace_bucket: None,
            pregame: BTreeMap::new(),
            outcomes: BTreeMap::new(),
        }
    }

    /// Binary label read from the named outcome field (non-zero = hit)
    pub fn label(&self, field: &str) -> Option<bool> {
        self.outcomes
            .get(field)
            .filter(|v| v.is_finite())
            .map(|v| *v != 0.0)
    }

    /// Value of a pre-game field, if present and finite
    pub fn pregame_value(&self, field: &str) -> Option<f64> {
        self.pregame.get(field).copied().filter(|v| v.is_finite())
    }
}

/// Application-wide errors
#[derive(Debug, Error)]
pub enum OverlineError {
    #[error("Required column missing: {0}")]
    MissingColumn(String),

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Outcome leakage detected, these columns must not be features: {}", .columns.join(", "))]
    LeakageDetected { columns: Vec<String> },

    #[error("Numerical failure: {0}")]
    Numerical(String),

    #[error("Training labels contain a single class")]
    SingleClass,

    #[error("No valid folds completed")]
    NoCompletedFolds,

    #[error("Model not trained - run `overline backtest` first")]
    NoModel,

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),
}

pub type Result<T> = std::result::Result<T, OverlineError>;

/// Application configuration loaded from config.toml
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub backtest: BacktestConfig,
    pub features: FeatureConfig,
    pub model: ModelConfig,
    pub policy: PolicyConfig,
    pub data: DataConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestConfig {
    pub min_train_size: usize,
    pub test_chunk_size: usize,
    /// Share of each fold's training rows used to fit the base model;
    /// the later remainder is the calibration slice.
    pub fit_fraction: f64,
    pub min_calibration_samples: usize,
    /// Isotonic is dropped from selection above this log loss
    pub isotonic_max_log_loss: f64,
    pub calibration_bins: usize,
    pub decision_threshold: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureConfig {
    pub rolling_windows: Vec<usize>,
    pub label_field: String,
    pub line_field: String,
    pub game_line_field: String,
    /// Below this share of dated rows the run logs reduced temporal confidence
    pub date_coverage_threshold: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Inverse L2 regularization strength
    pub c: f64,
    pub max_iter: usize,
    pub tolerance: f64,
    /// Inverse regularization strength of the sigmoid recalibration
    pub calibration_c: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyConfig {
    pub thresholds: Vec<f64>,
    pub top_k: Vec<usize>,
    pub assumed_payout: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataConfig {
    pub database_path: String,
    pub output_dir: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            backtest: BacktestConfig {
                min_train_size: 400,
                test_chunk_size: 100,
                fit_fraction: 0.8,
                min_calibration_samples: 10,
                isotonic_max_log_loss: 1.0,
                calibration_bins: 10,
                decision_threshold: 0.5,
            },
            features: FeatureConfig {
                rolling_windows: vec![5, 10],
                label_field: "TEAM_TOTAL_OVER_HIT".to_string(),
                line_field: "TEAM_TOTAL_LINE".to_string(),
                game_line_field: "GAME_TOTAL_LINE".to_string(),
                date_coverage_threshold: 0.95,
            },
            model: ModelConfig {
                c: 0.1,
                max_iter: 2000,
                tolerance: 1e-8,
                calibration_c: 1.0,
            },
            policy: PolicyConfig {
                thresholds: vec![0.55, 0.60, 0.65, 0.70],
                top_k: vec![5, 10, 20],
                assumed_payout: 0.9091,
            },
            data: DataConfig {
                database_path: "data/events.db".to_string(),
                output_dir: "artifacts".to_string(),
            },
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            OverlineError::Config(format!("Failed to read config file {}: {}", path, e))
        })?;
        toml::from_str(&content)
            .map_err(|e| OverlineError::Config(format!("Failed to parse config: {}", e)))
    }

    pub fn save(&self, path: &str) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| OverlineError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply `ML_*` environment overrides from the process environment
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("ML_MIN_TRAIN_SIZE") {
            self.backtest.min_train_size = parse_override("ML_MIN_TRAIN_SIZE", &v)?;
        }
        if let Some(v) = lookup("ML_TEST_CHUNK_SIZE") {
            self.backtest.test_chunk_size = parse_override("ML_TEST_CHUNK_SIZE", &v)?;
        }
        if let Some(v) = lookup("ML_LOGISTIC_C") {
            self.model.c = parse_override("ML_LOGISTIC_C", &v)?;
        }
        if let Some(v) = lookup("ML_LOGISTIC_MAX_ITER") {
            self.model.max_iter = parse_override("ML_LOGISTIC_MAX_ITER", &v)?;
        }
        if let Some(v) = lookup("LABEL_FIELD").or_else(|| lookup("ML_LABEL_FIELD")) {
            self.features.label_field = v;
        }
        if let Some(v) = lookup("ML_ROLLING_WINDOWS") {
            self.features.rolling_windows = v
                .split(',')
                .map(|w| parse_override("ML_ROLLING_WINDOWS", w.trim()))
                .collect::<Result<Vec<usize>>>()?;
        }
        if let Some(v) = lookup("ML_OUTPUT_DIR") {
            self.data.output_dir = v;
        }
        self.validate()
    }

    /// Reject settings that cannot produce a meaningful run
    pub fn validate(&self) -> Result<()> {
        if self.backtest.test_chunk_size == 0 {
            return Err(OverlineError::Config("test_chunk_size must be positive".into()));
        }
        if !(self.backtest.fit_fraction > 0.0 && self.backtest.fit_fraction < 1.0) {
            return Err(OverlineError::Config("fit_fraction must be in (0, 1)".into()));
        }
        if self.features.rolling_windows.iter().any(|w| *w == 0) {
            return Err(OverlineError::Config("rolling windows must be positive".into()));
        }
        if !(self.model.c > 0.0) || !(self.model.calibration_c > 0.0) {
            return Err(OverlineError::Config("regularization strength must be positive".into()));
        }
        if self.backtest.calibration_bins == 0 {
            return Err(OverlineError::Config("calibration_bins must be positive".into()));
        }
        Ok(())
    }
}

fn parse_override<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| OverlineError::Config(format!("Invalid value for {}: {:?}", key, value)))
}
