//! Team-total over/under backtesting CLI
//!
//! Walk-forward evaluation of a calibrated linear classifier over stored
//! event records.

use clap::{Parser, Subcommand};
use overline::{Config, Result};

#[derive(Parser)]
#[command(name = "overline")]
#[command(about = "Walk-forward backtesting of team-total over/under picks", long_about = None)]
struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Data management commands
    Data {
        #[command(subcommand)]
        action: DataCommands,
    },
    /// Run the walk-forward backtest and write artifacts
    Backtest {
        /// Skip the feature-set ablation
        #[arg(long)]
        skip_ablation: bool,
    },
    /// Re-run the pick-policy analysis on saved predictions
    Picks,
    /// Score upcoming games from a JSON-lines fixture file
    Predict {
        /// Fixture file (one record per line, no outcomes needed)
        fixture: String,
        /// Output format
        #[arg(long, default_value = "table")]
        format: OutputFormat,
    },
    /// Initialize a new project with default config
    Init,
}

#[derive(Subcommand)]
enum DataCommands {
    /// Import event records from a JSON-lines file
    Import {
        /// Path to the .jsonl file
        file: String,
    },
    /// Show database status
    Status,
    /// Fill the database with seeded synthetic records
    Synth {
        /// Number of games to generate
        #[arg(long, default_value = "500")]
        games: usize,
        /// Random seed
        #[arg(long, default_value = "42")]
        seed: u64,
    },
}

#[derive(Clone, Debug)]
enum OutputFormat {
    Table,
    Json,
    Csv,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            "csv" => Ok(OutputFormat::Csv),
            _ => Err(format!("Unknown format: {}. Use table, json, or csv.", s)),
        }
    }
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Load or create config, then apply environment overrides
    let mut config = if std::path::Path::new(&cli.config).exists() {
        match Config::load(&cli.config) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Error loading config: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        Config::default()
    };
    if let Err(e) = config.apply_env_overrides() {
        eprintln!("Error in environment overrides: {}", e);
        std::process::exit(1);
    }

    // Run command
    let result = match cli.command {
        Commands::Data { action } => match action {
            DataCommands::Import { file } => commands::data_import(&config, &file),
            DataCommands::Status => commands::data_status(&config),
            DataCommands::Synth { games, seed } => commands::data_synth(&config, games, seed),
        },
        Commands::Backtest { skip_ablation } => commands::backtest(&config, skip_ablation),
        Commands::Picks => commands::picks(&config),
        Commands::Predict { fixture, format } => commands::predict(&config, &fixture, format),
        Commands::Init => commands::init(&cli.config),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

mod commands {
    use super::*;
    use overline::data::import::read_jsonl;
    use overline::data::synthetic::{generate, SyntheticConfig};
    use overline::data::Database;
    use overline::predict::{format_pick, Predictor};
    use overline::report::artifacts::MODEL_FILE;
    use overline::report::{backtest_summary, picks_summary, ArtifactWriter};
    use overline::training::{analyze_picks, Runner};
    use overline::OverlineError;

    pub fn init(config_path: &str) -> Result<()> {
        let config = Config::default();
        config.save(config_path)?;
        println!("Created default config at {}", config_path);

        // Create data and artifact directories
        std::fs::create_dir_all("data")?;
        std::fs::create_dir_all(&config.data.output_dir)?;
        println!("Created data/ and {}/ directories", config.data.output_dir);

        println!("\nNext steps:");
        println!("  1. Edit {} to customize settings", config_path);
        println!("  2. Run 'overline data import <events.jsonl>' to load records");
        println!("  3. Run 'overline backtest' to evaluate and train the model");
        println!("  4. Run 'overline predict <fixture.jsonl>' to score upcoming games");

        Ok(())
    }

    pub fn data_import(config: &Config, file: &str) -> Result<()> {
        let db = Database::open(&config.data.database_path)?;

        println!("Reading records from {}...", file);
        let records = read_jsonl(file)?;
        if records.is_empty() {
            println!("No records found in {}", file);
            return Ok(());
        }

        let count = db.upsert_events(&records)?;
        println!("Stored {} records in database", count);
        Ok(())
    }

    pub fn data_synth(config: &Config, games: usize, seed: u64) -> Result<()> {
        let db = Database::open(&config.data.database_path)?;
        let records = generate(&SyntheticConfig {
            games,
            seed,
            ..Default::default()
        });
        let count = db.upsert_events(&records)?;
        println!("Stored {} synthetic records ({} games)", count, games);
        Ok(())
    }

    pub fn data_status(config: &Config) -> Result<()> {
        let db = Database::open(&config.data.database_path)?;
        let stats = db.get_stats()?;

        println!("Database Status");
        println!("───────────────────────────────");
        println!("  Path:     {}", config.data.database_path);
        println!("  Rows:     {}", stats.rows);
        println!("  Games:    {}", stats.games);
        println!("  Teams:    {}", stats.teams);
        println!(
            "  Dated:    {} ({:.1}%)",
            stats.dated_rows,
            stats.date_coverage() * 100.0
        );
        if let (Some(earliest), Some(latest)) = (stats.earliest, stats.latest) {
            println!("  Range:    {} to {}", earliest, latest);
        }

        Ok(())
    }

    pub fn backtest(config: &Config, skip_ablation: bool) -> Result<()> {
        let db = Database::open(&config.data.database_path)?;
        if db.get_stats()?.rows == 0 {
            return Err(OverlineError::InsufficientData(
                "No records in database. Run 'overline data import' first.".to_string(),
            ));
        }

        let output = Runner::new(&db, config.clone())
            .skip_ablation(skip_ablation)
            .run()?;

        let writer = ArtifactWriter::new(&config.data.output_dir)?;
        writer.write_run(&output)?;

        println!();
        print!("{}", backtest_summary(&output));
        println!();
        print!("{}", picks_summary(&output.picks));
        println!("\nArtifacts saved to: {}", writer.dir().display());
        Ok(())
    }

    pub fn picks(config: &Config) -> Result<()> {
        let writer = ArtifactWriter::new(&config.data.output_dir)?;
        let predictions = writer.read_predictions()?;
        println!("Loaded {} predictions", predictions.len());

        let report = analyze_picks(&predictions, &config.policy);
        for path in writer.write_picks(&report)? {
            println!("  Saved {}", path.display());
        }
        println!();
        print!("{}", picks_summary(&report));
        Ok(())
    }

    pub fn predict(config: &Config, fixture: &str, format: OutputFormat) -> Result<()> {
        let model_path = std::path::Path::new(&config.data.output_dir).join(MODEL_FILE);
        let predictor = Predictor::load(&model_path, config)?;

        let db = Database::open(&config.data.database_path)?;
        let history = db.get_all_events()?;
        let future = read_jsonl(fixture)?;
        let picks = predictor.predict(&history, &future)?;

        match format {
            OutputFormat::Table => {
                for pick in &picks {
                    print!("{}", format_pick(pick));
                }
            }
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&picks)?);
            }
            OutputFormat::Csv => {
                println!("game_id,team_id,date,line,p_hat,confidence,side,hypothetical_ev");
                for pick in &picks {
                    println!(
                        "{},{},{},{},{:.4},{:.4},{},{:.4}",
                        pick.game_id,
                        pick.team_id,
                        pick.date.map(|d| d.to_string()).unwrap_or_default(),
                        pick.line.map(|l| l.to_string()).unwrap_or_default(),
                        pick.p_hat,
                        pick.confidence,
                        pick.side,
                        pick.hypothetical_ev
                    );
                }
            }
        }

        Ok(())
    }
}
