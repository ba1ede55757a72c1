use std::path::PathBuf;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use hoops_features::config::PipelineConfig;
use hoops_features::fetcher::FetchMode;
use hoops_features::pipeline::{CycleOutcome, Pipeline};
use hoops_features::provider::NbaStatsProvider;

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    init_tracing();

    let mut config = PipelineConfig::from_env();
    if let Some(path) = parse_db_path_arg() {
        config.db_path = path;
    }
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let once = args.iter().any(|a| a == "--once");
    let force_full = args.iter().any(|a| a == "--full");

    info!(
        db = %config.db_path.display(),
        season = %config.season,
        window = config.rolling_window,
        "starting nba feature ingest"
    );

    let provider = NbaStatsProvider::new(&config)?;
    let mut pipeline = Pipeline::open(provider, config)?;

    if once {
        let outcome = if force_full {
            pipeline.run_cycle_with_mode(FetchMode::Full)?
        } else {
            pipeline.run_cycle()?
        };
        match outcome {
            CycleOutcome::Empty { .. } => println!("No new game logs available."),
            CycleOutcome::Ingested(summary) => {
                println!("Ingest complete ({})", summary.mode.as_str());
                println!("DB: {}", pipeline.config().db_path.display());
                println!(
                    "Players: {}/{}",
                    summary.players_total - summary.players_failed,
                    summary.players_total
                );
                println!("Raw rows inserted: {}", summary.raw_inserted);
                println!("Engineered rows appended: {}", summary.engineered_appended);
            }
        }
        return Ok(());
    }

    if force_full {
        // Re-pull the whole season once; the loop decides on its own afterwards.
        if let Err(err) = pipeline.run_cycle_with_mode(FetchMode::Full) {
            tracing::error!(error = %format!("{err:#}"), "forced full cycle failed");
        }
    }
    pipeline.run_forever();
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn parse_db_path_arg() -> Option<PathBuf> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    for (idx, arg) in args.iter().enumerate() {
        if let Some(path) = arg.strip_prefix("--db=") {
            let trimmed = path.trim();
            if !trimmed.is_empty() {
                return Some(PathBuf::from(trimmed));
            }
        }
        if arg == "--db" {
            let Some(next) = args.get(idx + 1) else {
                continue;
            };
            if !next.trim().is_empty() {
                return Some(PathBuf::from(next));
            }
        }
    }
    None
}
