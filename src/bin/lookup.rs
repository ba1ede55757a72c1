use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use serde::Serialize;

use hoops_features::config::PipelineConfig;
use hoops_features::feature_store::PlayerKey;
use hoops_features::lookup::{PredictionInputs, PredictionLookup, prediction_inputs};
use hoops_features::records::{HomeAway, StatLine, format_game_date};
use hoops_features::store;

#[derive(Serialize)]
struct LookupReport<'a> {
    player_id: u32,
    player_name: &'a str,
    last_game_date: String,
    opponent_team: &'a str,
    home_away: HomeAway,
    rolling: StatLine<f64>,
    allowed: StatLine<f64>,
    features: Vec<f64>,
}

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");

    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let player = arg_value(&args, "--player").ok_or_else(|| anyhow!("--player is required"))?;
    let opponent =
        arg_value(&args, "--opponent").ok_or_else(|| anyhow!("--opponent is required"))?;
    let venue = arg_value(&args, "--venue").unwrap_or_else(|| "home".to_string());
    let as_json = args.iter().any(|a| a == "--json");

    let db_path = arg_value(&args, "--db")
        .map(PathBuf::from)
        .unwrap_or_else(|| PipelineConfig::from_env().db_path);
    let conn = store::open_db(&db_path).context("open feature store")?;

    let key = match player.parse::<u32>() {
        Ok(id) => PlayerKey::Id(id),
        Err(_) => PlayerKey::Name(player),
    };
    match prediction_inputs(&conn, &key, &opponent, &venue)? {
        PredictionLookup::Unavailable(reason) => {
            println!("No prediction available: {reason}");
        }
        PredictionLookup::Ready(inputs) if as_json => {
            let report = LookupReport {
                player_id: inputs.player_id,
                player_name: &inputs.player_name,
                last_game_date: format_game_date(inputs.last_game_date),
                opponent_team: &inputs.opponent_team,
                home_away: inputs.home_away,
                rolling: inputs.rolling,
                allowed: inputs.allowed,
                features: inputs.feature_vector(),
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        PredictionLookup::Ready(inputs) => {
            println!(
                "{} (last game {}) vs {} [{}]",
                inputs.player_name,
                inputs.last_game_date,
                inputs.opponent_team,
                inputs.home_away.code()
            );
            for (name, value) in PredictionInputs::feature_names()
                .iter()
                .zip(inputs.feature_vector())
            {
                println!("  {name:<20} {value:>8.3}");
            }
        }
    }
    Ok(())
}

fn arg_value(args: &[String], flag: &str) -> Option<String> {
    let prefix = format!("{flag}=");
    for (idx, arg) in args.iter().enumerate() {
        if let Some(value) = arg.strip_prefix(&prefix) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
        if arg == flag {
            let Some(next) = args.get(idx + 1) else {
                continue;
            };
            if !next.trim().is_empty() {
                return Some(next.trim().to_string());
            }
        }
    }
    None
}
