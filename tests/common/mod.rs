#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Result, anyhow};
use chrono::NaiveDate;

use hoops_features::config::PipelineConfig;
use hoops_features::provider::{ActivePlayer, StatsProvider, parse_game_log_json};
use hoops_features::records::RawGameRecord;

pub fn date(raw: &str) -> NaiveDate {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").expect("test date")
}

/// Box score with the counters the features read; everything else zero.
pub fn game(
    player_id: u32,
    player_name: &str,
    game_id: &str,
    game_date: &str,
    matchup: &str,
    pts: f64,
) -> RawGameRecord {
    RawGameRecord {
        season_id: "22024".to_string(),
        player_id,
        player_name: player_name.to_string(),
        game_id: game_id.to_string(),
        game_date: date(game_date),
        matchup: matchup.to_string(),
        wl: Some("W".to_string()),
        min: 30.0,
        fgm: 5.0,
        fga: 10.0,
        fg_pct: 0.5,
        fg3m: 0.0,
        fg3a: 0.0,
        fg3_pct: 0.0,
        ftm: 0.0,
        fta: 0.0,
        ft_pct: 0.0,
        oreb: 0.0,
        dreb: 0.0,
        reb: 4.0,
        ast: 3.0,
        stl: 1.0,
        blk: 0.0,
        tov: 0.0,
        pf: 0.0,
        pts,
        plus_minus: 0.0,
        video_available: false,
    }
}

pub fn with_shooting(mut record: RawGameRecord, fgm: f64, fga: f64) -> RawGameRecord {
    record.fgm = fgm;
    record.fga = fga;
    record.fg_pct = if fga > 0.0 { fgm / fga } else { 0.0 };
    record
}

pub fn test_config() -> PipelineConfig {
    PipelineConfig {
        provider_min_interval: Duration::ZERO,
        fetch_parallelism: 2,
        ..PipelineConfig::default()
    }
}

/// In-process provider serving scripted game logs. `date_from` is inclusive, like the real
/// endpoint.
#[derive(Default)]
pub struct ScriptedProvider {
    players: Vec<ActivePlayer>,
    logs: Mutex<HashMap<u32, Vec<RawGameRecord>>>,
    payloads: Mutex<HashMap<u32, String>>,
    failing: Mutex<HashSet<u32>>,
    calls: Mutex<Vec<(u32, Option<NaiveDate>)>>,
}

impl ScriptedProvider {
    pub fn new(players: &[(u32, &str)]) -> Self {
        Self {
            players: players
                .iter()
                .map(|(id, name)| ActivePlayer {
                    id: *id,
                    full_name: name.to_string(),
                })
                .collect(),
            ..Self::default()
        }
    }

    pub fn add_games(&self, games: Vec<RawGameRecord>) {
        let mut logs = self.logs.lock().unwrap();
        for g in games {
            logs.entry(g.player_id).or_default().push(g);
        }
    }

    /// Replaces everything served for the player, e.g. with corrected box scores.
    pub fn replace_games(&self, player_id: u32, games: Vec<RawGameRecord>) {
        self.logs.lock().unwrap().insert(player_id, games);
    }

    /// Serves `payload` through the real game log parser instead of scripted rows.
    pub fn serve_payload(&self, player_id: u32, payload: &str) {
        self.payloads
            .lock()
            .unwrap()
            .insert(player_id, payload.to_string());
    }

    pub fn fail_player(&self, player_id: u32) {
        self.failing.lock().unwrap().insert(player_id);
    }

    pub fn calls(&self) -> Vec<(u32, Option<NaiveDate>)> {
        let mut calls = self.calls.lock().unwrap().clone();
        calls.sort();
        calls
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }
}

impl StatsProvider for ScriptedProvider {
    fn list_active_players(&self) -> Result<Vec<ActivePlayer>> {
        Ok(self.players.clone())
    }

    fn game_log(
        &self,
        player_id: u32,
        _season: &str,
        date_from: Option<NaiveDate>,
    ) -> Result<Vec<RawGameRecord>> {
        self.calls.lock().unwrap().push((player_id, date_from));
        if self.failing.lock().unwrap().contains(&player_id) {
            return Err(anyhow!("http 503: service unavailable"));
        }
        if let Some(payload) = self.payloads.lock().unwrap().get(&player_id) {
            return parse_game_log_json(payload, player_id);
        }
        let logs = self.logs.lock().unwrap();
        let mut rows: Vec<RawGameRecord> = logs
            .get(&player_id)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter(|r| date_from.is_none_or(|from| r.game_date >= from))
            .map(|mut r| {
                // The endpoint doesn't carry names.
                r.player_name.clear();
                r
            })
            .collect();
        // Newest first, as the endpoint returns them.
        rows.sort_by(|a, b| b.game_date.cmp(&a.game_date));
        Ok(rows)
    }
}

/// `playergamelog` body with one row per `(game_id, game_date, matchup, pts)`.
pub fn game_log_payload(player_id: u32, rows: &[(&str, &str, &str, f64)]) -> String {
    let rows: Vec<serde_json::Value> = rows
        .iter()
        .map(|(game_id, game_date, matchup, pts)| {
            serde_json::json!([
                "22024", player_id, game_id, game_date, matchup, "W", 30, 5, 10, 0.5, 4, 3, 1, 0,
                pts
            ])
        })
        .collect();
    serde_json::json!({
        "resource": "playergamelog",
        "resultSets": [{
            "name": "PlayerGameLog",
            "headers": [
                "SEASON_ID", "Player_ID", "Game_ID", "GAME_DATE", "MATCHUP", "WL", "MIN", "FGM",
                "FGA", "FG_PCT", "REB", "AST", "STL", "BLK", "PTS"
            ],
            "rowSet": rows
        }]
    })
    .to_string()
}
