use std::collections::HashMap;

use anyhow::{Context, Result, anyhow};
use chrono::NaiveDate;
use reqwest::blocking::Client;
use serde_json::Value;

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::http_client::http_client;
use crate::records::{RawGameRecord, parse_game_date};

const NBA_STATS_URL: &str = "https://stats.nba.com/stats";
const LEAGUE_ID: &str = "00";
const SEASON_TYPE: &str = "Regular Season";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivePlayer {
    pub id: u32,
    pub full_name: String,
}

/// Source of box scores. Implementations must be usable from several fetch workers at once.
pub trait StatsProvider: Send + Sync {
    fn list_active_players(&self) -> Result<Vec<ActivePlayer>>;

    /// Game log of one player for `season`, optionally starting at `date_from` (inclusive).
    /// Rows may come back without `player_name`; the fetcher fills it in.
    fn game_log(
        &self,
        player_id: u32,
        season: &str,
        date_from: Option<NaiveDate>,
    ) -> Result<Vec<RawGameRecord>>;
}

pub struct NbaStatsProvider {
    client: &'static Client,
    season: String,
}

impl NbaStatsProvider {
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(config.http_timeout)?,
            season: config.season.clone(),
        })
    }

    fn get(&self, url: &str) -> Result<String> {
        let resp = self.client.get(url).send().context("request failed")?;
        let status = resp.status();
        let body = resp.text().context("failed reading body")?;
        if !status.is_success() {
            return Err(anyhow!("http {}: {}", status, truncate(&body, 200)));
        }
        Ok(body)
    }
}

impl StatsProvider for NbaStatsProvider {
    fn list_active_players(&self) -> Result<Vec<ActivePlayer>> {
        let url = format!(
            "{NBA_STATS_URL}/commonallplayers?IsOnlyCurrentSeason=1&LeagueID={LEAGUE_ID}&Season={}",
            self.season
        );
        let body = self.get(&url).context("fetch active players")?;
        parse_active_players_json(&body)
    }

    fn game_log(
        &self,
        player_id: u32,
        season: &str,
        date_from: Option<NaiveDate>,
    ) -> Result<Vec<RawGameRecord>> {
        let url = game_log_url(player_id, season, date_from);
        let body = self
            .get(&url)
            .with_context(|| format!("fetch game log for player {player_id}"))?;
        parse_game_log_json(&body, player_id)
    }
}

pub fn game_log_url(player_id: u32, season: &str, date_from: Option<NaiveDate>) -> String {
    let date_from = date_from
        .map(|d| d.format("%m/%d/%Y").to_string().replace('/', "%2F"))
        .unwrap_or_default();
    format!(
        "{NBA_STATS_URL}/playergamelog?DateFrom={date_from}&DateTo=&LeagueID={LEAGUE_ID}&PlayerID={player_id}&Season={season}&SeasonType={}",
        SEASON_TYPE.replace(' ', "+")
    )
}

/// One `resultSets` table: column headers plus positional rows.
#[derive(Debug, Clone)]
struct ResultTable {
    index: HashMap<String, usize>,
    rows: Vec<Vec<Value>>,
}

impl ResultTable {
    fn cell<'a>(&self, row: &'a [Value], column: &str) -> Option<&'a Value> {
        let idx = *self.index.get(column)?;
        row.get(idx).filter(|v| !v.is_null())
    }

    fn has(&self, column: &str) -> bool {
        self.index.contains_key(column)
    }

    fn require(&self, columns: &[&str]) -> Result<(), PipelineError> {
        for column in columns {
            if !self.has(column) {
                return Err(PipelineError::malformed(format!(
                    "result set has no {column} column"
                )));
            }
        }
        Ok(())
    }
}

/// First table of a stats payload. `Ok(None)` for empty or `null` bodies.
fn first_result_table(raw: &str) -> Result<Option<ResultTable>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Ok(None);
    }
    let root: Value = serde_json::from_str(trimmed).context("invalid stats json")?;
    let table = root
        .get("resultSets")
        .and_then(|v| v.as_array())
        .and_then(|arr| arr.first())
        .or_else(|| root.get("resultSet"));
    let Some(table) = table else {
        return Ok(None);
    };

    let index = table
        .get("headers")
        .and_then(|v| v.as_array())
        .map(|headers| {
            headers
                .iter()
                .enumerate()
                .filter_map(|(i, h)| h.as_str().map(|name| (name.to_ascii_uppercase(), i)))
                .collect::<HashMap<_, _>>()
        })
        .unwrap_or_default();
    let rows = table
        .get("rowSet")
        .and_then(|v| v.as_array())
        .map(|rows| {
            rows.iter()
                .filter_map(|row| row.as_array().cloned())
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    Ok(Some(ResultTable { index, rows }))
}

pub fn parse_active_players_json(raw: &str) -> Result<Vec<ActivePlayer>> {
    let Some(table) = first_result_table(raw)? else {
        return Ok(Vec::new());
    };
    table.require(&["PERSON_ID", "DISPLAY_FIRST_LAST"])?;

    let mut out = Vec::with_capacity(table.rows.len());
    for row in &table.rows {
        let active = table
            .cell(row, "ROSTERSTATUS")
            .and_then(as_i64_any)
            .is_none_or(|status| status == 1);
        if !active {
            continue;
        }
        let Some(id) = table.cell(row, "PERSON_ID").and_then(as_u32_any) else {
            continue;
        };
        let full_name = table
            .cell(row, "DISPLAY_FIRST_LAST")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .trim()
            .to_string();
        if id == 0 || full_name.is_empty() {
            continue;
        }
        out.push(ActivePlayer { id, full_name });
    }
    Ok(out)
}

/// Parses a `playergamelog` payload. Rows without a player id inherit `player_id`.
pub fn parse_game_log_json(raw: &str, player_id: u32) -> Result<Vec<RawGameRecord>> {
    let Some(table) = first_result_table(raw)? else {
        return Ok(Vec::new());
    };
    if table.rows.is_empty() {
        return Ok(Vec::new());
    }
    table.require(&["GAME_ID", "GAME_DATE", "MATCHUP"])?;

    let mut out = Vec::with_capacity(table.rows.len());
    for row in &table.rows {
        let num = |column: &str| table.cell(row, column).and_then(as_f64_any).unwrap_or(0.0);
        let text = |column: &str| {
            table
                .cell(row, column)
                .map(|v| match v {
                    Value::String(s) => s.trim().to_string(),
                    other => other.to_string(),
                })
                .filter(|s| !s.is_empty())
        };

        let game_id = text("GAME_ID")
            .ok_or_else(|| PipelineError::malformed("game log row without GAME_ID"))?;
        let game_date_raw = text("GAME_DATE").ok_or_else(|| {
            PipelineError::malformed(format!("game {game_id} has no GAME_DATE"))
        })?;
        let matchup = text("MATCHUP")
            .ok_or_else(|| PipelineError::malformed(format!("game {game_id} has no MATCHUP")))?;

        out.push(RawGameRecord {
            season_id: text("SEASON_ID").unwrap_or_default(),
            player_id: table
                .cell(row, "PLAYER_ID")
                .and_then(as_u32_any)
                .unwrap_or(player_id),
            player_name: text("PLAYER_NAME").unwrap_or_default(),
            game_date: parse_game_date(&game_date_raw)?,
            game_id,
            matchup,
            wl: text("WL"),
            min: table.cell(row, "MIN").and_then(as_minutes).unwrap_or(0.0),
            fgm: num("FGM"),
            fga: num("FGA"),
            fg_pct: num("FG_PCT"),
            fg3m: num("FG3M"),
            fg3a: num("FG3A"),
            fg3_pct: num("FG3_PCT"),
            ftm: num("FTM"),
            fta: num("FTA"),
            ft_pct: num("FT_PCT"),
            oreb: num("OREB"),
            dreb: num("DREB"),
            reb: num("REB"),
            ast: num("AST"),
            stl: num("STL"),
            blk: num("BLK"),
            tov: num("TOV"),
            pf: num("PF"),
            pts: num("PTS"),
            plus_minus: num("PLUS_MINUS"),
            video_available: num("VIDEO_AVAILABLE") != 0.0,
        });
    }
    Ok(out)
}

fn as_f64_any(v: &Value) -> Option<f64> {
    if let Some(n) = v.as_f64() {
        return Some(n);
    }
    v.as_str()?.trim().parse::<f64>().ok()
}

fn as_i64_any(v: &Value) -> Option<i64> {
    if let Some(n) = v.as_i64() {
        return Some(n);
    }
    v.as_str()?.trim().parse::<i64>().ok()
}

fn as_u32_any(v: &Value) -> Option<u32> {
    u32::try_from(as_i64_any(v)?).ok()
}

/// Minutes come as a number or as "MM:SS".
fn as_minutes(v: &Value) -> Option<f64> {
    if let Some(n) = v.as_f64() {
        return Some(n);
    }
    let raw = v.as_str()?.trim();
    match raw.split_once(':') {
        Some((m, s)) => {
            let m = m.trim().parse::<f64>().ok()?;
            let s = s.trim().parse::<f64>().ok()?;
            Some(m + s / 60.0)
        }
        None => raw.parse::<f64>().ok(),
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
