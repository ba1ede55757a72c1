use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::types::Value;
use rusqlite::{Connection, Row, params, params_from_iter};

use crate::error::PipelineError;
use crate::raw_store::{RAW_COLUMN_COUNT, RAW_COLUMNS, placeholders, raw_from_row, raw_values};
use crate::records::{EngineeredRecord, HomeAway, Stat, StatLine};
use crate::store::{self, Table};

const FEATURE_COLUMNS_SQL: &str = "home_away, opponent_team, \
     pts_rolling_avg, ast_rolling_avg, reb_rolling_avg, fg_pct_rolling_avg, stl_rolling_avg, blk_rolling_avg, \
     pts_allowed, ast_allowed, reb_allowed, fg_pct_allowed, stl_allowed, blk_allowed";

const FEATURE_COLUMN_COUNT: usize = 14;

/// How the prediction side names a player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerKey {
    Id(u32),
    Name(String),
}

pub fn is_empty(conn: &Connection) -> Result<bool> {
    store::is_empty(conn, Table::EngineeredStats)
}

/// Appends every row. Never deduplicates or overwrites earlier rows.
///
/// Runs on whatever transaction `conn` is in; pass a `Transaction` to batch the writes.
pub fn append_rows(conn: &Connection, rows: &[EngineeredRecord]) -> Result<usize> {
    if rows.is_empty() {
        return Ok(0);
    }
    let ingested_at = Utc::now().to_rfc3339();
    let sql = format!(
        "INSERT INTO engineered_stats ({RAW_COLUMNS}, {FEATURE_COLUMNS_SQL}, ingested_at) VALUES ({})",
        placeholders(RAW_COLUMN_COUNT + FEATURE_COLUMN_COUNT + 1)
    );
    let mut stmt = conn
        .prepare_cached(&sql)
        .context("prepare engineered insert")?;
    for row in rows {
        let mut values = raw_values(&row.raw);
        values.push(Value::Text(row.home_away.code().to_string()));
        values.push(Value::Text(row.opponent_team.clone()));
        values.extend(row.rolling.to_vec().into_iter().map(Value::Real));
        values.extend(
            row.allowed
                .to_vec()
                .into_iter()
                .map(|v| v.map(Value::Real).unwrap_or(Value::Null)),
        );
        values.push(Value::Text(ingested_at.clone()));
        stmt.execute(params_from_iter(values)).with_context(|| {
            format!(
                "insert engineered row {}/{}",
                row.raw.player_id, row.raw.game_id
            )
        })?;
    }
    Ok(rows.len())
}

/// Most recent engineered row for a player by game date. Ties on date go to the row written last.
pub fn latest_for_player(conn: &Connection, key: &PlayerKey) -> Result<Option<EngineeredRecord>> {
    let (filter, value) = match key {
        PlayerKey::Id(id) => ("player_id = ?1", Value::Integer(*id as i64)),
        PlayerKey::Name(name) => ("player_name = ?1", Value::Text(name.trim().to_string())),
    };
    let sql = format!(
        "SELECT {RAW_COLUMNS}, {FEATURE_COLUMNS_SQL} FROM engineered_stats \
         WHERE {filter} ORDER BY game_date DESC, rowid DESC LIMIT 1"
    );
    query_one(conn, &sql, params![value]).context("query latest player features")
}

/// Most recent engineered row carrying allowed aggregates for an opponent at a venue.
pub fn latest_allowed_for(
    conn: &Connection,
    opponent_team: &str,
    home_away: HomeAway,
) -> Result<Option<EngineeredRecord>> {
    let sql = format!(
        "SELECT {RAW_COLUMNS}, {FEATURE_COLUMNS_SQL} FROM engineered_stats \
         WHERE opponent_team = ?1 AND home_away = ?2 \
         ORDER BY game_date DESC, rowid DESC LIMIT 1"
    );
    query_one(
        conn,
        &sql,
        params![opponent_team.trim().to_ascii_uppercase(), home_away.code()],
    )
    .context("query latest opponent allowed features")
}

pub fn select_for_player(conn: &Connection, player_id: u32) -> Result<Vec<EngineeredRecord>> {
    let sql = format!(
        "SELECT {RAW_COLUMNS}, {FEATURE_COLUMNS_SQL} FROM engineered_stats \
         WHERE player_id = ?1 ORDER BY game_date ASC, rowid ASC"
    );
    let mut stmt = conn.prepare(&sql).context("prepare player features query")?;
    let mut rows = stmt
        .query(params![player_id as i64])
        .context("query player features")?;
    let mut out = Vec::new();
    while let Some(row) = rows.next().context("step player features")? {
        out.push(engineered_from_row(row)?);
    }
    Ok(out)
}

/// One example for the stat-line regressor: twelve features, six targets.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingRow {
    pub features: Vec<f64>,
    pub targets: Vec<f64>,
}

/// Every engineered row whose features are complete, oldest first.
pub fn training_rows(conn: &Connection) -> Result<Vec<TrainingRow>> {
    let sql = format!(
        "SELECT {RAW_COLUMNS}, {FEATURE_COLUMNS_SQL} FROM engineered_stats \
         ORDER BY game_date ASC, rowid ASC"
    );
    let mut stmt = conn.prepare(&sql).context("prepare training rows query")?;
    let mut rows = stmt.query([]).context("query training rows")?;
    let mut out = Vec::new();
    while let Some(row) = rows.next().context("step training rows")? {
        let record = engineered_from_row(row)?;
        let Some(features) = feature_vector(&record.rolling, &record.allowed) else {
            continue;
        };
        let targets = Stat::ALL.iter().map(|s| record.raw.stat(*s)).collect();
        out.push(TrainingRow { features, targets });
    }
    Ok(out)
}

/// Rolling columns then allowed columns, in [`Stat::ALL`] order. `None` if any allowed value
/// is missing.
pub fn feature_vector(
    rolling: &StatLine<f64>,
    allowed: &StatLine<Option<f64>>,
) -> Option<Vec<f64>> {
    let mut out = rolling.to_vec();
    for value in allowed.to_vec() {
        out.push(value?);
    }
    Some(out)
}

fn query_one<P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> Result<Option<EngineeredRecord>> {
    let mut stmt = conn.prepare(sql).context("prepare latest row query")?;
    let mut rows = stmt.query(params).context("query latest row")?;
    match rows.next().context("step latest row")? {
        Some(row) => Ok(Some(engineered_from_row(row)?)),
        None => Ok(None),
    }
}

fn engineered_from_row(row: &Row<'_>) -> Result<EngineeredRecord> {
    let raw = raw_from_row(row, 0)?;
    let base = RAW_COLUMN_COUNT;
    let home_away_raw: String = row.get(base)?;
    let home_away = HomeAway::parse(&home_away_raw).ok_or_else(|| {
        PipelineError::malformed(format!("unknown home_away code {home_away_raw:?}"))
    })?;
    let opponent_team: String = row.get(base + 1)?;

    let mut rolling = StatLine::<f64>::default();
    let mut allowed = StatLine::<Option<f64>>::default();
    for (i, stat) in Stat::ALL.iter().enumerate() {
        rolling.set(*stat, row.get(base + 2 + i)?);
        allowed.set(*stat, row.get(base + 2 + Stat::ALL.len() + i)?);
    }

    Ok(EngineeredRecord {
        raw,
        home_away,
        opponent_team,
        rolling,
        allowed,
    })
}
