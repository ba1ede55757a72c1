use anyhow::{Context, Result};
use rusqlite::{Connection, Row, params, params_from_iter};

use crate::records::{RawGameRecord, Watermark, format_game_date, parse_game_date};
use crate::store::{self, OrderColumn, Table, bool_to_i64};

/// Column list shared by both stores, in [`raw_from_row`] order.
pub(crate) const RAW_COLUMNS: &str = "season_id, player_id, player_name, game_id, game_date, \
     matchup, wl, min, fgm, fga, fg_pct, fg3m, fg3a, fg3_pct, ftm, fta, ft_pct, \
     oreb, dreb, reb, ast, stl, blk, tov, pf, pts, plus_minus, video_available";

pub(crate) const RAW_COLUMN_COUNT: usize = 28;

pub fn is_empty(conn: &Connection) -> Result<bool> {
    store::is_empty(conn, Table::GameLogs)
}

pub fn watermark(conn: &Connection) -> Result<Watermark> {
    let latest = store::max_column_value(conn, Table::GameLogs, OrderColumn::GameDate)?;
    Ok(Watermark(latest))
}

/// Inserts rows not yet present by (player_id, game_id). Returns how many were new.
///
/// Runs on whatever transaction `conn` is in; pass a `Transaction` to batch the writes.
pub fn append_rows(conn: &Connection, rows: &[RawGameRecord]) -> Result<usize> {
    if rows.is_empty() {
        return Ok(0);
    }
    let sql = format!(
        "INSERT OR IGNORE INTO game_logs ({RAW_COLUMNS}) VALUES ({})",
        placeholders(RAW_COLUMN_COUNT)
    );
    let mut stmt = conn.prepare_cached(&sql).context("prepare raw insert")?;
    let mut inserted = 0usize;
    for row in rows {
        inserted += stmt
            .execute(params_from_iter(raw_values(row)))
            .with_context(|| format!("insert game log {}/{}", row.player_id, row.game_id))?;
    }
    Ok(inserted)
}

/// Every stored row of the given seasons, ordered by player then date.
pub fn select_by_seasons(conn: &Connection, seasons: &[String]) -> Result<Vec<RawGameRecord>> {
    if seasons.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT {RAW_COLUMNS} FROM game_logs WHERE season_id IN ({}) \
         ORDER BY player_id ASC, game_date ASC, game_id ASC",
        placeholders(seasons.len())
    );
    let mut stmt = conn.prepare(&sql).context("prepare season history query")?;
    let mut rows = stmt
        .query(params_from_iter(seasons.iter()))
        .context("query season history")?;
    let mut out = Vec::new();
    while let Some(row) = rows.next().context("step season history")? {
        out.push(raw_from_row(row, 0)?);
    }
    Ok(out)
}

pub fn select_for_player(conn: &Connection, player_id: u32) -> Result<Vec<RawGameRecord>> {
    let sql = format!(
        "SELECT {RAW_COLUMNS} FROM game_logs WHERE player_id = ?1 ORDER BY game_date ASC, game_id ASC"
    );
    let mut stmt = conn.prepare(&sql).context("prepare player history query")?;
    let mut rows = stmt
        .query(params![player_id as i64])
        .context("query player history")?;
    let mut out = Vec::new();
    while let Some(row) = rows.next().context("step player history")? {
        out.push(raw_from_row(row, 0)?);
    }
    Ok(out)
}

pub(crate) fn raw_values(r: &RawGameRecord) -> Vec<rusqlite::types::Value> {
    use rusqlite::types::Value;
    vec![
        Value::Text(r.season_id.clone()),
        Value::Integer(r.player_id as i64),
        Value::Text(r.player_name.clone()),
        Value::Text(r.game_id.clone()),
        Value::Text(format_game_date(r.game_date)),
        Value::Text(r.matchup.clone()),
        r.wl.clone().map(Value::Text).unwrap_or(Value::Null),
        Value::Real(r.min),
        Value::Real(r.fgm),
        Value::Real(r.fga),
        Value::Real(r.fg_pct),
        Value::Real(r.fg3m),
        Value::Real(r.fg3a),
        Value::Real(r.fg3_pct),
        Value::Real(r.ftm),
        Value::Real(r.fta),
        Value::Real(r.ft_pct),
        Value::Real(r.oreb),
        Value::Real(r.dreb),
        Value::Real(r.reb),
        Value::Real(r.ast),
        Value::Real(r.stl),
        Value::Real(r.blk),
        Value::Real(r.tov),
        Value::Real(r.pf),
        Value::Real(r.pts),
        Value::Real(r.plus_minus),
        Value::Integer(bool_to_i64(r.video_available)),
    ]
}

/// Decodes [`RAW_COLUMNS`] starting at column `base`.
pub(crate) fn raw_from_row(row: &Row<'_>, base: usize) -> Result<RawGameRecord> {
    let col = |i: usize| base + i;
    let game_date_raw: String = row.get(col(4)).context("decode game_date")?;
    let game_date = parse_game_date(&game_date_raw)?;
    let record = RawGameRecord {
        season_id: row.get(col(0))?,
        player_id: row.get::<_, u32>(col(1))?,
        player_name: row.get(col(2))?,
        game_id: row.get(col(3))?,
        game_date,
        matchup: row.get(col(5))?,
        wl: row.get(col(6))?,
        min: row.get(col(7))?,
        fgm: row.get(col(8))?,
        fga: row.get(col(9))?,
        fg_pct: row.get(col(10))?,
        fg3m: row.get(col(11))?,
        fg3a: row.get(col(12))?,
        fg3_pct: row.get(col(13))?,
        ftm: row.get(col(14))?,
        fta: row.get(col(15))?,
        ft_pct: row.get(col(16))?,
        oreb: row.get(col(17))?,
        dreb: row.get(col(18))?,
        reb: row.get(col(19))?,
        ast: row.get(col(20))?,
        stl: row.get(col(21))?,
        blk: row.get(col(22))?,
        tov: row.get(col(23))?,
        pf: row.get(col(24))?,
        pts: row.get(col(25))?,
        plus_minus: row.get(col(26))?,
        video_available: row.get::<_, i64>(col(27))? != 0,
    };
    Ok(record)
}

pub(crate) fn placeholders(n: usize) -> String {
    (1..=n)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ")
}
