use std::path::Path;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use rusqlite::{Connection, params};

use crate::records::parse_game_date;

/// Tables the pipeline reads and writes. Names are never taken from caller strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    GameLogs,
    EngineeredStats,
    IngestRuns,
}

impl Table {
    pub fn name(self) -> &'static str {
        match self {
            Table::GameLogs => "game_logs",
            Table::EngineeredStats => "engineered_stats",
            Table::IngestRuns => "ingest_runs",
        }
    }
}

/// Columns usable with [`max_column_value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderColumn {
    GameDate,
}

impl OrderColumn {
    pub fn name(self) -> &'static str {
        match self {
            OrderColumn::GameDate => "game_date",
        }
    }
}

pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let conn =
        Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
    conn.execute_batch("PRAGMA journal_mode = WAL;")
        .context("enable wal journal")?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory().context("open in-memory sqlite db")?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS game_logs (
            season_id TEXT NOT NULL,
            player_id INTEGER NOT NULL,
            player_name TEXT NOT NULL,
            game_id TEXT NOT NULL,
            game_date TEXT NOT NULL,
            matchup TEXT NOT NULL,
            wl TEXT NULL,
            min REAL NOT NULL,
            fgm REAL NOT NULL,
            fga REAL NOT NULL,
            fg_pct REAL NOT NULL,
            fg3m REAL NOT NULL,
            fg3a REAL NOT NULL,
            fg3_pct REAL NOT NULL,
            ftm REAL NOT NULL,
            fta REAL NOT NULL,
            ft_pct REAL NOT NULL,
            oreb REAL NOT NULL,
            dreb REAL NOT NULL,
            reb REAL NOT NULL,
            ast REAL NOT NULL,
            stl REAL NOT NULL,
            blk REAL NOT NULL,
            tov REAL NOT NULL,
            pf REAL NOT NULL,
            pts REAL NOT NULL,
            plus_minus REAL NOT NULL,
            video_available INTEGER NOT NULL,
            PRIMARY KEY (player_id, game_id)
        );
        CREATE INDEX IF NOT EXISTS idx_game_logs_date ON game_logs(game_date);
        CREATE INDEX IF NOT EXISTS idx_game_logs_season ON game_logs(season_id);

        CREATE TABLE IF NOT EXISTS engineered_stats (
            season_id TEXT NOT NULL,
            player_id INTEGER NOT NULL,
            player_name TEXT NOT NULL,
            game_id TEXT NOT NULL,
            game_date TEXT NOT NULL,
            matchup TEXT NOT NULL,
            wl TEXT NULL,
            min REAL NOT NULL,
            fgm REAL NOT NULL,
            fga REAL NOT NULL,
            fg_pct REAL NOT NULL,
            fg3m REAL NOT NULL,
            fg3a REAL NOT NULL,
            fg3_pct REAL NOT NULL,
            ftm REAL NOT NULL,
            fta REAL NOT NULL,
            ft_pct REAL NOT NULL,
            oreb REAL NOT NULL,
            dreb REAL NOT NULL,
            reb REAL NOT NULL,
            ast REAL NOT NULL,
            stl REAL NOT NULL,
            blk REAL NOT NULL,
            tov REAL NOT NULL,
            pf REAL NOT NULL,
            pts REAL NOT NULL,
            plus_minus REAL NOT NULL,
            video_available INTEGER NOT NULL,
            home_away TEXT NOT NULL,
            opponent_team TEXT NOT NULL,
            pts_rolling_avg REAL NOT NULL,
            ast_rolling_avg REAL NOT NULL,
            reb_rolling_avg REAL NOT NULL,
            fg_pct_rolling_avg REAL NOT NULL,
            stl_rolling_avg REAL NOT NULL,
            blk_rolling_avg REAL NOT NULL,
            pts_allowed REAL NULL,
            ast_allowed REAL NULL,
            reb_allowed REAL NULL,
            fg_pct_allowed REAL NULL,
            stl_allowed REAL NULL,
            blk_allowed REAL NULL,
            ingested_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_engineered_player ON engineered_stats(player_id, game_date);
        CREATE INDEX IF NOT EXISTS idx_engineered_player_name ON engineered_stats(player_name, game_date);
        CREATE INDEX IF NOT EXISTS idx_engineered_opponent
            ON engineered_stats(opponent_team, home_away, game_date);

        CREATE TABLE IF NOT EXISTS ingest_runs (
            run_id INTEGER PRIMARY KEY AUTOINCREMENT,
            started_at TEXT NOT NULL,
            finished_at TEXT NULL,
            mode TEXT NOT NULL,
            players_total INTEGER NOT NULL,
            players_failed INTEGER NOT NULL,
            raw_inserted INTEGER NOT NULL,
            engineered_appended INTEGER NOT NULL,
            errors_json TEXT NOT NULL
        );
        "#,
    )
    .context("create sqlite schema")?;
    Ok(())
}

pub fn is_empty(conn: &Connection, table: Table) -> Result<bool> {
    let sql = format!("SELECT EXISTS(SELECT 1 FROM {})", table.name());
    let exists = conn
        .query_row(&sql, [], |row| row.get::<_, i64>(0))
        .with_context(|| format!("check {} for rows", table.name()))?;
    Ok(exists == 0)
}

pub fn count_rows(conn: &Connection, table: Table) -> Result<usize> {
    let sql = format!("SELECT COUNT(*) FROM {}", table.name());
    let count = conn
        .query_row(&sql, [], |row| row.get::<_, i64>(0))
        .with_context(|| format!("count rows in {}", table.name()))?;
    Ok(usize::try_from(count).unwrap_or_default())
}

/// Largest stored value of a date column, `None` when the table is empty.
pub fn max_column_value(
    conn: &Connection,
    table: Table,
    column: OrderColumn,
) -> Result<Option<NaiveDate>> {
    let sql = format!("SELECT MAX({}) FROM {}", column.name(), table.name());
    let raw = conn
        .query_row(&sql, [], |row| row.get::<_, Option<String>>(0))
        .with_context(|| format!("query max {} of {}", column.name(), table.name()))?;
    let Some(raw) = raw else {
        return Ok(None);
    };
    Ok(Some(parse_game_date(&raw)?))
}

/// Audit row for one ingestion cycle.
#[derive(Debug, Clone, Default)]
pub struct IngestRun {
    pub mode: String,
    pub players_total: usize,
    pub players_failed: usize,
    pub raw_inserted: usize,
    pub engineered_appended: usize,
    pub errors: Vec<String>,
}

/// Writes the audit row of a finished (or abandoned) cycle.
pub fn record_ingest_run(conn: &Connection, started_at: &str, run: &IngestRun) -> Result<i64> {
    let errors_json = serde_json::to_string(&run.errors).unwrap_or_else(|_| "[]".to_string());
    conn.execute(
        "INSERT INTO ingest_runs(started_at, finished_at, mode, players_total, players_failed, raw_inserted, engineered_appended, errors_json)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            started_at,
            Utc::now().to_rfc3339(),
            run.mode,
            run.players_total as i64,
            run.players_failed as i64,
            run.raw_inserted as i64,
            run.engineered_appended as i64,
            errors_json,
        ],
    )
    .context("insert ingest run")?;
    Ok(conn.last_insert_rowid())
}

pub(crate) fn bool_to_i64(v: bool) -> i64 {
    if v { 1 } else { 0 }
}
