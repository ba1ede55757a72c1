use std::collections::{BTreeSet, HashSet};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::Connection;
use tracing::{error, info, warn};

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::feature_store;
use crate::features::FeatureEngine;
use crate::fetcher::{FetchMode, Fetcher};
use crate::provider::StatsProvider;
use crate::raw_store;
use crate::records::{RawGameRecord, Watermark};
use crate::store::{self, IngestRun};

/// Whether anything has been ingested yet. Derived from the Raw Store on every cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Cold,
    Warm,
}

impl RunState {
    pub fn fetch_mode(self) -> FetchMode {
        match self {
            RunState::Cold => FetchMode::Full,
            RunState::Warm => FetchMode::Incremental,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleSummary {
    pub mode: FetchMode,
    pub watermark: Watermark,
    pub players_total: usize,
    pub players_failed: usize,
    pub fetched: usize,
    pub raw_inserted: usize,
    pub engineered_appended: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Nothing new from the provider. No store was written.
    Empty {
        mode: FetchMode,
        players_failed: usize,
    },
    Ingested(CycleSummary),
}

/// The long-lived ingestion loop. Owns the store connection, so only one cycle can be active.
pub struct Pipeline<P> {
    conn: Connection,
    fetcher: Fetcher<P>,
    engine: FeatureEngine,
    config: PipelineConfig,
}

impl<P: StatsProvider> Pipeline<P> {
    pub fn new(conn: Connection, provider: P, config: PipelineConfig) -> Self {
        Self {
            conn,
            fetcher: Fetcher::new(provider, &config),
            engine: FeatureEngine::new(config.rolling_window),
            config,
        }
    }

    pub fn open(provider: P, config: PipelineConfig) -> Result<Self> {
        let conn = store::open_db(&config.db_path)?;
        Ok(Self::new(conn, provider, config))
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn provider(&self) -> &P {
        self.fetcher.provider()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn state(&self) -> Result<RunState> {
        if raw_store::is_empty(&self.conn)? {
            Ok(RunState::Cold)
        } else {
            Ok(RunState::Warm)
        }
    }

    pub fn run_cycle(&mut self) -> Result<CycleOutcome> {
        let mode = self.state()?.fetch_mode();
        self.run_cycle_with_mode(mode)
    }

    /// One fetch → persist raw → engineer → persist engineered pass.
    ///
    /// Raw and engineered rows are written in one transaction, so a cycle that fails while
    /// engineering leaves both stores as they were and the next cycle fetches the same games
    /// again.
    pub fn run_cycle_with_mode(&mut self, mode: FetchMode) -> Result<CycleOutcome> {
        let started_at = Utc::now().to_rfc3339();
        let watermark = raw_store::watermark(&self.conn)?;
        let batch = self.fetcher.fetch(mode, watermark)?;

        if batch.is_empty() {
            return Ok(CycleOutcome::Empty {
                mode,
                players_failed: batch.failures.len(),
            });
        }

        let mut run = IngestRun {
            mode: mode.as_str().to_string(),
            players_total: batch.players_total,
            players_failed: batch.failures.len(),
            errors: batch.failures.iter().map(|e| e.to_string()).collect(),
            ..IngestRun::default()
        };

        let persisted = persist_batch(&mut self.conn, &self.engine, &batch.records);
        let (raw_inserted, engineered_appended) = match persisted {
            Ok(counts) => counts,
            Err(err) => {
                run.errors.push(format!("{err:#}"));
                if let Err(audit_err) = store::record_ingest_run(&self.conn, &started_at, &run) {
                    warn!(error = %audit_err, "failed to record abandoned ingest run");
                }
                return Err(err);
            }
        };
        run.raw_inserted = raw_inserted;
        run.engineered_appended = engineered_appended;
        store::record_ingest_run(&self.conn, &started_at, &run)?;

        Ok(CycleOutcome::Ingested(CycleSummary {
            mode,
            watermark,
            players_total: batch.players_total,
            players_failed: batch.failures.len(),
            fetched: batch.records.len(),
            raw_inserted,
            engineered_appended,
        }))
    }

    /// How long to wait after a cycle: the idle interval when nothing came in, the regular
    /// interval otherwise (including after a failed cycle).
    pub fn next_sleep(&self, outcome: &Result<CycleOutcome>) -> Duration {
        match outcome {
            Ok(CycleOutcome::Empty { .. }) => self.config.idle_interval,
            _ => self.config.cycle_interval,
        }
    }

    /// Runs cycles until `max_cycles` is reached (forever when `None`), sleeping through
    /// `sleep` between them. Cycle errors are logged and never end the loop.
    pub fn run_loop(&mut self, max_cycles: Option<u64>, mut sleep: impl FnMut(Duration)) {
        let mut iteration = 0u64;
        loop {
            iteration += 1;
            let loop_start = Instant::now();
            let outcome = self.run_cycle();
            log_outcome(iteration, &outcome, loop_start.elapsed());

            if max_cycles.is_some_and(|max| iteration >= max) {
                return;
            }
            let pause = self.next_sleep(&outcome);
            info!(
                iteration,
                next_cycle_secs = pause.as_secs(),
                "ingest worker: sleeping"
            );
            sleep(pause);
        }
    }

    pub fn run_forever(&mut self) {
        self.run_loop(None, thread::sleep);
    }
}

fn persist_batch(
    conn: &mut Connection,
    engine: &FeatureEngine,
    records: &[RawGameRecord],
) -> Result<(usize, usize)> {
    let tx = conn.transaction().context("begin ingest transaction")?;
    let raw_inserted = raw_store::append_rows(&tx, records)?;

    let seasons: Vec<String> = records
        .iter()
        .map(|r| r.season_id.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let history = raw_store::select_by_seasons(&tx, &seasons)?;
    // Engineer the stored copies: a replayed game the raw insert ignored keeps its first values.
    let wanted: HashSet<(u32, &str)> = records.iter().map(|r| r.identity()).collect();
    let stored_batch: Vec<RawGameRecord> = history
        .iter()
        .filter(|r| wanted.contains(&r.identity()))
        .cloned()
        .collect();
    let engineered = engine
        .engineer_with_history(&history, &stored_batch)
        .context("feature engineering failed")?;
    let engineered_appended = feature_store::append_rows(&tx, &engineered)?;

    tx.commit().context("commit ingest transaction")?;
    Ok((raw_inserted, engineered_appended))
}

fn log_outcome(iteration: u64, outcome: &Result<CycleOutcome>, elapsed: Duration) {
    match outcome {
        Ok(CycleOutcome::Empty {
            mode,
            players_failed,
        }) => {
            info!(
                iteration,
                mode = mode.as_str(),
                players_failed,
                "ingest worker: no new game logs"
            );
        }
        Ok(CycleOutcome::Ingested(summary)) => {
            info!(
                iteration,
                mode = summary.mode.as_str(),
                watermark = ?summary.watermark.latest(),
                fetched = summary.fetched,
                raw_inserted = summary.raw_inserted,
                engineered_appended = summary.engineered_appended,
                players_failed = summary.players_failed,
                duration_secs = elapsed.as_secs_f64(),
                "ingest worker: cycle completed"
            );
        }
        Err(err) => {
            let malformed = matches!(
                err.downcast_ref::<PipelineError>(),
                Some(PipelineError::MalformedRecord(_))
            );
            error!(
                iteration,
                malformed,
                error = %format!("{err:#}"),
                "ingest worker: cycle failed"
            );
        }
    }
}
