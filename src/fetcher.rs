use anyhow::{Context, Result};
use chrono::NaiveDate;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::provider::{ActivePlayer, StatsProvider};
use crate::rate_limit::TokenBucket;
use crate::records::{RawGameRecord, Watermark};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// Whole current season for every active player.
    Full,
    /// Only games strictly after the watermark.
    Incremental,
}

impl FetchMode {
    pub fn as_str(self) -> &'static str {
        match self {
            FetchMode::Full => "full",
            FetchMode::Incremental => "incremental",
        }
    }
}

/// Result of one fetch pass over the active players.
#[derive(Debug, Default)]
pub struct FetchBatch {
    pub records: Vec<RawGameRecord>,
    pub players_total: usize,
    pub failures: Vec<PipelineError>,
}

impl FetchBatch {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

pub struct Fetcher<P> {
    provider: P,
    limiter: TokenBucket,
    season: String,
    season_start: NaiveDate,
    parallelism: usize,
}

impl<P: StatsProvider> Fetcher<P> {
    pub fn new(provider: P, config: &PipelineConfig) -> Self {
        Self {
            provider,
            limiter: TokenBucket::new(config.provider_min_interval, config.provider_burst),
            season: config.season.clone(),
            season_start: config.season_start,
            parallelism: config.fetch_parallelism.max(1),
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Pulls game logs for every active player.
    ///
    /// A player whose call fails is logged and left out. Failing to list the players, or a
    /// payload carrying malformed records, fails the whole fetch. Records come back grouped in
    /// active-player order, each player's games oldest first, regardless of how the workers
    /// were scheduled.
    pub fn fetch(&self, mode: FetchMode, watermark: Watermark) -> Result<FetchBatch> {
        let players = self
            .provider
            .list_active_players()
            .context("list active players")?;
        let date_from = match mode {
            FetchMode::Full => None,
            FetchMode::Incremental => Some(watermark.fetch_from(self.season_start)),
        };
        info!(
            mode = mode.as_str(),
            players = players.len(),
            date_from = ?date_from,
            season = %self.season,
            "fetching game logs"
        );

        let mut results: Vec<Result<Vec<RawGameRecord>, PipelineError>> =
            with_fetch_pool(self.parallelism, || {
                players
                    .par_iter()
                    .map(|player| self.fetch_player(player, date_from))
                    .collect()
            });

        // A payload that parses into bad records fails the whole fetch, so nothing from this
        // cycle is stored and the watermark cannot move past the player's games.
        if let Some(idx) = results
            .iter()
            .position(|r| matches!(r, Err(PipelineError::MalformedRecord(_))))
        {
            if let Err(err) = results.swap_remove(idx) {
                return Err(err.into());
            }
        }

        let mut batch = FetchBatch {
            players_total: players.len(),
            ..FetchBatch::default()
        };
        for (player, result) in players.iter().zip(results) {
            match result {
                Ok(mut rows) => {
                    if mode == FetchMode::Incremental {
                        rows.retain(|r| watermark.admits(r.game_date, self.season_start));
                    }
                    rows.sort_by(|a, b| {
                        a.game_date
                            .cmp(&b.game_date)
                            .then_with(|| a.game_id.cmp(&b.game_id))
                    });
                    for row in &mut rows {
                        row.player_id = player.id;
                        row.player_name = player.full_name.clone();
                    }
                    if !rows.is_empty() {
                        debug!(player = %player.full_name, games = rows.len(), "fetched game log");
                    }
                    batch.records.extend(rows);
                }
                Err(err) => {
                    warn!(
                        player = %player.full_name,
                        player_id = player.id,
                        error = %err,
                        "skipping player"
                    );
                    batch.failures.push(err);
                }
            }
        }

        info!(
            mode = mode.as_str(),
            records = batch.records.len(),
            failed_players = batch.failures.len(),
            "fetch complete"
        );
        Ok(batch)
    }

    fn fetch_player(
        &self,
        player: &ActivePlayer,
        date_from: Option<NaiveDate>,
    ) -> Result<Vec<RawGameRecord>, PipelineError> {
        self.limiter.acquire();
        self.provider
            .game_log(player.id, &self.season, date_from)
            .map_err(|err| {
                let malformed = err.chain().find_map(|cause| {
                    match cause.downcast_ref::<PipelineError>() {
                        Some(PipelineError::MalformedRecord(msg)) => Some(msg.clone()),
                        _ => None,
                    }
                });
                match malformed {
                    Some(msg) => PipelineError::malformed(format!("player {}: {msg}", player.id)),
                    None => PipelineError::ProviderUnavailable {
                        player_id: player.id,
                        reason: format!("{err:#}"),
                    },
                }
            })
    }
}

fn with_fetch_pool<T>(threads: usize, action: impl FnOnce() -> T + Send) -> T
where
    T: Send,
{
    match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
        Ok(pool) => pool.install(action),
        Err(_) => action(),
    }
}
