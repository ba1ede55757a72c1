//! Feature derivation over batches of raw game logs.
//!
//! Every stage works on an owned working copy, so callers keep their input untouched. Stages
//! can run on their own; the only ordering constraint is that the matchup columns exist before
//! the opponent aggregate is joined.

use std::collections::{BTreeMap, HashSet};

use tracing::debug;

use crate::config::DEFAULT_ROLLING_WINDOW;
use crate::error::PipelineError;
use crate::records::{EngineeredRecord, HomeAway, RawGameRecord, Stat, StatLine};

const AWAY_MARKER: char = '@';

#[derive(Debug, Clone, Copy)]
pub struct FeatureEngine {
    window: usize,
}

impl Default for FeatureEngine {
    fn default() -> Self {
        Self::new(DEFAULT_ROLLING_WINDOW)
    }
}

impl FeatureEngine {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Engineers a batch on its own: windows and aggregates only see the batch.
    pub fn engineer(
        &self,
        batch: &[RawGameRecord],
    ) -> Result<Vec<EngineeredRecord>, PipelineError> {
        self.engineer_with_history(&[], batch)
    }

    /// Engineers `batch` against already-stored `history`.
    ///
    /// Rolling windows and opponent aggregates are computed over history and batch together
    /// (deduplicated by player and game, batch rows win), but only the batch's rows are
    /// returned. Output is ordered by player, then date, then game.
    pub fn engineer_with_history(
        &self,
        history: &[RawGameRecord],
        batch: &[RawGameRecord],
    ) -> Result<Vec<EngineeredRecord>, PipelineError> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        validate_identities(history)?;
        validate_identities(batch)?;

        let targets: HashSet<(u32, &str)> = batch.iter().map(|r| r.identity()).collect();

        let mut merged: BTreeMap<(u32, String), &RawGameRecord> = BTreeMap::new();
        for record in history.iter().chain(batch.iter()) {
            merged.insert((record.player_id, record.game_id.clone()), record);
        }

        let mut rows = derive_matchup_columns(merged.into_values())?;
        rolling_averages(&mut rows, self.window);
        opponent_allowed(&mut rows);

        rows.retain(|row| targets.contains(&row.raw.identity()));
        debug!(
            batch = batch.len(),
            history = history.len(),
            engineered = rows.len(),
            window = self.window,
            "engineered feature batch"
        );
        Ok(rows)
    }
}

/// "LAL @ BOS" is an away game for LAL, "LAL vs. BOS" a home game.
pub fn home_away(matchup: &str) -> HomeAway {
    if matchup.contains(AWAY_MARKER) {
        HomeAway::Away
    } else {
        HomeAway::Home
    }
}

/// Opponent code from the last three characters of the matchup.
pub fn opponent_team(matchup: &str) -> Result<String, PipelineError> {
    let trimmed = matchup.trim();
    let parts: Vec<&str> = trimmed.split_whitespace().collect();
    let well_formed = parts.len() == 3
        && matches!(parts[1], "@" | "vs." | "vs")
        && is_team_code(parts[0])
        && is_team_code(parts[2]);
    if !well_formed {
        return Err(PipelineError::malformed(format!(
            "matchup {matchup:?} is not \"TEAM @ OPP\" or \"TEAM vs. OPP\""
        )));
    }
    Ok(trimmed[trimmed.len() - 3..].to_string())
}

fn is_team_code(raw: &str) -> bool {
    raw.len() == 3 && raw.bytes().all(|b| b.is_ascii_uppercase())
}

/// Wraps raw rows into engineered rows with home/away and opponent filled in. Feature
/// columns start empty.
pub fn derive_matchup_columns<'a>(
    records: impl IntoIterator<Item = &'a RawGameRecord>,
) -> Result<Vec<EngineeredRecord>, PipelineError> {
    records
        .into_iter()
        .map(|raw| {
            let opponent_team = opponent_team(&raw.matchup).map_err(|err| {
                PipelineError::malformed(format!(
                    "player {} game {}: {err}",
                    raw.player_id, raw.game_id
                ))
            })?;
            Ok(EngineeredRecord {
                home_away: home_away(&raw.matchup),
                opponent_team,
                raw: raw.clone(),
                rolling: StatLine::default(),
                allowed: StatLine::default(),
            })
        })
        .collect()
}

/// Fills the rolling columns: per player, by date, trailing mean over at most `window`
/// games with a minimum of one. Leaves `rows` sorted by player, date, game.
pub fn rolling_averages(rows: &mut [EngineeredRecord], window: usize) {
    let window = window.max(1);
    sort_chronologically(rows);

    let mut start = 0;
    while start < rows.len() {
        let player_id = rows[start].raw.player_id;
        let end = rows[start..]
            .iter()
            .position(|r| r.raw.player_id != player_id)
            .map_or(rows.len(), |offset| start + offset);

        for stat in Stat::ALL {
            let values: Vec<f64> = rows[start..end].iter().map(|r| r.raw.stat(stat)).collect();
            for (row, mean) in rows[start..end]
                .iter_mut()
                .zip(trailing_means(&values, window))
            {
                row.rolling.set(stat, mean);
            }
        }
        start = end;
    }
}

/// Mean of each value and up to `window - 1` values before it.
///
/// Each mean is summed from its own window so a value never depends on anything outside it.
pub fn trailing_means(values: &[f64], window: usize) -> Vec<f64> {
    let window = window.max(1);
    (0..values.len())
        .map(|i| {
            let lo = (i + 1).saturating_sub(window);
            let slice = &values[lo..=i];
            slice.iter().sum::<f64>() / slice.len() as f64
        })
        .collect()
}

#[derive(Debug, Default)]
struct AllowedAccumulator {
    games: usize,
    sums: StatLine<f64>,
    fgm: f64,
    fga: f64,
}

/// Fills the allowed columns from every row sharing the row's (opponent, venue) key.
pub fn opponent_allowed(rows: &mut [EngineeredRecord]) {
    let mut by_key: BTreeMap<(String, HomeAway), AllowedAccumulator> = BTreeMap::new();
    for row in rows.iter() {
        let acc = by_key
            .entry((row.opponent_team.clone(), row.home_away))
            .or_default();
        acc.games += 1;
        for stat in Stat::MEAN_ALLOWED {
            acc.sums.set(stat, acc.sums.get(stat) + row.raw.stat(stat));
        }
        acc.fgm += row.raw.fgm;
        acc.fga += row.raw.fga;
    }

    let aggregates: BTreeMap<(String, HomeAway), StatLine<Option<f64>>> = by_key
        .into_iter()
        .map(|(key, acc)| (key, acc.finish()))
        .collect();

    for row in rows.iter_mut() {
        row.allowed = aggregates
            .get(&(row.opponent_team.clone(), row.home_away))
            .copied()
            .unwrap_or_default();
    }
}

impl AllowedAccumulator {
    fn finish(&self) -> StatLine<Option<f64>> {
        let mut out = StatLine::<Option<f64>>::default();
        if self.games == 0 {
            return out;
        }
        for stat in Stat::MEAN_ALLOWED {
            out.set(stat, Some(self.sums.get(stat) / self.games as f64));
        }
        // Ratio of totals, not the mean of per-game percentages.
        let fg_pct = (self.fga > 0.0).then(|| self.fgm / self.fga);
        out.set(Stat::FgPct, fg_pct);
        out
    }
}

fn sort_chronologically(rows: &mut [EngineeredRecord]) {
    rows.sort_by(|a, b| {
        a.raw
            .player_id
            .cmp(&b.raw.player_id)
            .then(a.raw.game_date.cmp(&b.raw.game_date))
            .then_with(|| a.raw.game_id.cmp(&b.raw.game_id))
    });
}

fn validate_identities(records: &[RawGameRecord]) -> Result<(), PipelineError> {
    for record in records {
        if record.player_id == 0 {
            return Err(PipelineError::malformed(format!(
                "game {} has no player id",
                record.game_id
            )));
        }
        if record.player_name.trim().is_empty() {
            return Err(PipelineError::malformed(format!(
                "player {} game {} has no player name",
                record.player_id, record.game_id
            )));
        }
        if record.game_id.trim().is_empty() {
            return Err(PipelineError::malformed(format!(
                "player {} has a game without id",
                record.player_id
            )));
        }
    }
    Ok(())
}
