//! Read path used by the prediction side: the player's latest rolling features joined with the
//! opponent's latest allowed aggregates for the requested venue.

use std::fmt;

use anyhow::Result;
use chrono::NaiveDate;
use rusqlite::Connection;

use crate::feature_store::{self, PlayerKey};
use crate::records::{HomeAway, Stat, StatLine};

#[derive(Debug, Clone, PartialEq)]
pub struct PredictionInputs {
    pub player_id: u32,
    pub player_name: String,
    pub last_game_date: NaiveDate,
    pub opponent_team: String,
    pub home_away: HomeAway,
    pub rolling: StatLine<f64>,
    pub allowed: StatLine<f64>,
}

impl PredictionInputs {
    /// Rolling then allowed values, in [`Stat::ALL`] order.
    pub fn feature_vector(&self) -> Vec<f64> {
        let mut out = self.rolling.to_vec();
        out.extend(self.allowed.to_vec());
        out
    }

    pub fn feature_names() -> Vec<String> {
        Stat::ALL
            .iter()
            .map(|s| s.rolling_column())
            .chain(Stat::ALL.iter().map(|s| s.allowed_column()))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unavailable {
    UnknownVenue(String),
    NoPlayerData(String),
    NoOpponentData {
        opponent_team: String,
        home_away: HomeAway,
    },
}

impl fmt::Display for Unavailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unavailable::UnknownVenue(raw) => {
                write!(f, "venue {raw:?} is neither home nor away")
            }
            Unavailable::NoPlayerData(player) => write!(f, "no recent stats found for {player}"),
            Unavailable::NoOpponentData {
                opponent_team,
                home_away,
            } => write!(
                f,
                "no defensive stats found for {opponent_team} ({})",
                match home_away {
                    HomeAway::Home => "home",
                    HomeAway::Away => "away",
                }
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PredictionLookup {
    Ready(PredictionInputs),
    Unavailable(Unavailable),
}

pub fn prediction_inputs(
    conn: &Connection,
    player: &PlayerKey,
    opponent_team: &str,
    venue: &str,
) -> Result<PredictionLookup> {
    let Some(home_away) = HomeAway::parse(venue) else {
        return Ok(PredictionLookup::Unavailable(Unavailable::UnknownVenue(
            venue.to_string(),
        )));
    };
    let opponent_team = opponent_team.trim().to_ascii_uppercase();

    let Some(latest) = feature_store::latest_for_player(conn, player)? else {
        let label = match player {
            PlayerKey::Id(id) => format!("player {id}"),
            PlayerKey::Name(name) => name.clone(),
        };
        return Ok(PredictionLookup::Unavailable(Unavailable::NoPlayerData(label)));
    };

    let no_opponent = || {
        PredictionLookup::Unavailable(Unavailable::NoOpponentData {
            opponent_team: opponent_team.clone(),
            home_away,
        })
    };
    let Some(opponent_row) = feature_store::latest_allowed_for(conn, &opponent_team, home_away)?
    else {
        return Ok(no_opponent());
    };

    let mut allowed = StatLine::<f64>::default();
    for stat in Stat::ALL {
        let Some(value) = opponent_row.allowed.get(stat) else {
            return Ok(no_opponent());
        };
        allowed.set(stat, value);
    }

    Ok(PredictionLookup::Ready(PredictionInputs {
        player_id: latest.raw.player_id,
        player_name: latest.raw.player_name,
        last_game_date: latest.raw.game_date,
        opponent_team,
        home_away,
        rolling: latest.rolling,
        allowed,
    }))
}
