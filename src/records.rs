use chrono::NaiveDate;
use serde::Serialize;

use crate::error::PipelineError;

/// One player's box score for one game, as delivered by the stats provider.
#[derive(Debug, Clone, PartialEq)]
pub struct RawGameRecord {
    pub season_id: String,
    pub player_id: u32,
    pub player_name: String,
    pub game_id: String,
    pub game_date: NaiveDate,
    pub matchup: String,
    pub wl: Option<String>,
    pub min: f64,
    pub fgm: f64,
    pub fga: f64,
    pub fg_pct: f64,
    pub fg3m: f64,
    pub fg3a: f64,
    pub fg3_pct: f64,
    pub ftm: f64,
    pub fta: f64,
    pub ft_pct: f64,
    pub oreb: f64,
    pub dreb: f64,
    pub reb: f64,
    pub ast: f64,
    pub stl: f64,
    pub blk: f64,
    pub tov: f64,
    pub pf: f64,
    pub pts: f64,
    pub plus_minus: f64,
    pub video_available: bool,
}

impl RawGameRecord {
    pub fn identity(&self) -> (u32, &str) {
        (self.player_id, self.game_id.as_str())
    }

    pub fn stat(&self, stat: Stat) -> f64 {
        match stat {
            Stat::Pts => self.pts,
            Stat::Ast => self.ast,
            Stat::Reb => self.reb,
            Stat::FgPct => self.fg_pct,
            Stat::Stl => self.stl,
            Stat::Blk => self.blk,
        }
    }
}

/// Stats the feature columns are derived from, in model column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stat {
    Pts,
    Ast,
    Reb,
    FgPct,
    Stl,
    Blk,
}

impl Stat {
    pub const ALL: [Stat; 6] = [
        Stat::Pts,
        Stat::Ast,
        Stat::Reb,
        Stat::FgPct,
        Stat::Stl,
        Stat::Blk,
    ];

    /// Stats whose allowed value is a plain per-game mean. FG% is a ratio of sums instead.
    pub const MEAN_ALLOWED: [Stat; 5] = [Stat::Pts, Stat::Ast, Stat::Reb, Stat::Stl, Stat::Blk];

    pub fn column(self) -> &'static str {
        match self {
            Stat::Pts => "pts",
            Stat::Ast => "ast",
            Stat::Reb => "reb",
            Stat::FgPct => "fg_pct",
            Stat::Stl => "stl",
            Stat::Blk => "blk",
        }
    }

    pub fn rolling_column(self) -> String {
        format!("{}_rolling_avg", self.column())
    }

    pub fn allowed_column(self) -> String {
        format!("{}_allowed", self.column())
    }
}

/// One value per [`Stat`].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct StatLine<T> {
    pub pts: T,
    pub ast: T,
    pub reb: T,
    pub fg_pct: T,
    pub stl: T,
    pub blk: T,
}

impl<T: Copy> StatLine<T> {
    pub fn get(&self, stat: Stat) -> T {
        match stat {
            Stat::Pts => self.pts,
            Stat::Ast => self.ast,
            Stat::Reb => self.reb,
            Stat::FgPct => self.fg_pct,
            Stat::Stl => self.stl,
            Stat::Blk => self.blk,
        }
    }

    pub fn set(&mut self, stat: Stat, value: T) {
        match stat {
            Stat::Pts => self.pts = value,
            Stat::Ast => self.ast = value,
            Stat::Reb => self.reb = value,
            Stat::FgPct => self.fg_pct = value,
            Stat::Stl => self.stl = value,
            Stat::Blk => self.blk = value,
        }
    }

    pub fn to_vec(&self) -> Vec<T> {
        Stat::ALL.iter().map(|s| self.get(*s)).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HomeAway {
    Home,
    Away,
}

impl HomeAway {
    pub fn code(self) -> &'static str {
        match self {
            HomeAway::Home => "0",
            HomeAway::Away => "1",
        }
    }

    /// Accepts the stored codes as well as the words a caller types.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "0" | "home" | "h" => Some(HomeAway::Home),
            "1" | "away" | "a" => Some(HomeAway::Away),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineeredRecord {
    pub raw: RawGameRecord,
    pub home_away: HomeAway,
    pub opponent_team: String,
    pub rolling: StatLine<f64>,
    pub allowed: StatLine<Option<f64>>,
}

/// Latest game date already ingested. `None` on a cold store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Watermark(pub Option<NaiveDate>);

impl Watermark {
    pub fn latest(&self) -> Option<NaiveDate> {
        self.0
    }

    /// First date an incremental fetch has to ask the provider for.
    pub fn fetch_from(&self, season_start: NaiveDate) -> NaiveDate {
        self.0.unwrap_or(season_start)
    }

    /// Whether a game on `date` is new relative to this watermark.
    pub fn admits(&self, date: NaiveDate, season_start: NaiveDate) -> bool {
        match self.0 {
            Some(latest) => date > latest,
            None => date >= season_start,
        }
    }
}

/// Game dates arrive as "NOV 30, 2024" from the game log endpoint, as ISO timestamps from some
/// league endpoints, and as ISO dates from the stores.
pub fn parse_game_date(raw: &str) -> Result<NaiveDate, PipelineError> {
    let trimmed = raw.trim();
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(trimmed, "%b %d, %Y"))
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S").map(|dt| dt.date())
        })
        .map_err(|_| PipelineError::malformed(format!("unparsable game date {trimmed:?}")))
}

pub fn format_game_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn game_dates_parse_in_both_formats() {
        let want = NaiveDate::from_ymd_opt(2024, 11, 30).unwrap();
        assert_eq!(parse_game_date("NOV 30, 2024").unwrap(), want);
        assert_eq!(parse_game_date("Nov 30, 2024").unwrap(), want);
        assert_eq!(parse_game_date("2024-11-30").unwrap(), want);
        assert!(matches!(
            parse_game_date("30/11/2024"),
            Err(PipelineError::MalformedRecord(_))
        ));
    }

    #[test]
    fn watermark_is_strict() {
        let start = NaiveDate::from_ymd_opt(2024, 10, 1).unwrap();
        let mark = Watermark(NaiveDate::from_ymd_opt(2024, 12, 1));
        assert!(!mark.admits(NaiveDate::from_ymd_opt(2024, 11, 30).unwrap(), start));
        assert!(!mark.admits(NaiveDate::from_ymd_opt(2024, 12, 1).unwrap(), start));
        assert!(mark.admits(NaiveDate::from_ymd_opt(2024, 12, 2).unwrap(), start));
        assert_eq!(Watermark(None).fetch_from(start), start);
    }

    #[test]
    fn home_away_parse() {
        assert_eq!(HomeAway::parse("Away"), Some(HomeAway::Away));
        assert_eq!(HomeAway::parse("0"), Some(HomeAway::Home));
        assert_eq!(HomeAway::parse("neutral"), None);
        assert_eq!(HomeAway::Away.code(), "1");
    }
}
