use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveDate;

const CACHE_DIR: &str = "hoops_features";
const DB_FILE: &str = "nba_stats.sqlite";

pub const DEFAULT_SEASON: &str = "2024-25";
pub const DEFAULT_ROLLING_WINDOW: usize = 5;

/// Everything the pipeline components need, resolved once at startup and passed in at
/// construction.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub db_path: PathBuf,
    pub season: String,
    pub season_start: NaiveDate,
    pub rolling_window: usize,
    pub provider_min_interval: Duration,
    pub provider_burst: u32,
    pub fetch_parallelism: usize,
    pub cycle_interval: Duration,
    pub idle_interval: Duration,
    pub http_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path().unwrap_or_else(|| PathBuf::from(DB_FILE)),
            season: DEFAULT_SEASON.to_string(),
            season_start: default_season_start(),
            rolling_window: DEFAULT_ROLLING_WINDOW,
            provider_min_interval: Duration::from_millis(600),
            provider_burst: 1,
            fetch_parallelism: 4,
            cycle_interval: Duration::from_secs(12 * 60 * 60),
            idle_interval: Duration::from_secs(24 * 60 * 60),
            http_timeout: Duration::from_secs(30),
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup. Missing or unparsable values keep their
    /// defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let db_path = get("NBA_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.db_path);
        let season = get("NBA_SEASON").unwrap_or(defaults.season);
        let season_start = get("NBA_SEASON_START")
            .and_then(|v| NaiveDate::parse_from_str(&v, "%Y-%m-%d").ok())
            .unwrap_or(defaults.season_start);
        let rolling_window = get("ROLLING_WINDOW")
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults.rolling_window)
            .clamp(1, 82);
        let provider_min_interval = get("PROVIDER_MIN_INTERVAL_MS")
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.provider_min_interval);
        let provider_burst = get("PROVIDER_BURST")
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(defaults.provider_burst)
            .max(1);
        let fetch_parallelism = get("FETCH_PARALLELISM")
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults.fetch_parallelism)
            .clamp(1, 16);
        let cycle_interval = get("CYCLE_INTERVAL_SECS")
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.cycle_interval);
        let idle_interval = get("IDLE_INTERVAL_SECS")
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.idle_interval);
        let http_timeout = get("HTTP_TIMEOUT_SECS")
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.http_timeout);

        Self {
            db_path,
            season,
            season_start,
            rolling_window,
            provider_min_interval,
            provider_burst,
            fetch_parallelism,
            cycle_interval,
            idle_interval,
            http_timeout,
        }
    }
}

pub fn default_season_start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 10, 1).unwrap_or_default()
}

pub fn default_db_path() -> Option<PathBuf> {
    // Prefer XDG cache.
    if let Ok(base) = std::env::var("XDG_CACHE_HOME") {
        if !base.trim().is_empty() {
            return Some(PathBuf::from(base).join(CACHE_DIR).join(DB_FILE));
        }
    }
    let home = std::env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(PathBuf::from(home).join(".cache").join(CACHE_DIR).join(DB_FILE))
}
