use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use chrono::{Duration, NaiveDate};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use hoops_features::features::FeatureEngine;
use hoops_features::provider::parse_game_log_json;
use hoops_features::raw_store;
use hoops_features::records::RawGameRecord;
use hoops_features::store;

const TEAMS: [&str; 10] = [
    "ATL", "BOS", "CHI", "DAL", "DEN", "LAL", "MIA", "NYK", "PHX", "UTA",
];

const GAME_LOG_JSON: &str = include_str!("../tests/fixtures/playergamelog.json");

fn synthetic_season(players: u32, games: u32) -> Vec<RawGameRecord> {
    let mut rng = StdRng::seed_from_u64(7);
    let opening = NaiveDate::from_ymd_opt(2024, 10, 22).unwrap_or_default();
    let mut out = Vec::with_capacity((players * games) as usize);
    for player_id in 1..=players {
        let team = TEAMS[player_id as usize % TEAMS.len()];
        for game in 0..games {
            let opponent = TEAMS[rng.gen_range(0..TEAMS.len())];
            let marker = if rng.gen_bool(0.5) { "@" } else { "vs." };
            let fga: f64 = rng.gen_range(4..25) as f64;
            let fgm = (fga * rng.gen_range(0.3..0.6)).round();
            out.push(RawGameRecord {
                season_id: "22024".to_string(),
                player_id,
                player_name: format!("Player {player_id}"),
                game_id: format!("00224{:05}", player_id * 100 + game),
                game_date: opening + Duration::days(i64::from(game) * 2),
                matchup: format!("{team} {marker} {opponent}"),
                wl: Some(if rng.gen_bool(0.5) { "W" } else { "L" }.to_string()),
                min: rng.gen_range(10.0..40.0),
                fgm,
                fga,
                fg_pct: fgm / fga,
                fg3m: 0.0,
                fg3a: 0.0,
                fg3_pct: 0.0,
                ftm: 0.0,
                fta: 0.0,
                ft_pct: 0.0,
                oreb: 0.0,
                dreb: 0.0,
                reb: rng.gen_range(0..15) as f64,
                ast: rng.gen_range(0..12) as f64,
                stl: rng.gen_range(0..4) as f64,
                blk: rng.gen_range(0..4) as f64,
                tov: 0.0,
                pf: 0.0,
                pts: rng.gen_range(0..45) as f64,
                plus_minus: 0.0,
                video_available: true,
            });
        }
    }
    out
}

fn bench_engineer_season(c: &mut Criterion) {
    let season = synthetic_season(450, 60);
    let engine = FeatureEngine::default();
    c.bench_function("engineer_season", |b| {
        b.iter(|| {
            let rows = engine.engineer(black_box(&season)).unwrap();
            black_box(rows.len());
        })
    });
}

fn bench_engineer_incremental(c: &mut Criterion) {
    let season = synthetic_season(450, 60);
    let (history, batch): (Vec<_>, Vec<_>) = season
        .into_iter()
        .partition(|r| r.game_date < NaiveDate::from_ymd_opt(2025, 1, 15).unwrap_or_default());
    let engine = FeatureEngine::default();
    c.bench_function("engineer_incremental", |b| {
        b.iter(|| {
            let rows = engine
                .engineer_with_history(black_box(&history), black_box(&batch))
                .unwrap();
            black_box(rows.len());
        })
    });
}

fn bench_game_log_parse(c: &mut Criterion) {
    c.bench_function("game_log_parse", |b| {
        b.iter(|| {
            let rows = parse_game_log_json(black_box(GAME_LOG_JSON), 2544).unwrap();
            black_box(rows.len());
        })
    });
}

fn bench_raw_append(c: &mut Criterion) {
    let season = synthetic_season(100, 20);
    c.bench_function("raw_append", |b| {
        b.iter_batched(
            || store::open_in_memory().unwrap(),
            |mut conn| {
                let tx = conn.transaction().unwrap();
                let inserted = raw_store::append_rows(&tx, black_box(&season)).unwrap();
                tx.commit().unwrap();
                black_box(inserted);
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(
    benches,
    bench_engineer_season,
    bench_engineer_incremental,
    bench_game_log_parse,
    bench_raw_append
);
criterion_main!(benches);
