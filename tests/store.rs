mod common;

use common::{date, game, with_shooting};
use hoops_features::feature_store::{self, PlayerKey};
use hoops_features::features::FeatureEngine;
use hoops_features::lookup::{PredictionInputs, PredictionLookup, Unavailable, prediction_inputs};
use hoops_features::raw_store;
use hoops_features::records::{HomeAway, RawGameRecord, Stat};
use hoops_features::store::{self, Table};

fn sample_games() -> Vec<RawGameRecord> {
    vec![
        game(1, "Anthony Davis", "0022400101", "2024-11-01", "LAL @ BOS", 10.0),
        game(1, "Anthony Davis", "0022400102", "2024-11-03", "LAL vs. NYK", 20.0),
        game(2, "Jalen Brunson", "0022400201", "2024-11-05", "NYK @ BOS", 30.0),
    ]
}

#[test]
fn raw_append_skips_stored_games() {
    let conn = store::open_in_memory().unwrap();
    assert!(raw_store::is_empty(&conn).unwrap());

    assert_eq!(raw_store::append_rows(&conn, &sample_games()).unwrap(), 3);
    assert_eq!(raw_store::append_rows(&conn, &sample_games()).unwrap(), 0);
    assert_eq!(store::count_rows(&conn, Table::GameLogs).unwrap(), 3);
    assert!(!raw_store::is_empty(&conn).unwrap());
}

#[test]
fn raw_rows_read_back_unchanged() {
    let conn = store::open_in_memory().unwrap();
    let mut games = sample_games();
    games[0].game_id = "0022400007".to_string();
    games[0].wl = None;
    raw_store::append_rows(&conn, &games).unwrap();

    let stored = raw_store::select_for_player(&conn, 1).unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0], games[0]);
    assert_eq!(stored[0].game_id, "0022400007");
}

#[test]
fn watermark_tracks_latest_game_date() {
    let conn = store::open_in_memory().unwrap();
    assert_eq!(raw_store::watermark(&conn).unwrap().latest(), None);

    raw_store::append_rows(&conn, &sample_games()).unwrap();
    assert_eq!(
        raw_store::watermark(&conn).unwrap().latest(),
        Some(date("2024-11-05"))
    );
}

#[test]
fn season_history_only_returns_requested_seasons() {
    let conn = store::open_in_memory().unwrap();
    let mut old = game(1, "Anthony Davis", "0022300001", "2024-03-01", "LAL vs. BOS", 5.0);
    old.season_id = "22023".to_string();
    raw_store::append_rows(&conn, &[old]).unwrap();
    raw_store::append_rows(&conn, &sample_games()).unwrap();

    let rows = raw_store::select_by_seasons(&conn, &["22024".to_string()]).unwrap();
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|r| r.season_id == "22024"));
    assert!(
        raw_store::select_by_seasons(&conn, &[])
            .unwrap()
            .is_empty()
    );
}

#[test]
fn feature_store_appends_duplicates() {
    let conn = store::open_in_memory().unwrap();
    let rows = FeatureEngine::default().engineer(&sample_games()).unwrap();

    assert_eq!(feature_store::append_rows(&conn, &rows).unwrap(), 3);
    assert_eq!(feature_store::append_rows(&conn, &rows).unwrap(), 3);
    assert_eq!(store::count_rows(&conn, Table::EngineeredStats).unwrap(), 6);
    assert_eq!(feature_store::select_for_player(&conn, 1).unwrap().len(), 4);
}

#[test]
fn latest_row_wins_by_date_then_write_order() {
    let conn = store::open_in_memory().unwrap();
    let wide = FeatureEngine::new(5).engineer(&sample_games()).unwrap();
    let narrow = FeatureEngine::new(1).engineer(&sample_games()).unwrap();
    feature_store::append_rows(&conn, &wide).unwrap();
    feature_store::append_rows(&conn, &narrow).unwrap();

    let latest = feature_store::latest_for_player(&conn, &PlayerKey::Id(1))
        .unwrap()
        .unwrap();
    assert_eq!(latest.raw.game_date, date("2024-11-03"));
    assert_eq!(latest.rolling.get(Stat::Pts), 20.0);

    let by_name =
        feature_store::latest_for_player(&conn, &PlayerKey::Name("Anthony Davis".to_string()))
            .unwrap()
            .unwrap();
    assert_eq!(by_name, latest);

    assert!(
        feature_store::latest_for_player(&conn, &PlayerKey::Id(99))
            .unwrap()
            .is_none()
    );
}

#[test]
fn stored_features_keep_missing_allowed_values() {
    let conn = store::open_in_memory().unwrap();
    let blank = with_shooting(
        game(3, "Luka Doncic", "0022400301", "2024-11-07", "DAL vs. PHX", 0.0),
        0.0,
        0.0,
    );
    let rows = FeatureEngine::default().engineer(&[blank]).unwrap();
    feature_store::append_rows(&conn, &rows).unwrap();

    let latest = feature_store::latest_allowed_for(&conn, "phx", HomeAway::Home)
        .unwrap()
        .unwrap();
    assert_eq!(latest.allowed.get(Stat::FgPct), None);
    assert_eq!(latest.allowed.get(Stat::Pts), Some(0.0));
    assert_eq!(latest, rows[0]);
}

#[test]
fn training_rows_skip_incomplete_features() {
    let conn = store::open_in_memory().unwrap();
    let mut games = sample_games();
    games.push(with_shooting(
        game(3, "Luka Doncic", "0022400301", "2024-11-07", "DAL vs. PHX", 0.0),
        0.0,
        0.0,
    ));
    let rows = FeatureEngine::default().engineer(&games).unwrap();
    feature_store::append_rows(&conn, &rows).unwrap();

    let training = feature_store::training_rows(&conn).unwrap();
    assert_eq!(training.len(), 3);
    for row in &training {
        assert_eq!(row.features.len(), 12);
        assert_eq!(row.targets.len(), 6);
    }
    assert_eq!(training[0].targets[0], 10.0);
}

#[test]
fn lookup_joins_player_form_with_opponent_defense() {
    let conn = store::open_in_memory().unwrap();
    let rows = FeatureEngine::default().engineer(&sample_games()).unwrap();
    feature_store::append_rows(&conn, &rows).unwrap();

    let lookup = prediction_inputs(&conn, &PlayerKey::Id(1), "bos", "away").unwrap();
    let PredictionLookup::Ready(inputs) = lookup else {
        panic!("expected features, got {lookup:?}");
    };
    assert_eq!(inputs.player_name, "Anthony Davis");
    assert_eq!(inputs.last_game_date, date("2024-11-03"));
    assert_eq!(inputs.opponent_team, "BOS");
    assert_eq!(inputs.home_away, HomeAway::Away);
    assert_eq!(inputs.rolling.get(Stat::Pts), 15.0);
    assert_eq!(inputs.allowed.get(Stat::Pts), 20.0);
    assert_eq!(inputs.allowed.get(Stat::FgPct), 0.5);
    assert_eq!(inputs.feature_vector().len(), 12);
    assert_eq!(PredictionInputs::feature_names()[0], "pts_rolling_avg");
}

#[test]
fn lookup_reports_what_is_missing() {
    let conn = store::open_in_memory().unwrap();
    let rows = FeatureEngine::default().engineer(&sample_games()).unwrap();
    feature_store::append_rows(&conn, &rows).unwrap();

    assert_eq!(
        prediction_inputs(&conn, &PlayerKey::Id(1), "BOS", "neutral").unwrap(),
        PredictionLookup::Unavailable(Unavailable::UnknownVenue("neutral".to_string()))
    );
    assert!(matches!(
        prediction_inputs(&conn, &PlayerKey::Id(42), "BOS", "home").unwrap(),
        PredictionLookup::Unavailable(Unavailable::NoPlayerData(_))
    ));
    // BOS has only been faced on the road.
    assert_eq!(
        prediction_inputs(&conn, &PlayerKey::Id(1), "BOS", "home").unwrap(),
        PredictionLookup::Unavailable(Unavailable::NoOpponentData {
            opponent_team: "BOS".to_string(),
            home_away: HomeAway::Home,
        })
    );
}
