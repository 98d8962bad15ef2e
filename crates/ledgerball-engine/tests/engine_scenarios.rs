// End-to-end projection scenarios.
//
// These tests drive the engine through its public API with synthetic game
// histories: a batter with a full top-level season against one with mostly
// minor-league history, pitchers across the starter/reliever spectrum, and
// the publish-then-read path through the snapshot store.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use ledgerball_core::config::{load_config_from, Config};
use ledgerball_core::store::MemoryStore;
use ledgerball_core::{
    Category, GameStatLine, GameType, NameRegistry, SnapshotStore, StatFamily, StatLine, Strategy,
};
use ledgerball_engine::{project_lines, project_players, ProjectedLine, Projector, RunParams};

// ===========================================================================
// Test helpers
// ===========================================================================

const TOP: u32 = 1;
const DOUBLE_A: u32 = 12;

/// Shipped defaults, loaded through a scratch dir unique to each test.
fn defaults(test: &str) -> Config {
    let root = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../..");
    let tmp = std::env::temp_dir().join(format!("ledgerball_scenario_{test}"));
    let _ = std::fs::remove_dir_all(&tmp);
    std::fs::create_dir_all(tmp.join("config")).unwrap();
    for file in ["engine.toml", "batting.toml", "pitching.toml"] {
        std::fs::copy(root.join("defaults").join(file), tmp.join("config").join(file)).unwrap();
    }
    load_config_from(&tmp).unwrap()
}

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn line(player_id: u32, on: NaiveDate, level: u32, stats: StatLine) -> GameStatLine {
    GameStatLine {
        player_id,
        game_date: on,
        level,
        game_type: GameType::Regular,
        stats,
    }
}

/// Per-PA rates for a batter profile.
struct Profile {
    hr: f64,
    single: f64,
    double: f64,
    so: f64,
    uibb: f64,
}

const SLUGGER: Profile = Profile {
    hr: 0.06,
    single: 0.14,
    double: 0.05,
    so: 0.25,
    uibb: 0.10,
};

const AVERAGE: Profile = Profile {
    hr: 0.03,
    single: 0.15,
    double: 0.045,
    so: 0.22,
    uibb: 0.075,
};

/// `games` consecutive days of four plate appearances at `profile` rates.
fn batter_run(
    player_id: u32,
    from: NaiveDate,
    games: i64,
    level: u32,
    profile: &Profile,
) -> Vec<GameStatLine> {
    (0..games)
        .map(|d| {
            let pa = 4.0;
            let mut s = StatLine::new();
            s[Category::PA] = pa;
            s[Category::HR] = profile.hr * pa;
            s[Category::Single] = profile.single * pa;
            s[Category::Double] = profile.double * pa;
            s[Category::Triple] = 0.005 * pa;
            s[Category::SO] = profile.so * pa;
            s[Category::UIBB] = profile.uibb * pa;
            s[Category::IBB] = 0.005 * pa;
            s[Category::HBP] = 0.01 * pa;
            s[Category::SF] = 0.008 * pa;
            s[Category::R] = 0.12 * pa;
            s[Category::RBI] = 0.12 * pa;
            s[Category::SB] = 0.02 * pa;
            s[Category::CS] = 0.005 * pa;
            s[Category::GIDP] = 0.02 * pa;
            s[Category::H] = s[Category::HR]
                + s[Category::Single]
                + s[Category::Double]
                + s[Category::Triple];
            s[Category::BB] = s[Category::UIBB] + s[Category::IBB];
            s[Category::AB] = pa - s[Category::BB] - s[Category::HBP] - s[Category::SF];
            line(player_id, from + Duration::days(d), level, s)
        })
        .collect()
}

fn start(player_id: u32, on: NaiveDate) -> GameStatLine {
    let mut s = StatLine::new();
    s[Category::BFP] = 25.0;
    s[Category::G] = 1.0;
    s[Category::GS] = 1.0;
    s[Category::IP] = 6.0;
    s[Category::H] = 6.0;
    s[Category::ER] = 2.5;
    s[Category::R] = 2.8;
    s[Category::HR] = 0.8;
    s[Category::SO] = 6.0;
    s[Category::UIBB] = 1.8;
    s[Category::IBB] = 0.1;
    s[Category::HBP] = 0.3;
    s[Category::W] = 0.4;
    s[Category::L] = 0.3;
    s[Category::QS] = 0.5;
    line(player_id, on, TOP, s)
}

fn relief(player_id: u32, on: NaiveDate) -> GameStatLine {
    let mut s = StatLine::new();
    s[Category::BFP] = 4.0;
    s[Category::G] = 1.0;
    s[Category::IP] = 1.0;
    s[Category::H] = 0.9;
    s[Category::ER] = 0.4;
    s[Category::R] = 0.45;
    s[Category::HR] = 0.1;
    s[Category::SO] = 1.2;
    s[Category::UIBB] = 0.35;
    s[Category::HBP] = 0.05;
    s[Category::SV] = 0.2;
    s[Category::HLD] = 0.2;
    line(player_id, on, TOP, s)
}

/// Thirty starts, five days apart.
fn rotation(player_id: u32) -> Vec<GameStatLine> {
    (0..30)
        .map(|i| start(player_id, date("2023-04-01") + Duration::days(5 * i)))
        .collect()
}

/// Sixty relief outings, two days apart.
fn bullpen(player_id: u32) -> Vec<GameStatLine> {
    (0..60)
        .map(|i| relief(player_id, date("2023-04-01") + Duration::days(2 * i)))
        .collect()
}

/// A start and a relief outing on each of fifteen dates.
fn swingman(player_id: u32) -> Vec<GameStatLine> {
    (0..15)
        .flat_map(|i| {
            let on = date("2023-04-01") + Duration::days(10 * i);
            [start(player_id, on), relief(player_id, on)]
        })
        .collect()
}

fn projected(players: &[ProjectedLine], player_id: u32) -> &ProjectedLine {
    players
        .iter()
        .find(|p| p.player_id == player_id)
        .unwrap_or_else(|| panic!("player {player_id} was not projected"))
}

fn assert_finite(players: &[ProjectedLine]) {
    for p in players {
        for (cat, v) in p.stats.iter() {
            assert!(v.is_finite(), "player {} {cat} = {v}", p.player_id);
        }
    }
}

// ===========================================================================
// Batting
// ===========================================================================

const X: u32 = 1;
const Y: u32 = 2;
const AS_OF: &str = "2023-10-01";

/// X: 600 top-level PA this season. Y: ~50 recent top-level PA plus 400
/// double-A PA from the spring. Eight league-average regulars fill out the
/// baseline pool.
fn batting_history() -> Vec<GameStatLine> {
    let mut lines = batter_run(X, date("2023-04-01"), 150, TOP, &SLUGGER);
    lines.extend(batter_run(Y, date("2023-09-10"), 13, TOP, &SLUGGER));
    lines.extend(batter_run(Y, date("2023-04-01"), 100, DOUBLE_A, &SLUGGER));
    for id in 100..108 {
        lines.extend(batter_run(id, date("2023-04-01"), 125, TOP, &AVERAGE));
    }
    lines
}

#[test]
fn thin_top_level_sample_regresses_harder() {
    let mut config = defaults("thin_sample");
    config.strategy = Strategy::role_split();
    let params = RunParams::from_config(&config, StatFamily::Batting);

    let players = project_players(batting_history(), date(AS_OF), &params).unwrap();
    assert_finite(&players);

    let x = projected(&players, X);
    let y = projected(&players, Y);
    assert_eq!(x.target, 650.0);
    assert_eq!(y.target, 650.0);
    assert_eq!(x.stats[Category::PA], 650.0);
    assert_eq!(y.stats[Category::PA], 650.0);

    // Y is below the eligibility cutoff, so the pool is X plus the regulars.
    let baseline = (600.0 * SLUGGER.hr + 8.0 * 500.0 * AVERAGE.hr) / (600.0 + 8.0 * 500.0);

    let x_rate = x.stats[Category::HR] / 650.0;
    let y_rate = y.stats[Category::HR] / 650.0;
    let x_shift = (SLUGGER.hr - x_rate).abs();
    let y_shift = (SLUGGER.hr - y_rate).abs();

    assert!(x_shift < 0.01, "x moved {x_shift}");
    assert!(y_shift > x_shift, "y moved {y_shift}, x moved {x_shift}");
    assert!(y_rate > baseline && y_rate < SLUGGER.hr);
    assert!((y_rate - baseline).abs() < (SLUGGER.hr - baseline).abs());
    assert!(x_rate > y_rate, "fixed targets preserve rate order");
}

#[test]
fn batting_lines_are_internally_consistent() {
    let mut config = defaults("batting_identities");
    config.strategy = Strategy::role_split();
    let params = RunParams::from_config(&config, StatFamily::Batting);

    let players = project_players(batting_history(), date(AS_OF), &params).unwrap();
    for p in &players {
        let s = &p.stats;
        let bb = s[Category::IBB] + s[Category::UIBB];
        let h = s[Category::HR] + s[Category::Triple] + s[Category::Double] + s[Category::Single];
        let ab = s[Category::PA] - bb - s[Category::HBP] - s[Category::SF];
        assert!((s[Category::BB] - bb).abs() < 1e-9);
        assert!((s[Category::H] - h).abs() < 1e-9);
        assert!((s[Category::AB] - ab).abs() < 1e-9);
    }

    // Published integers keep the identities exactly.
    let snapshot =
        project_lines(batting_history(), date(AS_OF), &params, &NameRegistry::empty()).unwrap();
    for r in &snapshot.records {
        let get = |c| r.get(c).unwrap();
        let ab = get(Category::PA) - get(Category::BB) - get(Category::HBP) - get(Category::SF);
        let xbh = get(Category::HR) + get(Category::Triple) + get(Category::Double);
        assert_eq!(get(Category::AB), ab, "player {}", r.player_id);
        assert!(get(Category::H) >= xbh, "player {}", r.player_id);
    }

    // Usage-scaled targets are fractional; rounding still keeps AB exact.
    let usage = defaults("batting_identities_usage");
    let params = RunParams::from_config(&usage, StatFamily::Batting);
    let snapshot =
        project_lines(batting_history(), date(AS_OF), &params, &NameRegistry::empty()).unwrap();
    for r in &snapshot.records {
        let get = |c| r.get(c).unwrap();
        let ab = get(Category::PA) - get(Category::BB) - get(Category::HBP) - get(Category::SF);
        assert_eq!(get(Category::AB), ab, "player {}", r.player_id);
    }
}

#[test]
fn pooled_strategy_runs_on_split_walk_settings() {
    let mut config = defaults("pooled_split_walks");
    config.strategy = Strategy::pooled();
    let params = RunParams::from_config(&config, StatFamily::Batting);

    let players = project_players(batting_history(), date(AS_OF), &params).unwrap();
    assert!(!players.is_empty());
    for p in &players {
        let s = &p.stats;
        assert!((s[Category::BB] - (s[Category::IBB] + s[Category::UIBB])).abs() < 1e-9);
        assert!(s[Category::BB] > 0.0, "player {}", p.player_id);
        assert!((p.target - 650.0).abs() < 1e-9);
    }
}

#[test]
fn usage_scaled_batters_track_recent_playing_time() {
    let config = defaults("usage_batting");
    let params = RunParams::from_config(&config, StatFamily::Batting);

    let players = project_players(batting_history(), date(AS_OF), &params).unwrap();
    let x = projected(&players, X);
    let y = projected(&players, Y);
    let regular = projected(&players, 100);

    // X carries the most top-level usage in the pool.
    assert!((x.target - 725.0).abs() < 1e-6, "{}", x.target);
    assert!(regular.target < x.target && regular.target > 400.0);
    assert!(y.target < regular.target && y.target >= 400.0);
}

#[test]
fn spring_training_only_player_stays_finite() {
    let mut config = defaults("spring_only");
    config.strategy = Strategy::role_split();
    config.engine.exhibition_dampening = 0.0;
    config.batting.regression_mass.remove(&Category::SB);
    let params = RunParams::from_config(&config, StatFamily::Batting);

    let mut lines = batting_history();
    let mut spring = batter_run(50, date("2023-04-01"), 100, TOP, &AVERAGE);
    for l in &mut spring {
        l.game_type = GameType::SpringTraining;
    }
    lines.extend(spring);

    let players = project_players(lines, date(AS_OF), &params).unwrap();
    assert_finite(&players);
    let spring_only = projected(&players, 50);
    // Fully dampened history and no regression mass: nothing to divide by.
    assert_eq!(spring_only.stats[Category::SB], 0.0);
    // Regressed categories fall back to the league rate.
    assert!(spring_only.stats[Category::HR] > 0.0);
}

// ===========================================================================
// Pitching
// ===========================================================================

const ACE: u32 = 10;
const CLOSER: u32 = 20;
const SWING: u32 = 30;

fn pitching_history() -> Vec<GameStatLine> {
    let mut lines = rotation(ACE);
    lines.extend(bullpen(CLOSER));
    lines.extend(swingman(SWING));
    for id in 200..203 {
        lines.extend(rotation(id));
    }
    for id in 300..303 {
        lines.extend(bullpen(id));
    }
    lines
}

#[test]
fn fixed_targets_follow_start_fraction() {
    let mut config = defaults("fixed_pitching");
    config.strategy = Strategy::role_split();
    let params = RunParams::from_config(&config, StatFamily::Pitching);

    let players = project_players(pitching_history(), date(AS_OF), &params).unwrap();
    assert_finite(&players);

    let ace = projected(&players, ACE);
    let closer = projected(&players, CLOSER);
    let swing = projected(&players, SWING);
    assert_eq!(ace.start_fraction, 1.0);
    assert_eq!(closer.start_fraction, 0.0);
    assert!((swing.start_fraction - 0.5).abs() < 1e-9);

    assert!((ace.target - 800.0).abs() < 1e-9);
    assert!((closer.target - 250.0).abs() < 1e-9);
    assert!((swing.target - 525.0).abs() < 1e-6);
    assert_eq!(swing.stats[Category::BFP], swing.target);
}

#[test]
fn usage_scaled_targets_reach_role_ceilings() {
    let config = defaults("usage_pitching");
    let params = RunParams::from_config(&config, StatFamily::Pitching);

    let players = project_players(pitching_history(), date(AS_OF), &params).unwrap();
    let ace = projected(&players, ACE);
    let closer = projected(&players, CLOSER);
    let swing = projected(&players, SWING);

    assert!((ace.target - 850.0).abs() < 1e-6, "{}", ace.target);
    assert!((closer.target - 330.0).abs() < 1e-6, "{}", closer.target);
    // Weighted starts count the swingman mostly as a starter.
    assert!(swing.start_fraction > 0.5 && swing.start_fraction < 1.0);
    assert!(swing.target > 330.0 && swing.target < 850.0);
}

#[test]
fn pitching_lines_are_internally_consistent() {
    let config = defaults("pitching_identities");
    let params = RunParams::from_config(&config, StatFamily::Pitching);

    let players = project_players(pitching_history(), date(AS_OF), &params).unwrap();
    assert_finite(&players);
    for p in &players {
        let s = &p.stats;
        let bb = s[Category::IBB] + s[Category::UIBB];
        let ip = (s[Category::BFP] - s[Category::H] - bb - s[Category::HBP]) / 3.0;
        assert!((s[Category::BB] - bb).abs() < 1e-9);
        assert!((s[Category::IP] - ip).abs() < 1e-9);
        assert!(s[Category::IP] > 0.0);
        assert!(s[Category::ER] > 0.0 && s[Category::R] >= s[Category::ER]);
    }
}

#[test]
fn relievers_need_their_own_pool() {
    let config = defaults("no_relievers");
    let params = RunParams::from_config(&config, StatFamily::Pitching);
    let mut lines = rotation(ACE);
    lines.extend(rotation(200));

    let err = project_players(lines, date(AS_OF), &params).unwrap_err();
    assert!(err.to_string().contains("relievers"), "{err}");
}

// ===========================================================================
// Publishing
// ===========================================================================

#[test]
fn published_snapshots_round_trip_and_build_history() {
    let config = defaults("publish");
    let dir = std::env::temp_dir().join("ledgerball_scenario_publish_out");
    let _ = std::fs::remove_dir_all(&dir);

    let names = NameRegistry::from_reader(
        "key_mlbam,name_last,name_first\n1,Slugger,Xavier\n2,Prospect,Yusuf\n".as_bytes(),
    )
    .unwrap();
    let projector = Projector::new(
        config,
        Arc::new(MemoryStore::new(batting_history(), pitching_history())),
        names,
        SnapshotStore::new(&dir),
    );

    let mut written = Vec::new();
    for day in ["2023-08-01", "2023-08-20", "2023-09-05", "2023-10-01"] {
        for run in projector.project_all(date(day)).unwrap() {
            written.push(run);
        }
    }
    assert_eq!(written.len(), 8);

    for run in &written {
        let loaded = projector
            .snapshots()
            .load(run.snapshot.date, run.snapshot.family)
            .unwrap();
        assert_eq!(loaded, run.snapshot);
        for r in &loaded.records {
            assert!(r.stats.iter().all(|&(_, v)| v >= 0), "player {}", r.player_id);
        }
    }

    let latest = projector
        .snapshots()
        .load(date(AS_OF), StatFamily::Batting)
        .unwrap();
    let x = latest.record(X).unwrap();
    assert_eq!(x.name.last, "Slugger");
    assert_eq!(x.get(Category::PA), Some(725));

    let history = projector
        .snapshots()
        .player_history(X, StatFamily::Batting, date(AS_OF))
        .unwrap();
    let dates: Vec<NaiveDate> = history.iter().map(|h| h.date).collect();
    assert_eq!(
        dates,
        vec![date("2023-10-01"), date("2023-09-05"), date("2023-08-01")]
    );

    let _ = std::fs::remove_dir_all(&dir);
}
