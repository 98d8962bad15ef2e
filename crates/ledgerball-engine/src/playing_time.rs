// Playing-time targets and rescaling of regressed rates to counting stats.

use ledgerball_core::strategy::PlayingTimeRule;
use ledgerball_core::{Category, StatFamily, StatLine};

use crate::aggregate::PlayerAggregate;
use crate::rate::safe_div;

/// Pool-wide usage maxima needed by usage-scaled targets.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct UsagePool {
    /// Highest top-level regular-season decayed appearances in the pool.
    pub max_usage: f64,
    /// Same, over pure relievers (start fraction zero) only.
    pub max_reliever_usage: f64,
}

impl UsagePool {
    /// `players` pairs each projected player with their start fraction.
    pub fn from_players<'a>(players: impl IntoIterator<Item = (&'a PlayerAggregate, f64)>) -> Self {
        let mut pool = UsagePool::default();
        for (p, start_fraction) in players {
            pool.max_usage = pool.max_usage.max(p.usage);
            if start_fraction == 0.0 {
                pool.max_reliever_usage = pool.max_reliever_usage.max(p.usage);
            }
        }
        pool
    }
}

/// Appearance volume a player is projected to.
pub fn target_appearances(
    family: StatFamily,
    rule: &PlayingTimeRule,
    usage: f64,
    start_fraction: f64,
    pool: &UsagePool,
) -> f64 {
    let sf = start_fraction;
    match (*rule, family) {
        (PlayingTimeRule::Fixed { batting, .. }, StatFamily::Batting) => batting,
        (
            PlayingTimeRule::Fixed {
                starter, reliever, ..
            },
            StatFamily::Pitching,
        ) => reliever + sf * (starter - reliever),
        (
            PlayingTimeRule::UsageScaled {
                batting_top,
                batting_floor,
                ..
            },
            StatFamily::Batting,
        ) => batting_floor + usage * safe_div(batting_top - batting_floor, pool.max_usage),
        (
            PlayingTimeRule::UsageScaled {
                starter_top,
                starter_floor,
                reliever_top,
                reliever_floor,
                ..
            },
            StatFamily::Pitching,
        ) => {
            let as_starter =
                starter_floor + usage * safe_div(starter_top - starter_floor, pool.max_usage);
            let as_reliever = reliever_floor
                + usage * safe_div(reliever_top - reliever_floor, pool.max_reliever_usage);
            sf * as_starter + (1.0 - sf) * as_reliever
        }
    }
}

/// Each base stat's rate times `target`; the appearance column is `target`.
pub fn rescale(
    player: &PlayerAggregate,
    base_stats: &[Category],
    appearances: Category,
    target: f64,
) -> StatLine {
    let mut out = StatLine::new();
    for &cat in base_stats {
        out[cat] = safe_div(player.values[cat], player.denoms[cat]) * target;
    }
    out[appearances] = target;
    out
}
