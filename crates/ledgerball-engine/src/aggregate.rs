// Per-player aggregation, the playing-time cull, and the eligibility-filtered
// league baseline.

use std::collections::BTreeMap;
use std::fmt;

use ledgerball_core::strategy::StartFractionRule;
use ledgerball_core::{Category, GameStatLine, GameType, PlayerId, StatFamily, StatLine};
use tracing::{debug, info};

use crate::normalize::NormalizedLine;
use crate::rate::safe_div;
use crate::{EngineError, RunParams};

// ---------------------------------------------------------------------------
// Player aggregates
// ---------------------------------------------------------------------------

/// Sum of a player's normalized lines. Each category's value and weight
/// mass travel together and are only ever divided as a pair.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerAggregate {
    pub player_id: PlayerId,
    pub values: StatLine,
    pub denoms: StatLine,
    pub appearances: f64,
    pub usage: f64,
}

impl PlayerAggregate {
    fn empty(player_id: PlayerId) -> Self {
        PlayerAggregate {
            player_id,
            values: StatLine::new(),
            denoms: StatLine::new(),
            appearances: 0.0,
            usage: 0.0,
        }
    }

    fn add(&mut self, line: &NormalizedLine) {
        self.values += &line.values;
        self.denoms += &line.denoms;
        self.appearances += line.appearances;
        self.usage += line.usage;
    }

    /// Weighted value over weighted mass for one category.
    pub fn rate(&self, cat: Category) -> f64 {
        safe_div(self.values[cat], self.denoms[cat])
    }

    /// Share of a pitcher's appearances that were starts, from the weighted
    /// games and games-started totals. Clamped to [0, 1].
    pub fn start_fraction(&self, rule: StartFractionRule) -> f64 {
        let games = self.values[Category::G];
        let starts = self.values[Category::GS];
        let fraction = match rule {
            StartFractionRule::GamesRatio => safe_div(starts, games),
            StartFractionRule::WeightedStarts { start_weight } => {
                let weighted = starts * start_weight;
                safe_div(weighted, weighted + games - starts)
            }
        };
        fraction.clamp(0.0, 1.0)
    }
}

/// Group normalized lines by player, ascending by id. Within a player, lines
/// are summed in input order.
pub fn aggregate(lines: &[NormalizedLine]) -> Vec<PlayerAggregate> {
    let mut by_player: BTreeMap<PlayerId, PlayerAggregate> = BTreeMap::new();
    for line in lines {
        by_player
            .entry(line.player_id)
            .or_insert_with(|| PlayerAggregate::empty(line.player_id))
            .add(line);
    }
    by_player.into_values().collect()
}

/// Keep players whose decayed appearances exceed `threshold_fraction` of the
/// pool maximum.
pub fn cull(players: Vec<PlayerAggregate>, threshold_fraction: f64) -> Vec<PlayerAggregate> {
    let max = players.iter().map(|p| p.appearances).fold(0.0, f64::max);
    let cutoff = max * threshold_fraction;
    let before = players.len();
    let kept: Vec<PlayerAggregate> = players
        .into_iter()
        .filter(|p| p.appearances > cutoff)
        .collect();
    info!(
        candidates = before,
        kept = kept.len(),
        cutoff,
        "culled players below playing-time threshold"
    );
    kept
}

// ---------------------------------------------------------------------------
// League baseline
// ---------------------------------------------------------------------------

/// Which players a baseline is computed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolRole {
    All,
    Starters,
    Relievers,
}

impl PoolRole {
    fn admits(self, line: &GameStatLine) -> bool {
        match self {
            PoolRole::All => true,
            PoolRole::Starters => line.stats[Category::GS] >= 1.0,
            PoolRole::Relievers => line.stats[Category::GS] == 0.0,
        }
    }
}

impl fmt::Display for PoolRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PoolRole::All => "players",
            PoolRole::Starters => "starters",
            PoolRole::Relievers => "relievers",
        })
    }
}

/// Mean unweighted season line of the eligible players in one pool.
#[derive(Debug, Clone, PartialEq)]
pub struct LeagueBaseline {
    pub role: PoolRole,
    /// Mean per-player total for every category.
    pub totals: StatLine,
    /// Mean per-player appearances.
    pub appearances: f64,
    pub players: usize,
}

impl LeagueBaseline {
    pub fn rate(&self, cat: Category) -> f64 {
        safe_div(self.totals[cat], self.appearances)
    }
}

/// One pooled baseline, or separate starter and reliever baselines blended
/// by each pitcher's start fraction.
#[derive(Debug, Clone, PartialEq)]
pub enum Baseline {
    Pooled(LeagueBaseline),
    ByRole {
        starters: LeagueBaseline,
        relievers: LeagueBaseline,
    },
}

impl Baseline {
    pub fn rate(&self, cat: Category, start_fraction: f64) -> f64 {
        match self {
            Baseline::Pooled(b) => b.rate(cat),
            Baseline::ByRole {
                starters,
                relievers,
            } => {
                start_fraction * starters.rate(cat)
                    + (1.0 - start_fraction) * relievers.rate(cat)
            }
        }
    }
}

/// Baseline over the top-level regular-season games of `role`, without any
/// weighting. The eligibility cutoff is taken from the same pool that is
/// averaged.
pub fn league_baseline(
    lines: &[GameStatLine],
    params: &RunParams<'_>,
    role: PoolRole,
) -> Result<LeagueBaseline, EngineError> {
    let appearances = params.appearances();
    let mut totals: BTreeMap<PlayerId, StatLine> = BTreeMap::new();
    for line in lines.iter().filter(|l| {
        l.level == params.engine.top_level && l.game_type == GameType::Regular && role.admits(l)
    }) {
        *totals.entry(line.player_id).or_default() += &line.stats;
    }

    let max = totals.values().map(|t| t[appearances]).fold(0.0, f64::max);
    let cutoff = max * params.engine.threshold_fraction;
    let eligible: Vec<&StatLine> = totals.values().filter(|t| t[appearances] > cutoff).collect();

    if eligible.is_empty() {
        return Err(EngineError::EmptyPool {
            family: params.family,
            role,
        });
    }

    let n = eligible.len() as f64;
    let mut sum = StatLine::new();
    for t in &eligible {
        sum += *t;
    }
    let mean = sum.scaled(1.0 / n);

    debug!(
        family = params.family.as_str(),
        %role,
        players = eligible.len(),
        pool = totals.len(),
        appearances = mean[appearances],
        "computed league baseline"
    );

    Ok(LeagueBaseline {
        role,
        appearances: mean[appearances],
        totals: mean,
        players: eligible.len(),
    })
}

/// The baseline(s) the strategy asks for.
pub fn compute_baseline(lines: &[GameStatLine], params: &RunParams<'_>) -> Result<Baseline, EngineError> {
    if params.family == StatFamily::Pitching && params.strategy.role_baselines {
        Ok(Baseline::ByRole {
            starters: league_baseline(lines, params, PoolRole::Starters)?,
            relievers: league_baseline(lines, params, PoolRole::Relievers)?,
        })
    } else {
        Ok(Baseline::Pooled(league_baseline(lines, params, PoolRole::All)?))
    }
}
