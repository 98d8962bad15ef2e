// Context normalization: recency decay, exhibition dampening and level
// translation applied to each game line inside the projection window.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use ledgerball_core::{Category, GameStatLine, GameType, LevelId, PlayerId, StatFamily, StatLine};
use rayon::prelude::*;
use tracing::info;

use crate::{EngineError, RunParams};

/// Weight of a game `days_ago` days old under per-day decay `rate`.
pub fn decay_weight(rate: f64, days_ago: i64) -> f64 {
    rate.powf(days_ago as f64)
}

/// A game line after weighting. `values` and `denoms` are only filled for
/// the family's base stats.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedLine {
    pub player_id: PlayerId,
    /// Weighted contribution per base stat (decay, dampening, level factor).
    pub values: StatLine,
    /// Appearances under the same decay and dampening as the matching value,
    /// without the level factor.
    pub denoms: StatLine,
    /// Appearances decayed at the appearance rate. Drives the playing-time cull.
    pub appearances: f64,
    /// As `appearances`, but only for top-level regular-season games.
    pub usage: f64,
}

/// Normalization state resolved once per run: decay rates per base stat and
/// a translation table per known level.
#[derive(Debug, Clone)]
pub struct Normalizer {
    family: StatFamily,
    date: NaiveDate,
    max_days_ago: i64,
    dampening: f64,
    top_level: LevelId,
    appearance_decay: f64,
    decay: Vec<(Category, f64)>,
    levels: BTreeMap<LevelId, StatLine>,
}

impl Normalizer {
    pub fn new(params: &RunParams<'_>, date: NaiveDate) -> Result<Self, EngineError> {
        let family = params.family;
        let prefix = family.as_str();
        let appearances = params.appearances();

        let appearance_decay = params.settings.decay_rate(appearances).ok_or_else(|| {
            EngineError::missing(
                format!("{prefix}.decay_rates.{appearances}"),
                "missing decay rate",
            )
        })?;

        let mut decay = Vec::with_capacity(params.base_stats().len());
        for &cat in params.base_stats() {
            let rate = params.settings.decay_rate(cat).ok_or_else(|| {
                EngineError::missing(format!("{prefix}.decay_rates.{cat}"), "missing decay rate")
            })?;
            decay.push((cat, rate));
        }

        let mut levels = BTreeMap::new();
        let mut top = StatLine::new();
        for &cat in params.base_stats() {
            top[cat] = 1.0;
        }
        levels.insert(params.engine.top_level, top);

        for (name, &id) in &params.engine.levels {
            let mut factors = StatLine::new();
            for &cat in params.base_stats() {
                factors[cat] = params.settings.level_factor(name, cat).ok_or_else(|| {
                    EngineError::missing(
                        format!("{prefix}.level_factors.{name}.{cat}"),
                        "missing level factor",
                    )
                })?;
            }
            levels.insert(id, factors);
        }

        Ok(Normalizer {
            family,
            date,
            max_days_ago: params.engine.max_days_ago,
            dampening: params.engine.exhibition_dampening,
            top_level: params.engine.top_level,
            appearance_decay,
            decay,
            levels,
        })
    }

    pub fn days_ago(&self, line: &GameStatLine) -> i64 {
        (self.date - line.game_date).num_days()
    }

    /// Games on or after the projection date, and games older than the
    /// window, are excluded.
    pub fn in_window(&self, line: &GameStatLine) -> bool {
        let days = self.days_ago(line);
        days > 0 && days <= self.max_days_ago
    }

    /// Weight every in-window line. Lines outside the window are dropped; a
    /// line from a level with no translation table is a configuration error.
    pub fn normalize(&self, lines: &[GameStatLine]) -> Result<Vec<NormalizedLine>, EngineError> {
        let unknown: BTreeSet<LevelId> = lines
            .iter()
            .filter(|l| self.in_window(l) && !self.levels.contains_key(&l.level))
            .map(|l| l.level)
            .collect();
        if let Some(level) = unknown.first() {
            return Err(EngineError::missing(
                "context.levels".to_string(),
                format!(
                    "level id {level} appears in {} games but is neither the top level nor configured",
                    self.family
                ),
            ));
        }

        let normalized: Vec<NormalizedLine> = lines
            .par_iter()
            .filter(|l| self.in_window(l))
            .filter_map(|l| self.levels.get(&l.level).map(|f| self.normalize_line(l, f)))
            .collect();

        info!(
            family = self.family.as_str(),
            lines = normalized.len(),
            "normalized game lines"
        );
        Ok(normalized)
    }

    fn normalize_line(&self, line: &GameStatLine, factors: &StatLine) -> NormalizedLine {
        let days = self.days_ago(line);
        let damp = if line.game_type.is_dampened() {
            self.dampening
        } else {
            1.0
        };
        let raw_appearances = line.stats[self.family.appearances()];

        let mut values = StatLine::new();
        let mut denoms = StatLine::new();
        for &(cat, rate) in &self.decay {
            let weight = decay_weight(rate, days) * damp;
            values[cat] = line.stats[cat] * weight * factors[cat];
            denoms[cat] = raw_appearances * weight;
        }

        let appearances = raw_appearances * decay_weight(self.appearance_decay, days);
        let counts_for_usage =
            line.level == self.top_level && line.game_type == GameType::Regular;

        NormalizedLine {
            player_id: line.player_id,
            values,
            denoms,
            appearances,
            usage: if counts_for_usage { appearances } else { 0.0 },
        }
    }
}
