// Regression toward the league baseline by additive phantom mass.

use ledgerball_core::Settings;

use crate::aggregate::{Baseline, PlayerAggregate};

/// Add `M` appearances of league-average production to every base stat
/// that has a regression mass. Works on weighted totals, never on rates, so
/// the decay weighting is not applied twice. Categories without a mass pass
/// through unchanged.
///
/// `start_fraction` only matters for role-split baselines.
pub fn regress(
    player: &PlayerAggregate,
    baseline: &Baseline,
    settings: &Settings,
    start_fraction: f64,
) -> PlayerAggregate {
    let mut out = player.clone();
    for &cat in &settings.base_stats {
        let Some(mass) = settings.regression_mass(cat) else {
            continue;
        };
        out.values[cat] += baseline.rate(cat, start_fraction) * mass;
        out.denoms[cat] += mass;
    }
    out
}
