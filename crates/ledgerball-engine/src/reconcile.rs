// Rebuild derived counting stats from the independently regressed
// components so a projected line satisfies the family's identities.

use ledgerball_core::{Category, StatFamily, StatLine, Strategy};

use crate::rate::safe_div;

/// Run-estimator ERA with no strikeouts or walks.
const KWERA_INTERCEPT: f64 = 5.40;
/// ERA change per unit of (SO - BB) / BFP.
const KWERA_SLOPE: f64 = 12.0;

/// Strikeout/walk run estimator on an ERA scale.
pub fn kw_era(strikeouts: f64, walks: f64, batters_faced: f64) -> f64 {
    KWERA_INTERCEPT - KWERA_SLOPE * safe_div(strikeouts - walks, batters_faced)
}

/// Apply the identities in place. Expects the appearance column and every
/// base stat to be filled already.
pub fn reconcile(family: StatFamily, strategy: &Strategy, line: &mut StatLine) {
    derive_totals(family, strategy.split_walks, line);

    if family == StatFamily::Pitching {
        let w = strategy.run_estimator_weight;
        if w > 0.0 {
            let era = kw_era(line[Category::SO], line[Category::BB], line[Category::BFP]);
            let kw_runs = era / 9.0 * line[Category::IP];
            line[Category::ER] = w * kw_runs + (1.0 - w) * line[Category::ER];
            line[Category::R] = w * kw_runs + (1.0 - w) * line[Category::R];
        }
    }
}

/// Recompute the pure sums and differences (walks, hits, at-bats, innings)
/// from their components.
pub fn derive_totals(family: StatFamily, split_walks: bool, line: &mut StatLine) {
    if split_walks {
        line[Category::BB] = line[Category::IBB] + line[Category::UIBB];
    }

    match family {
        StatFamily::Batting => {
            line[Category::H] = line[Category::HR]
                + line[Category::Triple]
                + line[Category::Double]
                + line[Category::Single];
            line[Category::AB] = line[Category::PA]
                - line[Category::BB]
                - line[Category::HBP]
                - line[Category::SF];
        }
        StatFamily::Pitching => {
            line[Category::IP] = (line[Category::BFP]
                - line[Category::H]
                - line[Category::BB]
                - line[Category::HBP])
                / 3.0;
        }
    }
}
