// Per-game statistical lines as delivered by the stat store, plus the
// load-time derivations every generation of the engine relies on.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::category::{Category, StatFamily, StatLine};

/// Competition level id as assigned by the stats service (1 = top tier).
pub type LevelId = u32;

/// Player id as assigned by the stats service.
pub type PlayerId = u32;

// ---------------------------------------------------------------------------
// GameType
// ---------------------------------------------------------------------------

/// Kind of game a line was recorded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GameType {
    Regular,
    Exhibition,
    SpringTraining,
    Postseason,
}

impl GameType {
    /// Exhibition-style games are dampened during normalization.
    pub fn is_dampened(self) -> bool {
        matches!(self, GameType::Exhibition | GameType::SpringTraining)
    }

    pub fn code(self) -> &'static str {
        match self {
            GameType::Regular => "R",
            GameType::Exhibition => "E",
            GameType::SpringTraining => "S",
            GameType::Postseason => "P",
        }
    }
}

impl fmt::Display for GameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for GameType {
    type Err = String;

    /// Parse the stats service's single-letter game type code. All-star games
    /// count as exhibitions; every postseason round collapses to `Postseason`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "R" => Ok(GameType::Regular),
            "S" => Ok(GameType::SpringTraining),
            "E" | "A" => Ok(GameType::Exhibition),
            "P" | "F" | "D" | "L" | "W" => Ok(GameType::Postseason),
            other => Err(format!("unknown game type '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// GameStatLine
// ---------------------------------------------------------------------------

/// One player's contribution in one game.
#[derive(Debug, Clone, PartialEq)]
pub struct GameStatLine {
    pub player_id: PlayerId,
    pub game_date: NaiveDate,
    pub level: LevelId,
    pub game_type: GameType,
    pub stats: StatLine,
}

/// Innings are recorded as whole innings plus outs in the tenths digit
/// (`6.2` means six and two-thirds). Converts to true decimal innings.
pub fn convert_innings(notation: f64) -> f64 {
    if !notation.is_finite() {
        return 0.0;
    }
    let whole = notation.trunc();
    let outs = ((notation - whole) * 10.0).round();
    whole + outs / 3.0
}

/// A quality start: a start of six or more innings allowing three or fewer
/// earned runs. `innings` must already be in true decimal form.
pub fn is_quality_start(starts: f64, innings: f64, earned_runs: f64) -> bool {
    starts > 0.0 && innings >= 6.0 && earned_runs <= 3.0
}

/// Fill the derived columns for a freshly loaded line: singles and plate
/// appearances for batters, unintentional walks for both families.
pub fn derive_columns(family: StatFamily, stats: &mut StatLine) {
    stats[Category::UIBB] = stats[Category::BB] - stats[Category::IBB];
    if family == StatFamily::Batting {
        stats[Category::Single] = stats[Category::H]
            - stats[Category::HR]
            - stats[Category::Triple]
            - stats[Category::Double];
        stats[Category::PA] = stats[Category::AB]
            + stats[Category::BB]
            + stats[Category::HBP]
            + stats[Category::SH]
            + stats[Category::SF];
    }
}
