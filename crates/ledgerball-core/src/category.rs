// Statistical categories, stat families, and the dense per-category vector
// that every pipeline stage operates on.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{AddAssign, Index, IndexMut};
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Category
// ---------------------------------------------------------------------------

/// A single counting category. Batting and pitching share variants whose
/// column labels coincide (R, H, HR, SO, BB, IBB, HBP).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    PA,
    AB,
    R,
    H,
    #[serde(rename = "1B")]
    Single,
    #[serde(rename = "2B")]
    Double,
    #[serde(rename = "3B")]
    Triple,
    HR,
    RBI,
    SB,
    CS,
    BB,
    UIBB,
    IBB,
    SO,
    HBP,
    SH,
    SF,
    GIDP,
    W,
    L,
    QS,
    G,
    GS,
    CG,
    SHO,
    SV,
    HLD,
    BFP,
    IP,
    ER,
    WP,
    BK,
}

impl Category {
    pub const COUNT: usize = 33;

    pub const ALL: [Category; Category::COUNT] = [
        Category::PA,
        Category::AB,
        Category::R,
        Category::H,
        Category::Single,
        Category::Double,
        Category::Triple,
        Category::HR,
        Category::RBI,
        Category::SB,
        Category::CS,
        Category::BB,
        Category::UIBB,
        Category::IBB,
        Category::SO,
        Category::HBP,
        Category::SH,
        Category::SF,
        Category::GIDP,
        Category::W,
        Category::L,
        Category::QS,
        Category::G,
        Category::GS,
        Category::CG,
        Category::SHO,
        Category::SV,
        Category::HLD,
        Category::BFP,
        Category::IP,
        Category::ER,
        Category::WP,
        Category::BK,
    ];

    /// Column label used in stores, config files and snapshots.
    pub fn label(self) -> &'static str {
        match self {
            Category::PA => "PA",
            Category::AB => "AB",
            Category::R => "R",
            Category::H => "H",
            Category::Single => "1B",
            Category::Double => "2B",
            Category::Triple => "3B",
            Category::HR => "HR",
            Category::RBI => "RBI",
            Category::SB => "SB",
            Category::CS => "CS",
            Category::BB => "BB",
            Category::UIBB => "UIBB",
            Category::IBB => "IBB",
            Category::SO => "SO",
            Category::HBP => "HBP",
            Category::SH => "SH",
            Category::SF => "SF",
            Category::GIDP => "GIDP",
            Category::W => "W",
            Category::L => "L",
            Category::QS => "QS",
            Category::G => "G",
            Category::GS => "GS",
            Category::CG => "CG",
            Category::SHO => "SHO",
            Category::SV => "SV",
            Category::HLD => "HLD",
            Category::BFP => "BFP",
            Category::IP => "IP",
            Category::ER => "ER",
            Category::WP => "WP",
            Category::BK => "BK",
        }
    }

    /// Look up a category by its column label. Case-sensitive, matching the
    /// labels the stats service writes.
    pub fn from_label(label: &str) -> Option<Category> {
        Category::ALL.iter().copied().find(|c| c.label() == label)
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::from_label(s.trim()).ok_or_else(|| format!("unknown category '{s}'"))
    }
}

// ---------------------------------------------------------------------------
// StatLine
// ---------------------------------------------------------------------------

/// Dense vector of one value per `Category`. Categories a family does not use
/// simply stay at zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatLine([f64; Category::COUNT]);

impl Default for StatLine {
    fn default() -> Self {
        StatLine([0.0; Category::COUNT])
    }
}

impl StatLine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, cat: Category) -> f64 {
        self.0[cat.index()]
    }

    /// Multiply every category by `factor`.
    pub fn scaled(&self, factor: f64) -> StatLine {
        let mut out = *self;
        for v in out.0.iter_mut() {
            *v *= factor;
        }
        out
    }

    pub fn iter(&self) -> impl Iterator<Item = (Category, f64)> + '_ {
        Category::ALL.iter().map(move |&c| (c, self.get(c)))
    }
}

impl Index<Category> for StatLine {
    type Output = f64;

    fn index(&self, cat: Category) -> &f64 {
        &self.0[cat.index()]
    }
}

impl IndexMut<Category> for StatLine {
    fn index_mut(&mut self, cat: Category) -> &mut f64 {
        &mut self.0[cat.index()]
    }
}

impl AddAssign<&StatLine> for StatLine {
    fn add_assign(&mut self, rhs: &StatLine) {
        for (a, b) in self.0.iter_mut().zip(rhs.0.iter()) {
            *a += b;
        }
    }
}

// ---------------------------------------------------------------------------
// StatFamily
// ---------------------------------------------------------------------------

/// Batting or pitching. Each family projects independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatFamily {
    Batting,
    Pitching,
}

const BATTING_COLUMNS: &[Category] = &[
    Category::AB,
    Category::R,
    Category::H,
    Category::Double,
    Category::Triple,
    Category::HR,
    Category::RBI,
    Category::SB,
    Category::CS,
    Category::BB,
    Category::SO,
    Category::IBB,
    Category::HBP,
    Category::SH,
    Category::SF,
    Category::GIDP,
];

const PITCHING_COLUMNS: &[Category] = &[
    Category::W,
    Category::L,
    Category::QS,
    Category::G,
    Category::GS,
    Category::CG,
    Category::SHO,
    Category::SV,
    Category::HLD,
    Category::BFP,
    Category::IP,
    Category::H,
    Category::ER,
    Category::R,
    Category::HR,
    Category::SO,
    Category::BB,
    Category::IBB,
    Category::HBP,
    Category::WP,
    Category::BK,
];

impl StatFamily {
    pub const ALL: [StatFamily; 2] = [StatFamily::Batting, StatFamily::Pitching];

    /// The exposure denominator: plate appearances or batters faced.
    pub fn appearances(self) -> Category {
        match self {
            StatFamily::Batting => Category::PA,
            StatFamily::Pitching => Category::BFP,
        }
    }

    /// Raw counting columns the stat store carries for this family.
    pub fn raw_columns(self) -> &'static [Category] {
        match self {
            StatFamily::Batting => BATTING_COLUMNS,
            StatFamily::Pitching => PITCHING_COLUMNS,
        }
    }

    /// Store table name and snapshot directory name.
    pub fn as_str(self) -> &'static str {
        match self {
            StatFamily::Batting => "batting",
            StatFamily::Pitching => "pitching",
        }
    }
}

impl fmt::Display for StatFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "batting" | "hitting" => Ok(StatFamily::Batting),
            "pitching" => Ok(StatFamily::Pitching),
            other => Err(format!("unknown stat family '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
