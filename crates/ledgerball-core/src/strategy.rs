// Blending strategy: the knobs that distinguish one generation of the
// projection engine from another. The stage sequence never changes.

use serde::Deserialize;

use crate::category::Category;

/// How a pitcher's start fraction is computed from games and games started.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum StartFractionRule {
    /// `GS / G`.
    GamesRatio,
    /// `GS·w / (GS·w + G − GS)`: a start counts as `w` relief appearances.
    WeightedStarts { start_weight: f64 },
}

/// Target appearance volume rule.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum PlayingTimeRule {
    /// Every batter gets `batting`; pitchers interpolate from `reliever`
    /// (start fraction 0) to `starter` (start fraction 1).
    Fixed {
        batting: f64,
        starter: f64,
        reliever: f64,
    },
    /// Targets scale with each player's recent top-level regular-season usage
    /// relative to the heaviest-used player in the pool.
    UsageScaled {
        batting_top: f64,
        batting_floor: f64,
        starter_top: f64,
        starter_floor: f64,
        reliever_top: f64,
        reliever_floor: f64,
    },
}

/// Everything the engine varies between generations.
#[derive(Debug, Clone, PartialEq)]
pub struct Strategy {
    pub name: String,
    /// Regress intentional and unintentional walks separately, then rebuild BB.
    pub split_walks: bool,
    /// Separate starter and reliever baselines for pitchers.
    pub role_baselines: bool,
    pub start_fraction: StartFractionRule,
    pub playing_time: PlayingTimeRule,
    /// Weight given to the strikeout/walk run estimator when blending earned
    /// and total runs. Zero leaves the regressed values untouched.
    pub run_estimator_weight: f64,
}

impl Strategy {
    /// First generation: one pooled baseline, walks regressed whole, fixed
    /// playing time.
    pub fn pooled() -> Self {
        Strategy {
            name: "pooled".into(),
            split_walks: false,
            role_baselines: false,
            start_fraction: StartFractionRule::GamesRatio,
            playing_time: PlayingTimeRule::Fixed {
                batting: 650.0,
                starter: 800.0,
                reliever: 250.0,
            },
            run_estimator_weight: 0.0,
        }
    }

    /// Second generation: role-split baselines and walk split, fixed volume.
    pub fn role_split() -> Self {
        Strategy {
            name: "role_split".into(),
            split_walks: true,
            role_baselines: true,
            start_fraction: StartFractionRule::GamesRatio,
            playing_time: PlayingTimeRule::Fixed {
                batting: 650.0,
                starter: 800.0,
                reliever: 250.0,
            },
            run_estimator_weight: 0.5,
        }
    }

    /// Third generation: usage-scaled playing time and weighted starts.
    pub fn usage_scaled() -> Self {
        Strategy {
            name: "usage_scaled".into(),
            split_walks: true,
            role_baselines: true,
            start_fraction: StartFractionRule::WeightedStarts { start_weight: 5.0 },
            playing_time: PlayingTimeRule::UsageScaled {
                batting_top: 725.0,
                batting_floor: 400.0,
                starter_top: 850.0,
                starter_floor: 500.0,
                reliever_top: 330.0,
                reliever_floor: 200.0,
            },
            run_estimator_weight: 0.5,
        }
    }

    /// Look up a preset by name.
    pub fn preset(name: &str) -> Option<Self> {
        match name {
            "pooled" => Some(Self::pooled()),
            "role_split" => Some(Self::role_split()),
            "usage_scaled" => Some(Self::usage_scaled()),
            _ => None,
        }
    }

    /// The strategy as applied to one family's regressed categories. When BB
    /// itself is not regressed it is always rebuilt from IBB and UIBB.
    pub fn for_base_stats(&self, base_stats: &[Category]) -> Strategy {
        let mut strategy = self.clone();
        if !base_stats.contains(&Category::BB) {
            strategy.split_walks = true;
        }
        strategy
    }
}

impl Default for Strategy {
    fn default() -> Self {
        Self::usage_scaled()
    }
}

/// `[strategy]` table in engine.toml: a preset name plus optional overrides.
#[derive(Debug, Clone, Deserialize)]
pub struct StrategySection {
    pub preset: String,
    pub split_walks: Option<bool>,
    pub role_baselines: Option<bool>,
    pub start_fraction: Option<StartFractionRule>,
    pub playing_time: Option<PlayingTimeRule>,
    pub run_estimator_weight: Option<f64>,
}

impl StrategySection {
    /// Resolve the preset and apply overrides. Returns `None` for an unknown
    /// preset name.
    pub fn resolve(&self) -> Option<Strategy> {
        let mut strategy = Strategy::preset(self.preset.trim())?;
        if let Some(v) = self.split_walks {
            strategy.split_walks = v;
        }
        if let Some(v) = self.role_baselines {
            strategy.role_baselines = v;
        }
        if let Some(v) = self.start_fraction {
            strategy.start_fraction = v;
        }
        if let Some(v) = self.playing_time {
            strategy.playing_time = v;
        }
        if let Some(v) = self.run_estimator_weight {
            strategy.run_estimator_weight = v;
        }
        Some(strategy)
    }
}
