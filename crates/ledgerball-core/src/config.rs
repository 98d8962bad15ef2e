// Configuration loading and parsing (engine.toml, batting.toml, pitching.toml).

use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use crate::category::{Category, StatFamily};
use crate::gamelog::LevelId;
use crate::strategy::{PlayingTimeRule, StartFractionRule, Strategy, StrategySection};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

impl ConfigError {
    fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        ConfigError::ValidationError {
            field: field.into(),
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Top-level assembled Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub engine: EngineConfig,
    pub strategy: Strategy,
    pub batting: Settings,
    pub pitching: Settings,
    pub paths: DataPaths,
}

impl Config {
    pub fn settings(&self, family: StatFamily) -> &Settings {
        match family {
            StatFamily::Batting => &self.batting,
            StatFamily::Pitching => &self.pitching,
        }
    }
}

// ---------------------------------------------------------------------------
// engine.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for the entire engine.toml file.
#[derive(Debug, Clone, Deserialize)]
struct EngineFile {
    window: WindowSection,
    context: ContextSection,
    eligibility: EligibilitySection,
    strategy: StrategySection,
    paths: DataPaths,
}

#[derive(Debug, Clone, Deserialize)]
struct WindowSection {
    max_days_ago: i64,
}

#[derive(Debug, Clone, Deserialize)]
struct ContextSection {
    exhibition_dampening: f64,
    top_level: LevelId,
    levels: BTreeMap<String, LevelId>,
}

#[derive(Debug, Clone, Deserialize)]
struct EligibilitySection {
    threshold_fraction: f64,
}

/// Run-wide constants shared by both stat families.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Games older than this many days before the projection date are ignored.
    pub max_days_ago: i64,
    /// Multiplier applied to exhibition and spring-training games.
    pub exhibition_dampening: f64,
    pub top_level: LevelId,
    /// Lower competition levels by name. Level factors are keyed by these names.
    pub levels: BTreeMap<String, LevelId>,
    /// Fraction of the pool's maximum appearances a player must exceed to
    /// count toward the baseline or receive a projection.
    pub threshold_fraction: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let levels = [
            ("AAA", 11),
            ("AA", 12),
            ("HIGH_A", 13),
            ("LOW_A", 14),
            ("ROOKIE", 16),
            ("FALL", 17),
        ]
        .into_iter()
        .map(|(name, id)| (name.to_string(), id))
        .collect();
        EngineConfig {
            max_days_ago: 2000,
            exhibition_dampening: 0.45,
            top_level: 1,
            levels,
            threshold_fraction: 0.11,
        }
    }
}

/// Where the stat store lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// A SQLite database with `batting` and `pitching` tables.
    Sqlite,
    /// A directory holding `batting.csv` and `pitching.csv`.
    Csv,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataPaths {
    pub store_kind: StoreKind,
    pub store: String,
    /// People register CSV. Optional: without it every name is blank.
    #[serde(default)]
    pub names: Option<String>,
    pub projections: String,
}

// ---------------------------------------------------------------------------
// batting.toml / pitching.toml
// ---------------------------------------------------------------------------

/// Per-family tunables. Immutable once loaded.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Categories that are independently weighted and regressed.
    pub base_stats: Vec<Category>,
    /// Snapshot columns, in order.
    pub display: Vec<Category>,
    pub decay_rates: BTreeMap<Category, f64>,
    #[serde(default)]
    pub regression_mass: BTreeMap<Category, f64>,
    /// Level name -> category -> translation factor.
    #[serde(default)]
    pub level_factors: BTreeMap<String, BTreeMap<Category, f64>>,
}

impl Settings {
    pub fn decay_rate(&self, cat: Category) -> Option<f64> {
        self.decay_rates.get(&cat).copied()
    }

    pub fn regression_mass(&self, cat: Category) -> Option<f64> {
        self.regression_mass.get(&cat).copied()
    }

    pub fn level_factor(&self, level: &str, cat: Category) -> Option<f64> {
        self.level_factors.get(level).and_then(|m| m.get(&cat)).copied()
    }
}

/// Categories the reconciler rebuilds instead of regressing.
pub fn reconciled_categories(family: StatFamily, strategy: &Strategy) -> Vec<Category> {
    let mut cats = Vec::new();
    if strategy.split_walks {
        cats.push(Category::BB);
    }
    match family {
        StatFamily::Batting => cats.extend([Category::H, Category::AB]),
        StatFamily::Pitching => cats.push(Category::IP),
    }
    cats
}

/// Categories the reconciler reads.
fn reconciliation_inputs(family: StatFamily, strategy: &Strategy) -> Vec<Category> {
    let mut cats = if strategy.split_walks {
        vec![Category::UIBB, Category::IBB]
    } else {
        vec![Category::BB]
    };
    match family {
        StatFamily::Batting => cats.extend([
            Category::Single,
            Category::Double,
            Category::Triple,
            Category::HR,
            Category::HBP,
            Category::SF,
        ]),
        StatFamily::Pitching => {
            cats.extend([Category::H, Category::HBP]);
            if strategy.run_estimator_weight > 0.0 {
                cats.extend([Category::SO, Category::ER, Category::R]);
            }
        }
    }
    cats
}

/// Check one family's settings against the engine constants and strategy.
///
/// Used by the config loader and again by the engine at run start, so
/// programmatically built settings get the same guarantees.
pub fn validate_settings(
    family: StatFamily,
    settings: &Settings,
    engine: &EngineConfig,
    strategy: &Strategy,
) -> Result<(), ConfigError> {
    let prefix = family.as_str();
    let strategy = &strategy.for_base_stats(&settings.base_stats);

    if settings.base_stats.is_empty() {
        return Err(ConfigError::invalid(
            format!("{prefix}.base_stats"),
            "must list at least one category",
        ));
    }

    let appearances = family.appearances();
    let base: BTreeSet<Category> = settings.base_stats.iter().copied().collect();
    if base.contains(&appearances) {
        return Err(ConfigError::invalid(
            format!("{prefix}.base_stats"),
            format!("{appearances} is the exposure denominator and cannot be regressed"),
        ));
    }

    for (&cat, &rate) in &settings.decay_rates {
        if !(rate > 0.0 && rate <= 1.0) {
            return Err(ConfigError::invalid(
                format!("{prefix}.decay_rates.{cat}"),
                format!("must be in (0, 1], got {rate}"),
            ));
        }
    }

    for cat in base.iter().copied().chain(std::iter::once(appearances)) {
        if settings.decay_rate(cat).is_none() {
            return Err(ConfigError::invalid(
                format!("{prefix}.decay_rates.{cat}"),
                "missing decay rate",
            ));
        }
    }

    for (&cat, &mass) in &settings.regression_mass {
        if !mass.is_finite() || mass < 0.0 {
            return Err(ConfigError::invalid(
                format!("{prefix}.regression_mass.{cat}"),
                format!("must be >= 0, got {mass}"),
            ));
        }
    }

    for level in engine.levels.keys() {
        for &cat in &settings.base_stats {
            match settings.level_factor(level, cat) {
                Some(f) if f.is_finite() && f >= 0.0 => {}
                Some(f) => {
                    return Err(ConfigError::invalid(
                        format!("{prefix}.level_factors.{level}.{cat}"),
                        format!("must be >= 0, got {f}"),
                    ))
                }
                None => {
                    return Err(ConfigError::invalid(
                        format!("{prefix}.level_factors.{level}.{cat}"),
                        "missing level factor",
                    ))
                }
            }
        }
    }

    for cat in reconciliation_inputs(family, strategy) {
        if !base.contains(&cat) {
            return Err(ConfigError::invalid(
                format!("{prefix}.base_stats"),
                format!("{cat} is required by {} reconciliation", strategy.name),
            ));
        }
    }

    let reconciled = reconciled_categories(family, strategy);
    for &cat in &settings.display {
        let produced = cat == appearances || base.contains(&cat) || reconciled.contains(&cat);
        if !produced {
            return Err(ConfigError::invalid(
                format!("{prefix}.display"),
                format!("{cat} is neither regressed nor reconciled"),
            ));
        }
    }

    Ok(())
}

fn validate_engine(engine: &EngineConfig, strategy: &Strategy) -> Result<(), ConfigError> {
    if engine.max_days_ago <= 0 {
        return Err(ConfigError::invalid(
            "window.max_days_ago",
            format!("must be > 0, got {}", engine.max_days_ago),
        ));
    }

    let damp = engine.exhibition_dampening;
    if !(0.0..=1.0).contains(&damp) {
        return Err(ConfigError::invalid(
            "context.exhibition_dampening",
            format!("must be between 0.0 and 1.0 inclusive, got {damp}"),
        ));
    }

    if engine.levels.values().any(|&id| id == engine.top_level) {
        return Err(ConfigError::invalid(
            "context.levels",
            format!("top level {} cannot also be a lower level", engine.top_level),
        ));
    }

    let frac = engine.threshold_fraction;
    if !(frac > 0.0 && frac < 1.0) {
        return Err(ConfigError::invalid(
            "eligibility.threshold_fraction",
            format!("must be in (0, 1), got {frac}"),
        ));
    }

    let w = strategy.run_estimator_weight;
    if !(0.0..=1.0).contains(&w) {
        return Err(ConfigError::invalid(
            "strategy.run_estimator_weight",
            format!("must be between 0.0 and 1.0 inclusive, got {w}"),
        ));
    }

    if let StartFractionRule::WeightedStarts { start_weight } = strategy.start_fraction {
        if start_weight <= 0.0 {
            return Err(ConfigError::invalid(
                "strategy.start_fraction.start_weight",
                format!("must be > 0, got {start_weight}"),
            ));
        }
    }

    let volumes: Vec<(&str, f64)> = match strategy.playing_time {
        PlayingTimeRule::Fixed {
            batting,
            starter,
            reliever,
        } => vec![
            ("playing_time.batting", batting),
            ("playing_time.starter", starter),
            ("playing_time.reliever", reliever),
        ],
        PlayingTimeRule::UsageScaled {
            batting_top,
            batting_floor,
            starter_top,
            starter_floor,
            reliever_top,
            reliever_floor,
        } => {
            for (name, top, floor) in [
                ("batting", batting_top, batting_floor),
                ("starter", starter_top, starter_floor),
                ("reliever", reliever_top, reliever_floor),
            ] {
                if top < floor {
                    return Err(ConfigError::invalid(
                        format!("strategy.playing_time.{name}_top"),
                        format!("must be >= {name}_floor ({floor}), got {top}"),
                    ));
                }
            }
            vec![
                ("playing_time.batting_floor", batting_floor),
                ("playing_time.starter_floor", starter_floor),
                ("playing_time.reliever_floor", reliever_floor),
            ]
        }
    };
    for (name, val) in volumes {
        if val <= 0.0 {
            return Err(ConfigError::invalid(
                format!("strategy.{name}"),
                format!("must be > 0, got {val}"),
            ));
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate configuration from `config/engine.toml`,
/// `config/batting.toml`, and `config/pitching.toml`, all relative to the
/// given `base_dir`.
///
/// Does not seed missing files; `load_config_in` does.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let config_dir = base_dir.join("config");

    let engine_file: EngineFile = read_toml(&config_dir.join("engine.toml"))?;
    let batting: Settings = read_toml(&config_dir.join("batting.toml"))?;
    let pitching: Settings = read_toml(&config_dir.join("pitching.toml"))?;

    let strategy = engine_file.strategy.resolve().ok_or_else(|| {
        ConfigError::invalid(
            "strategy.preset",
            format!("unknown preset '{}'", engine_file.strategy.preset),
        )
    })?;

    let engine = EngineConfig {
        max_days_ago: engine_file.window.max_days_ago,
        exhibition_dampening: engine_file.context.exhibition_dampening,
        top_level: engine_file.context.top_level,
        levels: engine_file.context.levels,
        threshold_fraction: engine_file.eligibility.threshold_fraction,
    };

    let config = Config {
        engine,
        strategy,
        batting,
        pitching,
        paths: engine_file.paths,
    };

    validate(&config)?;

    Ok(config)
}

/// Files read from `config/`, each seeded from `defaults/` when missing.
const CONFIG_FILES: [&str; 3] = ["engine.toml", "batting.toml", "pitching.toml"];

/// Seed `base_dir/config` with whichever config files it lacks. Files
/// already present are left alone. Returns the files written.
pub fn ensure_config_files(base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let defaults_dir = base_dir.join("defaults");
    let config_dir = base_dir.join("config");

    if !defaults_dir.is_dir() {
        if config_dir.is_dir() {
            return Ok(Vec::new());
        }
        return Err(ConfigError::DefaultsCopyError {
            message: format!(
                "no defaults/ or config/ directory under {}",
                base_dir.display()
            ),
        });
    }

    std::fs::create_dir_all(&config_dir).map_err(|e| seed_error("create", &config_dir, e))?;

    let mut copied = Vec::new();
    for name in CONFIG_FILES {
        let source = defaults_dir.join(name);
        let target = config_dir.join(name);
        if target.exists() || !source.is_file() {
            continue;
        }
        std::fs::copy(&source, &target).map_err(|e| seed_error("copy", &source, e))?;
        info!(file = name, "seeded config from defaults");
        copied.push(target);
    }

    Ok(copied)
}

fn seed_error(action: &str, path: &Path, e: std::io::Error) -> ConfigError {
    ConfigError::DefaultsCopyError {
        message: format!("failed to {action} {}: {e}", path.display()),
    }
}

/// Copy missing defaults into `base_dir/config` and load from there.
pub fn load_config_in(base_dir: &Path) -> Result<Config, ConfigError> {
    ensure_config_files(base_dir)?;
    load_config_from(base_dir)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

fn read_toml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let text = read_file(path)?;
    toml::from_str(&text).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        source: e,
    })
}

fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_engine(&config.engine, &config.strategy)?;
    for family in StatFamily::ALL {
        validate_settings(
            family,
            config.settings(family),
            &config.engine,
            &config.strategy,
        )?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
