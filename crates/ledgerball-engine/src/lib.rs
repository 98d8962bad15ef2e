// Projection engine: turns a multi-level, time-stamped game history into
// regressed, rate-consistent projections for a target date.
//
// Stage order is fixed: normalize, aggregate (plus league baseline), regress,
// rescale, reconcile. A `Strategy` selects the policies that differ between
// engine generations.

pub mod aggregate;
pub mod normalize;
pub mod playing_time;
pub mod rate;
pub mod reconcile;
pub mod regress;
pub mod run;

use ledgerball_core::config::{Config, ConfigError, EngineConfig, Settings};
use ledgerball_core::{Category, SnapshotError, StatFamily, StoreError, Strategy};
use thiserror::Error;

pub use aggregate::PoolRole;
pub use run::{project_lines, project_players, ProjectedLine, ProjectionRun, Projector};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("no eligible {role} in the {family} pool; the league baseline is undefined")]
    EmptyPool { family: StatFamily, role: PoolRole },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

impl EngineError {
    pub(crate) fn missing(field: String, message: impl Into<String>) -> Self {
        EngineError::Configuration(ConfigError::ValidationError {
            field,
            message: message.into(),
        })
    }
}

// ---------------------------------------------------------------------------
// Run parameters
// ---------------------------------------------------------------------------

/// Everything a stage needs to know about the current (family, config) pair.
/// Borrowed from the loaded config; never mutated during a run.
#[derive(Debug, Clone, Copy)]
pub struct RunParams<'a> {
    pub family: StatFamily,
    pub engine: &'a EngineConfig,
    pub settings: &'a Settings,
    pub strategy: &'a Strategy,
}

impl<'a> RunParams<'a> {
    pub fn from_config(config: &'a Config, family: StatFamily) -> Self {
        RunParams {
            family,
            engine: &config.engine,
            settings: config.settings(family),
            strategy: &config.strategy,
        }
    }

    pub fn appearances(&self) -> Category {
        self.family.appearances()
    }

    pub fn base_stats(&self) -> &'a [Category] {
        &self.settings.base_stats
    }
}
