// Run orchestration: one (date, family) projection from stat store to
// published snapshot.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDate;
use ledgerball_core::config::{validate_settings, Config};
use ledgerball_core::store::open_store;
use ledgerball_core::{
    GameStatLine, NameRegistry, PlayerId, ProjectionRecord, Snapshot, SnapshotStore, StatFamily,
    StatLine, StatStore, Strategy,
};
use tracing::{info, warn};

use crate::aggregate::{aggregate, compute_baseline, cull, PlayerAggregate};
use crate::normalize::Normalizer;
use crate::playing_time::{rescale, target_appearances, UsagePool};
use crate::reconcile::{derive_totals, reconcile};
use crate::regress::regress;
use crate::{EngineError, RunParams};

/// Nearest integer; anything non-finite becomes zero.
fn round_count(value: f64) -> i64 {
    if value.is_finite() {
        value.round() as i64
    } else {
        0
    }
}

/// Round every category, then rebuild the derived totals from the rounded
/// components so the published identities hold exactly.
fn round_line(family: StatFamily, strategy: &Strategy, line: &StatLine) -> StatLine {
    let mut rounded = StatLine::new();
    for (cat, value) in line.iter() {
        rounded[cat] = round_count(value) as f64;
    }
    derive_totals(family, strategy.split_walks, &mut rounded);
    rounded
}

/// One player's reconciled projection before rounding.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedLine {
    pub player_id: PlayerId,
    /// Zero for batters.
    pub start_fraction: f64,
    /// Projected appearances.
    pub target: f64,
    pub stats: StatLine,
}

/// Every stage up to and including reconciliation, over an in-memory
/// history. Players come out ascending by id.
pub fn project_players(
    mut lines: Vec<GameStatLine>,
    date: NaiveDate,
    params: &RunParams<'_>,
) -> Result<Vec<ProjectedLine>, EngineError> {
    let family = params.family;
    let settings = params.settings;
    let strategy = params.strategy;
    validate_settings(family, settings, params.engine, strategy)?;

    let normalizer = Normalizer::new(params, date)?;
    lines.retain(|l| normalizer.in_window(l));
    info!(
        family = family.as_str(),
        %date,
        lines = lines.len(),
        strategy = %strategy.name,
        "starting projection run"
    );

    let baseline = compute_baseline(&lines, params)?;
    let normalized = normalizer.normalize(&lines)?;
    let players = cull(aggregate(&normalized), params.engine.threshold_fraction);

    let start_fractions: Vec<f64> = players
        .iter()
        .map(|p| match family {
            StatFamily::Pitching => p.start_fraction(strategy.start_fraction),
            StatFamily::Batting => 0.0,
        })
        .collect();

    let regressed: Vec<PlayerAggregate> = players
        .iter()
        .zip(&start_fractions)
        .map(|(p, &sf)| regress(p, &baseline, settings, sf))
        .collect();

    let pool = UsagePool::from_players(regressed.iter().zip(start_fractions.iter().copied()));
    let reconciling = strategy.for_base_stats(&settings.base_stats);

    let projected: Vec<ProjectedLine> = regressed
        .iter()
        .zip(&start_fractions)
        .map(|(p, &sf)| {
            let target = target_appearances(family, &strategy.playing_time, p.usage, sf, &pool);
            let mut stats = rescale(p, &settings.base_stats, params.appearances(), target);
            reconcile(family, &reconciling, &mut stats);
            ProjectedLine {
                player_id: p.player_id,
                start_fraction: sf,
                target,
                stats,
            }
        })
        .collect();

    info!(
        family = family.as_str(),
        %date,
        projected = projected.len(),
        "projection run complete"
    );
    Ok(projected)
}

/// The full pipeline, rounded to display columns and joined with names.
/// Pure: nothing is written.
pub fn project_lines(
    lines: Vec<GameStatLine>,
    date: NaiveDate,
    params: &RunParams<'_>,
    names: &NameRegistry,
) -> Result<Snapshot, EngineError> {
    let display = &params.settings.display;
    let reconciling = params.strategy.for_base_stats(&params.settings.base_stats);
    let records = project_players(lines, date, params)?
        .into_iter()
        .map(|p| {
            let rounded = round_line(params.family, &reconciling, &p.stats);
            ProjectionRecord {
                player_id: p.player_id,
                stats: display
                    .iter()
                    .map(|&c| (c, round_count(rounded[c])))
                    .collect(),
                name: names.resolve(p.player_id),
            }
        })
        .collect();

    Ok(Snapshot {
        date,
        family: params.family,
        columns: display.clone(),
        records,
    })
}

/// A published projection.
#[derive(Debug, Clone)]
pub struct ProjectionRun {
    pub snapshot: Snapshot,
    pub path: PathBuf,
}

/// Owns everything a projection run reads from and writes to. Shareable
/// across threads; runs for different (date, family) pairs hold no common
/// mutable state.
pub struct Projector {
    config: Config,
    store: Arc<dyn StatStore>,
    names: NameRegistry,
    snapshots: SnapshotStore,
}

impl Projector {
    pub fn new(
        config: Config,
        store: Arc<dyn StatStore>,
        names: NameRegistry,
        snapshots: SnapshotStore,
    ) -> Self {
        Projector {
            config,
            store,
            names,
            snapshots,
        }
    }

    /// Open the store, name register and snapshot directory named in the
    /// config. An unreadable name register only costs the names.
    pub fn from_config(config: Config) -> Result<Self, EngineError> {
        let store: Arc<dyn StatStore> = Arc::from(open_store(&config.paths)?);
        let names = match &config.paths.names {
            Some(path) => NameRegistry::load(Path::new(path)).unwrap_or_else(|e| {
                warn!("name register unavailable, names will be blank: {e}");
                NameRegistry::empty()
            }),
            None => NameRegistry::empty(),
        };
        let snapshots = SnapshotStore::new(&config.paths.projections);
        Ok(Self::new(config, store, names, snapshots))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn snapshots(&self) -> &SnapshotStore {
        &self.snapshots
    }

    /// Run the pipeline without publishing.
    pub fn compute(&self, date: NaiveDate, family: StatFamily) -> Result<Snapshot, EngineError> {
        let lines = self.store.game_lines(family)?;
        let params = RunParams::from_config(&self.config, family);
        project_lines(lines, date, &params, &self.names)
    }

    /// Run the pipeline and publish the snapshot. Nothing is written when
    /// any stage fails.
    pub fn project(&self, date: NaiveDate, family: StatFamily) -> Result<ProjectionRun, EngineError> {
        let snapshot = self.compute(date, family)?;
        let path = self.snapshots.write(&snapshot)?;
        Ok(ProjectionRun { snapshot, path })
    }

    /// Batting then pitching. Stops at the first failure.
    pub fn project_all(&self, date: NaiveDate) -> Result<Vec<ProjectionRun>, EngineError> {
        StatFamily::ALL
            .iter()
            .map(|&family| self.project(date, family))
            .collect()
    }
}
