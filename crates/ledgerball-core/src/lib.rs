// Data model, configuration, stat store adapters, name lookup and
// projection snapshots shared by the engine and the CLI.

pub mod category;
pub mod config;
pub mod gamelog;
pub mod names;
pub mod snapshot;
pub mod store;
pub mod strategy;

pub use category::{Category, StatFamily, StatLine};
pub use config::{Config, EngineConfig, Settings};
pub use gamelog::{GameStatLine, GameType, LevelId, PlayerId};
pub use names::{NameRegistry, PlayerName};
pub use snapshot::{HistoryEntry, ProjectionRecord, Snapshot, SnapshotError, SnapshotStore};
pub use store::{StatStore, StoreError};
pub use strategy::Strategy;
