// Stat store adapters: per-game lines from SQLite or CSV, coerced into
// uniformly typed `GameStatLine`s.

use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::NaiveDate;
use rusqlite::types::ValueRef;
use rusqlite::{params_from_iter, Connection};
use thiserror::Error;
use tracing::{info, warn};

use crate::category::{Category, StatFamily, StatLine};
use crate::config::{DataPaths, StoreKind};
use crate::gamelog::{
    convert_innings, derive_columns, is_quality_start, GameStatLine, GameType, LevelId, PlayerId,
};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open stat store at {path}: {source}")]
    Open {
        path: String,
        source: rusqlite::Error,
    },

    #[error("query against `{table}` failed: {source}")]
    Query {
        table: String,
        source: rusqlite::Error,
    },

    #[error("failed to read file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv { path: String, source: csv::Error },
}

// ---------------------------------------------------------------------------
// StatStore trait
// ---------------------------------------------------------------------------

/// Read-only access to every ingested game line of a family. Implementations
/// must already have converted innings notation and filled the derived
/// columns (see `derive_columns`).
pub trait StatStore: Send + Sync {
    fn game_lines(&self, family: StatFamily) -> Result<Vec<GameStatLine>, StoreError>;
}

/// Open the store named by `[paths]` in engine.toml.
pub fn open_store(paths: &DataPaths) -> Result<Box<dyn StatStore>, StoreError> {
    match paths.store_kind {
        StoreKind::Sqlite => Ok(Box::new(GameLogDb::open(&paths.store)?)),
        StoreKind::Csv => Ok(Box::new(CsvStore::new(&paths.store))),
    }
}

/// Lines held in memory, already typed. Used by tests and callers that
/// assemble their own history.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    pub batting: Vec<GameStatLine>,
    pub pitching: Vec<GameStatLine>,
}

impl MemoryStore {
    pub fn new(batting: Vec<GameStatLine>, pitching: Vec<GameStatLine>) -> Self {
        MemoryStore { batting, pitching }
    }
}

impl StatStore for MemoryStore {
    fn game_lines(&self, family: StatFamily) -> Result<Vec<GameStatLine>, StoreError> {
        Ok(match family {
            StatFamily::Batting => self.batting.clone(),
            StatFamily::Pitching => self.pitching.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// Raw row coercion
// ---------------------------------------------------------------------------

/// One untyped cell as read from a store.
#[derive(Debug, Clone, PartialEq)]
enum Cell {
    Null,
    Int(i64),
    Real(f64),
    Text(String),
}

impl Cell {
    /// Numeric value with the store's lenient coercion: NULL and empty text
    /// count as zero.
    fn number(&self) -> Result<f64, String> {
        match self {
            Cell::Null => Ok(0.0),
            Cell::Int(i) => Ok(*i as f64),
            Cell::Real(f) => Ok(*f),
            Cell::Text(s) if s.trim().is_empty() => Ok(0.0),
            Cell::Text(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| format!("non-numeric value '{s}'")),
        }
    }

    /// NULL, or text with nothing but whitespace.
    fn is_blank(&self) -> bool {
        match self {
            Cell::Null => true,
            Cell::Text(s) => s.trim().is_empty(),
            Cell::Int(_) | Cell::Real(_) => false,
        }
    }

    fn text(&self) -> Option<String> {
        match self {
            Cell::Null => None,
            Cell::Int(i) => Some(i.to_string()),
            Cell::Real(f) => Some(f.to_string()),
            Cell::Text(s) => Some(s.trim().to_string()),
        }
    }
}

/// Column name -> cell for one stored row.
type RawRow = HashMap<String, Cell>;

const PLAYER_COLUMNS: &[&str] = &["player_id", "mlbam_id"];
const DATE_COLUMNS: &[&str] = &["game_date", "date"];
const LEVEL_COLUMNS: &[&str] = &["league_id", "sport_id", "level"];

fn first_present<'a>(row: &'a RawRow, names: &[&str]) -> Option<&'a Cell> {
    names.iter().find_map(|n| row.get(*n)).filter(|c| **c != Cell::Null)
}

fn parse_id(row: &RawRow, names: &[&str], what: &str) -> Result<u32, String> {
    let cell = first_present(row, names).ok_or_else(|| format!("missing {what}"))?;
    let value = cell.number()?;
    if value < 0.0 || value.fract() != 0.0 || value > u32::MAX as f64 {
        return Err(format!("invalid {what} {value}"));
    }
    Ok(value as u32)
}

fn parse_date(row: &RawRow) -> Result<NaiveDate, String> {
    let text = first_present(row, DATE_COLUMNS)
        .and_then(Cell::text)
        .ok_or("missing game date")?;
    // Timestamps carry a time suffix; the calendar date is the first ten chars.
    let day = text.get(..10).unwrap_or(&text);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").map_err(|_| format!("invalid game date '{text}'"))
}

/// Turn one raw row into a typed line, applying the load-time derivations.
fn parse_row(family: StatFamily, row: &RawRow) -> Result<GameStatLine, String> {
    let player_id: PlayerId = parse_id(row, PLAYER_COLUMNS, "player id")?;
    let game_date = parse_date(row)?;
    let level: LevelId = parse_id(row, LEVEL_COLUMNS, "level")?;
    let game_type: GameType = row
        .get("game_type")
        .and_then(Cell::text)
        .ok_or("missing game type")?
        .parse()?;

    let mut stats = StatLine::new();
    for &cat in family.raw_columns() {
        if let Some(cell) = row.get(cat.label()) {
            stats[cat] = cell.number().map_err(|e| format!("{cat}: {e}"))?;
        }
    }

    if family == StatFamily::Pitching {
        stats[Category::IP] = convert_innings(stats[Category::IP]);
        let has_qs = row.get(Category::QS.label()).is_some_and(|c| !c.is_blank());
        if !has_qs {
            let qs = is_quality_start(stats[Category::GS], stats[Category::IP], stats[Category::ER]);
            stats[Category::QS] = if qs { 1.0 } else { 0.0 };
        }
    }
    derive_columns(family, &mut stats);

    Ok(GameStatLine {
        player_id,
        game_date,
        level,
        game_type,
        stats,
    })
}

/// Parse every raw row, skipping (and logging) malformed ones.
fn collect_lines(family: StatFamily, rows: impl IntoIterator<Item = RawRow>) -> Vec<GameStatLine> {
    let mut lines = Vec::new();
    let mut skipped = 0usize;
    for row in rows {
        match parse_row(family, &row) {
            Ok(line) => lines.push(line),
            Err(e) => {
                skipped += 1;
                warn!("skipping malformed {family} row: {e}");
            }
        }
    }
    info!(
        family = family.as_str(),
        lines = lines.len(),
        skipped,
        "loaded game lines"
    );
    lines
}

// ---------------------------------------------------------------------------
// SQLite store
// ---------------------------------------------------------------------------

/// SQLite-backed game log with one table per family. The ingestion side
/// writes through `insert_line`; the engine only ever reads.
pub struct GameLogDb {
    conn: Mutex<Connection>,
}

impl GameLogDb {
    /// Open (or create) a database at `path` and ensure both tables exist.
    /// Pass `":memory:"` for an ephemeral database.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|e| StoreError::Open {
            path: path.to_string(),
            source: e,
        })?;

        conn.execute_batch("PRAGMA busy_timeout = 5000;")
            .map_err(|e| StoreError::Open {
                path: path.to_string(),
                source: e,
            })?;

        for family in StatFamily::ALL {
            conn.execute_batch(&create_table_sql(family))
                .map_err(|e| StoreError::Query {
                    table: family.as_str().to_string(),
                    source: e,
                })?;
        }

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A poisoned lock only means another thread panicked mid-query; the
        // connection itself is still usable.
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Store one line in ingested form: innings in thirds notation, no
    /// derived columns.
    pub fn insert_line(&self, family: StatFamily, line: &GameStatLine) -> Result<(), StoreError> {
        let columns = family.raw_columns();
        let names: Vec<String> = columns.iter().map(|c| format!("\"{}\"", c.label())).collect();
        let placeholders: Vec<String> = (5..5 + columns.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "INSERT INTO {table} (player_id, game_date, league_id, game_type, {names}) \
             VALUES (?1, ?2, ?3, ?4, {placeholders})",
            table = family.as_str(),
            names = names.join(", "),
            placeholders = placeholders.join(", "),
        );

        let mut values: Vec<rusqlite::types::Value> = vec![
            i64::from(line.player_id).into(),
            line.game_date.format("%Y-%m-%d").to_string().into(),
            i64::from(line.level).into(),
            line.game_type.code().to_string().into(),
        ];
        values.extend(columns.iter().map(|&c| line.stats[c].into()));

        self.conn()
            .execute(&sql, params_from_iter(values))
            .map_err(|e| StoreError::Query {
                table: family.as_str().to_string(),
                source: e,
            })?;
        Ok(())
    }
}

fn create_table_sql(family: StatFamily) -> String {
    let stat_columns: Vec<String> = family
        .raw_columns()
        .iter()
        .map(|c| format!("\"{}\" REAL", c.label()))
        .collect();
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            player_id INTEGER NOT NULL,
            game_date TEXT NOT NULL,
            league_id INTEGER NOT NULL,
            game_type TEXT NOT NULL,
            {stats}
        );",
        table = family.as_str(),
        stats = stat_columns.join(",\n            "),
    )
}

impl StatStore for GameLogDb {
    fn game_lines(&self, family: StatFamily) -> Result<Vec<GameStatLine>, StoreError> {
        let table = family.as_str();
        let query_err = |e| StoreError::Query {
            table: table.to_string(),
            source: e,
        };

        let conn = self.conn();
        let mut stmt = conn
            .prepare(&format!("SELECT * FROM {table}"))
            .map_err(query_err)?;
        let names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();

        let rows = stmt
            .query_map([], |row| {
                let mut raw = RawRow::with_capacity(names.len());
                for (i, name) in names.iter().enumerate() {
                    let cell = match row.get_ref(i)? {
                        ValueRef::Null | ValueRef::Blob(_) => Cell::Null,
                        ValueRef::Integer(v) => Cell::Int(v),
                        ValueRef::Real(v) => Cell::Real(v),
                        ValueRef::Text(t) => Cell::Text(String::from_utf8_lossy(t).into_owned()),
                    };
                    raw.insert(name.clone(), cell);
                }
                Ok(raw)
            })
            .map_err(query_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(query_err)?;

        Ok(collect_lines(family, rows))
    }
}

// ---------------------------------------------------------------------------
// CSV store
// ---------------------------------------------------------------------------

/// A directory holding `batting.csv` and `pitching.csv` exports.
#[derive(Debug, Clone)]
pub struct CsvStore {
    dir: PathBuf,
}

impl CsvStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        CsvStore {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn path_for(&self, family: StatFamily) -> PathBuf {
        self.dir.join(format!("{}.csv", family.as_str()))
    }
}

fn lines_from_reader<R: Read>(family: StatFamily, rdr: R) -> Result<Vec<GameStatLine>, csv::Error> {
    let mut reader = csv::Reader::from_reader(rdr);
    let headers = reader.headers()?.clone();
    let mut rows = Vec::new();
    for result in reader.records() {
        match result {
            Ok(record) => {
                let raw: RawRow = headers
                    .iter()
                    .zip(record.iter())
                    .map(|(h, v)| (h.trim().to_string(), Cell::Text(v.to_string())))
                    .collect();
                rows.push(raw);
            }
            Err(e) => warn!("skipping unreadable {family} record: {e}"),
        }
    }
    Ok(collect_lines(family, rows))
}

impl StatStore for CsvStore {
    fn game_lines(&self, family: StatFamily) -> Result<Vec<GameStatLine>, StoreError> {
        let path = self.path_for(family);
        let display = path.display().to_string();
        let file = std::fs::File::open(&path).map_err(|e| StoreError::Io {
            path: display.clone(),
            source: e,
        })?;
        lines_from_reader(family, file).map_err(|e| StoreError::Csv {
            path: display,
            source: e,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
