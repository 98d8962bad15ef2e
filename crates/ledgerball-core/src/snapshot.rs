// Dated projection snapshots: atomic writer, point loader and per-player
// history reader.

use std::collections::BTreeMap;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{Datelike, NaiveDate};
use serde::ser::{Serialize, SerializeMap, Serializer};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::category::{Category, StatFamily};
use crate::gamelog::PlayerId;
use crate::names::PlayerName;

const ID_COLUMN: &str = "mlbam_id";
const LAST_NAME_COLUMN: &str = "name_last";
const FIRST_NAME_COLUMN: &str = "name_first";
const DATE_FORMAT: &str = "%Y-%m-%d";

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("no {family} projections for {date}")]
    NotFound { date: NaiveDate, family: StatFamily },

    #[error("failed to access {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv { path: String, source: csv::Error },

    #[error("malformed snapshot {path}: {message}")]
    Malformed { path: String, message: String },
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// One player's final projected line.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionRecord {
    pub player_id: PlayerId,
    /// Display columns in snapshot order.
    pub stats: Vec<(Category, i64)>,
    pub name: PlayerName,
}

impl ProjectionRecord {
    pub fn get(&self, cat: Category) -> Option<i64> {
        self.stats.iter().find(|(c, _)| *c == cat).map(|(_, v)| *v)
    }
}

/// Serializes as a flat object keyed like the snapshot header.
impl Serialize for ProjectionRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.stats.len() + 3))?;
        map.serialize_entry(ID_COLUMN, &self.player_id)?;
        for (cat, value) in &self.stats {
            map.serialize_entry(cat.label(), value)?;
        }
        map.serialize_entry(LAST_NAME_COLUMN, &self.name.last)?;
        map.serialize_entry(FIRST_NAME_COLUMN, &self.name.first)?;
        map.end()
    }
}

/// Every projected player of one family for one date.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub date: NaiveDate,
    pub family: StatFamily,
    pub columns: Vec<Category>,
    /// Ascending by player id.
    pub records: Vec<ProjectionRecord>,
}

impl Snapshot {
    pub fn record(&self, player_id: PlayerId) -> Option<&ProjectionRecord> {
        self.records
            .binary_search_by_key(&player_id, |r| r.player_id)
            .ok()
            .map(|i| &self.records[i])
    }

    /// Write as CSV: id, display columns, last name, first name.
    pub fn write_csv<W: Write>(&self, out: W) -> Result<(), csv::Error> {
        let mut writer = csv::Writer::from_writer(out);
        let mut header = vec![ID_COLUMN.to_string()];
        header.extend(self.columns.iter().map(|c| c.label().to_string()));
        header.push(LAST_NAME_COLUMN.to_string());
        header.push(FIRST_NAME_COLUMN.to_string());
        writer.write_record(&header)?;

        for record in &self.records {
            let mut row = vec![record.player_id.to_string()];
            row.extend(
                self.columns
                    .iter()
                    .map(|&c| record.get(c).unwrap_or(0).to_string()),
            );
            row.push(record.name.last.clone());
            row.push(record.name.first.clone());
            writer.write_record(&row)?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// A past projection of one player.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub date: NaiveDate,
    pub record: ProjectionRecord,
}

// ---------------------------------------------------------------------------
// CSV parsing
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum ReadError {
    Csv(csv::Error),
    Malformed(String),
}

impl From<csv::Error> for ReadError {
    fn from(e: csv::Error) -> Self {
        ReadError::Csv(e)
    }
}

/// Parse a snapshot body. Numeric cells are read as floats and rounded so
/// files written by other tools with decimal values still load as integers.
fn read_snapshot<R: Read>(
    rdr: R,
    date: NaiveDate,
    family: StatFamily,
) -> Result<Snapshot, ReadError> {
    let mut reader = csv::Reader::from_reader(rdr);
    let headers = reader.headers()?.clone();
    let labels: Vec<&str> = headers.iter().map(str::trim).collect();

    let id_col = labels
        .iter()
        .position(|h| *h == ID_COLUMN)
        .ok_or_else(|| ReadError::Malformed(format!("missing {ID_COLUMN} column")))?;
    let last_col = labels.iter().position(|h| *h == LAST_NAME_COLUMN);
    let first_col = labels.iter().position(|h| *h == FIRST_NAME_COLUMN);

    let mut stat_cols = Vec::new();
    for (i, label) in labels.iter().enumerate() {
        if i == id_col || Some(i) == last_col || Some(i) == first_col {
            continue;
        }
        let cat = Category::from_label(label)
            .ok_or_else(|| ReadError::Malformed(format!("unknown column '{label}'")))?;
        stat_cols.push((i, cat));
    }

    let mut records = Vec::new();
    for result in reader.records() {
        let row = result?;
        let cell = |i: usize| row.get(i).unwrap_or("").trim();
        let number = |i: usize| -> Result<f64, ReadError> {
            let text = cell(i);
            if text.is_empty() {
                return Ok(0.0);
            }
            text.parse::<f64>()
                .map_err(|_| ReadError::Malformed(format!("non-numeric value '{text}'")))
        };

        let player_id = number(id_col)?;
        if player_id < 0.0 || player_id.fract() != 0.0 {
            return Err(ReadError::Malformed(format!("invalid player id {player_id}")));
        }
        let mut stats = Vec::with_capacity(stat_cols.len());
        for &(i, cat) in &stat_cols {
            stats.push((cat, number(i)?.round() as i64));
        }
        records.push(ProjectionRecord {
            player_id: player_id as PlayerId,
            stats,
            name: PlayerName {
                last: last_col.map(cell).unwrap_or("").to_string(),
                first: first_col.map(cell).unwrap_or("").to_string(),
            },
        });
    }
    records.sort_by_key(|r| r.player_id);

    Ok(Snapshot {
        date,
        family,
        columns: stat_cols.into_iter().map(|(_, c)| c).collect(),
        records,
    })
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Snapshot files under `<root>/<family>/<YYYY-MM-DD>.csv`.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    root: PathBuf,
}

impl SnapshotStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        SnapshotStore {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn family_dir(&self, family: StatFamily) -> PathBuf {
        self.root.join(family.as_str())
    }

    pub fn path_for(&self, date: NaiveDate, family: StatFamily) -> PathBuf {
        self.family_dir(family)
            .join(format!("{}.csv", date.format(DATE_FORMAT)))
    }

    /// Write a snapshot atomically: the full body goes to a uniquely named
    /// temp file in the target directory, which is then renamed over the
    /// target. Readers see either the old file or the new one.
    pub fn write(&self, snapshot: &Snapshot) -> Result<PathBuf, SnapshotError> {
        let dir = self.family_dir(snapshot.family);
        fs::create_dir_all(&dir).map_err(|e| io_error(&dir, e))?;

        let mut body = Vec::new();
        snapshot
            .write_csv(&mut body)
            .map_err(|e| SnapshotError::Csv {
                path: dir.display().to_string(),
                source: e,
            })?;

        let target = self.path_for(snapshot.date, snapshot.family);
        let tmp = dir.join(format!(
            ".{}.{}.{}.{}.tmp",
            snapshot.date.format(DATE_FORMAT),
            std::process::id(),
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_nanos())
                .unwrap_or(0),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed),
        ));

        if let Err(e) = replace_file(&tmp, &target, &body) {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }

        info!(
            family = snapshot.family.as_str(),
            date = %snapshot.date,
            players = snapshot.records.len(),
            path = %target.display(),
            "wrote projection snapshot"
        );
        Ok(target)
    }

    /// Load the snapshot for `date`.
    pub fn load(&self, date: NaiveDate, family: StatFamily) -> Result<Snapshot, SnapshotError> {
        let path = self.path_for(date, family);
        let display = path.display().to_string();
        let file = match fs::File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SnapshotError::NotFound { date, family });
            }
            Err(e) => return Err(io_error(&path, e)),
        };
        read_snapshot(file, date, family).map_err(|e| match e {
            ReadError::Csv(source) => SnapshotError::Csv {
                path: display,
                source,
            },
            ReadError::Malformed(message) => SnapshotError::Malformed {
                path: display,
                message,
            },
        })
    }

    /// Dates with a snapshot on disk, ascending. A missing family directory
    /// means no snapshots yet.
    pub fn dates(&self, family: StatFamily) -> Result<Vec<NaiveDate>, SnapshotError> {
        let dir = self.family_dir(family);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(io_error(&dir, e)),
        };

        let mut dates = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("csv") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match NaiveDate::parse_from_str(stem, DATE_FORMAT) {
                Ok(date) => dates.push(date),
                Err(_) => debug!("ignoring non-snapshot file {}", path.display()),
            }
        }
        dates.sort();
        Ok(dates)
    }

    /// A player's past projections up to and including `as_of`, newest
    /// first. Only snapshots that contain the player count: their newest,
    /// plus the earliest of every earlier calendar month.
    pub fn player_history(
        &self,
        player_id: PlayerId,
        family: StatFamily,
        as_of: NaiveDate,
    ) -> Result<Vec<HistoryEntry>, SnapshotError> {
        let mut found: BTreeMap<NaiveDate, ProjectionRecord> = BTreeMap::new();
        for date in self.dates(family)?.into_iter().filter(|d| *d <= as_of) {
            let snapshot = match self.load(date, family) {
                Ok(s) => s,
                // Removed between listing and reading.
                Err(SnapshotError::NotFound { .. }) => continue,
                Err(SnapshotError::Malformed { path, message }) => {
                    warn!("skipping malformed snapshot {path}: {message}");
                    continue;
                }
                Err(e) => return Err(e),
            };
            if let Some(record) = snapshot.record(player_id) {
                found.insert(date, record.clone());
            }
        }

        let dates: Vec<NaiveDate> = found.keys().copied().collect();
        Ok(select_history_dates(&dates)
            .into_iter()
            .filter_map(|date| {
                found
                    .remove(&date)
                    .map(|record| HistoryEntry { date, record })
            })
            .collect())
    }
}

fn io_error(path: &Path, source: std::io::Error) -> SnapshotError {
    SnapshotError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Write `body` to `tmp`, flush it to disk, then rename it over `target`.
fn replace_file(tmp: &Path, target: &Path, body: &[u8]) -> Result<(), SnapshotError> {
    let mut file = fs::File::create(tmp).map_err(|e| io_error(tmp, e))?;
    file.write_all(body).map_err(|e| io_error(tmp, e))?;
    file.sync_all().map_err(|e| io_error(tmp, e))?;
    fs::rename(tmp, target).map_err(|e| io_error(target, e))
}

/// From ascending `dates`, keep the newest plus the earliest date of each
/// calendar month before the newest's month. Returned newest first.
fn select_history_dates(dates: &[NaiveDate]) -> Vec<NaiveDate> {
    let Some(&newest) = dates.last() else {
        return vec![];
    };
    let newest_month = (newest.year(), newest.month());

    let mut first_of_month: BTreeMap<(i32, u32), NaiveDate> = BTreeMap::new();
    for &d in dates {
        let month = (d.year(), d.month());
        if month < newest_month {
            first_of_month.entry(month).or_insert(d);
        }
    }

    let mut selected = vec![newest];
    selected.extend(first_of_month.values().rev().copied());
    selected
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DATE_FORMAT).unwrap()
    }

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(name);
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    fn sample_snapshot(on: &str, hr: i64) -> Snapshot {
        let columns = vec![Category::PA, Category::HR, Category::BB];
        let records = vec![
            ProjectionRecord {
                player_id: 545361,
                stats: vec![(Category::PA, 650), (Category::HR, hr), (Category::BB, 80)],
                name: PlayerName {
                    last: "Trout".into(),
                    first: "Mike".into(),
                },
            },
            ProjectionRecord {
                player_id: 660271,
                stats: vec![(Category::PA, 650), (Category::HR, 30), (Category::BB, 70)],
                name: PlayerName::default(),
            },
        ];
        Snapshot {
            date: date(on),
            family: StatFamily::Batting,
            columns,
            records,
        }
    }

    #[test]
    fn write_then_load_round_trips() {
        let dir = scratch("ledgerball_snapshot_round_trip");
        let store = SnapshotStore::new(&dir);
        let snap = sample_snapshot("2023-07-01", 38);

        let path = store.write(&snap).unwrap();
        assert_eq!(path, dir.join("batting/2023-07-01.csv"));
        let loaded = store.load(snap.date, StatFamily::Batting).unwrap();
        assert_eq!(loaded, snap);

        let leftovers: Vec<_> = fs::read_dir(dir.join("batting"))
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty(), "temp file left behind");

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn header_layout() {
        let mut out = Vec::new();
        sample_snapshot("2023-07-01", 38).write_csv(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("mlbam_id,PA,HR,BB,name_last,name_first"));
        assert_eq!(lines.next(), Some("545361,650,38,80,Trout,Mike"));
        assert_eq!(lines.next(), Some("660271,650,30,70,,"));
    }

    #[test]
    fn overwrite_replaces_whole_file() {
        let dir = scratch("ledgerball_snapshot_overwrite");
        let store = SnapshotStore::new(&dir);
        store.write(&sample_snapshot("2023-07-01", 38)).unwrap();
        store.write(&sample_snapshot("2023-07-01", 41)).unwrap();
        let loaded = store.load(date("2023-07-01"), StatFamily::Batting).unwrap();
        assert_eq!(loaded.record(545361).unwrap().get(Category::HR), Some(41));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_snapshot_is_not_found() {
        let dir = scratch("ledgerball_snapshot_missing");
        let store = SnapshotStore::new(&dir);
        let err = store
            .load(date("2023-07-01"), StatFamily::Pitching)
            .unwrap_err();
        match err {
            SnapshotError::NotFound { date: d, family } => {
                assert_eq!(d, date("2023-07-01"));
                assert_eq!(family, StatFamily::Pitching);
            }
            other => panic!("expected NotFound, got: {other}"),
        }
        assert!(store.dates(StatFamily::Pitching).unwrap().is_empty());
    }

    #[test]
    fn decimal_cells_round_to_integers() {
        let csv = "mlbam_id,PA,HR,name_last,name_first\n545361,649.6,37.4,Trout,Mike\n";
        let snap = read_snapshot(csv.as_bytes(), date("2023-07-01"), StatFamily::Batting).unwrap();
        assert_eq!(snap.records[0].get(Category::PA), Some(650));
        assert_eq!(snap.records[0].get(Category::HR), Some(37));
    }

    #[test]
    fn unknown_column_is_malformed() {
        let csv = "mlbam_id,XBH,name_last,name_first\n1,2,A,B\n";
        let err = read_snapshot(csv.as_bytes(), date("2023-07-01"), StatFamily::Batting)
            .unwrap_err();
        assert!(matches!(err, ReadError::Malformed(ref m) if m.contains("XBH")));
    }

    #[test]
    fn history_keeps_newest_and_first_of_each_earlier_month() {
        let dates: Vec<NaiveDate> = [
            "2023-04-01",
            "2023-04-15",
            "2023-05-03",
            "2023-05-20",
            "2023-06-01",
            "2023-06-10",
            "2023-06-12",
        ]
        .iter()
        .map(|s| date(s))
        .collect();
        assert_eq!(
            select_history_dates(&dates),
            vec![date("2023-06-12"), date("2023-05-03"), date("2023-04-01")]
        );
        assert!(select_history_dates(&[]).is_empty());
    }

    #[test]
    fn player_history_reads_selected_snapshots() {
        let dir = scratch("ledgerball_snapshot_history");
        let store = SnapshotStore::new(&dir);
        for (on, hr) in [
            ("2023-05-01", 30),
            ("2023-05-15", 31),
            ("2023-06-01", 33),
            ("2023-06-20", 35),
            ("2023-07-01", 38),
        ] {
            store.write(&sample_snapshot(on, hr)).unwrap();
        }
        fs::write(dir.join("batting/notes.txt"), "scratch").unwrap();

        let history = store
            .player_history(545361, StatFamily::Batting, date("2023-06-30"))
            .unwrap();
        let got: Vec<(NaiveDate, Option<i64>)> = history
            .iter()
            .map(|h| (h.date, h.record.get(Category::HR)))
            .collect();
        assert_eq!(
            got,
            vec![(date("2023-06-20"), Some(35)), (date("2023-05-01"), Some(30))]
        );

        assert!(store
            .player_history(1, StatFamily::Batting, date("2023-07-01"))
            .unwrap()
            .is_empty());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn player_history_skips_snapshots_without_the_player() {
        let dir = scratch("ledgerball_snapshot_history_absent");
        let store = SnapshotStore::new(&dir);
        for (on, hr) in [("2023-05-01", 30), ("2023-06-01", 33), ("2023-06-15", 35)] {
            store.write(&sample_snapshot(on, hr)).unwrap();
        }
        // Culled from the newest run.
        let mut latest = sample_snapshot("2023-06-20", 36);
        latest.records.retain(|r| r.player_id != 545361);
        store.write(&latest).unwrap();

        let got: Vec<(NaiveDate, Option<i64>)> = store
            .player_history(545361, StatFamily::Batting, date("2023-06-30"))
            .unwrap()
            .iter()
            .map(|h| (h.date, h.record.get(Category::HR)))
            .collect();
        assert_eq!(
            got,
            vec![(date("2023-06-15"), Some(35)), (date("2023-05-01"), Some(30))]
        );

        let other = store
            .player_history(660271, StatFamily::Batting, date("2023-06-30"))
            .unwrap();
        assert_eq!(other[0].date, date("2023-06-20"));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn records_serialize_as_flat_objects() {
        let snap = sample_snapshot("2023-07-01", 38);
        let json = serde_json::to_value(&snap.records[0]).unwrap();
        assert_eq!(json["mlbam_id"], 545361);
        assert_eq!(json["HR"], 38);
        assert_eq!(json["name_first"], "Mike");
    }
}
