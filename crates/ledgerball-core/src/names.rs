// Player id -> display name lookup, backed by the people register CSV.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use tracing::{info, warn};

use crate::gamelog::PlayerId;
use crate::store::StoreError;

/// Last and first name. Unknown players resolve to two empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayerName {
    pub last: String,
    pub first: String,
}

#[derive(Debug, Clone, Default)]
pub struct NameRegistry {
    names: HashMap<PlayerId, PlayerName>,
}

impl NameRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Read `key_mlbam,name_last,name_first` rows. Other columns are ignored;
    /// rows with a blank or non-numeric id are skipped.
    pub fn from_reader<R: Read>(rdr: R) -> Result<Self, csv::Error> {
        let mut reader = csv::Reader::from_reader(rdr);
        let headers = reader.headers()?.clone();
        let col = |name: &str| headers.iter().position(|h| h.trim() == name);
        let (Some(id_col), last_col, first_col) =
            (col("key_mlbam"), col("name_last"), col("name_first"))
        else {
            warn!("people register has no key_mlbam column; names will be blank");
            return Ok(Self::empty());
        };

        let mut names = HashMap::new();
        for result in reader.records() {
            let record = match result {
                Ok(r) => r,
                Err(e) => {
                    warn!("skipping malformed people row: {e}");
                    continue;
                }
            };
            let Some(id) = record
                .get(id_col)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .and_then(|s| s.parse::<f64>().ok())
                .filter(|v| *v >= 0.0 && v.fract() == 0.0)
            else {
                continue;
            };
            let field = |c: Option<usize>| {
                c.and_then(|i| record.get(i))
                    .unwrap_or("")
                    .trim()
                    .to_string()
            };
            names.insert(
                id as PlayerId,
                PlayerName {
                    last: field(last_col),
                    first: field(first_col),
                },
            );
        }
        Ok(NameRegistry { names })
    }

    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let display = path.display().to_string();
        let file = std::fs::File::open(path).map_err(|e| StoreError::Io {
            path: display.clone(),
            source: e,
        })?;
        let registry = Self::from_reader(file).map_err(|e| StoreError::Csv {
            path: display,
            source: e,
        })?;
        info!(players = registry.len(), "loaded name registry");
        Ok(registry)
    }

    pub fn resolve(&self, id: PlayerId) -> PlayerName {
        self.names.get(&id).cloned().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
