//! Point-in-time filesystem state.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use compact_str::CompactString;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ScanWarning;
use crate::record::FileRecord;

/// Mapping from normalized relative path to file metadata.
///
/// Keys are unique by construction: inserting a record for a path that is
/// already present replaces it. The empty path (the root itself) is never a
/// key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Root path the snapshot was taken from.
    pub root: PathBuf,

    /// When the snapshot was taken.
    pub taken_at: DateTime<Utc>,

    /// Entries keyed by relative path.
    #[serde(deserialize_with = "deserialize_entries")]
    entries: HashMap<CompactString, FileRecord>,

    /// Entries skipped during the walk.
    #[serde(default)]
    pub warnings: Vec<ScanWarning>,
}

impl Snapshot {
    /// Create an empty snapshot for a root.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            taken_at: Utc::now(),
            entries: HashMap::new(),
            warnings: Vec::new(),
        }
    }

    /// Create a snapshot from records.
    pub fn from_records(root: impl Into<PathBuf>, records: impl IntoIterator<Item = FileRecord>) -> Self {
        let mut snapshot = Self::new(root);
        for record in records {
            snapshot.insert(record);
        }
        snapshot
    }

    /// Create a snapshot from an already keyed map.
    ///
    /// Entries are re-keyed by their record's own path.
    pub fn from_entries(
        root: impl Into<PathBuf>,
        entries: HashMap<CompactString, FileRecord>,
        warnings: Vec<ScanWarning>,
    ) -> Self {
        let mut snapshot = Self::new(root);
        snapshot.entries = rekey(entries);
        snapshot.warnings = warnings;
        snapshot
    }

    /// Insert a record, returning the record it replaced.
    ///
    /// Records with an empty path are ignored.
    pub fn insert(&mut self, record: FileRecord) -> Option<FileRecord> {
        if record.path.is_empty() {
            return None;
        }
        self.entries.insert(record.path.clone(), record)
    }

    /// Get the record for a path.
    pub fn get(&self, path: &str) -> Option<&FileRecord> {
        self.entries.get(path)
    }

    /// Check if a path is present.
    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the snapshot has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over records in unspecified order.
    pub fn records(&self) -> impl Iterator<Item = &FileRecord> {
        self.entries.values()
    }

    /// Iterate over paths in unspecified order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|k| k.as_str())
    }

    /// All paths in ascending byte order.
    pub fn sorted_paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self.entries.keys().map(|k| k.as_str()).collect();
        paths.sort_unstable();
        paths
    }

    /// Total size of all regular files.
    pub fn total_size(&self) -> u64 {
        self.entries
            .values()
            .filter(|r| r.kind == crate::EntryKind::File)
            .map(|r| r.size)
            .sum()
    }

    /// Check if any entry was skipped.
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Key every record by its own path, dropping the root. When two entries
/// carry the same path, the one already stored under that key wins.
fn rekey(entries: HashMap<CompactString, FileRecord>) -> HashMap<CompactString, FileRecord> {
    let mut keyed: HashMap<CompactString, FileRecord> = HashMap::with_capacity(entries.len());
    for (key, record) in entries {
        if record.path.is_empty() {
            continue;
        }
        if key == record.path || !keyed.contains_key(&record.path) {
            keyed.insert(record.path.clone(), record);
        }
    }
    keyed
}

fn deserialize_entries<'de, D>(
    deserializer: D,
) -> Result<HashMap<CompactString, FileRecord>, D::Error>
where
    D: Deserializer<'de>,
{
    HashMap::deserialize(deserializer).map(rekey)
}
