//! Change records and ordered delta sets.

use std::collections::BTreeSet;

use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::record::FileRecord;

/// Attribute that differs between two records for the same path.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ChangeReason {
    /// Size in bytes changed.
    Size,
    /// Permission bits changed.
    Mode,
    /// Entry type changed (file, directory, symlink, other).
    Type,
    /// Modification time changed.
    Mtime,
}

/// Flat change tag used in reports.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Removed,
    Modified,
}

/// A single classified difference between two snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ChangeRecord {
    /// Path exists only in the later snapshot.
    Added {
        path: CompactString,
        record: FileRecord,
    },
    /// Path exists only in the earlier snapshot.
    Removed {
        path: CompactString,
        record: FileRecord,
    },
    /// Path exists in both with differing attributes.
    Modified {
        path: CompactString,
        before: FileRecord,
        after: FileRecord,
        reasons: BTreeSet<ChangeReason>,
    },
}

impl ChangeRecord {
    /// Create an added record.
    pub fn added(record: FileRecord) -> Self {
        Self::Added {
            path: record.path.clone(),
            record,
        }
    }

    /// Create a removed record.
    pub fn removed(record: FileRecord) -> Self {
        Self::Removed {
            path: record.path.clone(),
            record,
        }
    }

    /// Create a modified record, or `None` when there is no reason.
    pub fn modified(
        before: FileRecord,
        after: FileRecord,
        reasons: BTreeSet<ChangeReason>,
    ) -> Option<Self> {
        if reasons.is_empty() {
            return None;
        }
        Some(Self::Modified {
            path: after.path.clone(),
            before,
            after,
            reasons,
        })
    }

    /// Path this change applies to.
    pub fn path(&self) -> &str {
        match self {
            Self::Added { path, .. } | Self::Removed { path, .. } | Self::Modified { path, .. } => {
                path.as_str()
            }
        }
    }

    /// Flat change tag.
    pub fn kind(&self) -> ChangeKind {
        match self {
            Self::Added { .. } => ChangeKind::Added,
            Self::Removed { .. } => ChangeKind::Removed,
            Self::Modified { .. } => ChangeKind::Modified,
        }
    }

    /// Reasons for a modification (empty for added/removed).
    pub fn reasons(&self) -> Vec<ChangeReason> {
        match self {
            Self::Modified { reasons, .. } => reasons.iter().copied().collect(),
            _ => Vec::new(),
        }
    }

    /// The record as it exists after the change, if it still exists.
    pub fn current(&self) -> Option<&FileRecord> {
        match self {
            Self::Added { record, .. } => Some(record),
            Self::Modified { after, .. } => Some(after),
            Self::Removed { .. } => None,
        }
    }

    /// The same change seen from the other direction.
    pub fn inverted(&self) -> Self {
        match self.clone() {
            Self::Added { path, record } => Self::Removed { path, record },
            Self::Removed { path, record } => Self::Added { path, record },
            Self::Modified {
                path,
                before,
                after,
                reasons,
            } => Self::Modified {
                path,
                before: after,
                after: before,
                reasons,
            },
        }
    }
}

/// Counts per change kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaSummary {
    pub added: usize,
    pub removed: usize,
    pub modified: usize,
    /// Bytes of regular files added.
    pub bytes_added: u64,
}

/// Change records in ascending path order, at most one per path.
///
/// Serialized as a plain list; deserializing sorts it again, so a hand-edited
/// or foreign delta still supports path lookups.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<ChangeRecord>", into = "Vec<ChangeRecord>")]
pub struct DeltaSet {
    changes: Vec<ChangeRecord>,
}

impl DeltaSet {
    /// Create a delta set, sorting the changes by path. Only the first
    /// change given for a path is kept.
    pub fn new(mut changes: Vec<ChangeRecord>) -> Self {
        changes.sort_by(|a, b| a.path().cmp(b.path()));
        changes.dedup_by(|later, earlier| later.path() == earlier.path());
        Self { changes }
    }

    /// Iterate over changes in path order.
    pub fn iter(&self) -> std::slice::Iter<'_, ChangeRecord> {
        self.changes.iter()
    }

    /// Number of changes.
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Check if there are no changes.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Find the change for a path.
    pub fn get(&self, path: &str) -> Option<&ChangeRecord> {
        self.changes
            .binary_search_by(|c| c.path().cmp(path))
            .ok()
            .map(|idx| &self.changes[idx])
    }

    /// Changes of one kind, in path order.
    pub fn of_kind(&self, kind: ChangeKind) -> impl Iterator<Item = &ChangeRecord> {
        self.changes.iter().filter(move |c| c.kind() == kind)
    }

    /// Summarize counts per kind.
    pub fn summary(&self) -> DeltaSummary {
        let mut summary = DeltaSummary::default();
        for change in &self.changes {
            match change {
                ChangeRecord::Added { record, .. } => {
                    summary.added += 1;
                    if record.kind == crate::EntryKind::File {
                        summary.bytes_added += record.size;
                    }
                }
                ChangeRecord::Removed { .. } => summary.removed += 1,
                ChangeRecord::Modified { .. } => summary.modified += 1,
            }
        }
        summary
    }

    /// The delta from the other direction (added and removed swapped).
    pub fn inverted(&self) -> Self {
        Self {
            changes: self.changes.iter().map(ChangeRecord::inverted).collect(),
        }
    }

    /// Underlying changes.
    pub fn as_slice(&self) -> &[ChangeRecord] {
        &self.changes
    }
}

impl From<Vec<ChangeRecord>> for DeltaSet {
    fn from(changes: Vec<ChangeRecord>) -> Self {
        Self::new(changes)
    }
}

impl From<DeltaSet> for Vec<ChangeRecord> {
    fn from(delta: DeltaSet) -> Self {
        delta.changes
    }
}

impl IntoIterator for DeltaSet {
    type Item = ChangeRecord;
    type IntoIter = std::vec::IntoIter<ChangeRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.into_iter()
    }
}

impl<'a> IntoIterator for &'a DeltaSet {
    type Item = &'a ChangeRecord;
    type IntoIter = std::slice::Iter<'a, ChangeRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.iter()
    }
}
