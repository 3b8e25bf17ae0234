//! Snapshot comparison.
//!
//! The delta of two snapshots is computed over the sorted union of their
//! paths, so the result is in ascending path order regardless of how the
//! snapshots were stored or how many threads compared them.

use std::collections::BTreeSet;

use derive_builder::Builder;
use rayon::prelude::*;
use tracing::debug;

use minimo_core::{ChangeReason, ChangeRecord, DeltaSet, FileRecord, Snapshot};

/// Configuration for snapshot comparison.
#[derive(Debug, Clone, Builder)]
#[builder(setter(into))]
pub struct DeltaConfig {
    /// Reasons that never produce a modification on their own.
    #[builder(default)]
    pub ignored_reasons: BTreeSet<ChangeReason>,

    /// Compare in parallel once the path union reaches this size.
    #[builder(default = "4096")]
    pub parallel_threshold: usize,
}

impl Default for DeltaConfig {
    fn default() -> Self {
        Self {
            ignored_reasons: BTreeSet::new(),
            parallel_threshold: 4096,
        }
    }
}

impl DeltaConfig {
    /// Create a new config builder.
    pub fn builder() -> DeltaConfigBuilder {
        DeltaConfigBuilder::default()
    }
}

/// Compares two snapshots.
#[derive(Debug, Clone, Default)]
pub struct DeltaEngine {
    config: DeltaConfig,
}

impl DeltaEngine {
    /// Create an engine tracking every reason.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an engine with custom config.
    pub fn with_config(config: DeltaConfig) -> Self {
        Self { config }
    }

    /// Compute the ordered delta from `before` to `after`.
    pub fn diff(&self, before: &Snapshot, after: &Snapshot) -> DeltaSet {
        let mut paths: Vec<&str> = before
            .paths()
            .chain(after.paths().filter(|p| !before.contains(p)))
            .collect();
        paths.sort_unstable();

        let classify = |path: &&str| -> Option<ChangeRecord> {
            match (before.get(path), after.get(path)) {
                (Some(old), None) => Some(ChangeRecord::removed(old.clone())),
                (None, Some(new)) => Some(ChangeRecord::added(new.clone())),
                (Some(old), Some(new)) => {
                    let mut reasons = compare_records(old, new);
                    reasons.retain(|r| !self.config.ignored_reasons.contains(r));
                    if reasons.is_empty() {
                        None
                    } else {
                        ChangeRecord::modified(old.clone(), new.clone(), reasons)
                    }
                }
                (None, None) => None,
            }
        };

        let changes: Vec<ChangeRecord> = if paths.len() >= self.config.parallel_threshold {
            paths.par_iter().filter_map(classify).collect()
        } else {
            paths.iter().filter_map(classify).collect()
        };

        let delta = DeltaSet::new(changes);
        let summary = delta.summary();
        debug!(
            compared = paths.len(),
            added = summary.added,
            removed = summary.removed,
            modified = summary.modified,
            "delta computed"
        );
        delta
    }
}

/// Compute the delta from `before` to `after` tracking every reason.
pub fn diff(before: &Snapshot, after: &Snapshot) -> DeltaSet {
    DeltaEngine::new().diff(before, after)
}

/// Attributes that differ between two records of the same path.
///
/// `Mode` compares permission bits only; a change of entry type is
/// reported as `Type`.
pub fn compare_records(before: &FileRecord, after: &FileRecord) -> BTreeSet<ChangeReason> {
    let mut reasons = BTreeSet::new();
    if before.size != after.size {
        reasons.insert(ChangeReason::Size);
    }
    if before.permissions() != after.permissions() {
        reasons.insert(ChangeReason::Mode);
    }
    if before.kind != after.kind {
        reasons.insert(ChangeReason::Type);
    }
    if before.mtime != after.mtime {
        reasons.insert(ChangeReason::Mtime);
    }
    reasons
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use minimo_core::{ChangeKind, EntryKind};

    fn at(secs: i64) -> chrono::DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_added_removed_unchanged() {
        let before = Snapshot::from_records(
            "/r",
            [
                FileRecord::file("a", 10, 0o644, at(1)),
                FileRecord::file("b", 20, 0o644, at(1)),
            ],
        );
        let after = Snapshot::from_records(
            "/r",
            [
                FileRecord::file("a", 10, 0o644, at(1)),
                FileRecord::file("c", 5, 0o644, at(1)),
            ],
        );

        let delta = diff(&before, &after);
        let kinds: Vec<(&str, ChangeKind)> = delta.iter().map(|c| (c.path(), c.kind())).collect();
        assert_eq!(kinds, vec![("b", ChangeKind::Removed), ("c", ChangeKind::Added)]);
        assert!(delta.get("a").is_none());
    }

    #[test]
    fn test_only_mtime_differs() {
        let before = Snapshot::from_records("/r", [FileRecord::file("etc/foo.conf", 3, 0o644, at(1))]);
        let after = Snapshot::from_records("/r", [FileRecord::file("etc/foo.conf", 3, 0o644, at(2))]);

        let delta = diff(&before, &after);
        assert_eq!(delta.len(), 1);
        assert_eq!(delta.get("etc/foo.conf").unwrap().reasons(), vec![ChangeReason::Mtime]);
    }

    #[test]
    fn test_type_change_is_not_a_mode_change() {
        let file = FileRecord::new("lib", EntryKind::File, 0, 0o100777, at(1));
        let link = FileRecord::new("lib", EntryKind::Symlink, 0, 0o120777, at(1));
        assert_eq!(compare_records(&file, &link), BTreeSet::from([ChangeReason::Type]));

        let chmod = FileRecord::new("lib", EntryKind::File, 0, 0o100755, at(1));
        assert_eq!(compare_records(&file, &chmod), BTreeSet::from([ChangeReason::Mode]));
    }

    #[test]
    fn test_all_reasons() {
        let a = FileRecord::new("x", EntryKind::File, 1, 0o100644, at(1));
        let b = FileRecord::new("x", EntryKind::Directory, 2, 0o040755, at(2));
        assert_eq!(compare_records(&a, &b).len(), 4);
    }

    #[test]
    fn test_ignored_reasons() {
        let before = Snapshot::from_records("/r", [FileRecord::directory("var", 0o755, at(1))]);
        let after = Snapshot::from_records("/r", [FileRecord::directory("var", 0o755, at(9))]);

        let config = DeltaConfig::builder()
            .ignored_reasons(BTreeSet::from([ChangeReason::Mtime]))
            .build()
            .unwrap();
        assert!(DeltaEngine::with_config(config).diff(&before, &after).is_empty());
        assert_eq!(diff(&before, &after).len(), 1);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let before = Snapshot::from_records(
            "/r",
            (0..500).map(|i| FileRecord::file(format!("f{i:03}"), i, 0o644, at(1))),
        );
        let after = Snapshot::from_records(
            "/r",
            (250..750).map(|i| FileRecord::file(format!("f{i:03}"), i + (i % 2), 0o644, at(1))),
        );

        let sequential = DeltaEngine::new().diff(&before, &after);
        let parallel = DeltaEngine::with_config(
            DeltaConfig::builder().parallel_threshold(1usize).build().unwrap(),
        )
        .diff(&before, &after);
        assert_eq!(sequential, parallel);
        assert_eq!(sequential.summary().removed, 250);
        assert_eq!(sequential.summary().added, 250);
        assert_eq!(sequential.summary().modified, 125);
    }
}
