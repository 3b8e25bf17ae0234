//! JWalk-based snapshot engine.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Instant, UNIX_EPOCH};

#[cfg(unix)]
use std::os::unix::fs::MetadataExt;

use chrono::{DateTime, Utc};
use compact_str::CompactString;
use dashmap::DashMap;
use jwalk::{Parallelism, WalkDir};
use rayon::prelude::*;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use minimo_core::{
    EntryKind, FileRecord, IgnoreRules, ScanWarning, Snapshot, SnapshotConfig, SnapshotError,
    relative_to,
};

use crate::progress::SnapshotProgress;

/// Send a progress update every this many entries.
const PROGRESS_INTERVAL: u64 = 1000;

/// Snapshot engine using jwalk for traversal and rayon for metadata reads.
pub struct JwalkSnapshotter {
    progress_tx: broadcast::Sender<SnapshotProgress>,
}

impl JwalkSnapshotter {
    /// Create a new snapshotter.
    pub fn new() -> Self {
        let (progress_tx, _) = broadcast::channel(100);
        Self { progress_tx }
    }

    /// Subscribe to snapshot progress updates.
    pub fn subscribe(&self) -> broadcast::Receiver<SnapshotProgress> {
        self.progress_tx.subscribe()
    }

    /// Take a snapshot of the configured root.
    pub fn snapshot(&self, config: &SnapshotConfig) -> Result<Snapshot, SnapshotError> {
        self.snapshot_with_cancel(config, &CancellationToken::new())
    }

    /// Take a snapshot, stopping early once `cancel` is triggered.
    pub fn snapshot_with_cancel(
        &self,
        config: &SnapshotConfig,
        cancel: &CancellationToken,
    ) -> Result<Snapshot, SnapshotError> {
        let start = Instant::now();
        let ignore = config.ignore_rules()?;
        let prune = config.prune_rules()?;
        let root = open_root(&config.root)?;

        let mut warnings = Vec::new();
        let candidates = self.list_entries(config, &root, &ignore, prune, cancel, &mut warnings)?;
        let listed = candidates.len() as u64;

        let records: DashMap<CompactString, FileRecord> = DashMap::with_capacity(candidates.len());
        let read_counter = AtomicU64::new(0);
        let read_all = || -> Vec<ScanWarning> {
            candidates
                .par_iter()
                .filter_map(|candidate| {
                    if cancel.is_cancelled() {
                        return None;
                    }
                    let count = read_counter.fetch_add(1, Ordering::Relaxed);
                    if count % PROGRESS_INTERVAL == 0 {
                        let _ = self.progress_tx.send(SnapshotProgress {
                            entries_listed: listed,
                            records_read: count,
                            current_path: candidate.path.clone(),
                            warnings: 0,
                            elapsed: start.elapsed(),
                        });
                    }

                    match std::fs::symlink_metadata(&candidate.path) {
                        Ok(metadata) => {
                            let record = record_from_metadata(candidate.rel.clone(), &metadata);
                            records.insert(candidate.rel.clone(), record);
                            None
                        }
                        Err(err) => {
                            warn!(path = %candidate.path.display(), error = %err, "skipping unreadable entry");
                            Some(ScanWarning::metadata(&candidate.path, &err))
                        }
                    }
                })
                .collect()
        };

        let entry_warnings = match config.threads {
            0 => read_all(),
            n => rayon::ThreadPoolBuilder::new()
                .num_threads(n)
                .build()
                .map_err(|e| SnapshotError::InvalidConfig {
                    message: format!("cannot build thread pool: {e}"),
                })?
                .install(read_all),
        };

        if cancel.is_cancelled() {
            return Err(SnapshotError::Cancelled);
        }
        warnings.extend(entry_warnings);

        let entries: HashMap<CompactString, FileRecord> = records.into_iter().collect();
        let snapshot = Snapshot::from_entries(root.clone(), entries, warnings);

        let _ = self.progress_tx.send(SnapshotProgress {
            entries_listed: listed,
            records_read: snapshot.len() as u64,
            current_path: root.clone(),
            warnings: snapshot.warnings.len() as u64,
            elapsed: start.elapsed(),
        });
        debug!(
            root = %root.display(),
            entries = snapshot.len(),
            warnings = snapshot.warnings.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "snapshot complete"
        );

        Ok(snapshot)
    }

    /// Walk the tree and collect every entry that survives the ignore rules.
    fn list_entries(
        &self,
        config: &SnapshotConfig,
        root: &Path,
        ignore: &IgnoreRules,
        prune: IgnoreRules,
        cancel: &CancellationToken,
        warnings: &mut Vec<ScanWarning>,
    ) -> Result<Vec<Candidate>, SnapshotError> {
        let parallelism = match config.threads {
            0 => Parallelism::RayonDefaultPool {
                busy_timeout: std::time::Duration::from_millis(100),
            },
            n => Parallelism::RayonNewPool(n),
        };

        let mut walker = WalkDir::new(root)
            .parallelism(parallelism)
            .skip_hidden(false)
            .follow_links(false)
            .min_depth(1);

        let prune = Arc::new(prune);
        let prune_root = root.to_path_buf();
        walker = walker.process_read_dir(move |_depth, _dir, _state, children| {
            // Prune rules apply to directories only.
            children.retain(|child| match child {
                Ok(entry) if entry.file_type().is_dir() => {
                    match relative_to(&prune_root, &entry.path()) {
                        Ok(Some(rel)) => !prune.is_match(&rel),
                        _ => true,
                    }
                }
                _ => true,
            });
            // Everything below a non-UTF-8 directory is unkeyable too.
            for entry in children.iter_mut().flatten() {
                if entry.file_name.to_str().is_none() {
                    entry.read_children_path = None;
                }
            }
        });

        let mut candidates = Vec::new();
        for entry_result in walker {
            if cancel.is_cancelled() {
                return Err(SnapshotError::Cancelled);
            }

            let entry = match entry_result {
                Ok(e) => e,
                Err(err) => {
                    let path = err.path().map(|p| p.to_path_buf()).unwrap_or_default();
                    warn!(path = %path.display(), error = %err, "directory read failed");
                    warnings.push(ScanWarning::read_error(path, err.to_string()));
                    continue;
                }
            };

            let path = entry.path();
            let rel = match relative_to(root, &path) {
                Ok(Some(rel)) => rel,
                Ok(None) => continue,
                Err(err) => {
                    warn!(path = %path.display(), "skipping entry with non-UTF-8 name");
                    warnings.push(ScanWarning::invalid_name(err.0));
                    continue;
                }
            };

            if ignore.is_match(&rel) {
                continue;
            }

            candidates.push(Candidate { path, rel });
        }

        Ok(candidates)
    }
}

impl Default for JwalkSnapshotter {
    fn default() -> Self {
        Self::new()
    }
}

/// An entry found by the walk, awaiting its metadata read.
struct Candidate {
    path: PathBuf,
    rel: CompactString,
}

/// Resolve and verify the snapshot root. Any failure here is fatal.
fn open_root(root: &Path) -> Result<PathBuf, SnapshotError> {
    let root_path = root.canonicalize().map_err(|e| SnapshotError::io(root, e))?;
    let metadata = std::fs::metadata(&root_path).map_err(|e| SnapshotError::io(&root_path, e))?;
    if !metadata.is_dir() {
        return Err(SnapshotError::NotADirectory { path: root_path });
    }
    std::fs::read_dir(&root_path).map_err(|e| SnapshotError::io(&root_path, e))?;
    Ok(root_path)
}

/// Build a record from `lstat` metadata.
fn record_from_metadata(rel: CompactString, metadata: &std::fs::Metadata) -> FileRecord {
    let file_type = metadata.file_type();
    let kind = if file_type.is_dir() {
        EntryKind::Directory
    } else if file_type.is_symlink() {
        EntryKind::Symlink
    } else if file_type.is_file() {
        EntryKind::File
    } else {
        EntryKind::Other
    };

    let mtime = metadata
        .modified()
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| DateTime::<Utc>::from(UNIX_EPOCH));

    FileRecord::new(rel, kind, metadata.len(), get_mode(metadata, kind), mtime)
}

// Cross-platform metadata helpers

/// Get the raw mode from metadata.
#[cfg(unix)]
fn get_mode(metadata: &std::fs::Metadata, _kind: EntryKind) -> u32 {
    metadata.mode()
}

#[cfg(not(unix))]
fn get_mode(metadata: &std::fs::Metadata, kind: EntryKind) -> u32 {
    // Synthesize unix-style bits so snapshots compare the same way everywhere
    let type_bits = match kind {
        EntryKind::Directory => 0o040000,
        EntryKind::Symlink => 0o120000,
        EntryKind::File => 0o100000,
        EntryKind::Other => 0,
    };
    let perm_bits = if metadata.permissions().readonly() { 0o444 } else { 0o644 };
    type_bits | perm_bits
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn create_test_tree() -> TempDir {
        let temp = TempDir::new().unwrap();
        let root = temp.path();

        fs::create_dir_all(root.join("etc/nginx")).unwrap();
        fs::create_dir_all(root.join("dev/pts")).unwrap();
        fs::create_dir_all(root.join("proc/1")).unwrap();

        fs::write(root.join("etc/nginx/nginx.conf"), "worker_processes 1;").unwrap();
        fs::write(root.join("etc/hostname"), "minimo").unwrap();
        fs::write(root.join("dev/pts/ptmx"), "").unwrap();
        fs::write(root.join("proc/1/status"), "running").unwrap();
        fs::write(root.join(".hidden"), "x").unwrap();

        temp
    }

    #[test]
    fn test_basic_snapshot() {
        let temp = create_test_tree();
        let snapshot = JwalkSnapshotter::new()
            .snapshot(&SnapshotConfig::new(temp.path()))
            .unwrap();

        assert!(!snapshot.contains(""));
        assert!(snapshot.contains("etc"));
        assert!(snapshot.contains(".hidden"));
        let conf = snapshot.get("etc/nginx/nginx.conf").unwrap();
        assert_eq!(conf.kind, EntryKind::File);
        assert_eq!(conf.size, "worker_processes 1;".len() as u64);
        assert!(snapshot.get("etc/nginx").unwrap().is_dir());
        assert_eq!(snapshot.len(), 11);
        assert!(!snapshot.has_warnings());
    }

    #[test]
    fn test_ignore_is_per_path() {
        let temp = create_test_tree();
        let config = SnapshotConfig::builder()
            .root(temp.path())
            .ignore_patterns(vec!["dev".to_string(), "etc/.*\\.conf".to_string()])
            .build()
            .unwrap();

        let snapshot = JwalkSnapshotter::new().snapshot(&config).unwrap();

        assert!(!snapshot.contains("dev"));
        assert!(snapshot.contains("dev/pts"));
        assert!(snapshot.contains("dev/pts/ptmx"));
        assert!(!snapshot.contains("etc/nginx/nginx.conf"));
        assert!(snapshot.contains("etc/hostname"));
    }

    #[test]
    fn test_prune_drops_subtree() {
        let temp = create_test_tree();
        let config = SnapshotConfig::builder()
            .root(temp.path())
            .prune_patterns(vec!["proc".to_string()])
            .build()
            .unwrap();

        let snapshot = JwalkSnapshotter::new().snapshot(&config).unwrap();

        assert!(!snapshot.contains("proc"));
        assert!(!snapshot.contains("proc/1"));
        assert!(!snapshot.contains("proc/1/status"));
        assert!(snapshot.contains("dev/pts/ptmx"));
    }

    #[test]
    fn test_prune_ignores_matching_files() {
        let temp = create_test_tree();
        let config = SnapshotConfig::builder()
            .root(temp.path())
            .prune_patterns(vec!["etc/hostname".to_string(), "etc/nginx.*".to_string()])
            .build()
            .unwrap();

        let snapshot = JwalkSnapshotter::new().snapshot(&config).unwrap();

        assert!(snapshot.get("etc/hostname").unwrap().is_file());
        assert!(!snapshot.contains("etc/nginx"));
        assert!(!snapshot.contains("etc/nginx/nginx.conf"));
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_names_are_skipped_with_warning() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let temp = create_test_tree();
        let root = temp.path();
        fs::write(root.join(OsStr::from_bytes(b"etc/a\xff")), "one").unwrap();
        fs::write(root.join(OsStr::from_bytes(b"etc/a\xfe")), "two").unwrap();
        let dir = root.join(OsStr::from_bytes(b"b\xfe"));
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join("inner"), "three").unwrap();

        let snapshot = JwalkSnapshotter::new()
            .snapshot(&SnapshotConfig::new(root))
            .unwrap();

        // Only the three bad names warn; the directory's contents are not read.
        assert_eq!(snapshot.warnings.len(), 3);
        assert!(
            snapshot
                .warnings
                .iter()
                .all(|w| w.kind == minimo_core::WarningKind::InvalidName)
        );
        assert!(!snapshot.contains("etc/a\u{FFFD}"));
        assert!(!snapshot.contains("b\u{FFFD}/inner"));
        assert!(snapshot.contains("etc/hostname"));
        assert_eq!(snapshot.len(), 11);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_are_not_followed() {
        let temp = create_test_tree();
        let root = temp.path();
        std::os::unix::fs::symlink(root.join("etc"), root.join("etc/loop")).unwrap();
        std::os::unix::fs::symlink("missing-target", root.join("broken")).unwrap();

        let snapshot = JwalkSnapshotter::new()
            .snapshot(&SnapshotConfig::new(root))
            .unwrap();

        assert!(snapshot.get("etc/loop").unwrap().is_symlink());
        assert!(!snapshot.contains("etc/loop/hostname"));
        assert!(snapshot.get("broken").unwrap().is_symlink());
    }

    #[test]
    fn test_missing_root_is_fatal() {
        let temp = TempDir::new().unwrap();
        let result = JwalkSnapshotter::new().snapshot(&SnapshotConfig::new(temp.path().join("nope")));
        assert!(matches!(result, Err(SnapshotError::NotFound { .. })));
    }

    #[test]
    fn test_file_root_is_fatal() {
        let temp = create_test_tree();
        let result = JwalkSnapshotter::new()
            .snapshot(&SnapshotConfig::new(temp.path().join("etc/hostname")));
        assert!(matches!(result, Err(SnapshotError::NotADirectory { .. })));
    }

    #[test]
    fn test_cancelled_snapshot() {
        let temp = create_test_tree();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = JwalkSnapshotter::new()
            .snapshot_with_cancel(&SnapshotConfig::new(temp.path()), &cancel);
        assert!(matches!(result, Err(SnapshotError::Cancelled)));
    }

    #[cfg(unix)]
    #[test]
    fn test_mode_is_recorded() {
        use std::os::unix::fs::PermissionsExt;

        let temp = create_test_tree();
        let script = temp.path().join("etc/run.sh");
        fs::write(&script, "#!/bin/sh").unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o750)).unwrap();

        let snapshot = JwalkSnapshotter::new()
            .snapshot(&SnapshotConfig::new(temp.path()))
            .unwrap();
        assert_eq!(snapshot.get("etc/run.sh").unwrap().permissions(), 0o750);
    }
}
