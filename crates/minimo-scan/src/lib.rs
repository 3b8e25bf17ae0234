//! Filesystem snapshot engine for minimo.
//!
//! This crate walks a build root and records the metadata of every entry
//! (size, mode, type, mtime) keyed by its path relative to the root.
//!
//! # Overview
//!
//! - **Parallel traversal** via jwalk, parallel metadata reads via rayon
//! - **Per-path ignore rules** (anchored regular expressions) and opt-in
//!   **subtree pruning**
//! - **Symlinks recorded, never followed**
//! - **Cooperative cancellation** through a `CancellationToken`
//! - **Progress updates** via broadcast channels
//!
//! Unreadable entries are skipped and reported as warnings on the
//! snapshot; an inaccessible root is an error.
//!
//! # Example
//!
//! ```rust,no_run
//! use minimo_scan::{JwalkSnapshotter, SnapshotConfig};
//!
//! let config = SnapshotConfig::builder()
//!     .root("/var/minimo/root")
//!     .ignore_patterns(vec!["dev/.*".to_string()])
//!     .build()
//!     .unwrap();
//! let snapshot = JwalkSnapshotter::new().snapshot(&config).unwrap();
//!
//! println!("{} entries", snapshot.len());
//! ```

mod progress;
mod scanner;

pub use progress::SnapshotProgress;
pub use scanner::JwalkSnapshotter;

// Re-export core types for convenience
pub use minimo_core::{
    EntryKind, FileRecord, ScanWarning, Snapshot, SnapshotConfig, SnapshotError, WarningKind,
};
