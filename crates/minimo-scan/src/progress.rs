//! Snapshot progress reporting.

use std::path::PathBuf;
use std::time::Duration;

/// Progress information during a snapshot.
#[derive(Debug, Clone)]
pub struct SnapshotProgress {
    /// Entries found by the walk so far.
    pub entries_listed: u64,
    /// Entries whose metadata has been read.
    pub records_read: u64,
    /// Path most recently processed.
    pub current_path: PathBuf,
    /// Number of entries skipped with a warning.
    pub warnings: u64,
    /// Time elapsed since the snapshot started.
    pub elapsed: Duration,
}

impl SnapshotProgress {
    /// Create initial progress state.
    pub fn new() -> Self {
        Self {
            entries_listed: 0,
            records_read: 0,
            current_path: PathBuf::new(),
            warnings: 0,
            elapsed: Duration::ZERO,
        }
    }

    /// Calculate read rate in entries per second.
    pub fn records_per_second(&self) -> f64 {
        if self.elapsed.as_secs_f64() > 0.0 {
            self.records_read as f64 / self.elapsed.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Fraction of listed entries whose metadata has been read.
    pub fn fraction_read(&self) -> f64 {
        if self.entries_listed == 0 {
            0.0
        } else {
            self.records_read as f64 / self.entries_listed as f64
        }
    }
}

impl Default for SnapshotProgress {
    fn default() -> Self {
        Self::new()
    }
}
