//! Core types and traits for minimo.
//!
//! This crate provides the data model shared by the minimo crates: file
//! records and snapshots, change records and delta sets, package closures,
//! minimization plans, path patterns and the lookup capabilities injected
//! into the resolver and planner.

mod change;
mod config;
mod error;
mod lookup;
mod package;
mod pattern;
mod plan;
mod record;
mod snapshot;

pub use change::{ChangeKind, ChangeReason, ChangeRecord, DeltaSet, DeltaSummary};
pub use config::{Overrides, SnapshotConfig, SnapshotConfigBuilder};
pub use error::{ScanWarning, SnapshotError, WarningKind};
pub use lookup::{
    IndexManifest, LookupError, OwnershipLookup, PackageEntry, PackageLookup, StaticPackageIndex,
};
pub use package::{DependencyClosure, PackageNode, ResolutionError};
pub use pattern::{IgnoreRules, PathGlobs, PatternError};
pub use plan::{Classification, MinimizationPlan, PlanEntry, PlanReport, PlanSummary, ReportRow};
pub use record::{
    normalize_path, relative_to, EntryKind, FileRecord, NonUtf8Path, PERMISSION_MASK,
};
pub use snapshot::Snapshot;
