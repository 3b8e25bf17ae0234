//! Analysis algorithms for minimo.
//!
//! This crate turns snapshots and package metadata into a minimization plan:
//!
//! - **Delta** - Compare two snapshots into an ordered set of changes
//! - **Resolution** - Compute the transitive dependency closure of the
//!   requested packages
//! - **Planning** - Classify every change as required, incidental or
//!   user-overridden
//!
//! # Delta
//!
//! ```rust,ignore
//! use minimo_analyze::diff;
//! use minimo_scan::{JwalkSnapshotter, SnapshotConfig};
//!
//! let scanner = JwalkSnapshotter::new();
//! let before = scanner.snapshot(&SnapshotConfig::new("/var/minimo/root")).unwrap();
//! // ... install packages ...
//! let after = scanner.snapshot(&SnapshotConfig::new("/var/minimo/root")).unwrap();
//!
//! let delta = diff(&before, &after);
//! println!("{} changes", delta.len());
//! ```
//!
//! # Resolution and planning
//!
//! Lookups are injected, so any package database can back them:
//!
//! ```rust,ignore
//! use minimo_analyze::{DependencyResolver, MinimizationPlanner};
//! use minimo_core::{Overrides, StaticPackageIndex};
//!
//! let index = StaticPackageIndex::new()
//!     .with_package("nginx", ["libc6"])
//!     .with_files("nginx", ["/etc/nginx/nginx.conf"]);
//!
//! let resolution = DependencyResolver::new().resolve(["nginx"], &index).unwrap();
//! let planner = MinimizationPlanner::new(&Overrides::new().include("srv/**")).unwrap();
//! let plan = planner.plan(&delta, &resolution, &index);
//!
//! for path in plan.kept_paths() {
//!     println!("{path}");
//! }
//! ```

pub mod delta;
mod planner;
mod resolve;

pub use delta::{compare_records, diff, DeltaConfig, DeltaConfigBuilder, DeltaEngine};
pub use planner::MinimizationPlanner;
pub use resolve::{DependencyResolver, Resolution, ResolveError};

// Re-export core types
pub use minimo_core::{
    ChangeKind, ChangeReason, ChangeRecord, Classification, DeltaSet, DependencyClosure,
    MinimizationPlan, ResolutionError,
};
