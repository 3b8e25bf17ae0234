//! Build pipeline for minimo.
//!
//! This crate drives a full build around the analysis core:
//!
//! - **Build roots** via the [`BuildRoot`] trait ([`ExistingRoot`] verifies a
//!   provisioned directory)
//! - **Package managers** via the [`PackageInstaller`] trait
//!   ([`CommandInstaller`] runs argv templates through `tokio::process`)
//! - **Package databases** via the [`DatabaseLoader`] trait (dpkg status
//!   and file lists, or a static manifest)
//! - **Configuration** from a TOML file
//!
//! Stage changes are published on a broadcast channel so a front end can
//! follow a run.
//!
//! ```rust,ignore
//! use minimo_pipeline::{Pipeline, PipelineConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! let config = PipelineConfig::load("minimo.toml")?;
//! let pipeline = Pipeline::from_config(config)?;
//! let outcome = pipeline.run(&CancellationToken::new()).await?;
//!
//! for path in outcome.plan.kept_paths() {
//!     println!("{path}");
//! }
//! ```

mod config;
mod database;
mod dpkg;
mod error;
mod install;
mod pipeline;
mod root;

pub use config::{
    config_path, default_ignore_patterns, load_manifest, Platform, PipelineConfig, CONFIG_ENV,
    DEFAULT_CONFIG_FILE,
};
pub use database::{
    loader_for, DatabaseLoader, DpkgLoader, ManifestLoader, PackageDatabase, StaticLoader,
};
pub use dpkg::{DpkgDatabase, INFO_DIR, STATUS_PATH};
pub use error::{ConfigError, PipelineError};
pub use install::{
    expand, CommandInstaller, InstallOutcome, PackageInstaller, PACKAGES_PLACEHOLDER,
    ROOT_PLACEHOLDER,
};
pub use pipeline::{Pipeline, PipelineOutcome, PipelineStage};
pub use root::{BuildRoot, ExistingRoot};
