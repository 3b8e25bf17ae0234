//! Error types for configuration and pipeline runs.

use std::path::PathBuf;

use compact_str::CompactString;
use thiserror::Error;

use minimo_analyze::ResolveError;
use minimo_core::{PatternError, SnapshotError};

/// Errors loading or validating a pipeline configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML for this schema.
    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// A package manifest could not be decoded.
    #[error("Invalid package manifest {path}: {message}")]
    Manifest { path: PathBuf, message: String },

    /// A value is missing or out of range.
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// An ignore, prune or override pattern failed to compile.
    #[error(transparent)]
    Pattern(#[from] PatternError),
}

/// Fatal errors that abort a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The build root could not be prepared.
    #[error("Build root {path} is unavailable: {message}")]
    RootUnavailable { path: PathBuf, message: String },

    /// A snapshot of the build root failed.
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    /// The package manager command could not be started.
    #[error("Failed to run `{program}`: {source}")]
    Command {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Installing the requested packages failed.
    #[error("Installing {} failed", .packages.join(", "))]
    InstallFailed {
        packages: Vec<CompactString>,
        log: String,
    },

    /// Removing the excluded packages failed.
    #[error("Removing {} failed", .packages.join(", "))]
    RemoveFailed {
        packages: Vec<CompactString>,
        log: String,
    },

    /// The package database of the build root could not be loaded.
    #[error("Failed to load package database from {path}: {message}")]
    Database { path: PathBuf, message: String },

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// A blocking phase panicked or was aborted.
    #[error("Pipeline task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// The run was cancelled by the caller.
    #[error("Pipeline cancelled")]
    Cancelled,
}

impl PipelineError {
    /// Captured package manager output, for install and remove failures.
    pub fn log(&self) -> Option<&str> {
        match self {
            Self::InstallFailed { log, .. } | Self::RemoveFailed { log, .. } => Some(log),
            _ => None,
        }
    }
}

impl From<PatternError> for PipelineError {
    fn from(err: PatternError) -> Self {
        Self::Config(ConfigError::Pattern(err))
    }
}
