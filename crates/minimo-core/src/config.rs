//! Snapshot and override configuration types.

use std::path::PathBuf;

use compact_str::CompactString;
use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::pattern::{IgnoreRules, PathGlobs, PatternError};

/// Configuration for a snapshot.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct SnapshotConfig {
    /// Root path to snapshot.
    pub root: PathBuf,

    /// Regular expressions matched against each relative path; a match
    /// drops that entry only, descendants are still visited.
    #[builder(default)]
    #[serde(default)]
    pub ignore_patterns: Vec<String>,

    /// Regular expressions matched against directory paths; a match drops
    /// the directory and its whole subtree without reading it. Files are
    /// never pruned.
    #[builder(default)]
    #[serde(default)]
    pub prune_patterns: Vec<String>,

    /// Number of threads for metadata reads (0 = auto-detect).
    #[builder(default = "0")]
    #[serde(default)]
    pub threads: usize,
}

impl SnapshotConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        match self.root {
            Some(ref root) if root.as_os_str().is_empty() => {
                return Err("Root path cannot be empty".to_string());
            }
            Some(_) => {}
            None => return Err("Root path is required".to_string()),
        }
        if let Some(ref patterns) = self.ignore_patterns {
            IgnoreRules::new(patterns).map_err(|e| e.to_string())?;
        }
        if let Some(ref patterns) = self.prune_patterns {
            IgnoreRules::new(patterns).map_err(|e| e.to_string())?;
        }
        Ok(())
    }
}

impl SnapshotConfig {
    /// Create a new snapshot config builder.
    pub fn builder() -> SnapshotConfigBuilder {
        SnapshotConfigBuilder::default()
    }

    /// Create a simple config for a root with no ignore rules.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ignore_patterns: Vec::new(),
            prune_patterns: Vec::new(),
            threads: 0,
        }
    }

    /// Compile the per-path ignore rules.
    pub fn ignore_rules(&self) -> Result<IgnoreRules, PatternError> {
        IgnoreRules::new(&self.ignore_patterns)
    }

    /// Compile the subtree prune rules.
    pub fn prune_rules(&self) -> Result<IgnoreRules, PatternError> {
        IgnoreRules::new(&self.prune_patterns)
    }
}

/// User overrides applied by the minimization planner.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Overrides {
    /// Globs of paths to keep even when incidental.
    #[serde(default)]
    pub include_paths: Vec<String>,

    /// Globs of paths to drop even when required.
    #[serde(default)]
    pub exclude_paths: Vec<String>,

    /// Packages whose files are dropped even when in the closure.
    #[serde(default)]
    pub exclude_packages: Vec<CompactString>,
}

impl Overrides {
    /// Create empty overrides.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an include glob.
    pub fn include(mut self, pattern: impl Into<String>) -> Self {
        self.include_paths.push(pattern.into());
        self
    }

    /// Add an exclude glob.
    pub fn exclude(mut self, pattern: impl Into<String>) -> Self {
        self.exclude_paths.push(pattern.into());
        self
    }

    /// Add an excluded package.
    pub fn exclude_package(mut self, name: impl Into<CompactString>) -> Self {
        self.exclude_packages.push(name.into());
        self
    }

    /// Compile the include globs.
    pub fn include_globs(&self) -> Result<PathGlobs, PatternError> {
        PathGlobs::new(&self.include_paths)
    }

    /// Compile the exclude globs.
    pub fn exclude_globs(&self) -> Result<PathGlobs, PatternError> {
        PathGlobs::new(&self.exclude_paths)
    }
}
