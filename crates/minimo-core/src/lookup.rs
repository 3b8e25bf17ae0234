//! Injected package metadata and path ownership capabilities.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::package::PackageNode;
use crate::record::normalize_path;

/// Failure of a single lookup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    /// The lookup has no entry for the key.
    #[error("not found")]
    NotFound,

    /// The lookup itself failed.
    #[error("{0}")]
    Failed(String),
}

/// Package metadata lookup: `name -> PackageNode | NotFound`.
pub trait PackageLookup: Send + Sync {
    /// Look up a package by name.
    fn lookup(&self, name: &str) -> Result<PackageNode, LookupError>;
}

/// Path ownership lookup: `relative path -> owners`.
///
/// A path may be listed by several packages, shared directories like
/// `usr/share/man` being the common case.
pub trait OwnershipLookup: Send + Sync {
    /// Primary owning package of a normalized relative path, `Ok(None)` if
    /// unowned.
    fn owner(&self, path: &str) -> Result<Option<CompactString>, LookupError>;

    /// Every package listing the path, primary owner first. Empty if unowned.
    fn owners(&self, path: &str) -> Result<Vec<CompactString>, LookupError> {
        Ok(self.owner(path)?.into_iter().collect())
    }
}

impl<T: PackageLookup + ?Sized> PackageLookup for &T {
    fn lookup(&self, name: &str) -> Result<PackageNode, LookupError> {
        (**self).lookup(name)
    }
}

impl<T: PackageLookup + ?Sized> PackageLookup for Box<T> {
    fn lookup(&self, name: &str) -> Result<PackageNode, LookupError> {
        (**self).lookup(name)
    }
}

impl<T: PackageLookup + ?Sized> PackageLookup for Arc<T> {
    fn lookup(&self, name: &str) -> Result<PackageNode, LookupError> {
        (**self).lookup(name)
    }
}

impl<T: OwnershipLookup + ?Sized> OwnershipLookup for &T {
    fn owner(&self, path: &str) -> Result<Option<CompactString>, LookupError> {
        (**self).owner(path)
    }

    fn owners(&self, path: &str) -> Result<Vec<CompactString>, LookupError> {
        (**self).owners(path)
    }
}

impl<T: OwnershipLookup + ?Sized> OwnershipLookup for Box<T> {
    fn owner(&self, path: &str) -> Result<Option<CompactString>, LookupError> {
        (**self).owner(path)
    }

    fn owners(&self, path: &str) -> Result<Vec<CompactString>, LookupError> {
        (**self).owners(path)
    }
}

impl<T: OwnershipLookup + ?Sized> OwnershipLookup for Arc<T> {
    fn owner(&self, path: &str) -> Result<Option<CompactString>, LookupError> {
        (**self).owner(path)
    }

    fn owners(&self, path: &str) -> Result<Vec<CompactString>, LookupError> {
        (**self).owners(path)
    }
}

/// Manifest entry for one package.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageEntry {
    /// Direct dependencies.
    #[serde(default)]
    pub depends: Vec<CompactString>,
    /// Files installed by the package (absolute or relative).
    #[serde(default)]
    pub files: Vec<String>,
}

/// On-disk form of a [`StaticPackageIndex`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexManifest {
    #[serde(default)]
    pub packages: BTreeMap<CompactString, PackageEntry>,
}

/// In-memory package database answering both lookups.
///
/// Every package listing a path is kept as an owner, in insertion order (name
/// order when loaded from a manifest).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "IndexManifest", into = "IndexManifest")]
pub struct StaticPackageIndex {
    packages: BTreeMap<CompactString, PackageEntry>,
    owners: HashMap<CompactString, Vec<CompactString>>,
}

impl StaticPackageIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a package with its dependencies.
    pub fn with_package<I, S>(mut self, name: impl Into<CompactString>, depends: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<CompactString>,
    {
        self.insert_package(name, depends);
        self
    }

    /// Record files owned by a package.
    pub fn with_files<I, S>(mut self, name: impl Into<CompactString>, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let name = name.into();
        for file in files {
            self.add_file(name.clone(), file.as_ref());
        }
        self
    }

    /// Add or replace a package's dependencies.
    pub fn insert_package<I, S>(&mut self, name: impl Into<CompactString>, depends: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<CompactString>,
    {
        let entry = self.packages.entry(name.into()).or_default();
        entry.depends = depends.into_iter().map(Into::into).collect();
    }

    /// Record a file owned by a package. The package is created if missing.
    pub fn add_file(&mut self, name: impl Into<CompactString>, path: &str) {
        let name = name.into();
        let normalized = normalize_path(path);
        if normalized.is_empty() {
            return;
        }
        let owners = self.owners.entry(normalized).or_default();
        if !owners.contains(&name) {
            owners.push(name.clone());
        }
        self.packages
            .entry(name)
            .or_default()
            .files
            .push(path.to_string());
    }

    /// Number of packages.
    pub fn len(&self) -> usize {
        self.packages.len()
    }

    /// Check if the index has no packages.
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

impl PackageLookup for StaticPackageIndex {
    fn lookup(&self, name: &str) -> Result<PackageNode, LookupError> {
        self.packages
            .get(name)
            .map(|entry| PackageNode::new(name, entry.depends.iter().cloned()))
            .ok_or(LookupError::NotFound)
    }
}

impl OwnershipLookup for StaticPackageIndex {
    fn owner(&self, path: &str) -> Result<Option<CompactString>, LookupError> {
        Ok(self
            .owners
            .get(normalize_path(path).as_str())
            .and_then(|owners| owners.first().cloned()))
    }

    fn owners(&self, path: &str) -> Result<Vec<CompactString>, LookupError> {
        Ok(self
            .owners
            .get(normalize_path(path).as_str())
            .cloned()
            .unwrap_or_default())
    }
}

impl From<IndexManifest> for StaticPackageIndex {
    fn from(manifest: IndexManifest) -> Self {
        let mut index = Self::new();
        for (name, entry) in manifest.packages {
            index.insert_package(name.clone(), entry.depends);
            for file in &entry.files {
                index.add_file(name.clone(), file);
            }
        }
        index
    }
}

impl From<StaticPackageIndex> for IndexManifest {
    fn from(index: StaticPackageIndex) -> Self {
        Self {
            packages: index.packages,
        }
    }
}
