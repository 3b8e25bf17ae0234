//! Package metadata, dependency closures and resolution errors.

use std::collections::{BTreeMap, BTreeSet};

use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A package and its direct dependencies as reported by a lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageNode {
    /// Package name.
    pub name: CompactString,
    /// Direct dependency names.
    #[serde(default)]
    pub depends: Vec<CompactString>,
}

impl PackageNode {
    /// Create a package node.
    pub fn new<I, S>(name: impl Into<CompactString>, depends: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<CompactString>,
    {
        Self {
            name: name.into(),
            depends: depends.into_iter().map(Into::into).collect(),
        }
    }

    /// Create a package with no dependencies.
    pub fn leaf(name: impl Into<CompactString>) -> Self {
        Self {
            name: name.into(),
            depends: Vec::new(),
        }
    }
}

/// Packages reachable from a requested root set, roots included.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyClosure {
    roots: BTreeSet<CompactString>,
    packages: BTreeSet<CompactString>,
    /// For every non-root member, the package that first pulled it in.
    required_by: BTreeMap<CompactString, CompactString>,
}

impl DependencyClosure {
    /// Create a closure from its parts. Roots are always members.
    pub fn from_parts(
        roots: BTreeSet<CompactString>,
        mut packages: BTreeSet<CompactString>,
        mut required_by: BTreeMap<CompactString, CompactString>,
    ) -> Self {
        packages.extend(roots.iter().cloned());
        required_by.retain(|name, _| !roots.contains(name));
        Self {
            roots,
            packages,
            required_by,
        }
    }

    /// Create a closure containing only the given roots.
    pub fn from_roots<I, S>(roots: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<CompactString>,
    {
        let roots: BTreeSet<CompactString> = roots.into_iter().map(Into::into).collect();
        Self::from_parts(roots, BTreeSet::new(), BTreeMap::new())
    }

    /// Check if a package is in the closure.
    pub fn contains(&self, name: &str) -> bool {
        self.packages.contains(name)
    }

    /// Check if a package was explicitly requested.
    pub fn is_root(&self, name: &str) -> bool {
        self.roots.contains(name)
    }

    /// Number of packages in the closure.
    pub fn len(&self) -> usize {
        self.packages.len()
    }

    /// Check if the closure is empty.
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Requested roots in name order.
    pub fn roots(&self) -> impl Iterator<Item = &str> {
        self.roots.iter().map(|s| s.as_str())
    }

    /// All members in name order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.packages.iter().map(|s| s.as_str())
    }

    /// The package that pulled `name` into the closure.
    pub fn required_by(&self, name: &str) -> Option<&str> {
        self.required_by.get(name).map(|s| s.as_str())
    }

    /// Dependency chain from a root down to `name`, or `None` if `name` is
    /// not a member.
    pub fn chain(&self, name: &str) -> Option<Vec<&str>> {
        let mut current = self.packages.get(name)?.as_str();
        let mut chain = vec![current];
        while let Some(parent) = self.required_by(current) {
            if chain.contains(&parent) {
                break;
            }
            chain.push(parent);
            current = parent;
        }
        chain.reverse();
        Some(chain)
    }
}

/// A recoverable per-package or per-path failure attached to the output.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "error", rename_all = "snake_case")]
pub enum ResolutionError {
    /// The metadata lookup has no such package.
    #[error("package `{package}` not found{}", requester_suffix(.requested_by))]
    PackageNotFound {
        package: CompactString,
        requested_by: Option<CompactString>,
    },

    /// The metadata lookup failed for a package.
    #[error("lookup of package `{package}` failed{}: {message}", requester_suffix(.requested_by))]
    PackageLookupFailed {
        package: CompactString,
        requested_by: Option<CompactString>,
        message: String,
    },

    /// The ownership lookup failed for a path.
    #[error("ownership lookup for `{path}` failed: {message}")]
    OwnershipLookupFailed { path: CompactString, message: String },
}

fn requester_suffix(requested_by: &Option<CompactString>) -> String {
    match requested_by {
        Some(parent) => format!(" (required by `{parent}`)"),
        None => String::new(),
    }
}

impl ResolutionError {
    /// The package this error is about, if any.
    pub fn package(&self) -> Option<&str> {
        match self {
            Self::PackageNotFound { package, .. } | Self::PackageLookupFailed { package, .. } => {
                Some(package.as_str())
            }
            Self::OwnershipLookupFailed { .. } => None,
        }
    }
}
