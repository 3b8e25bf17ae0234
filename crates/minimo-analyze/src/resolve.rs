//! Transitive dependency resolution.
//!
//! Resolution is a breadth-first traversal from the requested packages. A
//! package is enqueued at most once, so each lookup happens at most once no
//! matter how many packages depend on it, and cycles terminate.
//!
//! Lookup failures never abort the traversal. A package that cannot be
//! looked up is recorded as a [`ResolutionError`] and left out of the
//! closure, unless it was requested (requested packages are always
//! members).

use std::collections::{BTreeMap, BTreeSet, HashSet};

use compact_str::CompactString;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use minimo_core::{DependencyClosure, LookupError, PackageLookup, PackageNode, ResolutionError};

/// Hard failures of a resolution.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The resolution was cancelled by the caller.
    #[error("Dependency resolution cancelled")]
    Cancelled,
}

/// Closure plus the recoverable errors met while building it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    /// Packages reachable from the requested roots.
    pub closure: DependencyClosure,
    /// Lookup misses and failures, in traversal order.
    pub errors: Vec<ResolutionError>,
}

impl Resolution {
    /// Check if every package resolved.
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Breadth-first dependency resolver.
#[derive(Debug, Clone, Default)]
pub struct DependencyResolver {
    parallel: bool,
    cancel: CancellationToken,
}

/// A package waiting for its lookup, with the package that pulled it in.
struct Pending {
    name: CompactString,
    parent: Option<CompactString>,
}

impl DependencyResolver {
    /// Create a sequential resolver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the packages of one traversal level concurrently.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Stop early once `cancel` is triggered.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Resolve the closure of `requested`.
    pub fn resolve<L, I, S>(&self, requested: I, lookup: &L) -> Result<Resolution, ResolveError>
    where
        L: PackageLookup + ?Sized,
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut enqueued: HashSet<CompactString> = HashSet::new();
        let mut roots = BTreeSet::new();
        let mut frontier = Vec::new();

        for name in requested {
            let name = name.as_ref().trim();
            if name.is_empty() {
                warn!("ignoring empty package name in request");
                continue;
            }
            let name = CompactString::from(name);
            if enqueued.insert(name.clone()) {
                roots.insert(name.clone());
                frontier.push(Pending { name, parent: None });
            }
        }

        let mut packages = BTreeSet::new();
        let mut required_by = BTreeMap::new();
        let mut errors = Vec::new();
        let mut depth = 0usize;

        while !frontier.is_empty() {
            let results = self.lookup_level(&frontier, lookup)?;
            let mut next = Vec::new();

            for (pending, result) in frontier.into_iter().zip(results) {
                let Pending { name, parent } = pending;
                match result {
                    Ok(node) => {
                        for dep in node.depends {
                            let dep = dep.trim();
                            if dep.is_empty() {
                                continue;
                            }
                            let dep = CompactString::from(dep);
                            if enqueued.insert(dep.clone()) {
                                next.push(Pending {
                                    name: dep,
                                    parent: Some(name.clone()),
                                });
                            }
                        }
                        if let Some(parent) = parent {
                            required_by.insert(name.clone(), parent);
                        }
                        packages.insert(name);
                    }
                    Err(LookupError::NotFound) => {
                        warn!(package = %name, requested_by = ?parent, "package not found");
                        errors.push(ResolutionError::PackageNotFound {
                            package: name,
                            requested_by: parent,
                        });
                    }
                    Err(LookupError::Failed(message)) => {
                        warn!(package = %name, requested_by = ?parent, %message, "package lookup failed");
                        errors.push(ResolutionError::PackageLookupFailed {
                            package: name,
                            requested_by: parent,
                            message,
                        });
                    }
                }
            }

            depth += 1;
            frontier = next;
        }

        let closure = DependencyClosure::from_parts(roots, packages, required_by);
        debug!(
            closure = closure.len(),
            errors = errors.len(),
            depth,
            "dependency resolution complete"
        );

        Ok(Resolution { closure, errors })
    }

    /// Look up every package of a level, preserving frontier order.
    fn lookup_level<L>(
        &self,
        frontier: &[Pending],
        lookup: &L,
    ) -> Result<Vec<Result<PackageNode, LookupError>>, ResolveError>
    where
        L: PackageLookup + ?Sized,
    {
        if self.parallel {
            let results: Vec<_> = frontier
                .par_iter()
                .map(|pending| {
                    if self.cancel.is_cancelled() {
                        return Err(LookupError::Failed("cancelled".to_string()));
                    }
                    lookup.lookup(&pending.name)
                })
                .collect();
            if self.cancel.is_cancelled() {
                return Err(ResolveError::Cancelled);
            }
            Ok(results)
        } else {
            let mut results = Vec::with_capacity(frontier.len());
            for pending in frontier {
                if self.cancel.is_cancelled() {
                    return Err(ResolveError::Cancelled);
                }
                results.push(lookup.lookup(&pending.name));
            }
            Ok(results)
        }
    }
}
