//! Classification of changes against a dependency closure.

use std::collections::HashSet;

use compact_str::CompactString;
use rayon::prelude::*;
use tracing::{debug, warn};

use minimo_core::{
    Classification, DeltaSet, DependencyClosure, MinimizationPlan, OwnershipLookup, Overrides,
    PathGlobs, PatternError, PlanEntry, ResolutionError,
};

use crate::resolve::Resolution;

/// Classifies each change of a delta.
///
/// Precedence, first match wins:
///
/// 1. path matches an exclude glob: `ExcludedByUser`
/// 2. every owner is an excluded package: `ExcludedByUser`
/// 3. any other owner is in the closure: `Required`
/// 4. path matches an include glob: `IncludedByUser`
/// 5. otherwise: `Incidental`
///
/// A path listed by several packages is attributed to the first owner in
/// the closure, falling back to the first owner that is not excluded.
#[derive(Debug, Clone, Default)]
pub struct MinimizationPlanner {
    include: PathGlobs,
    exclude: PathGlobs,
    excluded_packages: HashSet<CompactString>,
}

impl MinimizationPlanner {
    /// Create a planner from user overrides.
    pub fn new(overrides: &Overrides) -> Result<Self, PatternError> {
        Ok(Self {
            include: overrides.include_globs()?,
            exclude: overrides.exclude_globs()?,
            excluded_packages: overrides
                .exclude_packages
                .iter()
                .map(|p| CompactString::from(p.trim()))
                .filter(|p| !p.is_empty())
                .collect(),
        })
    }

    /// Classify one path given every package that owns it.
    pub fn classify(
        &self,
        path: &str,
        owners: &[CompactString],
        closure: &DependencyClosure,
    ) -> Classification {
        if self.exclude.is_match(path) {
            return Classification::ExcludedByUser;
        }
        let mut kept = owners
            .iter()
            .filter(|owner| !self.excluded_packages.contains(owner.as_str()))
            .peekable();
        if !owners.is_empty() && kept.peek().is_none() {
            return Classification::ExcludedByUser;
        }
        if kept.any(|owner| closure.contains(owner.as_str())) {
            return Classification::Required;
        }
        if self.include.is_match(path) {
            return Classification::IncludedByUser;
        }
        Classification::Incidental
    }

    /// Owner a path is attributed to in the plan.
    fn attribute(
        &self,
        owners: &[CompactString],
        closure: &DependencyClosure,
    ) -> Option<CompactString> {
        let kept = || {
            owners
                .iter()
                .filter(|owner| !self.excluded_packages.contains(owner.as_str()))
        };
        kept()
            .find(|owner| closure.contains(owner.as_str()))
            .or_else(|| kept().next())
            .or_else(|| owners.first())
            .cloned()
    }

    /// Classify every change of `delta`.
    ///
    /// Ownership lookups run in parallel; entries keep the delta's path
    /// order. A failed ownership lookup is recorded as an error and the
    /// change is classified as if it had no owner.
    pub fn plan<O>(&self, delta: &DeltaSet, resolution: &Resolution, ownership: &O) -> MinimizationPlan
    where
        O: OwnershipLookup + ?Sized,
    {
        let closure = &resolution.closure;

        let classified: Vec<(PlanEntry, Option<ResolutionError>)> = delta
            .as_slice()
            .par_iter()
            .map(|change| {
                let path = change.path();
                let (owners, error) = match ownership.owners(path) {
                    Ok(owners) => (owners, None),
                    Err(e) => {
                        warn!(path, error = %e, "ownership lookup failed");
                        (
                            Vec::new(),
                            Some(ResolutionError::OwnershipLookupFailed {
                                path: CompactString::from(path),
                                message: e.to_string(),
                            }),
                        )
                    }
                };
                let classification = self.classify(path, &owners, closure);
                let owner = self.attribute(&owners, closure);
                (
                    PlanEntry {
                        change: change.clone(),
                        owner,
                        classification,
                    },
                    error,
                )
            })
            .collect();

        let mut errors = resolution.errors.clone();
        let mut entries = Vec::with_capacity(classified.len());
        for (entry, error) in classified {
            entries.push(entry);
            errors.extend(error);
        }

        let plan = MinimizationPlan::new(entries, closure.clone(), errors);
        let summary = plan.summary();
        debug!(
            required = summary.required,
            incidental = summary.incidental,
            excluded = summary.excluded_by_user,
            included = summary.included_by_user,
            unowned = summary.unowned,
            errors = summary.errors,
            "minimization plan built"
        );
        plan
    }
}
