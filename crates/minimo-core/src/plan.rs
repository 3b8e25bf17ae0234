//! Minimization plan and its flat report form.

use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::change::{ChangeKind, ChangeReason, ChangeRecord, DeltaSet};
use crate::package::{DependencyClosure, ResolutionError};

/// Final classification of a change.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Classification {
    /// Owned by a package in the dependency closure.
    Required,
    /// Not attributable to the closure (logs, caches, unowned files).
    Incidental,
    /// Dropped by a user exclude.
    ExcludedByUser,
    /// Kept by a user include.
    IncludedByUser,
}

impl Classification {
    /// Check if the change belongs in the minimal image.
    pub fn is_kept(self) -> bool {
        matches!(self, Self::Required | Self::IncludedByUser)
    }
}

/// A change with its owner and classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanEntry {
    /// The classified change.
    pub change: ChangeRecord,
    /// Owning package, if known.
    pub owner: Option<CompactString>,
    /// Classification.
    pub classification: Classification,
}

/// Counts per classification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSummary {
    pub required: usize,
    pub incidental: usize,
    pub excluded_by_user: usize,
    pub included_by_user: usize,
    /// Changes with no known owner.
    pub unowned: usize,
    /// Resolution errors attached to the plan.
    pub errors: usize,
}

/// Classification of every change in a delta, with the closure and errors
/// that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MinimizationPlan {
    entries: Vec<PlanEntry>,
    closure: DependencyClosure,
    errors: Vec<ResolutionError>,
}

impl MinimizationPlan {
    /// Create a plan. Entries keep the order they are given in.
    pub fn new(
        entries: Vec<PlanEntry>,
        closure: DependencyClosure,
        errors: Vec<ResolutionError>,
    ) -> Self {
        Self {
            entries,
            closure,
            errors,
        }
    }

    /// Classified entries in path order.
    pub fn entries(&self) -> &[PlanEntry] {
        &self.entries
    }

    /// The dependency closure used for classification.
    pub fn closure(&self) -> &DependencyClosure {
        &self.closure
    }

    /// Resolution and ownership errors.
    pub fn errors(&self) -> &[ResolutionError] {
        &self.errors
    }

    /// The delta this plan classifies.
    pub fn delta(&self) -> DeltaSet {
        DeltaSet::new(self.entries.iter().map(|e| e.change.clone()).collect())
    }

    /// Classification of a path, if the path changed.
    pub fn classification_of(&self, path: &str) -> Option<Classification> {
        self.entries
            .binary_search_by(|e| e.change.path().cmp(path))
            .ok()
            .map(|idx| self.entries[idx].classification)
    }

    /// Entries with the given classification.
    pub fn with_class(&self, class: Classification) -> impl Iterator<Item = &PlanEntry> {
        self.entries.iter().filter(move |e| e.classification == class)
    }

    /// Paths that belong in the minimal image: kept changes that still exist.
    pub fn kept_paths(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| e.classification.is_kept() && e.change.current().is_some())
            .map(|e| e.change.path())
            .collect()
    }

    /// Counts per classification.
    pub fn summary(&self) -> PlanSummary {
        let mut summary = PlanSummary {
            errors: self.errors.len(),
            ..PlanSummary::default()
        };
        for entry in &self.entries {
            match entry.classification {
                Classification::Required => summary.required += 1,
                Classification::Incidental => summary.incidental += 1,
                Classification::ExcludedByUser => summary.excluded_by_user += 1,
                Classification::IncludedByUser => summary.included_by_user += 1,
            }
            if entry.owner.is_none() {
                summary.unowned += 1;
            }
        }
        summary
    }

    /// Flatten into a report for downstream packaging.
    pub fn report(&self) -> PlanReport {
        PlanReport {
            rows: self
                .entries
                .iter()
                .map(|e| ReportRow {
                    path: CompactString::from(e.change.path()),
                    change: e.change.kind(),
                    reasons: e.change.reasons(),
                    owner: e.owner.clone(),
                    classification: e.classification,
                })
                .collect(),
            summary: self.summary(),
            closure: self.closure.iter().map(CompactString::from).collect(),
            errors: self.errors.clone(),
        }
    }
}

/// One row of a flat plan report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRow {
    pub path: CompactString,
    pub change: ChangeKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reasons: Vec<ChangeReason>,
    pub owner: Option<CompactString>,
    pub classification: Classification,
}

/// Flat, ordered report of a plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanReport {
    /// One row per change, in path order.
    pub rows: Vec<ReportRow>,
    /// Counts per classification.
    pub summary: PlanSummary,
    /// Dependency closure in name order.
    pub closure: Vec<CompactString>,
    /// Resolution and ownership errors.
    pub errors: Vec<ResolutionError>,
}
