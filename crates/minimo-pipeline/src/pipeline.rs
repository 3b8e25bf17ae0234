//! Sequential build pipeline.
//!
//! Phases never overlap: prepare root, snapshot before, install, remove
//! excluded packages, snapshot after, diff, load the package database,
//! resolve, plan. Blocking phases run on the blocking thread pool.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use compact_str::CompactString;
use serde::Serialize;
use strum::Display;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use minimo_analyze::{DeltaEngine, DependencyResolver, MinimizationPlanner, Resolution};
use minimo_core::{DeltaSet, MinimizationPlan, Snapshot, SnapshotConfig, SnapshotError};
use minimo_scan::JwalkSnapshotter;

use crate::config::PipelineConfig;
use crate::database::{loader_for, DatabaseLoader};
use crate::error::PipelineError;
use crate::install::{CommandInstaller, PackageInstaller};
use crate::root::{BuildRoot, ExistingRoot};

/// Phase of a pipeline run, published as it starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PipelineStage {
    PreparingRoot,
    SnapshotBefore,
    Installing,
    Removing,
    SnapshotAfter,
    Diffing,
    LoadingDatabase,
    Resolving,
    Planning,
    Complete,
}

/// Everything a successful run produced.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub root: PathBuf,
    pub before: Snapshot,
    pub after: Snapshot,
    pub delta: DeltaSet,
    pub resolution: Resolution,
    pub plan: MinimizationPlan,
    /// Package manager output of the install and remove calls.
    pub install_log: String,
}

/// Runs the phases of a build in order.
pub struct Pipeline {
    config: PipelineConfig,
    build_root: Arc<dyn BuildRoot>,
    installer: Arc<dyn PackageInstaller>,
    loader: Arc<dyn DatabaseLoader>,
    stage_tx: broadcast::Sender<PipelineStage>,
}

impl Pipeline {
    /// Create a pipeline with explicit adapters.
    pub fn new(
        config: PipelineConfig,
        build_root: Arc<dyn BuildRoot>,
        installer: Arc<dyn PackageInstaller>,
        loader: Arc<dyn DatabaseLoader>,
    ) -> Self {
        let (stage_tx, _) = broadcast::channel(16);
        Self {
            config,
            build_root,
            installer,
            loader,
            stage_tx,
        }
    }

    /// Create a pipeline with the adapters a config describes: an existing
    /// root, command templates and dpkg or a manifest.
    pub fn from_config(config: PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        let root = config.root.clone().unwrap_or_default();
        let installer = CommandInstaller::from_config(&config)?;
        let loader: Arc<dyn DatabaseLoader> = Arc::from(loader_for(&config));
        Ok(Self::new(
            config,
            Arc::new(ExistingRoot::new(root)),
            Arc::new(installer),
            loader,
        ))
    }

    /// Subscribe to stage changes.
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineStage> {
        self.stage_tx.subscribe()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every phase.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<PipelineOutcome, PipelineError> {
        let start = Instant::now();
        let requested = names(&self.config.include_packages);
        let excluded = names(&self.config.exclude_packages);
        let overrides = self.config.overrides();
        let planner = MinimizationPlanner::new(&overrides)?;

        self.enter(PipelineStage::PreparingRoot, cancel)?;
        let root = self.build_root.prepare().await?;
        let snapshot_config = self.config.snapshot_config(&root)?;

        self.enter(PipelineStage::SnapshotBefore, cancel)?;
        let before = take_snapshot(snapshot_config.clone(), cancel.clone()).await?;

        let mut install_log = String::new();
        self.enter(PipelineStage::Installing, cancel)?;
        if !requested.is_empty() {
            let outcome = self.installer.install(&root, &requested).await?;
            if !outcome.success {
                return Err(PipelineError::InstallFailed {
                    packages: requested,
                    log: outcome.log,
                });
            }
            install_log.push_str(&outcome.log);
        }

        self.enter(PipelineStage::Removing, cancel)?;
        if !excluded.is_empty() {
            let outcome = self.installer.remove(&root, &excluded).await?;
            if !outcome.success {
                return Err(PipelineError::RemoveFailed {
                    packages: excluded,
                    log: outcome.log,
                });
            }
            install_log.push_str(&outcome.log);
        }

        self.enter(PipelineStage::SnapshotAfter, cancel)?;
        let after = take_snapshot(snapshot_config, cancel.clone()).await?;

        self.enter(PipelineStage::Diffing, cancel)?;
        let (before, after, delta) = tokio::task::spawn_blocking(move || {
            let delta = DeltaEngine::new().diff(&before, &after);
            (before, after, delta)
        })
        .await?;

        self.enter(PipelineStage::LoadingDatabase, cancel)?;
        let loader = Arc::clone(&self.loader);
        let db_root = root.clone();
        let database = tokio::task::spawn_blocking(move || loader.load(&db_root)).await??;

        self.enter(PipelineStage::Resolving, cancel)?;
        let resolver = DependencyResolver::new()
            .with_parallel(self.config.parallel_resolve)
            .with_cancel(cancel.clone());
        let (database, resolution) = tokio::task::spawn_blocking(move || {
            let resolution = resolver.resolve(&requested, &*database);
            (database, resolution)
        })
        .await?;
        let resolution = resolution?;

        self.enter(PipelineStage::Planning, cancel)?;
        let (delta, resolution, plan) = tokio::task::spawn_blocking(move || {
            let plan = planner.plan(&delta, &resolution, &*database);
            (delta, resolution, plan)
        })
        .await?;

        let _ = self.stage_tx.send(PipelineStage::Complete);
        let summary = plan.summary();
        info!(
            root = %root.display(),
            changes = delta.len(),
            closure = resolution.closure.len(),
            required = summary.required,
            incidental = summary.incidental,
            errors = summary.errors,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "pipeline complete"
        );

        Ok(PipelineOutcome {
            root,
            before,
            after,
            delta,
            resolution,
            plan,
            install_log,
        })
    }

    /// Publish a stage, failing if the run was cancelled.
    fn enter(&self, stage: PipelineStage, cancel: &CancellationToken) -> Result<(), PipelineError> {
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        info!(%stage, "pipeline stage");
        let _ = self.stage_tx.send(stage);
        Ok(())
    }
}

fn names(packages: &[CompactString]) -> Vec<CompactString> {
    let mut result: Vec<CompactString> = Vec::new();
    for name in packages {
        let name = name.trim();
        if !name.is_empty() && !result.iter().any(|n| n == name) {
            result.push(CompactString::from(name));
        }
    }
    result
}

async fn take_snapshot(
    config: SnapshotConfig,
    cancel: CancellationToken,
) -> Result<Snapshot, PipelineError> {
    let snapshot = tokio::task::spawn_blocking(move || {
        JwalkSnapshotter::new().snapshot_with_cancel(&config, &cancel)
    })
    .await?;
    match snapshot {
        Ok(snapshot) => {
            debug!(entries = snapshot.len(), warnings = snapshot.warnings.len(), "snapshot taken");
            Ok(snapshot)
        }
        Err(SnapshotError::Cancelled) => Err(PipelineError::Cancelled),
        Err(e) => Err(e.into()),
    }
}
