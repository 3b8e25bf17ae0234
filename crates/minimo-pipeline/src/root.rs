//! Build root provisioning.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;

use crate::error::PipelineError;

/// Provides the directory packages are installed into.
#[async_trait]
pub trait BuildRoot: Send + Sync {
    /// Make the root ready and return its path.
    async fn prepare(&self) -> Result<PathBuf, PipelineError>;
}

/// A build root that was provisioned ahead of time.
#[derive(Debug, Clone)]
pub struct ExistingRoot {
    path: PathBuf,
}

impl ExistingRoot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[async_trait]
impl BuildRoot for ExistingRoot {
    async fn prepare(&self) -> Result<PathBuf, PipelineError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            let unavailable = |message: String| PipelineError::RootUnavailable {
                path: path.clone(),
                message,
            };
            let canonical = std::fs::canonicalize(&path).map_err(|e| unavailable(e.to_string()))?;
            let metadata =
                std::fs::metadata(&canonical).map_err(|e| unavailable(e.to_string()))?;
            if !metadata.is_dir() {
                return Err(unavailable("not a directory".to_string()));
            }
            debug!(root = %canonical.display(), "using existing build root");
            Ok(canonical)
        })
        .await?
    }
}
