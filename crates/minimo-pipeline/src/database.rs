//! Package databases loaded from a build root.

use std::path::{Path, PathBuf};

use minimo_core::{OwnershipLookup, PackageLookup, StaticPackageIndex};

use crate::config::{load_manifest, PipelineConfig};
use crate::dpkg::DpkgDatabase;
use crate::error::PipelineError;

/// A source answering both package and ownership lookups.
pub trait PackageDatabase: PackageLookup + OwnershipLookup {}

impl<T: PackageLookup + OwnershipLookup + ?Sized> PackageDatabase for T {}

/// Opens the package database of a build root.
///
/// Loading happens after install so ownership reflects the installed state.
pub trait DatabaseLoader: Send + Sync {
    fn load(&self, root: &Path) -> Result<Box<dyn PackageDatabase>, PipelineError>;
}

/// Loads the dpkg database inside the build root.
#[derive(Debug, Clone, Copy, Default)]
pub struct DpkgLoader;

impl DatabaseLoader for DpkgLoader {
    fn load(&self, root: &Path) -> Result<Box<dyn PackageDatabase>, PipelineError> {
        Ok(Box::new(DpkgDatabase::load(root)?))
    }
}

/// Loads a static manifest file, ignoring the build root.
#[derive(Debug, Clone)]
pub struct ManifestLoader {
    path: PathBuf,
}

impl ManifestLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl DatabaseLoader for ManifestLoader {
    fn load(&self, _root: &Path) -> Result<Box<dyn PackageDatabase>, PipelineError> {
        Ok(Box::new(load_manifest(&self.path)?))
    }
}

/// Serves an in-memory index.
#[derive(Debug, Clone, Default)]
pub struct StaticLoader {
    index: StaticPackageIndex,
}

impl StaticLoader {
    pub fn new(index: StaticPackageIndex) -> Self {
        Self { index }
    }
}

impl DatabaseLoader for StaticLoader {
    fn load(&self, _root: &Path) -> Result<Box<dyn PackageDatabase>, PipelineError> {
        Ok(Box::new(self.index.clone()))
    }
}

/// The loader a config asks for: its manifest if set, dpkg otherwise.
pub fn loader_for(config: &PipelineConfig) -> Box<dyn DatabaseLoader> {
    match config.package_manifest {
        Some(ref path) => Box::new(ManifestLoader::new(path)),
        None => Box::new(DpkgLoader),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_manifest_loader() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("packages.toml");
        fs::write(&path, "[packages.busybox]\nfiles = [\"/bin/busybox\"]\n").unwrap();

        let config = PipelineConfig {
            package_manifest: Some(path),
            ..PipelineConfig::default()
        };
        let db = loader_for(&config).load(temp.path()).unwrap();
        assert!(db.lookup("busybox").is_ok());
        assert_eq!(db.owner("bin/busybox").unwrap().as_deref(), Some("busybox"));
    }

    #[test]
    fn test_dpkg_loader_requires_status() {
        let temp = TempDir::new().unwrap();
        let result = loader_for(&PipelineConfig::default()).load(temp.path());
        assert!(matches!(result, Err(PipelineError::Database { .. })));
    }
}
