//! Pipeline configuration file.
//!
//! A configuration is a TOML document; every key is optional:
//!
//! ```toml
//! platform = "debian"
//! root = "/var/minimo/root"
//! include_packages = ["nginx"]
//! exclude_packages = ["apt"]
//! include_files = ["srv/**"]
//! exclude_files = ["usr/share/doc/**"]
//! ignore_patterns = ["dev/.*", "proc/.*", "sys/.*"]
//! ```

use std::path::{Path, PathBuf};

use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use minimo_core::{Overrides, SnapshotConfig, StaticPackageIndex};

use crate::error::ConfigError;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "MINIMO_CONF";

/// Config file used when neither an argument nor [`CONFIG_ENV`] names one.
pub const DEFAULT_CONFIG_FILE: &str = "minimo.toml";

/// Target platform of the image.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Platform {
    Debian,
    #[default]
    Ubuntu,
}

impl Platform {
    /// Install command template for this platform.
    pub fn install_command(self) -> Vec<String> {
        match self {
            Self::Debian | Self::Ubuntu => argv(&[
                "chroot",
                "{root}",
                "apt-get",
                "install",
                "-y",
                "--no-install-recommends",
                "{packages}",
            ]),
        }
    }

    /// Remove command template for this platform. Dependencies are ignored
    /// so excluded packages go even when something depends on them.
    pub fn remove_command(self) -> Vec<String> {
        match self {
            Self::Debian | Self::Ubuntu => argv(&[
                "chroot",
                "{root}",
                "dpkg",
                "--remove",
                "--force-depends",
                "{packages}",
            ]),
        }
    }
}

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|p| p.to_string()).collect()
}

/// Paths never worth recording in a build root.
pub fn default_ignore_patterns() -> Vec<String> {
    argv(&["dev/.*", "proc/.*", "sys/.*"])
}

/// Settings for a full build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Target platform.
    pub platform: Platform,

    /// Provisioned build root.
    pub root: Option<PathBuf>,

    /// Packages to install and keep.
    pub include_packages: Vec<CompactString>,

    /// Packages removed after install and dropped from the plan.
    pub exclude_packages: Vec<CompactString>,

    /// Globs of paths kept even when incidental.
    pub include_files: Vec<String>,

    /// Globs of paths dropped even when required.
    pub exclude_files: Vec<String>,

    /// Per-path snapshot ignore expressions.
    pub ignore_patterns: Vec<String>,

    /// Snapshot subtree prune expressions.
    pub prune_patterns: Vec<String>,

    /// Snapshot threads (0 = auto-detect).
    pub threads: usize,

    /// Resolve each dependency level concurrently.
    pub parallel_resolve: bool,

    /// Install command template; empty uses the platform default.
    pub install_command: Vec<String>,

    /// Remove command template; empty uses the platform default.
    pub remove_command: Vec<String>,

    /// Static package manifest used instead of the build root's database.
    pub package_manifest: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            platform: Platform::default(),
            root: None,
            include_packages: Vec::new(),
            exclude_packages: Vec::new(),
            include_files: Vec::new(),
            exclude_files: Vec::new(),
            ignore_patterns: default_ignore_patterns(),
            prune_patterns: Vec::new(),
            threads: 0,
            parallel_resolve: false,
            install_command: Vec::new(),
            remove_command: Vec::new(),
            package_manifest: None,
        }
    }
}

impl PipelineConfig {
    /// Load a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load a config file if it exists, the defaults otherwise.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Check the settings a build needs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.root {
            Some(ref root) if root.as_os_str().is_empty() => {
                return Err(ConfigError::Invalid("root cannot be empty".to_string()));
            }
            Some(_) => {}
            None => return Err(ConfigError::Invalid("root is required".to_string())),
        }
        if self.include_packages.iter().all(|p| p.trim().is_empty()) {
            return Err(ConfigError::Invalid(
                "at least one package must be included".to_string(),
            ));
        }
        if self.install_argv().is_empty() || self.remove_argv().is_empty() {
            return Err(ConfigError::Invalid("empty package command".to_string()));
        }
        self.overrides().include_globs()?;
        self.overrides().exclude_globs()?;
        Ok(())
    }

    /// Snapshot settings for `root`.
    pub fn snapshot_config(&self, root: &Path) -> Result<SnapshotConfig, ConfigError> {
        SnapshotConfig::builder()
            .root(root)
            .ignore_patterns(self.ignore_patterns.clone())
            .prune_patterns(self.prune_patterns.clone())
            .threads(self.threads)
            .build()
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Planner overrides.
    pub fn overrides(&self) -> Overrides {
        Overrides {
            include_paths: self.include_files.clone(),
            exclude_paths: self.exclude_files.clone(),
            exclude_packages: self.exclude_packages.clone(),
        }
    }

    /// Effective install command template.
    pub fn install_argv(&self) -> Vec<String> {
        if self.install_command.is_empty() {
            self.platform.install_command()
        } else {
            self.install_command.clone()
        }
    }

    /// Effective remove command template.
    pub fn remove_argv(&self) -> Vec<String> {
        if self.remove_command.is_empty() {
            self.platform.remove_command()
        } else {
            self.remove_command.clone()
        }
    }
}

/// Resolve the config path: explicit argument, then [`CONFIG_ENV`], then
/// [`DEFAULT_CONFIG_FILE`].
pub fn config_path(explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
}

/// Load a static package manifest. Files ending in `.json` are JSON, all
/// others TOML.
pub fn load_manifest(path: impl AsRef<Path>) -> Result<StaticPackageIndex, ConfigError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let manifest_error = |message: String| ConfigError::Manifest {
        path: path.to_path_buf(),
        message,
    };

    if path.extension().is_some_and(|ext| ext == "json") {
        serde_json::from_str(&text).map_err(|e| manifest_error(e.to_string()))
    } else {
        toml::from_str(&text).map_err(|e| manifest_error(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use minimo_core::{OwnershipLookup, PackageLookup};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.platform, Platform::Ubuntu);
        assert_eq!(config.ignore_patterns, vec!["dev/.*", "proc/.*", "sys/.*"]);
        assert_eq!(config.install_argv()[0], "chroot");
        assert!(config.remove_argv().contains(&"--force-depends".to_string()));
    }

    #[test]
    fn test_parse_toml() {
        let config: PipelineConfig = toml::from_str(
            r#"
            platform = "debian"
            root = "/var/minimo/root"
            include_packages = ["nginx"]
            exclude_packages = ["apt"]
            include_files = ["srv/**"]
            install_command = ["true", "{packages}"]
            "#,
        )
        .unwrap();

        assert_eq!(config.platform, Platform::Debian);
        assert_eq!(config.root, Some(PathBuf::from("/var/minimo/root")));
        assert_eq!(config.install_argv(), vec!["true", "{packages}"]);
        assert_eq!(config.ignore_patterns, default_ignore_patterns());
        assert_eq!(config.overrides().exclude_packages, vec!["apt"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        assert!(toml::from_str::<PipelineConfig>("rooot = \"/x\"").is_err());
    }

    #[test]
    fn test_validate() {
        let mut config = PipelineConfig::default();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        config.root = Some(PathBuf::from("/r"));
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        config.include_packages = vec!["nginx".into()];
        assert!(config.validate().is_ok());

        config.exclude_files = vec!["[".to_string()];
        assert!(matches!(config.validate(), Err(ConfigError::Pattern(_))));
    }

    #[test]
    fn test_snapshot_config_rejects_bad_pattern() {
        let config = PipelineConfig {
            ignore_patterns: vec!["(".to_string()],
            ..PipelineConfig::default()
        };
        assert!(config.snapshot_config(Path::new("/r")).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("minimo.toml");
        fs::write(&path, "include_packages = [\"busybox\"]\nthreads = 2\n").unwrap();

        let config = PipelineConfig::load(&path).unwrap();
        assert_eq!(config.include_packages, vec!["busybox"]);
        assert_eq!(config.threads, 2);

        let missing = temp.path().join("absent.toml");
        assert!(matches!(PipelineConfig::load(&missing), Err(ConfigError::Read { .. })));
        assert_eq!(PipelineConfig::load_or_default(&missing).unwrap(), PipelineConfig::default());
    }

    #[test]
    fn test_explicit_config_path_wins() {
        assert_eq!(
            config_path(Some(Path::new("/etc/minimo.toml"))),
            PathBuf::from("/etc/minimo.toml")
        );
    }

    #[test]
    fn test_load_manifests() {
        let temp = TempDir::new().unwrap();
        let toml_path = temp.path().join("index.toml");
        fs::write(
            &toml_path,
            "[packages.nginx]\ndepends = [\"libc6\"]\nfiles = [\"/etc/nginx/nginx.conf\"]\n",
        )
        .unwrap();
        let json_path = temp.path().join("index.json");
        fs::write(&json_path, r#"{"packages":{"libc6":{"files":["/lib/libc.so.6"]}}}"#).unwrap();

        let index = load_manifest(&toml_path).unwrap();
        assert_eq!(index.lookup("nginx").unwrap().depends, vec!["libc6"]);
        assert_eq!(index.owner("etc/nginx/nginx.conf").unwrap().as_deref(), Some("nginx"));

        let index = load_manifest(&json_path).unwrap();
        assert_eq!(index.owner("lib/libc.so.6").unwrap().as_deref(), Some("libc6"));

        fs::write(&json_path, "{").unwrap();
        assert!(matches!(load_manifest(&json_path), Err(ConfigError::Manifest { .. })));
    }
}
