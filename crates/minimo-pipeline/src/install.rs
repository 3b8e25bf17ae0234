//! Package installation through an external package manager.
//!
//! The pipeline only needs a pass/fail result and the captured output of
//! each call; it never interprets what the package manager printed.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::PipelineConfig;
use crate::error::{ConfigError, PipelineError};

/// Placeholder replaced by the build root path.
pub const ROOT_PLACEHOLDER: &str = "{root}";

/// Placeholder replaced by the package names.
pub const PACKAGES_PLACEHOLDER: &str = "{packages}";

/// Result of one package manager call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallOutcome {
    /// Whether the command reported success.
    pub success: bool,
    /// Combined stdout and stderr.
    pub log: String,
}

impl InstallOutcome {
    pub fn succeeded(log: impl Into<String>) -> Self {
        Self {
            success: true,
            log: log.into(),
        }
    }

    pub fn failed(log: impl Into<String>) -> Self {
        Self {
            success: false,
            log: log.into(),
        }
    }
}

/// Installs and removes packages inside a build root.
#[async_trait]
pub trait PackageInstaller: Send + Sync {
    /// Install `packages` with their dependencies.
    async fn install(
        &self,
        root: &Path,
        packages: &[CompactString],
    ) -> Result<InstallOutcome, PipelineError>;

    /// Remove `packages`, ignoring anything that depends on them.
    async fn remove(
        &self,
        root: &Path,
        packages: &[CompactString],
    ) -> Result<InstallOutcome, PipelineError>;
}

/// Runs argv templates such as `["chroot", "{root}", "apt-get", "install",
/// "-y", "{packages}"]`.
///
/// An argument equal to `{packages}` expands to one argument per package;
/// placeholders inside a longer argument are substituted in place, with
/// package names separated by spaces.
#[derive(Debug, Clone)]
pub struct CommandInstaller {
    install: Vec<String>,
    remove: Vec<String>,
}

impl CommandInstaller {
    /// Create an installer from install and remove templates.
    pub fn new(install: Vec<String>, remove: Vec<String>) -> Result<Self, ConfigError> {
        if install.is_empty() || remove.is_empty() {
            return Err(ConfigError::Invalid("empty package command".to_string()));
        }
        Ok(Self { install, remove })
    }

    /// Create an installer from the effective templates of a config.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, ConfigError> {
        Self::new(config.install_argv(), config.remove_argv())
    }

    async fn run(
        &self,
        template: &[String],
        root: &Path,
        packages: &[CompactString],
    ) -> Result<InstallOutcome, PipelineError> {
        let argv = expand(template, root, packages);
        let Some((program, args)) = argv.split_first() else {
            return Err(ConfigError::Invalid("empty package command".to_string()).into());
        };

        debug!(command = %argv.join(" "), "running package manager");
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| PipelineError::Command {
                program: program.clone(),
                source,
            })?;

        let mut log = String::from_utf8_lossy(&output.stdout).into_owned();
        log.push_str(&String::from_utf8_lossy(&output.stderr));

        if output.status.success() {
            Ok(InstallOutcome::succeeded(log))
        } else {
            warn!(program = %program, status = %output.status, "package manager failed");
            Ok(InstallOutcome::failed(log))
        }
    }
}

#[async_trait]
impl PackageInstaller for CommandInstaller {
    async fn install(
        &self,
        root: &Path,
        packages: &[CompactString],
    ) -> Result<InstallOutcome, PipelineError> {
        self.run(&self.install, root, packages).await
    }

    async fn remove(
        &self,
        root: &Path,
        packages: &[CompactString],
    ) -> Result<InstallOutcome, PipelineError> {
        self.run(&self.remove, root, packages).await
    }
}

/// Substitute the placeholders of an argv template.
pub fn expand(template: &[String], root: &Path, packages: &[CompactString]) -> Vec<String> {
    let root = root.to_string_lossy();
    let joined = packages.join(" ");
    let mut argv = Vec::with_capacity(template.len() + packages.len());
    for arg in template {
        if arg == PACKAGES_PLACEHOLDER {
            argv.extend(packages.iter().map(|p| p.to_string()));
        } else {
            argv.push(
                arg.replace(ROOT_PLACEHOLDER, &root)
                    .replace(PACKAGES_PLACEHOLDER, &joined),
            );
        }
    }
    argv
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn template(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_expand_placeholders() {
        let argv = expand(
            &template(&["chroot", "{root}", "apt-get", "install", "{packages}"]),
            &PathBuf::from("/var/minimo/root"),
            &["nginx".into(), "curl".into()],
        );
        assert_eq!(
            argv,
            vec!["chroot", "/var/minimo/root", "apt-get", "install", "nginx", "curl"]
        );
    }

    #[test]
    fn test_expand_inline_placeholders() {
        let argv = expand(
            &template(&["sh", "-c", "echo {packages} > {root}/installed"]),
            &PathBuf::from("/r"),
            &["a".into(), "b".into()],
        );
        assert_eq!(argv[2], "echo a b > /r/installed");
    }

    #[test]
    fn test_empty_template_is_rejected() {
        assert!(CommandInstaller::new(Vec::new(), template(&["true"])).is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_outcome() {
        let installer = CommandInstaller::new(
            template(&["sh", "-c", "echo installing {packages}"]),
            template(&["sh", "-c", "echo cannot remove {packages} >&2; exit 3"]),
        )
        .unwrap();
        let root = PathBuf::from("/");

        let outcome = installer.install(&root, &["nginx".into()]).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.log.trim(), "installing nginx");

        let outcome = installer.remove(&root, &["apt".into()]).await.unwrap();
        assert!(!outcome.success);
        assert!(outcome.log.contains("cannot remove apt"));
    }

    #[tokio::test]
    async fn test_missing_program() {
        let installer = CommandInstaller::new(
            template(&["/nonexistent/minimo-package-manager"]),
            template(&["true"]),
        )
        .unwrap();
        let result = installer.install(Path::new("/"), &["x".into()]).await;
        assert!(matches!(result, Err(PipelineError::Command { .. })));
    }
}
