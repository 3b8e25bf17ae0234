use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use compact_str::CompactString;
use minimo_core::{Classification, StaticPackageIndex};
use minimo_pipeline::{
    BuildRoot, ExistingRoot, InstallOutcome, PackageInstaller, Pipeline, PipelineConfig,
    PipelineError, PipelineStage, StaticLoader,
};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// Installer that writes files into the root instead of running a package
/// manager.
#[derive(Default)]
struct FakeInstaller {
    fail_install: bool,
    calls: Mutex<Vec<String>>,
}

#[async_trait]
impl PackageInstaller for FakeInstaller {
    async fn install(
        &self,
        root: &Path,
        packages: &[CompactString],
    ) -> Result<InstallOutcome, PipelineError> {
        self.calls.lock().unwrap().push(format!("install {}", packages.join(" ")));
        if self.fail_install {
            return Ok(InstallOutcome::failed("E: Unable to locate package nginx"));
        }
        fs::create_dir_all(root.join("etc/nginx")).unwrap();
        fs::create_dir_all(root.join("var/log/apt")).unwrap();
        fs::create_dir_all(root.join("usr/share/doc/nginx")).unwrap();
        fs::write(root.join("etc/nginx/nginx.conf"), b"worker_processes 1;\n").unwrap();
        fs::write(root.join("usr/share/doc/nginx/README"), b"docs").unwrap();
        fs::write(root.join("var/log/apt/history.log"), b"Install: nginx\n").unwrap();
        fs::write(root.join("usr/bin/apt-helper"), b"apt").unwrap();
        Ok(InstallOutcome::succeeded("Setting up nginx\n"))
    }

    async fn remove(
        &self,
        root: &Path,
        packages: &[CompactString],
    ) -> Result<InstallOutcome, PipelineError> {
        self.calls.lock().unwrap().push(format!("remove {}", packages.join(" ")));
        let _ = fs::remove_file(root.join("usr/bin/apt-helper"));
        Ok(InstallOutcome::succeeded("Removing apt\n"))
    }
}

fn base_root() -> TempDir {
    let temp = TempDir::new().unwrap();
    fs::create_dir_all(temp.path().join("usr/bin")).unwrap();
    fs::create_dir_all(temp.path().join("dev")).unwrap();
    fs::write(temp.path().join("dev/null"), b"").unwrap();
    fs::write(temp.path().join("usr/bin/sh"), b"#!").unwrap();
    temp
}

fn index() -> StaticPackageIndex {
    StaticPackageIndex::new()
        .with_package("nginx", ["libc6"])
        .with_package("libc6", Vec::<&str>::new())
        .with_package("apt", ["libc6"])
        .with_files(
            "nginx",
            ["/etc/nginx", "/etc/nginx/nginx.conf", "/usr/share/doc/nginx/README"],
        )
        .with_files("apt", ["/var/log/apt/history.log", "/usr/bin/apt-helper"])
}

fn config(root: &Path) -> PipelineConfig {
    PipelineConfig {
        root: Some(root.to_path_buf()),
        include_packages: vec!["nginx".into()],
        exclude_packages: vec!["apt".into()],
        exclude_files: vec!["usr/share/doc/**".to_string()],
        ..PipelineConfig::default()
    }
}

fn pipeline(root: &Path, installer: Arc<FakeInstaller>) -> Pipeline {
    Pipeline::new(
        config(root),
        Arc::new(ExistingRoot::new(root)),
        installer,
        Arc::new(StaticLoader::new(index())),
    )
}

#[tokio::test]
async fn test_pipeline_end_to_end() {
    let temp = base_root();
    let installer = Arc::new(FakeInstaller::default());
    let pipeline = pipeline(temp.path(), Arc::clone(&installer));
    let mut stages = pipeline.subscribe();

    let outcome = pipeline.run(&CancellationToken::new()).await.unwrap();
    let plan = &outcome.plan;

    assert_eq!(
        plan.classification_of("etc/nginx/nginx.conf"),
        Some(Classification::Required)
    );
    assert_eq!(
        plan.classification_of("var/log/apt/history.log"),
        Some(Classification::Incidental)
    );
    assert_eq!(
        plan.classification_of("usr/share/doc/nginx/README"),
        Some(Classification::ExcludedByUser)
    );
    // Installed then removed: never seen by either snapshot.
    assert_eq!(plan.classification_of("usr/bin/apt-helper"), None);
    // Default ignore rules drop device nodes.
    assert!(!outcome.before.contains("dev/null"));
    assert!(outcome.before.contains("dev"));

    assert!(outcome.resolution.closure.contains("libc6"));
    assert!(outcome.install_log.contains("Setting up nginx"));
    assert!(outcome.install_log.contains("Removing apt"));
    assert_eq!(
        *installer.calls.lock().unwrap(),
        vec!["install nginx".to_string(), "remove apt".to_string()]
    );

    let mut seen = Vec::new();
    while let Ok(stage) = stages.try_recv() {
        seen.push(stage);
    }
    assert_eq!(seen.first(), Some(&PipelineStage::PreparingRoot));
    assert_eq!(seen.last(), Some(&PipelineStage::Complete));
    assert_eq!(seen.len(), 10);
}

#[tokio::test]
async fn test_install_failure_aborts_before_second_snapshot() {
    let temp = base_root();
    let installer = Arc::new(FakeInstaller {
        fail_install: true,
        ..FakeInstaller::default()
    });
    let pipeline = pipeline(temp.path(), Arc::clone(&installer));
    let mut stages = pipeline.subscribe();

    let err = pipeline.run(&CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, PipelineError::InstallFailed { .. }));
    assert_eq!(err.log(), Some("E: Unable to locate package nginx"));

    let mut seen = Vec::new();
    while let Ok(stage) = stages.try_recv() {
        seen.push(stage);
    }
    assert!(!seen.contains(&PipelineStage::Removing));
    assert!(!seen.contains(&PipelineStage::SnapshotAfter));
    assert_eq!(installer.calls.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_cancelled_pipeline() {
    let temp = base_root();
    let installer = Arc::new(FakeInstaller::default());
    let pipeline = pipeline(temp.path(), Arc::clone(&installer));

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = pipeline.run(&cancel).await.unwrap_err();
    assert!(matches!(err, PipelineError::Cancelled));
    assert!(installer.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_root() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("absent");
    let result = ExistingRoot::new(&root).prepare().await;
    assert!(matches!(result, Err(PipelineError::RootUnavailable { .. })));
}

#[test]
fn test_from_config_requires_root() {
    let config = PipelineConfig {
        include_packages: vec!["nginx".into()],
        ..PipelineConfig::default()
    };
    assert!(matches!(
        Pipeline::from_config(config),
        Err(PipelineError::Config(_))
    ));
}
