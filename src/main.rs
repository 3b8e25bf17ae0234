//! minimo - build minimal filesystem images from the files a package set
//! actually needs.
//!
//! Usage:
//!   minimo build [CONF]                  Run the full pipeline from a config file
//!   minimo snapshot ROOT                 Snapshot a directory (JSON export)
//!   minimo diff BEFORE AFTER             Compare two exported snapshots
//!   minimo resolve PKG...                Compute a dependency closure
//!   minimo plan BEFORE AFTER PKG...      Classify the changes between two snapshots
//!   minimo --help                        Show help

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{bail, Context, Result};
use itertools::Itertools;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use minimo_analyze::{
    diff, ChangeRecord, DeltaSet, DependencyResolver, MinimizationPlanner, Resolution,
};
use minimo_core::{Classification, MinimizationPlan, Overrides, Snapshot, SnapshotConfig};
use minimo_pipeline::{
    config_path, DatabaseLoader, DpkgLoader, ManifestLoader, PackageDatabase, Pipeline,
    PipelineConfig, Platform, CONFIG_ENV,
};
use minimo_scan::JwalkSnapshotter;

#[derive(Parser)]
#[command(
    name = "minimo",
    version,
    about = "Build minimal filesystem images",
    long_about = "minimo installs a package set into a build root, records what changed, \
                  and keeps only the changes owned by the packages' dependency closure."
)]
struct Cli {
    /// Show verbose debug information
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full pipeline: snapshot, install, snapshot, diff, resolve, plan
    Build {
        /// Path to the config file
        #[arg(env = CONFIG_ENV)]
        conf: Option<PathBuf>,

        /// Platform to build for
        #[arg(long)]
        platform: Option<Platform>,

        /// Pre-provisioned build root to install into
        #[arg(long)]
        root: Option<PathBuf>,

        /// Additional package to install in the image
        #[arg(long = "include-pkg")]
        include_pkgs: Vec<String>,

        /// Package to remove from the image, even if something depends on it
        #[arg(long = "exclude-pkg")]
        exclude_pkgs: Vec<String>,

        /// Glob of files to keep in the image
        #[arg(long = "include-file")]
        include_files: Vec<String>,

        /// Glob of files to drop from the image
        #[arg(long = "exclude-file")]
        exclude_files: Vec<String>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Snapshot a directory
    Snapshot {
        /// Root directory
        root: PathBuf,

        /// Regular expression of relative paths to skip (entry only)
        #[arg(long = "ignore")]
        ignore: Vec<String>,

        /// Regular expression of directories to skip with their contents
        #[arg(long = "prune")]
        prune: Vec<String>,

        /// Number of threads (0 = auto)
        #[arg(short = 'j', long, default_value = "0")]
        threads: usize,

        /// Output file (defaults to a summary on stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Compare two exported snapshots
    Diff {
        /// Snapshot taken before the change
        before: PathBuf,

        /// Snapshot taken after the change
        after: PathBuf,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Compute the dependency closure of packages
    Resolve {
        /// Requested packages
        #[arg(required = true)]
        packages: Vec<String>,

        #[command(flatten)]
        database: DatabaseArgs,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Classify the changes between two exported snapshots
    Plan {
        /// Snapshot taken before install
        before: PathBuf,

        /// Snapshot taken after install
        after: PathBuf,

        /// Requested packages
        #[arg(required = true)]
        packages: Vec<String>,

        #[command(flatten)]
        database: DatabaseArgs,

        /// Glob of files to keep
        #[arg(long = "include-file")]
        include_files: Vec<String>,

        /// Glob of files to drop
        #[arg(long = "exclude-file")]
        exclude_files: Vec<String>,

        /// Package whose files are dropped
        #[arg(long = "exclude-pkg")]
        exclude_pkgs: Vec<String>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },
}

/// Where package metadata comes from.
#[derive(clap::Args)]
struct DatabaseArgs {
    /// Static package manifest (TOML or JSON)
    #[arg(short, long, conflicts_with = "dpkg_root")]
    manifest: Option<PathBuf>,

    /// Build root whose dpkg database answers lookups
    #[arg(long)]
    dpkg_root: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Build {
            conf,
            platform,
            root,
            include_pkgs,
            exclude_pkgs,
            include_files,
            exclude_files,
            format,
        } => {
            let mut config = PipelineConfig::load_or_default(config_path(conf.as_deref()))
                .context("Failed to load config")?;
            if let Some(platform) = platform {
                config.platform = platform;
            }
            if root.is_some() {
                config.root = root;
            }
            config.include_packages.extend(include_pkgs.into_iter().map(Into::into));
            config.exclude_packages.extend(exclude_pkgs.into_iter().map(Into::into));
            config.include_files.extend(include_files);
            config.exclude_files.extend(exclude_files);
            run_build(config, format)?;
        }
        Command::Snapshot {
            root,
            ignore,
            prune,
            threads,
            output,
        } => {
            run_snapshot(&root, ignore, prune, threads, output)?;
        }
        Command::Diff {
            before,
            after,
            format,
        } => {
            run_diff(&before, &after, format)?;
        }
        Command::Resolve {
            packages,
            database,
            format,
        } => {
            run_resolve(&packages, &database, format)?;
        }
        Command::Plan {
            before,
            after,
            packages,
            database,
            include_files,
            exclude_files,
            exclude_pkgs,
            format,
        } => {
            let overrides = Overrides {
                include_paths: include_files,
                exclude_paths: exclude_files,
                exclude_packages: exclude_pkgs.into_iter().map(Into::into).collect(),
            };
            run_plan(&before, &after, &packages, &database, &overrides, format)?;
        }
    }

    Ok(())
}

/// Log to stderr; `RUST_LOG` wins over `-v`.
fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .init();
}

/// Run the full pipeline.
fn run_build(config: PipelineConfig, format: OutputFormat) -> Result<()> {
    debug!(?config, "effective configuration");
    let pipeline = Pipeline::from_config(config).context("Invalid configuration")?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start runtime")?;

    let outcome = runtime.block_on(async {
        let mut stages = pipeline.subscribe();
        let progress = tokio::spawn(async move {
            while let Ok(stage) = stages.recv().await {
                eprintln!("==> {stage}");
            }
        });
        let outcome = pipeline.run(&CancellationToken::new()).await;
        progress.abort();
        outcome
    });

    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(err) => {
            if let Some(log) = err.log() {
                eprintln!("{log}");
            }
            return Err(err).context("Build failed");
        }
    };

    print_plan(&outcome.plan, format)
}

/// Snapshot a directory and print a summary or export it.
fn run_snapshot(
    root: &Path,
    ignore: Vec<String>,
    prune: Vec<String>,
    threads: usize,
    output: Option<PathBuf>,
) -> Result<()> {
    let config = SnapshotConfig::builder()
        .root(root)
        .ignore_patterns(ignore)
        .prune_patterns(prune)
        .threads(threads)
        .build()
        .context("Invalid snapshot options")?;

    eprintln!("Snapshotting {}...", root.display());
    let snapshot = JwalkSnapshotter::new()
        .snapshot(&config)
        .context("Snapshot failed")?;

    match output {
        Some(output_path) => {
            let json = serde_json::to_string(&snapshot)?;
            std::fs::write(&output_path, json)
                .with_context(|| format!("Failed to write {}", output_path.display()))?;
            eprintln!("Exported {} entries to {}", snapshot.len(), output_path.display());
        }
        None => {
            println!();
            println!("{}", "─".repeat(60));
            println!(" {} - {}", snapshot.root.display(), format_size(snapshot.total_size()));
            println!(" {} entries", snapshot.len());
            println!("{}", "─".repeat(60));
        }
    }

    if snapshot.has_warnings() {
        eprintln!("{} warning(s) during snapshot", snapshot.warnings.len());
    }

    Ok(())
}

/// Compare two exported snapshots.
fn run_diff(before: &Path, after: &Path, format: OutputFormat) -> Result<()> {
    let before = read_snapshot(before)?;
    let after = read_snapshot(after)?;
    let delta = diff(&before, &after);

    match format {
        OutputFormat::Text => {
            for change in &delta {
                println!("{}", describe_change(change));
            }
            let summary = delta.summary();
            println!();
            println!(
                " {} added ({}), {} removed, {} modified",
                summary.added,
                format_size(summary.bytes_added),
                summary.removed,
                summary.modified
            );
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&delta)?);
        }
    }

    Ok(())
}

/// Compute and print a dependency closure.
fn run_resolve(packages: &[String], database: &DatabaseArgs, format: OutputFormat) -> Result<()> {
    let db = open_database(database)?;
    let resolution = DependencyResolver::new()
        .with_parallel(true)
        .resolve(packages, &*db)?;

    match format {
        OutputFormat::Text => print_resolution(&resolution),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&resolution)?),
    }

    Ok(())
}

/// Classify the delta between two exported snapshots.
fn run_plan(
    before: &Path,
    after: &Path,
    packages: &[String],
    database: &DatabaseArgs,
    overrides: &Overrides,
    format: OutputFormat,
) -> Result<()> {
    let before = read_snapshot(before)?;
    let after = read_snapshot(after)?;
    let delta: DeltaSet = diff(&before, &after);

    let db = open_database(database)?;
    let resolution = DependencyResolver::new()
        .with_parallel(true)
        .resolve(packages, &*db)?;
    let planner = MinimizationPlanner::new(overrides).context("Invalid override pattern")?;
    let plan = planner.plan(&delta, &resolution, &*db);

    print_plan(&plan, format)
}

fn open_database(args: &DatabaseArgs) -> Result<Box<dyn PackageDatabase>> {
    let db = match (&args.manifest, &args.dpkg_root) {
        (Some(manifest), _) => ManifestLoader::new(manifest).load(Path::new("/")),
        (None, Some(root)) => DpkgLoader.load(root),
        (None, None) => bail!("either --manifest or --dpkg-root is required"),
    };
    db.context("Failed to load package database")
}

fn read_snapshot(path: &Path) -> Result<Snapshot> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid snapshot {}", path.display()))
}

fn describe_change(change: &ChangeRecord) -> String {
    match change {
        ChangeRecord::Added { path, record } => {
            format!("+ {path} ({}, {})", record.kind, format_size(record.size))
        }
        ChangeRecord::Removed { path, .. } => format!("- {path}"),
        ChangeRecord::Modified { path, reasons, .. } => {
            format!("~ {path} ({})", reasons.iter().join(", "))
        }
    }
}

fn print_resolution(resolution: &Resolution) {
    let closure = &resolution.closure;
    println!(" {} packages in closure", closure.len());
    for name in closure.iter() {
        match closure.chain(name) {
            Some(chain) if chain.len() > 1 => println!("   {name}  ({})", chain.iter().join(" -> ")),
            _ => println!("   {name}"),
        }
    }
    if !resolution.is_complete() {
        println!();
        println!(" {} error(s):", resolution.errors.len());
        for error in &resolution.errors {
            println!("   {error}");
        }
    }
}

fn print_plan(plan: &MinimizationPlan, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            let summary = plan.summary();
            println!();
            println!("{}", "─".repeat(70));
            println!(" Minimization Plan");
            println!("{}", "─".repeat(70));
            println!();
            println!(
                " {} required, {} included, {} incidental, {} excluded ({} unowned)",
                summary.required,
                summary.included_by_user,
                summary.incidental,
                summary.excluded_by_user,
                summary.unowned
            );
            println!(" Closure: {}", plan.closure().iter().join(", "));
            println!();

            for (class, entries) in &plan
                .entries()
                .iter()
                .sorted_by_key(|e| class_order(e.classification))
                .chunk_by(|e| e.classification)
            {
                println!(" {class}:");
                for entry in entries {
                    let owner = entry.owner.as_deref().unwrap_or("-");
                    println!("   {:<60} {}", entry.change.path(), owner);
                }
                println!();
            }

            if !plan.errors().is_empty() {
                println!(" {} error(s):", plan.errors().len());
                for error in plan.errors() {
                    println!("   {error}");
                }
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&plan.report())?);
        }
    }

    Ok(())
}

fn class_order(class: Classification) -> u8 {
    match class {
        Classification::Required => 0,
        Classification::IncludedByUser => 1,
        Classification::Incidental => 2,
        Classification::ExcludedByUser => 3,
    }
}

/// Format size in human-readable form.
fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}
