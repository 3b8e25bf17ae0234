//! Package metadata and file ownership from a dpkg database.
//!
//! Reads `var/lib/dpkg/status` for installed packages and their
//! dependencies, and `var/lib/dpkg/info/*.list` for the files each package
//! installed.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use compact_str::CompactString;
use tracing::{debug, warn};

use minimo_core::{normalize_path, LookupError, OwnershipLookup, PackageLookup, PackageNode};

use crate::error::PipelineError;

/// Status file relative to the build root.
pub const STATUS_PATH: &str = "var/lib/dpkg/status";

/// File list directory relative to the build root.
pub const INFO_DIR: &str = "var/lib/dpkg/info";

/// Installed packages of a dpkg database.
///
/// Dependency fields are reduced to plain names: for an alternative
/// (`a | b`) the first option is taken, version constraints and
/// architecture qualifiers are dropped. A virtual package looks up as a
/// node depending on its first provider in name order.
#[derive(Debug, Clone, Default)]
pub struct DpkgDatabase {
    packages: BTreeMap<CompactString, Vec<CompactString>>,
    providers: BTreeMap<CompactString, Vec<CompactString>>,
    owners: HashMap<CompactString, Vec<CompactString>>,
}

impl DpkgDatabase {
    /// Load the database of a build root.
    ///
    /// A missing status file is an error; a missing info directory only
    /// leaves ownership empty.
    pub fn load(root: &Path) -> Result<Self, PipelineError> {
        let status_path = root.join(STATUS_PATH);
        let status =
            std::fs::read_to_string(&status_path).map_err(|e| database_error(&status_path, e))?;
        let mut db = Self::parse_status(&status);

        let info_dir = root.join(INFO_DIR);
        match std::fs::read_dir(&info_dir) {
            Ok(entries) => {
                let mut lists: Vec<PathBuf> = entries
                    .filter_map(Result::ok)
                    .map(|e| e.path())
                    .filter(|p| p.extension().is_some_and(|ext| ext == "list"))
                    .collect();
                lists.sort();

                for list in lists {
                    let Some(stem) = list.file_stem().and_then(|s| s.to_str()) else {
                        continue;
                    };
                    let package = strip_arch(stem);
                    if !db.packages.contains_key(package) {
                        continue;
                    }
                    match std::fs::read_to_string(&list) {
                        Ok(text) => db.add_file_list(package, &text),
                        Err(e) => {
                            warn!(path = %list.display(), error = %e, "skipping unreadable file list");
                        }
                    }
                }
            }
            Err(e) => {
                warn!(path = %info_dir.display(), error = %e, "no dpkg file lists, ownership unknown");
            }
        }

        debug!(
            packages = db.packages.len(),
            virtual_packages = db.providers.len(),
            owned_paths = db.owners.len(),
            "dpkg database loaded"
        );
        Ok(db)
    }

    /// Parse the contents of a status file. Packages that are not fully
    /// installed are skipped.
    pub fn parse_status(text: &str) -> Self {
        let mut db = Self::default();
        for stanza in stanzas(text) {
            let Some(name) = stanza.get("Package").map(|n| n.trim()) else {
                continue;
            };
            if name.is_empty() || !is_installed(stanza.get("Status").map(String::as_str)) {
                continue;
            }
            let name = CompactString::from(name);

            let mut depends: Vec<CompactString> = Vec::new();
            for field in ["Pre-Depends", "Depends"] {
                if let Some(value) = stanza.get(field) {
                    for dep in parse_relations(value) {
                        if !depends.contains(&dep) {
                            depends.push(dep);
                        }
                    }
                }
            }

            if let Some(value) = stanza.get("Provides") {
                for provided in parse_relations(value) {
                    let providers = db.providers.entry(provided).or_default();
                    if !providers.contains(&name) {
                        providers.push(name.clone());
                    }
                }
            }

            db.packages.insert(name, depends);
        }
        for providers in db.providers.values_mut() {
            providers.sort();
        }
        db
    }

    /// Record the contents of a `.list` file for `package`. Every package
    /// listing a path owns it, in the order the lists were added.
    pub fn add_file_list(&mut self, package: &str, text: &str) {
        for line in text.lines() {
            let path = normalize_path(line.trim());
            if path.is_empty() {
                continue;
            }
            let owners = self.owners.entry(path).or_default();
            if !owners.iter().any(|owner| owner == package) {
                owners.push(CompactString::from(package));
            }
        }
    }

    /// Number of installed packages.
    pub fn len(&self) -> usize {
        self.packages.len()
    }

    /// Check if no package is installed.
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Installed providers of a virtual package.
    pub fn providers(&self, name: &str) -> &[CompactString] {
        self.providers.get(name).map(Vec::as_slice).unwrap_or(&[])
    }
}

impl PackageLookup for DpkgDatabase {
    fn lookup(&self, name: &str) -> Result<PackageNode, LookupError> {
        let name = strip_arch(name);
        if let Some(depends) = self.packages.get(name) {
            return Ok(PackageNode::new(name, depends.iter().cloned()));
        }
        match self.providers(name).first() {
            Some(provider) => Ok(PackageNode::new(name, [provider.clone()])),
            None => Err(LookupError::NotFound),
        }
    }
}

impl OwnershipLookup for DpkgDatabase {
    fn owner(&self, path: &str) -> Result<Option<CompactString>, LookupError> {
        Ok(self
            .owners
            .get(normalize_path(path).as_str())
            .and_then(|owners| owners.first().cloned()))
    }

    fn owners(&self, path: &str) -> Result<Vec<CompactString>, LookupError> {
        Ok(self
            .owners
            .get(normalize_path(path).as_str())
            .cloned()
            .unwrap_or_default())
    }
}

fn database_error(path: &Path, err: std::io::Error) -> PipelineError {
    PipelineError::Database {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

/// Split a control file into stanzas of `field -> value`. Continuation
/// lines are appended to the previous field.
fn stanzas(text: &str) -> Vec<HashMap<String, String>> {
    let mut result = Vec::new();
    let mut current: HashMap<String, String> = HashMap::new();
    let mut last_field: Option<String> = None;

    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                result.push(std::mem::take(&mut current));
            }
            last_field = None;
            continue;
        }
        if line.starts_with([' ', '\t']) {
            if let Some(value) = last_field.as_deref().and_then(|f| current.get_mut(f)) {
                value.push('\n');
                value.push_str(line.trim());
            }
            continue;
        }
        if let Some((field, value)) = line.split_once(':') {
            let field = field.trim().to_string();
            current.insert(field.clone(), value.trim().to_string());
            last_field = Some(field);
        }
    }
    if !current.is_empty() {
        result.push(current);
    }
    result
}

/// `Status: <want> <flag> <status>`; only `installed` counts.
fn is_installed(status: Option<&str>) -> bool {
    status
        .and_then(|s| s.split_whitespace().nth(2))
        .is_some_and(|s| s == "installed")
}

/// Reduce a relationship field to package names.
fn parse_relations(value: &str) -> Vec<CompactString> {
    value
        .split(',')
        .filter_map(|group| {
            let first = group.split('|').next()?;
            let name = first.split('(').next()?.trim();
            let name = strip_arch(name);
            (!name.is_empty()).then(|| CompactString::from(name))
        })
        .collect()
}

fn strip_arch(name: &str) -> &str {
    name.split_once(':').map_or(name, |(base, _)| base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const STATUS: &str = "\
Package: nginx
Status: install ok installed
Version: 1.24.0-2
Depends: libc6 (>= 2.34), libssl3 (>= 3.0.0) | libssl1.1, zlib1g:amd64, mail-transport-agent
Description: small, powerful, scalable web/proxy server
 Nginx (\"engine X\") is a high-performance web and reverse proxy server.

Package: libc6
Status: install ok installed
Pre-Depends: libgcc-s1

Package: libgcc-s1
Status: install ok installed

Package: libssl3
Status: install ok installed
Depends: libc6

Package: zlib1g
Status: install ok installed

Package: postfix
Status: install ok installed
Provides: mail-transport-agent, default-mta (= 3.7)

Package: exim4
Status: deinstall ok config-files
Provides: mail-transport-agent
";

    #[test]
    fn test_parse_status() {
        let db = DpkgDatabase::parse_status(STATUS);
        assert_eq!(db.len(), 6);

        let nginx = db.lookup("nginx").unwrap();
        assert_eq!(
            nginx.depends,
            vec!["libc6", "libssl3", "zlib1g", "mail-transport-agent"]
        );
        assert_eq!(db.lookup("libc6").unwrap().depends, vec!["libgcc-s1"]);
        assert_eq!(db.lookup("libc6:amd64").unwrap().name, "libc6");
    }

    #[test]
    fn test_config_files_only_is_not_installed() {
        let db = DpkgDatabase::parse_status(STATUS);
        assert_eq!(db.lookup("exim4"), Err(LookupError::NotFound));
        assert_eq!(db.providers("mail-transport-agent").to_vec(), vec!["postfix"]);
    }

    #[test]
    fn test_virtual_package_maps_to_provider() {
        let db = DpkgDatabase::parse_status(STATUS);
        let node = db.lookup("mail-transport-agent").unwrap();
        assert_eq!(node.depends, vec!["postfix"]);
        assert_eq!(db.lookup("default-mta").unwrap().depends, vec!["postfix"]);
        assert_eq!(db.lookup("libssl1.1"), Err(LookupError::NotFound));
    }

    #[test]
    fn test_file_lists_define_ownership() {
        let mut db = DpkgDatabase::parse_status(STATUS);
        db.add_file_list("libc6", "/.\n/etc\n/lib/x86_64-linux-gnu/libc.so.6\n");
        db.add_file_list("nginx", "/.\n/etc\n/etc/nginx\n/etc/nginx/nginx.conf\n");

        assert_eq!(db.owner("etc/nginx/nginx.conf").unwrap().as_deref(), Some("nginx"));
        assert_eq!(db.owner("/etc").unwrap().as_deref(), Some("libc6"));
        assert_eq!(db.owner("var/log/apt/history.log").unwrap(), None);
    }

    #[test]
    fn test_shared_directory_lists_every_package() {
        let mut db = DpkgDatabase::parse_status(STATUS);
        db.add_file_list("libc6", "/.\n/usr/share/man\n/usr/share/man/man8\n");
        db.add_file_list("nginx", "/.\n/usr/share/man\n/usr/share/man/man8/nginx.8.gz\n");

        assert_eq!(db.owners("usr/share/man").unwrap(), vec!["libc6", "nginx"]);
        assert_eq!(db.owners("usr/share/man/man8/nginx.8.gz").unwrap(), vec!["nginx"]);
        assert!(db.owners("srv").unwrap().is_empty());
    }

    #[test]
    fn test_load_from_root() {
        let temp = TempDir::new().unwrap();
        let info = temp.path().join(INFO_DIR);
        fs::create_dir_all(&info).unwrap();
        fs::write(temp.path().join(STATUS_PATH), STATUS).unwrap();
        fs::write(info.join("nginx.list"), "/.\n/etc/nginx/nginx.conf\n").unwrap();
        fs::write(info.join("zlib1g:amd64.list"), "/usr/lib/libz.so.1\n").unwrap();
        fs::write(info.join("exim4.list"), "/usr/sbin/exim4\n").unwrap();
        fs::write(info.join("nginx.md5sums"), "ignored\n").unwrap();

        let db = DpkgDatabase::load(temp.path()).unwrap();
        assert_eq!(db.owner("etc/nginx/nginx.conf").unwrap().as_deref(), Some("nginx"));
        assert_eq!(db.owner("usr/lib/libz.so.1").unwrap().as_deref(), Some("zlib1g"));
        assert_eq!(db.owner("usr/sbin/exim4").unwrap(), None);
    }

    #[test]
    fn test_missing_status_is_an_error() {
        let temp = TempDir::new().unwrap();
        assert!(matches!(
            DpkgDatabase::load(temp.path()),
            Err(PipelineError::Database { .. })
        ));
    }
}
