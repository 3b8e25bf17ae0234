//! File records and relative path normalization.

use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;

/// Mask selecting the permission bits (including setuid/setgid/sticky).
pub const PERMISSION_MASK: u32 = 0o7777;

/// Type of a filesystem entry.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum EntryKind {
    /// Regular file.
    File,
    /// Directory.
    Directory,
    /// Symbolic link (never followed).
    Symlink,
    /// Device nodes, sockets, fifos.
    Other,
}

/// Metadata of a single entry in a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Normalized path relative to the snapshot root.
    pub path: CompactString,
    /// Entry type.
    pub kind: EntryKind,
    /// Size in bytes as reported by `lstat`.
    pub size: u64,
    /// Raw mode (type and permission bits).
    pub mode: u32,
    /// Last modification time.
    pub mtime: DateTime<Utc>,
}

impl FileRecord {
    /// Create a new record.
    pub fn new(
        path: impl Into<CompactString>,
        kind: EntryKind,
        size: u64,
        mode: u32,
        mtime: DateTime<Utc>,
    ) -> Self {
        Self {
            path: path.into(),
            kind,
            size,
            mode,
            mtime,
        }
    }

    /// Create a regular file record.
    pub fn file(path: impl Into<CompactString>, size: u64, mode: u32, mtime: DateTime<Utc>) -> Self {
        Self::new(path, EntryKind::File, size, mode, mtime)
    }

    /// Create a directory record.
    pub fn directory(path: impl Into<CompactString>, mode: u32, mtime: DateTime<Utc>) -> Self {
        Self::new(path, EntryKind::Directory, 0, mode, mtime)
    }

    /// Check if this record is a regular file.
    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    /// Check if this record is a directory.
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    /// Check if this record is a symlink.
    pub fn is_symlink(&self) -> bool {
        self.kind == EntryKind::Symlink
    }

    /// Permission bits without the file type.
    pub fn permissions(&self) -> u32 {
        self.mode & PERMISSION_MASK
    }
}

/// A path with a component that is not valid UTF-8.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Path is not valid UTF-8: {}", .0.display())]
pub struct NonUtf8Path(pub PathBuf);

/// Express `path` relative to `root` using `/` separators.
///
/// Returns `Ok(None)` for the root itself and for paths outside of `root`.
/// Components that are not valid UTF-8 are an error rather than being
/// replaced, so two distinct entries never share a key.
pub fn relative_to(root: &Path, path: &Path) -> Result<Option<CompactString>, NonUtf8Path> {
    let Ok(rel) = path.strip_prefix(root) else {
        return Ok(None);
    };
    let mut out = CompactString::default();
    for component in rel.components() {
        if let Component::Normal(part) = component {
            let part = part
                .to_str()
                .ok_or_else(|| NonUtf8Path(path.to_path_buf()))?;
            if !out.is_empty() {
                out.push('/');
            }
            out.push_str(part);
        }
    }
    Ok((!out.is_empty()).then_some(out))
}

/// Normalize a user-supplied path into snapshot key form.
///
/// Leading `/` and `./` are dropped, repeated separators collapsed and `..`
/// resolved lexically, so `/etc//nginx/./nginx.conf` becomes
/// `etc/nginx/nginx.conf`.
pub fn normalize_path(raw: &str) -> CompactString {
    let mut parts: Vec<&str> = Vec::new();
    for part in raw.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    CompactString::from(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_to() {
        let root = PathBuf::from("/var/minimo/root");
        assert_eq!(
            relative_to(&root, &root.join("etc/nginx/nginx.conf"))
                .unwrap()
                .as_deref(),
            Some("etc/nginx/nginx.conf")
        );
        assert_eq!(relative_to(&root, &root), Ok(None));
        assert_eq!(relative_to(&root, Path::new("/elsewhere")), Ok(None));
    }

    #[cfg(unix)]
    #[test]
    fn test_relative_to_rejects_non_utf8() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let root = PathBuf::from("/var/minimo/root");
        let path = root.join(OsStr::from_bytes(b"usr/a\xff"));
        assert_eq!(relative_to(&root, &path), Err(NonUtf8Path(path.clone())));
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/etc//nginx/./nginx.conf"), "etc/nginx/nginx.conf");
        assert_eq!(normalize_path("usr/lib/../share/"), "usr/share");
        assert_eq!(normalize_path("/"), "");
    }

    #[test]
    fn test_permissions_strip_type_bits() {
        let record = FileRecord::file("bin/sh", 10, 0o100755, Utc::now());
        assert_eq!(record.permissions(), 0o755);
        assert!(!record.is_dir());
    }
}
