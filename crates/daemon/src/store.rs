use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use bft_protocol::{ProtocolError, validate_filename};

/// Errors raised by the backup store.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// The backup directory could not be created at startup.
    #[error("cannot create backup directory '{}': {source}", .path.display())]
    Create {
        /// Directory the daemon attempted to create.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// A client-supplied name violated the wire limits.
    #[error(transparent)]
    Name(#[from] ProtocolError),

    /// A client-supplied name was not a plain basename.
    #[error("filename {name:?} is not a plain basename")]
    NotABasename {
        /// The offending name.
        name: String,
    },
}

/// The daemon's single directory of stored files, keyed by basename.
#[derive(Debug)]
pub struct BackupStore {
    root: PathBuf,
}

impl BackupStore {
    /// Opens the store rooted at `root`, creating the directory when absent.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        if !root.is_dir() {
            create_dir_0755(&root).map_err(|source| StoreError::Create {
                path: root.clone(),
                source,
            })?;
            info!(path = %root.display(), "created backup directory");
        }
        Ok(Self { root })
    }

    /// Directory holding the stored files.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps a client-supplied name onto its path inside the store.
    ///
    /// Only plain basenames are accepted: path separators, `.`/`..`
    /// components, and embedded NUL bytes are refused rather than stripped,
    /// so a request can never address anything outside the store.
    pub fn resolve(&self, name: &str) -> Result<PathBuf, StoreError> {
        validate_filename(name)?;
        if name.contains(['/', '\\', '\0']) || name == "." || name == ".." {
            return Err(StoreError::NotABasename {
                name: name.to_owned(),
            });
        }
        Ok(self.root.join(name))
    }
}

#[cfg(unix)]
fn create_dir_0755(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;

    fs::DirBuilder::new().mode(0o755).create(path)
}

#[cfg(not(unix))]
fn create_dir_0755(path: &Path) -> io::Result<()> {
    fs::create_dir(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_creates_the_directory_once() {
        let base = tempfile::tempdir().expect("tempdir");
        let root = base.path().join("backup");

        let store = BackupStore::open(&root).expect("first open");
        assert!(root.is_dir());
        assert_eq!(store.root(), root);

        // Re-opening an existing directory must not fail.
        BackupStore::open(&root).expect("second open");
    }

    #[test]
    fn resolve_joins_plain_basenames() {
        let base = tempfile::tempdir().expect("tempdir");
        let store = BackupStore::open(base.path().join("backup")).expect("open");

        let path = store.resolve("greet.txt").expect("resolve");
        assert_eq!(path, store.root().join("greet.txt"));
    }

    #[test]
    fn resolve_refuses_traversal_and_separators() {
        let base = tempfile::tempdir().expect("tempdir");
        let store = BackupStore::open(base.path().join("backup")).expect("open");

        for name in ["../greet.txt", "a/b", "a\\b", ".", "..", "nested/.."] {
            assert!(
                matches!(
                    store.resolve(name),
                    Err(StoreError::NotABasename { .. })
                ),
                "{name:?} must be refused"
            );
        }
    }

    #[test]
    fn resolve_enforces_the_wire_length_limit() {
        let base = tempfile::tempdir().expect("tempdir");
        let store = BackupStore::open(base.path().join("backup")).expect("open");

        assert!(matches!(
            store.resolve(&"n".repeat(65)),
            Err(StoreError::Name(_))
        ));
        assert!(matches!(store.resolve(""), Err(StoreError::Name(_))));
    }
}
