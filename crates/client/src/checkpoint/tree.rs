//! In-memory image of a configuration directory.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::trace;

/// Every regular file below a directory, keyed by relative path.
///
/// Two trees are equal exactly when the directories they were read from
/// hold byte-identical files at identical paths.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigTree {
    files: BTreeMap<PathBuf, Vec<u8>>,
}

impl ConfigTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a directory recursively. A missing directory reads as empty.
    pub fn read_dir(root: &Path) -> io::Result<Self> {
        let mut tree = Self::new();
        if root.exists() {
            tree.read_into(root, root)?;
        }
        trace!(root = %root.display(), files = tree.len(), "Read configuration tree");
        Ok(tree)
    }

    fn read_into(&mut self, root: &Path, dir: &Path) -> io::Result<()> {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                self.read_into(root, &path)?;
            } else if file_type.is_file() {
                let relative = path
                    .strip_prefix(root)
                    .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?
                    .to_path_buf();
                self.files.insert(relative, fs::read(&path)?);
            }
        }
        Ok(())
    }

    /// Make `root` hold exactly this tree.
    ///
    /// Files that differ are rewritten, files absent from the tree are
    /// removed, and directories left empty by removals are pruned.
    pub fn write_to(&self, root: &Path) -> io::Result<()> {
        fs::create_dir_all(root)?;
        let current = Self::read_dir(root)?;

        for path in current.files.keys() {
            if !self.files.contains_key(path) {
                fs::remove_file(root.join(path))?;
                prune_empty_parents(root, path);
            }
        }

        for (path, contents) in &self.files {
            if current.files.get(path) == Some(contents) {
                continue;
            }
            let target = root.join(path);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&target, contents)?;
        }

        Ok(())
    }

    pub fn get(&self, path: impl AsRef<Path>) -> Option<&[u8]> {
        self.files.get(path.as_ref()).map(Vec::as_slice)
    }

    pub fn get_str(&self, path: impl AsRef<Path>) -> Option<&str> {
        self.get(path).and_then(|bytes| std::str::from_utf8(bytes).ok())
    }

    pub fn contains(&self, path: impl AsRef<Path>) -> bool {
        self.files.contains_key(path.as_ref())
    }

    /// Insert or replace a file.
    ///
    /// # Panics
    ///
    /// Panics if `path` is absolute or contains `..`; tree paths always
    /// stay below the directory the tree is written to.
    pub fn insert(&mut self, path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) {
        let path = path.into();
        assert!(
            is_contained(&path),
            "configuration path escapes its root: {}",
            path.display()
        );
        self.files.insert(path, contents.into());
    }

    pub fn remove(&mut self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        self.files.remove(path.as_ref())
    }

    /// Files directly below `dir`
    pub fn files_in<'a>(&'a self, dir: &'a Path) -> impl Iterator<Item = (&'a Path, &'a [u8])> {
        self.files
            .iter()
            .filter(move |(path, _)| path.parent() == Some(dir))
            .map(|(path, contents)| (path.as_path(), contents.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// SHA-256 over every path and its contents, hex encoded.
    ///
    /// Lengths are hashed before each field so that no two different trees
    /// share a byte stream.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for (path, contents) in &self.files {
            let path = path.to_string_lossy();
            hasher.update((path.len() as u64).to_be_bytes());
            hasher.update(path.as_bytes());
            hasher.update((contents.len() as u64).to_be_bytes());
            hasher.update(contents);
        }
        hex::encode(hasher.finalize())
    }
}

fn is_contained(path: &Path) -> bool {
    path.components().all(|c| matches!(c, Component::Normal(_)))
        && path.components().next().is_some()
}

fn prune_empty_parents(root: &Path, relative: &Path) {
    let mut dir = relative.parent();
    while let Some(current) = dir {
        if current.as_os_str().is_empty() {
            break;
        }
        // Fails (and stops) at the first non-empty directory
        if fs::remove_dir(root.join(current)).is_err() {
            break;
        }
        dir = current.parent();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_read_missing_dir_is_empty() {
        let tree = ConfigTree::read_dir(Path::new("/nonexistent/certpilot")).unwrap();
        assert!(tree.is_empty());
    }

    #[test]
    fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        let mut tree = ConfigTree::new();
        tree.insert("sites/a.toml", "a");
        tree.insert("certs/a/cert.pem", "cert");

        tree.write_to(dir.path()).unwrap();

        assert_eq!(ConfigTree::read_dir(dir.path()).unwrap(), tree);
    }

    #[test]
    fn test_write_removes_extra_files_and_empty_dirs() {
        let dir = TempDir::new().unwrap();
        let mut tree = ConfigTree::new();
        tree.insert("sites/a.toml", "a");
        tree.insert("certs/a/cert.pem", "cert");
        tree.write_to(dir.path()).unwrap();

        tree.remove("certs/a/cert.pem");
        tree.write_to(dir.path()).unwrap();

        assert!(!dir.path().join("certs").exists());
        assert_eq!(ConfigTree::read_dir(dir.path()).unwrap(), tree);
    }

    #[test]
    fn test_digest_changes_with_content() {
        let mut a = ConfigTree::new();
        a.insert("x", "1");
        let mut b = a.clone();
        assert_eq!(a.digest(), b.digest());

        b.insert("x", "2");
        assert_ne!(a.digest(), b.digest());
    }

    #[test]
    fn test_files_in() {
        let mut tree = ConfigTree::new();
        tree.insert("sites/a.toml", "a");
        tree.insert("sites/b.toml", "b");
        tree.insert("certs/a/cert.pem", "cert");

        let sites: Vec<_> = tree.files_in(Path::new("sites")).collect();
        assert_eq!(sites.len(), 2);
    }

    #[test]
    #[should_panic(expected = "escapes its root")]
    fn test_insert_rejects_parent_components() {
        ConfigTree::new().insert("../etc/passwd", "x");
    }
}
