//! Filesystem capability used by the generator.
//!
//! Generation only ever touches the disk through [`FileSystem`], so every
//! directory listing applies the same hidden-entry rule and every write creates
//! its parent directories.

use std::{
    fmt, fs, io,
    path::{Path, PathBuf},
};

use walkdir::WalkDir;

/// Whether a file or directory name is hidden (starts with a dot).
pub fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

/// Whether any component of `path` below `root` is hidden.
pub fn is_hidden_below(path: &Path, root: &Path) -> bool {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .any(|c| c.as_os_str().to_str().is_some_and(is_hidden))
}

/// Non-hidden entries of one directory, each list sorted by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    pub dirs: Vec<String>,
    pub files: Vec<String>,
}

/// The set of filesystem primitives generation relies on.
pub trait FileSystem: Send + Sync + fmt::Debug {
    /// List the non-hidden subdirectories and files of `dir`.
    fn list(&self, dir: &Path) -> io::Result<Listing>;

    /// Read a whole file.
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Copy `src` to `dst`, creating the parent directories of `dst`.
    fn copy(&self, src: &Path, dst: &Path) -> io::Result<()>;

    /// Write `contents` to `path`, creating its parent directories.
    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()>;

    /// Remove a file or a directory tree. A missing path is not an error.
    fn remove_all(&self, path: &Path) -> io::Result<()>;

    fn is_dir(&self, path: &Path) -> bool;

    fn is_file(&self, path: &Path) -> bool;

    /// Every non-hidden directory below `dir`, parents before children.
    fn explore(&self, dir: &Path) -> Vec<PathBuf> {
        let mut found = Vec::new();
        let mut stack = vec![dir.to_path_buf()];
        while let Some(current) = stack.pop() {
            let Ok(listing) = self.list(&current) else {
                continue;
            };
            for name in listing.dirs.iter().rev() {
                stack.push(current.join(name));
            }
            if current != dir {
                found.push(current);
            }
        }
        found
    }
}

/// [`FileSystem`] backed by the local disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

impl FileSystem for LocalFs {
    fn list(&self, dir: &Path) -> io::Result<Listing> {
        let mut listing = Listing::default();

        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let Ok(name) = entry.file_name().into_string() else {
                tracing::warn!(path = %entry.path().display(), "skipping non UTF-8 entry");
                continue;
            };
            if is_hidden(&name) {
                continue;
            }
            if entry.path().is_dir() {
                listing.dirs.push(name);
            } else {
                listing.files.push(name);
            }
        }

        listing.dirs.sort();
        listing.files.sort();
        Ok(listing)
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }

    fn copy(&self, src: &Path, dst: &Path) -> io::Result<()> {
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(src, dst).map(|_| ())
    }

    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, contents)
    }

    fn remove_all(&self, path: &Path) -> io::Result<()> {
        let result = match fs::symlink_metadata(path) {
            Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
            Ok(_) => fs::remove_file(path),
            Err(e) => Err(e),
        };
        match result {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn explore(&self, dir: &Path) -> Vec<PathBuf> {
        WalkDir::new(dir)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !e.file_name().to_str().is_some_and(is_hidden))
            .filter_map(|e| match e {
                Ok(entry) => Some(entry),
                Err(err) => {
                    tracing::debug!(error = %err, "skipping unreadable entry");
                    None
                }
            })
            .filter(|e| e.path().is_dir())
            .map(walkdir::DirEntry::into_path)
            .collect()
    }
}
