//! Filesystem seam.
//!
//! The resolver, asset pipeline and page builder only touch disk through [`FileSystem`], so
//! tests can run against [`MemoryFileSystem`].

use crate::error::{BuildError, BuildResult};
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use walkdir::WalkDir;

pub trait FileSystem: Send + Sync {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Writes `bytes`, creating parent directories as needed.
    fn write(&self, path: &Path, bytes: &[u8]) -> io::Result<()>;

    fn exists(&self, path: &Path) -> bool;

    fn is_file(&self, path: &Path) -> bool;

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    fn remove_file(&self, path: &Path) -> io::Result<()>;

    /// Every file below `dir`, recursively, in sorted order.
    fn list_files(&self, dir: &Path) -> io::Result<Vec<PathBuf>>;

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        let bytes = self.read(path)?;
        String::from_utf8(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

/// Read a module source, mapping a missing file to [`BuildError::FileNotFound`].
pub fn read_source(
    fs: &dyn FileSystem,
    path: &Path,
    referenced_from: Option<&Path>,
) -> BuildResult<String> {
    fs.read_to_string(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => BuildError::FileNotFound {
            path: path.to_path_buf(),
            referenced_from: referenced_from.map(Path::to_path_buf),
        },
        _ => BuildError::io(path, e),
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// OS FILESYSTEM
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default, Clone, Copy)]
pub struct OsFileSystem;

impl FileSystem for OsFileSystem {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }

    fn write(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, bytes)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        std::fs::rename(from, to)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_file(path)
    }

    fn list_files(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
        if !dir.is_dir() {
            return Err(not_found(dir));
        }
        let mut files = Vec::new();
        for entry in WalkDir::new(dir).follow_links(true).sort_by_file_name() {
            let entry = entry.map_err(io::Error::from)?;
            if entry.file_type().is_file() {
                files.push(entry.into_path());
            }
        }
        Ok(files)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// MEMORY FILESYSTEM
// ═══════════════════════════════════════════════════════════════════════════════

/// In-memory files keyed by path. Directories exist implicitly as prefixes of file paths.
#[derive(Debug, Default)]
pub struct MemoryFileSystem {
    files: RwLock<BTreeMap<PathBuf, Vec<u8>>>,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_files<P, C>(files: impl IntoIterator<Item = (P, C)>) -> Self
    where
        P: Into<PathBuf>,
        C: Into<Vec<u8>>,
    {
        let fs = Self::new();
        for (path, contents) in files {
            fs.insert(path, contents);
        }
        fs
    }

    pub fn insert(&self, path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) {
        if let Ok(mut files) = self.files.write() {
            files.insert(path.into(), contents.into());
        }
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.files
            .read()
            .map(|files| files.keys().cloned().collect())
            .unwrap_or_default()
    }
}

fn poisoned() -> io::Error {
    io::Error::new(io::ErrorKind::Other, "memory filesystem lock poisoned")
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, path.display().to_string())
}

impl FileSystem for MemoryFileSystem {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        let files = self.files.read().map_err(|_| poisoned())?;
        files.get(path).cloned().ok_or_else(|| not_found(path))
    }

    fn write(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        let mut files = self.files.write().map_err(|_| poisoned())?;
        files.insert(path.to_path_buf(), bytes.to_vec());
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        match self.files.read() {
            Ok(files) => files.keys().any(|p| p.starts_with(path)),
            Err(_) => false,
        }
    }

    fn is_file(&self, path: &Path) -> bool {
        match self.files.read() {
            Ok(files) => files.contains_key(path),
            Err(_) => false,
        }
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        let mut files = self.files.write().map_err(|_| poisoned())?;
        let bytes = files.remove(from).ok_or_else(|| not_found(from))?;
        files.insert(to.to_path_buf(), bytes);
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        let mut files = self.files.write().map_err(|_| poisoned())?;
        files.remove(path).map(|_| ()).ok_or_else(|| not_found(path))
    }

    fn list_files(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
        let files = self.files.read().map_err(|_| poisoned())?;
        let found: Vec<PathBuf> = files.keys().filter(|p| p.starts_with(dir)).cloned().collect();
        if found.is_empty() {
            return Err(not_found(dir));
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_fs_read_write() {
        let fs = MemoryFileSystem::new();
        fs.write(Path::new("/out/a/b.html"), b"<p></p>").unwrap();
        assert!(fs.is_file(Path::new("/out/a/b.html")));
        assert!(fs.exists(Path::new("/out/a")));
        assert!(!fs.is_file(Path::new("/out/a")));
        assert_eq!(fs.read(Path::new("/out/a/b.html")).unwrap(), b"<p></p>");
    }

    #[test]
    fn test_list_files_recurses_below_dir() {
        let fs = MemoryFileSystem::with_files([
            ("/pages/index.jsx", ""),
            ("/pages/blog/[slug].jsx", ""),
            ("/other/x.jsx", ""),
        ]);
        let files = fs.list_files(Path::new("/pages")).unwrap();
        assert_eq!(
            files,
            vec![PathBuf::from("/pages/blog/[slug].jsx"), PathBuf::from("/pages/index.jsx")]
        );
        assert!(fs.list_files(Path::new("/missing")).is_err());
    }

    #[test]
    fn test_os_list_files() {
        let dir = tempfile::tempdir().unwrap();
        let fs = OsFileSystem;
        fs.write(&dir.path().join("a/b.jsx"), b"").unwrap();
        fs.write(&dir.path().join("c.jsx"), b"").unwrap();
        let files = fs.list_files(dir.path()).unwrap();
        assert_eq!(files, vec![dir.path().join("a/b.jsx"), dir.path().join("c.jsx")]);
    }

    #[test]
    fn test_read_source_missing_reports_importer() {
        let fs = MemoryFileSystem::new();
        let err = read_source(&fs, Path::new("/x.jsx"), Some(Path::new("/page.jsx"))).unwrap_err();
        match err {
            BuildError::FileNotFound {
                path,
                referenced_from,
            } => {
                assert_eq!(path, PathBuf::from("/x.jsx"));
                assert_eq!(referenced_from, Some(PathBuf::from("/page.jsx")));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_os_fs_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("deep/nested/file.txt");
        OsFileSystem.write(&target, b"hi").unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"hi");
    }
}
