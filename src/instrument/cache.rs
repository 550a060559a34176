//! Rewritten class bytes kept on disk across attach attempts.
use std::{
    io,
    path::{Path, PathBuf},
};

/// A directory holding one file of rewritten bytes per class.
#[derive(Debug, Clone)]
pub struct TransformCache {
    root: PathBuf,
}

impl TransformCache {
    /// Opens the cache at `root`, creating the directory if needed.
    ///
    /// # Errors
    /// Returns an [`io::Error`] if the directory cannot be created.
    pub fn create<P: Into<PathBuf>>(root: P) -> io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// The directory backing the cache.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The file holding the entry of `class_name`.
    #[must_use]
    pub fn entry_path(&self, class_name: &str) -> PathBuf {
        self.root.join(format!("{}.dex", class_name.replace('/', ".")))
    }

    /// Reads the cached bytes of `class_name`; [`None`] on a miss.
    ///
    /// # Errors
    /// Returns an [`io::Error`] if the entry exists but cannot be read.
    pub fn read_class(&self, class_name: &str) -> io::Result<Option<Vec<u8>>> {
        match std::fs::read(self.entry_path(class_name)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Stores `bytes` as the entry of `class_name`, replacing any previous entry atomically.
    ///
    /// # Errors
    /// Returns an [`io::Error`] if the entry cannot be written.
    pub fn write_class(&self, class_name: &str, bytes: &[u8]) -> io::Result<()> {
        atomic_write(&self.entry_path(class_name), bytes)
    }
}

/// The cache directory for a payload and a transform catalog.
///
/// Entries are only valid for the exact transforms that produced them, so both identities are
/// part of the path.
#[must_use]
pub fn cache_root_for(base: &Path, payload_hash: &str, fingerprint: &str) -> PathBuf {
    base.join(payload_hash).join(fingerprint)
}

fn atomic_write(path: &Path, contents: &[u8]) -> io::Result<()> {
    let tmp_path = path.with_extension("dex.tmp");
    std::fs::write(&tmp_path, contents)?;
    std::fs::rename(&tmp_path, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn miss_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TransformCache::create(dir.path()).unwrap();
        assert!(cache.read_class("pkg/Foo").unwrap().is_none());
    }

    #[test]
    fn write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TransformCache::create(dir.path().join("nested/root")).unwrap();
        cache.write_class("pkg/Foo", b"first").unwrap();
        cache.write_class("pkg/Foo", b"second").unwrap();
        assert_eq!(cache.read_class("pkg/Foo").unwrap().unwrap(), b"second");
        assert!(cache.read_class("pkg/Bar").unwrap().is_none());
    }

    #[test]
    fn entries_are_flat_files() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TransformCache::create(dir.path()).unwrap();
        cache.write_class("android/app/LoadedApk", b"x").unwrap();
        assert_eq!(
            cache.entry_path("android/app/LoadedApk"),
            dir.path().join("android.app.LoadedApk.dex")
        );
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|it| it.unwrap().file_name())
            .collect();
        assert_eq!(names, ["android.app.LoadedApk.dex"]);
    }

    #[test]
    fn root_is_versioned() {
        let root = cache_root_for(Path::new("/data/cache"), "abc", "def");
        assert_eq!(root, Path::new("/data/cache/abc/def"));
    }
}
