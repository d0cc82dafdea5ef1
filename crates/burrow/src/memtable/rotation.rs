//! File-rotation sequence for `<base>.<n>.<suffix>` data files.
//!
//! Compaction and migration both need a brand-new file name without racing
//! other writers; a monotonically incrementing integer suffix gives a simple
//! ordering and lets operators see at a glance which file is newest.

use crate::error::Result;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Hands out rotating file names of the form `<base>.<n>.<suffix>`.
///
/// On initialization the base directory is scanned and the highest existing
/// `n` becomes current, defaulting to 0. There is exactly one current index
/// at a time; files below it belong to the store and may be deleted by the
/// compactor.
pub(crate) struct FileRotationSequence {
    basedir: PathBuf,
    basename: String,
    suffix: String,
    current: AtomicUsize,
}

impl FileRotationSequence {
    /// Scans `basedir` and adopts the highest existing index.
    ///
    /// The directory is created if it does not exist yet.
    pub fn init(basedir: impl Into<PathBuf>, basename: &str, suffix: &str) -> Result<Self> {
        let basedir = basedir.into();
        fs::create_dir_all(&basedir)?;

        let mut highest = 0;
        for entry in fs::read_dir(&basedir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            if let Some(name) = name.to_str() {
                if let Some(index) = parse_index(name, basename, suffix) {
                    highest = highest.max(index);
                }
            }
        }

        Ok(Self {
            basedir,
            basename: basename.to_string(),
            suffix: suffix.to_string(),
            current: AtomicUsize::new(highest),
        })
    }

    /// Path for the current index.
    pub fn current_filename(&self) -> PathBuf {
        self.filename(self.current.load(Ordering::SeqCst))
    }

    /// Atomically advances the index and returns the new current path.
    pub fn next_filename(&self) -> PathBuf {
        let next = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.filename(next)
    }

    /// The current index.
    pub fn current_index(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }

    /// The directory the sequence rotates in.
    pub fn base_dir(&self) -> &Path {
        &self.basedir
    }

    fn filename(&self, index: usize) -> PathBuf {
        self.basedir
            .join(format!("{}.{}.{}", self.basename, index, self.suffix))
    }
}

/// Parses `n` out of `<basename>.<n>.<suffix>`; anything else is `None`.
fn parse_index(name: &str, basename: &str, suffix: &str) -> Option<usize> {
    let rest = name.strip_prefix(basename)?.strip_prefix('.')?;
    let digits = rest.strip_suffix(suffix)?.strip_suffix('.')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_empty_directory_starts_at_zero() {
        let dir = TempDir::new().unwrap();
        let seq = FileRotationSequence::init(dir.path(), "table", "mtlog").unwrap();

        assert_eq!(seq.current_index(), 0);
        assert_eq!(
            seq.current_filename(),
            dir.path().join("table.0.mtlog")
        );
    }

    #[test]
    fn test_adopts_highest_existing_index() {
        let dir = TempDir::new().unwrap();
        for index in [0, 3, 12, 7] {
            fs::write(dir.path().join(format!("table.{index}.mtlog")), b"").unwrap();
        }

        let seq = FileRotationSequence::init(dir.path(), "table", "mtlog").unwrap();
        assert_eq!(seq.current_index(), 12);
    }

    #[test]
    fn test_ignores_unrelated_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("table.9.other"), b"").unwrap();
        fs::write(dir.path().join("other.9.mtlog"), b"").unwrap();
        fs::write(dir.path().join("table.x9.mtlog"), b"").unwrap();
        fs::write(dir.path().join("table.mtlog"), b"").unwrap();
        fs::write(dir.path().join("table.migration.log"), b"").unwrap();

        let seq = FileRotationSequence::init(dir.path(), "table", "mtlog").unwrap();
        assert_eq!(seq.current_index(), 0);
    }

    #[test]
    fn test_next_filename_increments() {
        let dir = TempDir::new().unwrap();
        let seq = FileRotationSequence::init(dir.path(), "table", "mtlog").unwrap();

        assert_eq!(seq.next_filename(), dir.path().join("table.1.mtlog"));
        assert_eq!(seq.next_filename(), dir.path().join("table.2.mtlog"));
        assert_eq!(seq.current_filename(), dir.path().join("table.2.mtlog"));
    }

    #[test]
    fn test_creates_missing_directory() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("data");
        let seq = FileRotationSequence::init(&nested, "table", "mtlog").unwrap();

        assert!(nested.is_dir());
        assert_eq!(seq.current_index(), 0);
    }
}
