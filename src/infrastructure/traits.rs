//! I/O boundary traits for testability
//!
//! These traits abstract the filesystem and the tree database, allowing
//! services to be tested with mock implementations.

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::infrastructure::StoreResult;

/// Filesystem abstraction for testability.
pub trait FileSystem: Send + Sync {
    /// Read file contents to string.
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Check if path is a file.
    fn is_file(&self, path: &Path) -> bool;

    /// Check if path is a directory.
    fn is_dir(&self, path: &Path) -> bool;

    /// List the direct children of a directory (not recursive).
    fn list_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>>;
}

/// Summary row of a stored tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeSummary {
    pub halo_id: u64,
    pub sub_dir: String,
    pub root_mass: u64,
    /// Number of snapshots covered by the main branch
    pub length: usize,
}

/// A tree read back from the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredTree {
    pub halo_id: u64,
    pub sub_dir: String,
    pub masses: Vec<u64>,
    pub ids: Vec<u64>,
}

/// One recorded ingest run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestRun {
    pub sub_dir: String,
    pub n_trees: usize,
    pub started_at: String,
}

/// Storage for merger trees of one seed.
///
/// Writes happen between `begin` and `commit`; the caller owns the transaction.
pub trait TreeStore {
    /// Database location.
    fn path(&self) -> &Path;

    /// Snapshots stored per tree (width of the mass and id column groups).
    fn n_steps(&self) -> usize;

    /// Create tree and run tables if missing.
    fn halo_table(&mut self) -> StoreResult<()>;

    fn begin(&mut self) -> StoreResult<()>;

    fn commit(&mut self) -> StoreResult<()>;

    /// Insert or replace one tree; steps past the tree's length are left empty.
    fn insert_tree(
        &mut self,
        halo_id: u64,
        sub_dir: &str,
        masses: &[u64],
        ids: &[u64],
    ) -> StoreResult<()>;

    fn record_run(
        &mut self,
        sub_dir: &str,
        n_trees: usize,
        started_at: DateTime<Utc>,
    ) -> StoreResult<()>;

    fn count_trees(&self) -> StoreResult<usize>;

    /// Largest trees first.
    fn list_trees(&self, limit: usize) -> StoreResult<Vec<TreeSummary>>;

    fn load_tree(&self, halo_id: u64) -> StoreResult<Option<StoredTree>>;

    /// Most recent runs first.
    fn recent_runs(&self, limit: usize) -> StoreResult<Vec<IngestRun>>;

    /// Close the underlying connection, reporting any failure.
    fn close(self: Box<Self>) -> StoreResult<()>;
}

/// Factory for per-seed tree stores.
pub trait StoreOpener: Send + Sync {
    /// Open or create a database for trees of `n_steps` snapshots.
    fn open(&self, path: &Path, n_steps: usize) -> StoreResult<Box<dyn TreeStore>>;

    /// Open an existing database for reading.
    fn open_existing(&self, path: &Path) -> StoreResult<Box<dyn TreeStore>>;
}

// ============================================================
// REAL IMPLEMENTATIONS
// ============================================================

/// Real filesystem implementation.
#[derive(Debug, Default)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn list_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        use walkdir::WalkDir;

        let mut entries = Vec::new();
        for entry in WalkDir::new(path).min_depth(1).max_depth(1) {
            let entry = entry.map_err(io::Error::from)?;
            entries.push(entry.into_path());
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn given_directory_when_listing_then_returns_direct_children_only() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("a.mtree"), "").unwrap();
        std::fs::create_dir(temp.path().join("sub")).unwrap();
        std::fs::write(temp.path().join("sub").join("b.mtree"), "").unwrap();

        let mut names: Vec<String> = RealFileSystem
            .list_dir(temp.path())
            .unwrap()
            .iter()
            .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect();
        names.sort();

        assert_eq!(names, vec!["a.mtree".to_string(), "sub".to_string()]);
    }

    #[test]
    fn given_missing_directory_when_listing_then_fails() {
        let temp = TempDir::new().unwrap();
        assert!(RealFileSystem.list_dir(&temp.path().join("nope")).is_err());
    }
}
