//! Tree file reader
//!
//! Loads the snapshot catalogs of one seed and assembles main branches.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::application::{ApplicationError, ApplicationResult, IoResultExt};
use crate::domain::layout::chunk_path;
use crate::domain::{parse_mtree, MainBranchBuilder, MergerTree, SnapshotCatalog};
use crate::infrastructure::traits::FileSystem;

/// What to read: `<root><snap:03>.<chunk>.<suffix>` for the latest `n_steps` snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadSettings {
    /// Directory plus file stem, e.g. `/data/00/fb_00_gather_`
    pub root: PathBuf,
    pub suffix: String,
    pub n_chunks: u32,
    pub n_snaps: u32,
    pub n_steps: usize,
}

impl ReadSettings {
    /// Snapshot numbers to load, latest first.
    pub fn snapshots(&self) -> impl Iterator<Item = u32> {
        let n_snaps = self.n_snaps;
        (0..self.n_steps as u32).map_while(move |k| n_snaps.checked_sub(k))
    }
}

/// Reads `.mtree` files through the filesystem abstraction.
pub struct TreeReader {
    fs: Arc<dyn FileSystem>,
}

impl TreeReader {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }

    /// Read all trees rooted at the latest snapshot.
    #[instrument(skip(self), fields(root = %settings.root.display()))]
    pub fn read_trees(&self, settings: &ReadSettings) -> ApplicationResult<Vec<MergerTree>> {
        if settings.n_steps == 0 || settings.n_chunks == 0 {
            return Err(ApplicationError::Config {
                message: format!(
                    "cannot read trees with n_steps={} and n_chunks={}",
                    settings.n_steps, settings.n_chunks
                ),
            });
        }

        let mut catalogs = BTreeMap::new();
        for snap in settings.snapshots() {
            let catalog = self.read_snapshot(settings, snap)?;
            debug!(snap, halos = catalog.len(), "catalog loaded");
            catalogs.insert(snap, catalog);
        }

        let trees = MainBranchBuilder::new(&catalogs, settings.n_snaps, settings.n_steps).build_all();
        debug!(trees = trees.len(), "trees assembled");
        Ok(trees)
    }

    /// Merge all chunk files of one snapshot; missing chunks are skipped.
    pub fn read_snapshot(
        &self,
        settings: &ReadSettings,
        snap: u32,
    ) -> ApplicationResult<SnapshotCatalog> {
        let mut catalog = SnapshotCatalog::new(snap);
        for chunk in 0..settings.n_chunks {
            let path = chunk_path(&settings.root, snap, chunk, &settings.suffix);
            if !self.fs.is_file(&path) {
                warn!(path = %path.display(), "tree file missing, skipping");
                continue;
            }
            let content = self
                .fs
                .read_to_string(&path)
                .with_path_context("read tree file", &path)?;
            catalog.extend(parse_mtree(&content, &path)?);
        }
        Ok(catalog)
    }
}
