//! Read-back of stored trees

use std::path::Path;
use std::sync::Arc;

use tracing::instrument;

use crate::application::{ApplicationError, ApplicationResult, StoreResultExt};
use crate::infrastructure::traits::{
    FileSystem, IngestRun, StoreOpener, StoredTree, TreeStore, TreeSummary,
};

/// Overview of one per-seed database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseSummary {
    pub n_trees: usize,
    pub n_steps: usize,
    pub runs: Vec<IngestRun>,
}

pub struct QueryService {
    fs: Arc<dyn FileSystem>,
    stores: Arc<dyn StoreOpener>,
}

impl QueryService {
    pub fn new(fs: Arc<dyn FileSystem>, stores: Arc<dyn StoreOpener>) -> Self {
        Self { fs, stores }
    }

    fn open(&self, db: &Path) -> ApplicationResult<Box<dyn TreeStore>> {
        if !self.fs.is_file(db) {
            return Err(ApplicationError::DatabaseNotFound(db.to_path_buf()));
        }
        self.stores
            .open_existing(db)
            .with_db_context("open database", db)
    }

    #[instrument(skip(self))]
    pub fn summary(&self, db: &Path, recent: usize) -> ApplicationResult<DatabaseSummary> {
        let store = self.open(db)?;
        Ok(DatabaseSummary {
            n_trees: store.count_trees().with_db_context("count trees", db)?,
            n_steps: store.n_steps(),
            runs: store
                .recent_runs(recent)
                .with_db_context("read ingest runs", db)?,
        })
    }

    /// Largest trees first.
    #[instrument(skip(self))]
    pub fn list(&self, db: &Path, limit: usize) -> ApplicationResult<Vec<TreeSummary>> {
        self.open(db)?
            .list_trees(limit)
            .with_db_context("list trees", db)
    }

    #[instrument(skip(self))]
    pub fn tree(&self, db: &Path, halo_id: u64) -> ApplicationResult<StoredTree> {
        self.open(db)?
            .load_tree(halo_id)
            .with_db_context("load tree", db)?
            .ok_or_else(|| ApplicationError::TreeNotFound {
                halo_id,
                db: db.to_path_buf(),
            })
    }
}
