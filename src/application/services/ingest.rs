//! Per-seed ingestion of merger trees into SQLite
//!
//! For every seed: open `<db_prefix><seed><db_suffix>`, begin a transaction,
//! insert every tree above the mass threshold, then commit and close.
//! Commit and close failures are logged and reported, never fatal.

use std::ops::Range;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{info, instrument, warn};

use crate::application::services::reader::{ReadSettings, TreeReader};
use crate::application::{ApplicationResult, StoreResultExt};
use crate::config::Settings;
use crate::infrastructure::traits::{FileSystem, StoreOpener, TreeStore};

/// What happened to a seed's tree files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeedStatus {
    Ingested {
        /// Trees read from disk
        read: usize,
        /// Trees above the mass threshold, written to the database
        inserted: usize,
        elapsed: Duration,
    },
    /// Tree directory or probe file absent; the database was still created
    MissingTrees,
}

/// Result of the final commit and close.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedReport {
    pub seed: u32,
    pub sub_dir: String,
    pub db_path: PathBuf,
    pub status: SeedStatus,
    pub commit: CommitOutcome,
}

impl SeedReport {
    pub fn inserted(&self) -> usize {
        match self.status {
            SeedStatus::Ingested { inserted, .. } => inserted,
            SeedStatus::MissingTrees => 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub seeds: Vec<SeedReport>,
}

impl IngestReport {
    pub fn total_inserted(&self) -> usize {
        self.seeds.iter().map(SeedReport::inserted).sum()
    }

    pub fn failed_commits(&self) -> usize {
        self.seeds
            .iter()
            .filter(|s| matches!(s.commit, CommitOutcome::Failed(_)))
            .count()
    }
}

/// Batch driver over a range of seeds.
pub struct IngestService {
    settings: Arc<Settings>,
    reader: TreeReader,
    fs: Arc<dyn FileSystem>,
    stores: Arc<dyn StoreOpener>,
}

impl IngestService {
    pub fn new(
        settings: Arc<Settings>,
        reader: TreeReader,
        fs: Arc<dyn FileSystem>,
        stores: Arc<dyn StoreOpener>,
    ) -> Self {
        Self {
            settings,
            reader,
            fs,
            stores,
        }
    }

    /// Ingest every seed in `seeds`, in order.
    ///
    /// Open, parse and insert errors abort the run; earlier seeds stay committed.
    #[instrument(skip(self))]
    pub fn run(&self, seeds: Range<u32>) -> ApplicationResult<IngestReport> {
        let mut report = IngestReport::default();
        for seed in seeds {
            let seed_report = self.ingest_seed(seed)?;
            report.seeds.push(seed_report);
            info!(
                total = report.total_inserted(),
                "running total of inserted trees"
            );
        }
        Ok(report)
    }

    #[instrument(skip(self))]
    pub fn ingest_seed(&self, seed: u32) -> ApplicationResult<SeedReport> {
        let layout = self.settings.layout();
        let run = &self.settings.run;
        let sub_dir = layout.seed_str(seed);
        let db_path = layout.db_path(seed);

        // The transaction spans the whole seed; commit once at the end
        let mut store = self
            .stores
            .open(&db_path, run.n_steps)
            .with_db_context("open database", &db_path)?;
        store
            .halo_table()
            .with_db_context("create halo table", &db_path)?;
        store
            .begin()
            .with_db_context("begin transaction", &db_path)?;

        let tree_dir = layout.tree_dir(seed);
        let probe = layout.probe_file(seed);
        info!("Checking if folder {} exists", tree_dir.display());
        info!("Checking if file {} exists", probe.display());

        let status = if self.fs.is_dir(&tree_dir) && self.fs.is_file(&probe) {
            self.insert_trees(store.as_mut(), seed, &sub_dir)?
        } else {
            info!(seed, "no tree files found at {}", probe.display());
            SeedStatus::MissingTrees
        };

        let commit = finish(store);
        Ok(SeedReport {
            seed,
            sub_dir,
            db_path,
            status,
            commit,
        })
    }

    fn insert_trees(
        &self,
        store: &mut dyn TreeStore,
        seed: u32,
        sub_dir: &str,
    ) -> ApplicationResult<SeedStatus> {
        let layout = self.settings.layout();
        let run = &self.settings.run;
        let read_settings = ReadSettings {
            root: layout.root_path(seed),
            suffix: layout.suffix.clone(),
            n_chunks: run.n_chunks,
            n_snaps: run.n_snaps,
            n_steps: run.n_steps,
        };
        let trees = self.reader.read_trees(&read_settings)?;

        let started_at = Utc::now();
        let start = Instant::now();
        info!("Adding {} to database {}.", sub_dir, store.path().display());

        let mut inserted = 0;
        for tree in trees.iter().filter(|t| t.exceeds(run.min_mass)) {
            let (masses, ids) = tree.mass_id();
            store
                .insert_tree(tree.main_id(), sub_dir, masses, ids)
                .with_db_context("insert tree", store.path())?;
            inserted += 1;
        }

        let elapsed = start.elapsed();
        info!(
            "Inserted {} trees in {:.6} seconds.",
            inserted,
            elapsed.as_secs_f64()
        );

        store
            .record_run(sub_dir, inserted, started_at)
            .with_db_context("record ingest run", store.path())?;

        Ok(SeedStatus::Ingested {
            read: trees.len(),
            inserted,
            elapsed,
        })
    }
}

/// Commit and close; failures are logged and returned, not raised.
fn finish(mut store: Box<dyn TreeStore>) -> CommitOutcome {
    let path = store.path().to_path_buf();
    let committed = store.commit();
    let closed = store.close();

    match committed.and(closed) {
        Ok(()) => CommitOutcome::Committed,
        Err(e) => {
            warn!(db = %path.display(), error = %e, "commit or close failed");
            CommitOutcome::Failed(e.to_string())
        }
    }
}
