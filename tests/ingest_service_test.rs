//! Tests for IngestService

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tempfile::TempDir;

use mtreedb::application::services::{CommitOutcome, SeedStatus};
use mtreedb::application::ApplicationError;
use mtreedb::config::{LayoutConfig, RunConfig, Settings};
use mtreedb::infrastructure::di::ServiceContainer;
use mtreedb::infrastructure::traits::{
    IngestRun, RealFileSystem, StoreOpener, StoredTree, TreeStore, TreeSummary,
};
use mtreedb::infrastructure::{SqliteStoreOpener, SqliteTreeStore, StoreError, StoreResult};
use mtreedb::util::testing;

const SNAP_3: &str = "\
# ID_host(1) N_particles(2) N_progenitors(3) N_orphan_steps(4)
# ID_progenitor(1) N_common(2) N_particles(3)
100 900 2
200 800 850
201 10 40
101 450 1
202 400 420
102 600 0
";

const SNAP_2: &str = "\
200 850 1
300 700 760
202 420 0
";

const SNAP_1: &str = "\
300 760 1
400 600 640
";

fn settings(base: &Path) -> Settings {
    Settings {
        base_dir: base.to_path_buf(),
        layout: LayoutConfig::default(),
        run: RunConfig {
            seed_start: 0,
            seed_end: 2,
            n_snaps: 3,
            n_steps: 3,
            n_chunks: 1,
            min_mass: 500,
        },
    }
}

/// Writes the three snapshot files of seed 00.
fn write_seed_00(base: &Path) {
    let dir = base.join("00");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("fb_00_gather_003.0.mtree"), SNAP_3).unwrap();
    std::fs::write(dir.join("fb_00_gather_002.0.mtree"), SNAP_2).unwrap();
    std::fs::write(dir.join("fb_00_gather_001.0.mtree"), SNAP_1).unwrap();
}

fn count_trees(db: &Path) -> usize {
    SqliteTreeStore::open_existing(db)
        .ok()
        .unwrap()
        .count_trees()
        .unwrap()
}

#[test]
fn given_one_seed_with_trees_when_ingesting_then_stores_trees_above_threshold() {
    testing::init_test_setup();
    // Arrange
    let temp = TempDir::new().unwrap();
    write_seed_00(temp.path());
    let container = ServiceContainer::new(settings(temp.path()));

    // Act
    let report = container.ingest_service().run(0..2).unwrap();

    // Assert
    assert_eq!(report.seeds.len(), 2);
    let seed0 = &report.seeds[0];
    assert_eq!(seed0.sub_dir, "00");
    assert_eq!(seed0.commit, CommitOutcome::Committed);
    match &seed0.status {
        SeedStatus::Ingested { read, inserted, .. } => {
            assert_eq!(*read, 3);
            assert_eq!(*inserted, 2);
        }
        other => panic!("unexpected status: {other:?}"),
    }
    assert_eq!(report.total_inserted(), 2);

    let db = temp.path().join("fullbox_00_trees.db");
    let store = SqliteTreeStore::open_existing(&db).ok().unwrap();
    let tree = store.load_tree(100).unwrap().unwrap();
    assert_eq!(tree.sub_dir, "00");
    assert_eq!(tree.ids, vec![100, 200, 300]);
    assert_eq!(tree.masses, vec![900, 850, 760]);
    assert_eq!(store.load_tree(102).unwrap().unwrap().ids, vec![102]);
    assert!(store.load_tree(101).unwrap().is_none(), "450 is below threshold");
    assert_eq!(store.recent_runs(10).unwrap()[0].n_trees, 2);
}

#[test]
fn given_seed_without_tree_dir_when_ingesting_then_creates_empty_database() {
    testing::init_test_setup();
    let temp = TempDir::new().unwrap();
    let container = ServiceContainer::new(settings(temp.path()));

    let report = container.ingest_service().run(1..2).unwrap();

    assert_eq!(report.seeds[0].status, SeedStatus::MissingTrees);
    assert_eq!(report.seeds[0].commit, CommitOutcome::Committed);
    let db = temp.path().join("fullbox_01_trees.db");
    assert!(db.exists(), "database is opened even without trees");
    assert_eq!(count_trees(&db), 0);
}

#[test]
fn given_tree_dir_without_probe_file_when_ingesting_then_skips_seed() {
    testing::init_test_setup();
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("00");
    std::fs::create_dir_all(&dir).unwrap();
    // Only an older snapshot; the probe is snapshot 3, chunk 0
    std::fs::write(dir.join("fb_00_gather_002.0.mtree"), SNAP_2).unwrap();
    let container = ServiceContainer::new(settings(temp.path()));

    let report = container.ingest_service().run(0..1).unwrap();

    assert_eq!(report.seeds[0].status, SeedStatus::MissingTrees);
}

#[test]
fn given_repeated_run_when_ingesting_then_replaces_rows() {
    testing::init_test_setup();
    let temp = TempDir::new().unwrap();
    write_seed_00(temp.path());
    let container = ServiceContainer::new(settings(temp.path()));

    container.ingest_service().run(0..1).unwrap();
    container.ingest_service().run(0..1).unwrap();

    let db = temp.path().join("fullbox_00_trees.db");
    assert_eq!(count_trees(&db), 2);
    let store = SqliteTreeStore::open_existing(&db).ok().unwrap();
    assert_eq!(store.recent_runs(10).unwrap().len(), 2);
}

#[test]
fn given_higher_threshold_when_ingesting_then_filters_strictly() {
    testing::init_test_setup();
    let temp = TempDir::new().unwrap();
    write_seed_00(temp.path());
    let mut s = settings(temp.path());
    s.run.min_mass = 600;
    let container = ServiceContainer::new(s);

    let report = container.ingest_service().run(0..1).unwrap();

    // 900 passes, 600 is not strictly above 600
    assert_eq!(report.total_inserted(), 1);
}

#[test]
fn given_malformed_tree_file_when_ingesting_then_aborts_with_domain_error() {
    testing::init_test_setup();
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("00");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("fb_00_gather_003.0.mtree"), "100 900 2\n200 800 850\n").unwrap();
    let container = ServiceContainer::new(settings(temp.path()));

    let err = container.ingest_service().run(0..2).unwrap_err();

    assert!(matches!(err, ApplicationError::Domain(_)), "{err}");
}

#[test]
fn given_database_with_other_step_count_when_ingesting_then_fails_to_open() {
    testing::init_test_setup();
    let temp = TempDir::new().unwrap();
    write_seed_00(temp.path());
    SqliteTreeStore::open(&temp.path().join("fullbox_00_trees.db"), 10)
        .ok()
        .unwrap();
    let container = ServiceContainer::new(settings(temp.path()));

    let err = container.ingest_service().run(0..1).unwrap_err();

    assert!(err.to_string().contains("open database"), "{err}");
}

// ============================================================
// Commit failures are reported, not raised
// ============================================================

/// Delegates to SQLite but refuses to commit.
struct RefusingCommit(Box<dyn TreeStore>);

impl TreeStore for RefusingCommit {
    fn path(&self) -> &Path {
        self.0.path()
    }
    fn n_steps(&self) -> usize {
        self.0.n_steps()
    }
    fn halo_table(&mut self) -> StoreResult<()> {
        self.0.halo_table()
    }
    fn begin(&mut self) -> StoreResult<()> {
        self.0.begin()
    }
    fn commit(&mut self) -> StoreResult<()> {
        Err(StoreError::CorruptMeta("disk full".into()))
    }
    fn insert_tree(&mut self, halo_id: u64, sub_dir: &str, masses: &[u64], ids: &[u64]) -> StoreResult<()> {
        self.0.insert_tree(halo_id, sub_dir, masses, ids)
    }
    fn record_run(&mut self, sub_dir: &str, n_trees: usize, started_at: DateTime<Utc>) -> StoreResult<()> {
        self.0.record_run(sub_dir, n_trees, started_at)
    }
    fn count_trees(&self) -> StoreResult<usize> {
        self.0.count_trees()
    }
    fn list_trees(&self, limit: usize) -> StoreResult<Vec<TreeSummary>> {
        self.0.list_trees(limit)
    }
    fn load_tree(&self, halo_id: u64) -> StoreResult<Option<StoredTree>> {
        self.0.load_tree(halo_id)
    }
    fn recent_runs(&self, limit: usize) -> StoreResult<Vec<IngestRun>> {
        self.0.recent_runs(limit)
    }
    fn close(self: Box<Self>) -> StoreResult<()> {
        self.0.close()
    }
}

struct RefusingOpener;

impl StoreOpener for RefusingOpener {
    fn open(&self, path: &Path, n_steps: usize) -> StoreResult<Box<dyn TreeStore>> {
        Ok(Box::new(RefusingCommit(SqliteStoreOpener.open(path, n_steps)?)))
    }
    fn open_existing(&self, path: &Path) -> StoreResult<Box<dyn TreeStore>> {
        SqliteStoreOpener.open_existing(path)
    }
}

#[test]
fn given_commit_failure_when_ingesting_then_reports_and_continues() {
    testing::init_test_setup();
    let temp = TempDir::new().unwrap();
    write_seed_00(temp.path());
    let container = ServiceContainer::with_deps(
        settings(temp.path()),
        Arc::new(RealFileSystem),
        Arc::new(RefusingOpener),
    );

    let report = container.ingest_service().run(0..2).unwrap();

    assert_eq!(report.seeds.len(), 2, "second seed still visited");
    assert!(matches!(
        &report.seeds[0].commit,
        CommitOutcome::Failed(msg) if msg.contains("disk full")
    ));
    assert_eq!(report.failed_commits(), 2);
    // Uncommitted inserts are rolled back on close
    assert_eq!(count_trees(&temp.path().join("fullbox_00_trees.db")), 0);
}
