//! SQLite tree store
//!
//! Layout of a per-seed database:
//! - `tree_meta(key, value)`: holds `n_steps`, fixed at creation
//! - `halo_tree(halo_id, sub_dir, m_000.., id_000..)`: one row per tree
//! - `ingest_runs(sub_dir, n_trees, started_at)`: one row per ingest

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OpenFlags, OptionalExtension};
use tracing::{debug, instrument};

use crate::infrastructure::traits::{
    IngestRun, StoreOpener, StoredTree, TreeStore, TreeSummary,
};
use crate::infrastructure::{StoreError, StoreResult};

const META_STEPS_KEY: &str = "n_steps";

fn mass_col(step: usize) -> String {
    format!("m_{:03}", step)
}

fn id_col(step: usize) -> String {
    format!("id_{:03}", step)
}

fn to_sql_int(v: u64) -> StoreResult<i64> {
    i64::try_from(v).map_err(|_| StoreError::ValueOutOfRange(v))
}

fn from_sql_int(v: i64) -> StoreResult<u64> {
    u64::try_from(v).map_err(|_| StoreError::NegativeValue(v))
}

/// Tree store backed by a single SQLite file.
pub struct SqliteTreeStore {
    conn: Connection,
    path: PathBuf,
    n_steps: usize,
    insert_sql: String,
}

impl SqliteTreeStore {
    /// Open or create a database for trees of `n_steps` snapshots.
    #[instrument(level = "debug")]
    pub fn open(path: &Path, n_steps: usize) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS tree_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
        )?;

        match read_stored_steps(&conn)? {
            Some(stored) if stored != n_steps => {
                return Err(StoreError::StepMismatch {
                    path: path.to_path_buf(),
                    stored,
                    requested: n_steps,
                })
            }
            Some(_) => {}
            None => {
                conn.execute(
                    "INSERT INTO tree_meta (key, value) VALUES (?1, ?2)",
                    params![META_STEPS_KEY, n_steps.to_string()],
                )?;
            }
        }

        Ok(Self::from_parts(conn, path, n_steps))
    }

    /// Open an existing database read-only.
    #[instrument(level = "debug")]
    pub fn open_existing(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        let has_meta: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'tree_meta')",
            [],
            |row| row.get(0),
        )?;
        if !has_meta {
            return Err(StoreError::NotATreeDatabase(path.to_path_buf()));
        }
        let n_steps = read_stored_steps(&conn)?
            .ok_or_else(|| StoreError::NotATreeDatabase(path.to_path_buf()))?;

        Ok(Self::from_parts(conn, path, n_steps))
    }

    fn from_parts(conn: Connection, path: &Path, n_steps: usize) -> Self {
        let columns = (0..n_steps)
            .map(mass_col)
            .chain((0..n_steps).map(id_col))
            .collect::<Vec<_>>();
        let placeholders = (1..=columns.len() + 2)
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>();
        let insert_sql = format!(
            "INSERT OR REPLACE INTO halo_tree (halo_id, sub_dir, {}) VALUES ({})",
            columns.join(", "),
            placeholders.join(", ")
        );

        Self {
            conn,
            path: path.to_path_buf(),
            n_steps,
            insert_sql,
        }
    }

    /// SQL expression counting the non-empty id columns of a row.
    fn length_expr(&self) -> String {
        if self.n_steps == 0 {
            return "0".to_string();
        }
        (0..self.n_steps)
            .map(|i| format!("({} IS NOT NULL)", id_col(i)))
            .collect::<Vec<_>>()
            .join(" + ")
    }
}

fn read_stored_steps(conn: &Connection) -> StoreResult<Option<usize>> {
    let value: Option<String> = conn
        .query_row(
            "SELECT value FROM tree_meta WHERE key = ?1",
            [META_STEPS_KEY],
            |row| row.get(0),
        )
        .optional()?;

    value
        .map(|v| {
            v.parse::<usize>()
                .map_err(|e| StoreError::CorruptMeta(format!("{META_STEPS_KEY}={v}: {e}")))
        })
        .transpose()
}

impl TreeStore for SqliteTreeStore {
    fn path(&self) -> &Path {
        &self.path
    }

    fn n_steps(&self) -> usize {
        self.n_steps
    }

    fn halo_table(&mut self) -> StoreResult<()> {
        let step_columns = (0..self.n_steps)
            .map(|i| format!("{} INTEGER", mass_col(i)))
            .chain((0..self.n_steps).map(|i| format!("{} INTEGER", id_col(i))))
            .collect::<Vec<_>>();

        let mut sql = String::from(
            "CREATE TABLE IF NOT EXISTS halo_tree (
                halo_id INTEGER PRIMARY KEY,
                sub_dir TEXT NOT NULL",
        );
        for col in &step_columns {
            sql.push_str(",\n                ");
            sql.push_str(col);
        }
        sql.push_str("\n            );\n");
        sql.push_str(
            "CREATE TABLE IF NOT EXISTS ingest_runs (
                sub_dir TEXT NOT NULL,
                n_trees INTEGER NOT NULL,
                started_at TEXT NOT NULL
            );",
        );

        self.conn.execute_batch(&sql)?;
        debug!(path = %self.path.display(), n_steps = self.n_steps, "halo table ready");
        Ok(())
    }

    fn begin(&mut self) -> StoreResult<()> {
        self.conn.execute_batch("BEGIN TRANSACTION")?;
        Ok(())
    }

    fn commit(&mut self) -> StoreResult<()> {
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    fn insert_tree(
        &mut self,
        halo_id: u64,
        sub_dir: &str,
        masses: &[u64],
        ids: &[u64],
    ) -> StoreResult<()> {
        if masses.len() != ids.len() {
            return Err(StoreError::InvalidTree {
                halo_id,
                message: format!("{} masses but {} ids", masses.len(), ids.len()),
            });
        }
        if masses.len() > self.n_steps {
            return Err(StoreError::InvalidTree {
                halo_id,
                message: format!("{} steps, table holds {}", masses.len(), self.n_steps),
            });
        }

        let mut values = Vec::with_capacity(2 + 2 * self.n_steps);
        values.push(Value::Integer(to_sql_int(halo_id)?));
        values.push(Value::Text(sub_dir.to_string()));
        for column in [masses, ids] {
            for step in 0..self.n_steps {
                match column.get(step) {
                    Some(&v) => values.push(Value::Integer(to_sql_int(v)?)),
                    None => values.push(Value::Null),
                }
            }
        }

        let mut stmt = self.conn.prepare_cached(&self.insert_sql)?;
        stmt.execute(params_from_iter(values.iter()))?;
        Ok(())
    }

    fn record_run(
        &mut self,
        sub_dir: &str,
        n_trees: usize,
        started_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO ingest_runs (sub_dir, n_trees, started_at) VALUES (?1, ?2, ?3)",
            params![sub_dir, n_trees as i64, started_at.to_rfc3339()],
        )?;
        Ok(())
    }

    fn count_trees(&self) -> StoreResult<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM halo_tree", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    fn list_trees(&self, limit: usize) -> StoreResult<Vec<TreeSummary>> {
        let sql = format!(
            "SELECT halo_id, sub_dir, {root}, {len} FROM halo_tree ORDER BY {root} DESC, halo_id LIMIT ?1",
            root = mass_col(0),
            len = self.length_expr()
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([limit as i64], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<i64>>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?;

        let mut result = Vec::new();
        for row in rows {
            let (halo_id, sub_dir, root_mass, length) = row?;
            result.push(TreeSummary {
                halo_id: from_sql_int(halo_id)?,
                sub_dir,
                root_mass: from_sql_int(root_mass.unwrap_or(0))?,
                length: length as usize,
            });
        }
        Ok(result)
    }

    fn load_tree(&self, halo_id: u64) -> StoreResult<Option<StoredTree>> {
        let n = self.n_steps;
        let columns = (0..n)
            .map(mass_col)
            .chain((0..n).map(id_col))
            .collect::<Vec<_>>();
        let sql = format!(
            "SELECT sub_dir, {} FROM halo_tree WHERE halo_id = ?1",
            columns.join(", ")
        );

        let row = self
            .conn
            .query_row(&sql, [to_sql_int(halo_id)?], |row| {
                let sub_dir: String = row.get(0)?;
                let mut values = Vec::with_capacity(2 * n);
                for i in 0..2 * n {
                    values.push(row.get::<_, Option<i64>>(i + 1)?);
                }
                Ok((sub_dir, values))
            })
            .optional()?;

        let Some((sub_dir, values)) = row else {
            return Ok(None);
        };
        let (mass_vals, id_vals) = values.split_at(n);

        let mut masses = Vec::new();
        let mut ids = Vec::new();
        for (m, id) in mass_vals.iter().zip(id_vals) {
            match (m, id) {
                (Some(m), Some(id)) => {
                    masses.push(from_sql_int(*m)?);
                    ids.push(from_sql_int(*id)?);
                }
                _ => break,
            }
        }

        Ok(Some(StoredTree {
            halo_id,
            sub_dir,
            masses,
            ids,
        }))
    }

    fn recent_runs(&self, limit: usize) -> StoreResult<Vec<IngestRun>> {
        let mut stmt = self.conn.prepare(
            "SELECT sub_dir, n_trees, started_at FROM ingest_runs ORDER BY rowid DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map([limit as i64], |row| {
            Ok(IngestRun {
                sub_dir: row.get(0)?,
                n_trees: row.get::<_, i64>(1)? as usize,
                started_at: row.get(2)?,
            })
        })?;

        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    fn close(self: Box<Self>) -> StoreResult<()> {
        let SqliteTreeStore { conn, .. } = *self;
        conn.close().map_err(|(_, e)| StoreError::Sqlite(e))
    }
}

/// Opens [`SqliteTreeStore`]s.
#[derive(Debug, Default)]
pub struct SqliteStoreOpener;

impl StoreOpener for SqliteStoreOpener {
    fn open(&self, path: &Path, n_steps: usize) -> StoreResult<Box<dyn TreeStore>> {
        Ok(Box::new(SqliteTreeStore::open(path, n_steps)?))
    }

    fn open_existing(&self, path: &Path) -> StoreResult<Box<dyn TreeStore>> {
        Ok(Box::new(SqliteTreeStore::open_existing(path)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_store(temp: &TempDir, n_steps: usize) -> SqliteTreeStore {
        let mut store = SqliteTreeStore::open(&temp.path().join("t.db"), n_steps).unwrap();
        store.halo_table().unwrap();
        store
    }

    #[test]
    fn given_short_tree_when_inserting_then_pads_and_loads_back() {
        let temp = TempDir::new().unwrap();
        let mut store = open_store(&temp, 4);

        store.begin().unwrap();
        store.insert_tree(77, "00", &[900, 800], &[77, 66]).unwrap();
        store.commit().unwrap();

        let tree = store.load_tree(77).unwrap().unwrap();
        assert_eq!(tree.sub_dir, "00");
        assert_eq!(tree.masses, vec![900, 800]);
        assert_eq!(tree.ids, vec![77, 66]);

        let listed = store.list_trees(10).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].length, 2);
        assert_eq!(listed[0].root_mass, 900);
    }

    #[test]
    fn given_same_halo_twice_when_inserting_then_replaces_row() {
        let temp = TempDir::new().unwrap();
        let mut store = open_store(&temp, 3);

        store.insert_tree(5, "00", &[600], &[5]).unwrap();
        store.insert_tree(5, "00", &[700, 650], &[5, 4]).unwrap();

        assert_eq!(store.count_trees().unwrap(), 1);
        assert_eq!(store.load_tree(5).unwrap().unwrap().masses, vec![700, 650]);
    }

    #[test]
    fn given_tree_longer_than_table_when_inserting_then_fails() {
        let temp = TempDir::new().unwrap();
        let mut store = open_store(&temp, 1);
        let err = store.insert_tree(5, "00", &[1, 2], &[5, 4]).unwrap_err();
        assert!(matches!(err, StoreError::InvalidTree { halo_id: 5, .. }));
    }

    #[test]
    fn given_id_above_i64_when_inserting_then_fails() {
        let temp = TempDir::new().unwrap();
        let mut store = open_store(&temp, 1);
        let err = store.insert_tree(u64::MAX, "00", &[1], &[u64::MAX]).unwrap_err();
        assert!(matches!(err, StoreError::ValueOutOfRange(_)));
    }

    #[test]
    fn given_existing_db_when_opening_with_other_steps_then_mismatch() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp, 3);
        Box::new(store).close().unwrap();

        let err = SqliteTreeStore::open(&temp.path().join("t.db"), 5)
            .err()
            .unwrap();
        assert!(matches!(
            err,
            StoreError::StepMismatch { stored: 3, requested: 5, .. }
        ));
    }

    #[test]
    fn given_plain_sqlite_file_when_opening_existing_then_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("other.db");
        Connection::open(&path)
            .unwrap()
            .execute_batch("CREATE TABLE x (a INTEGER)")
            .unwrap();

        let err = SqliteTreeStore::open_existing(&path).err().unwrap();
        assert!(matches!(err, StoreError::NotATreeDatabase(_)));
    }

    #[test]
    fn given_recorded_runs_when_listing_then_newest_first() {
        let temp = TempDir::new().unwrap();
        let mut store = open_store(&temp, 2);
        store.record_run("00", 3, Utc::now()).unwrap();
        store.record_run("00", 5, Utc::now()).unwrap();

        let runs = store.recent_runs(10).unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].n_trees, 5);
    }
}
