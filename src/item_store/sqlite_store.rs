use super::models::{
    Candidate, IngestFileRecord, IngestFileStatus, Item, PayloadType, Run, RunItem, RunItemAction,
    RunStatus,
};
use super::schema::{ALL_TABLES, MIGRATIONS, SCHEMA_VERSION};
use crate::sqlite_persistence::run_migrations;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::info;

/// How long a writer waits on a locked database before failing with a busy
/// error. Concurrent invocations serialize through this rather than
/// application-level locks.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-backed store for items, runs, run outcomes, and ingest-file
/// fingerprints.
pub struct SqliteItemStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteItemStore {
    /// Open an existing database or create a new one at the current schema.
    ///
    /// Always runs the shape-detection migration chain (idempotent) and then
    /// asserts the final schema matches the expected column set for every
    /// table, failing fatally on unrecognized or corrupt shapes.
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path = db_path.as_ref();
        let is_new_db = !path.exists();
        if is_new_db {
            info!("Creating new item database at {:?}", path);
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open item database: {:?}", path))?;
        Self::from_connection(conn)
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(mut conn: Connection) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .context("Failed to enable write-ahead logging")?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        let applied = run_migrations(&mut conn, MIGRATIONS)?;
        if !applied.is_empty() {
            info!("Applied {} schema migration(s): {}", applied.len(), applied.join(", "));
        }
        for table in ALL_TABLES {
            table
                .validate(&conn)
                .with_context(|| "Item database schema validation failed after migration")?;
        }
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    // ==================== Items ====================

    /// Insert-or-update an item keyed by its canonical payload reference.
    ///
    /// Re-ingesting an existing reference updates `source` but never creates
    /// a duplicate row. Returns the row id.
    pub fn upsert_item(
        &self,
        payload_ref: &str,
        source: &str,
        captured_at: Option<DateTime<Utc>>,
    ) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let captured_at = captured_at.unwrap_or_else(Utc::now).to_rfc3339();
        let id = conn.query_row(
            "INSERT INTO items (captured_at, payload_ref, payload_type, source)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(payload_ref) DO UPDATE SET source = excluded.source
             RETURNING id",
            params![captured_at, payload_ref, PayloadType::Url.as_str(), source],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    pub fn get_item_by_ref(&self, payload_ref: &str) -> Result<Option<Item>> {
        let conn = self.conn.lock().unwrap();
        let item = conn
            .query_row(
                "SELECT id, captured_at, payload_ref, payload_type, source
                 FROM items WHERE payload_ref = ?1",
                params![payload_ref],
                Self::row_to_item,
            )
            .optional()?;
        Ok(item)
    }

    pub fn count_items(&self) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM items", [], |r| r.get(0))?;
        Ok(count as usize)
    }

    /// Items eligible for conversion: payload_type is "url" and no run has
    /// recorded a terminal outcome for them, ever. Ordered by id for
    /// deterministic batches.
    pub fn select_candidates(&self) -> Result<Vec<Candidate>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, payload_ref FROM items
             WHERE payload_type = 'url'
               AND id NOT IN (
                   SELECT item_id FROM run_items
                   WHERE action IN ('converted', 'failed')
               )
             ORDER BY id",
        )?;
        let candidates = stmt
            .query_map([], |row| {
                Ok(Candidate {
                    id: row.get(0)?,
                    payload_ref: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<_>>()?;
        Ok(candidates)
    }

    // ==================== Runs ====================

    /// Run `f` inside an immediate write transaction. Rolls back on error.
    ///
    /// The conversion workflow uses this so the Run/RunItem rows and the
    /// artifact file commit or disappear together.
    pub fn with_immediate_tx<T>(&self, f: impl FnOnce(&Transaction) -> Result<T>) -> Result<T> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    /// Insert a Run row with status "in_progress" and an empty filename.
    pub fn insert_run(tx: &Transaction, run_at: DateTime<Utc>, artifact_type: &str) -> Result<i64> {
        tx.execute(
            "INSERT INTO runs (run_at, artifact_type, filename, recipe, status)
             VALUES (?1, ?2, '', '', ?3)",
            params![run_at.to_rfc3339(), artifact_type, RunStatus::InProgress.as_str()],
        )?;
        Ok(tx.last_insert_rowid())
    }

    pub fn set_run_filename(tx: &Transaction, run_id: i64, filename: &str) -> Result<()> {
        tx.execute(
            "UPDATE runs SET filename = ?2 WHERE id = ?1",
            params![run_id, filename],
        )?;
        Ok(())
    }

    pub fn mark_run_committed(tx: &Transaction, run_id: i64) -> Result<()> {
        tx.execute(
            "UPDATE runs SET status = ?2 WHERE id = ?1",
            params![run_id, RunStatus::Committed.as_str()],
        )?;
        Ok(())
    }

    pub fn insert_run_item(
        tx: &Transaction,
        run_id: i64,
        item_id: i64,
        action: RunItemAction,
    ) -> Result<()> {
        tx.execute(
            "INSERT INTO run_items (run_id, item_id, action) VALUES (?1, ?2, ?3)",
            params![run_id, item_id, action.as_str()],
        )?;
        Ok(())
    }

    pub fn get_run(&self, run_id: i64) -> Result<Option<Run>> {
        let conn = self.conn.lock().unwrap();
        let run = conn
            .query_row(
                "SELECT id, run_at, artifact_type, filename, recipe, status
                 FROM runs WHERE id = ?1",
                params![run_id],
                Self::row_to_run,
            )
            .optional()?;
        Ok(run)
    }

    pub fn get_latest_run(&self) -> Result<Option<Run>> {
        let conn = self.conn.lock().unwrap();
        let run = conn
            .query_row(
                "SELECT id, run_at, artifact_type, filename, recipe, status
                 FROM runs ORDER BY id DESC LIMIT 1",
                [],
                Self::row_to_run,
            )
            .optional()?;
        Ok(run)
    }

    pub fn count_runs(&self) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM runs", [], |r| r.get(0))?;
        Ok(count as usize)
    }

    pub fn get_run_items(&self, run_id: i64) -> Result<Vec<RunItem>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT run_id, item_id, action FROM run_items
             WHERE run_id = ?1 ORDER BY item_id",
        )?;
        let rows = stmt
            .query_map(params![run_id], Self::row_to_run_item)?
            .collect::<rusqlite::Result<_>>()?;
        Ok(rows)
    }

    pub fn count_run_items(&self) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM run_items", [], |r| r.get(0))?;
        Ok(count as usize)
    }

    // ==================== Ingest-file fingerprints ====================

    pub fn get_ingest_file(&self, path: &str) -> Result<Option<IngestFileRecord>> {
        let conn = self.conn.lock().unwrap();
        let record = conn
            .query_row(
                "SELECT path, size, mtime_ns, last_ingested_at, status
                 FROM ingest_files WHERE path = ?1",
                params![path],
                Self::row_to_ingest_file,
            )
            .optional()?;
        Ok(record)
    }

    pub fn upsert_ingest_file(&self, record: &IngestFileRecord) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO ingest_files (path, size, mtime_ns, last_ingested_at, status)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(path) DO UPDATE SET
                size = excluded.size,
                mtime_ns = excluded.mtime_ns,
                last_ingested_at = excluded.last_ingested_at,
                status = excluded.status",
            params![
                record.path,
                record.size,
                record.mtime_ns,
                record.last_ingested_at.to_rfc3339(),
                record.status.as_str(),
            ],
        )?;
        Ok(())
    }

    // ==================== Row mapping ====================

    fn parse_datetime(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now())
    }

    fn row_to_item(row: &rusqlite::Row) -> rusqlite::Result<Item> {
        let captured_at: String = row.get(1)?;
        let payload_type: String = row.get(3)?;
        Ok(Item {
            id: row.get(0)?,
            captured_at: Self::parse_datetime(&captured_at),
            payload_ref: row.get(2)?,
            payload_type: PayloadType::parse(&payload_type).unwrap_or(PayloadType::Url),
            source: row.get(4)?,
        })
    }

    fn row_to_run(row: &rusqlite::Row) -> rusqlite::Result<Run> {
        let run_at: String = row.get(1)?;
        let status: String = row.get(5)?;
        Ok(Run {
            id: row.get(0)?,
            run_at: Self::parse_datetime(&run_at),
            artifact_type: row.get(2)?,
            filename: row.get(3)?,
            recipe: row.get(4)?,
            status: RunStatus::parse(&status).unwrap_or(RunStatus::InProgress),
        })
    }

    fn row_to_ingest_file(row: &rusqlite::Row) -> rusqlite::Result<IngestFileRecord> {
        let last_ingested_at: String = row.get(3)?;
        let status: String = row.get(4)?;
        Ok(IngestFileRecord {
            path: row.get(0)?,
            size: row.get(1)?,
            mtime_ns: row.get(2)?,
            last_ingested_at: Self::parse_datetime(&last_ingested_at),
            status: IngestFileStatus::parse(&status).unwrap_or(IngestFileStatus::Error),
        })
    }

    fn row_to_run_item(row: &rusqlite::Row) -> rusqlite::Result<RunItem> {
        let action: String = row.get(2)?;
        Ok(RunItem {
            run_id: row.get(0)?,
            item_id: row.get(1)?,
            action: RunItemAction::parse(&action).unwrap_or(RunItemAction::Failed),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed_items(store: &SqliteItemStore, refs: &[&str]) -> Vec<i64> {
        refs.iter()
            .map(|r| store.upsert_item(r, "raw_text", None).unwrap())
            .collect()
    }

    #[test]
    fn upsert_item_deduplicates_on_payload_ref() {
        let store = SqliteItemStore::open_in_memory().unwrap();
        let first = store
            .upsert_item("https://example.com/a", "/vault/a.md", None)
            .unwrap();
        let second = store
            .upsert_item("https://example.com/a", "browser_extension", None)
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(store.count_items().unwrap(), 1);
        let item = store
            .get_item_by_ref("https://example.com/a")
            .unwrap()
            .unwrap();
        // Re-ingest updates source only.
        assert_eq!(item.source, "browser_extension");
    }

    #[test]
    fn upsert_item_respects_provided_captured_at() {
        let store = SqliteItemStore::open_in_memory().unwrap();
        let captured = DateTime::parse_from_rfc3339("2026-02-12T15:23:11Z")
            .unwrap()
            .with_timezone(&Utc);
        store
            .upsert_item("https://example.com/a", "browser_extension", Some(captured))
            .unwrap();
        let item = store
            .get_item_by_ref("https://example.com/a")
            .unwrap()
            .unwrap();
        assert_eq!(item.captured_at, captured);
    }

    #[test]
    fn candidates_exclude_items_with_terminal_outcomes() {
        let store = SqliteItemStore::open_in_memory().unwrap();
        let ids = seed_items(
            &store,
            &[
                "https://example.com/a",
                "https://example.com/b",
                "https://example.com/c",
            ],
        );

        store
            .with_immediate_tx(|tx| {
                let run_id = SqliteItemStore::insert_run(tx, Utc::now(), "epub")?;
                SqliteItemStore::insert_run_item(tx, run_id, ids[0], RunItemAction::Converted)?;
                SqliteItemStore::insert_run_item(tx, run_id, ids[1], RunItemAction::Failed)?;
                SqliteItemStore::mark_run_committed(tx, run_id)?;
                Ok(())
            })
            .unwrap();

        let candidates = store.select_candidates().unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id, ids[2]);
        assert_eq!(candidates[0].payload_ref, "https://example.com/c");
    }

    #[test]
    fn immediate_tx_rolls_back_on_error() {
        let store = SqliteItemStore::open_in_memory().unwrap();
        seed_items(&store, &["https://example.com/a"]);

        let result: Result<()> = store.with_immediate_tx(|tx| {
            SqliteItemStore::insert_run(tx, Utc::now(), "epub")?;
            anyhow::bail!("boom")
        });
        assert!(result.is_err());
        assert_eq!(store.count_runs().unwrap(), 0);
        assert_eq!(store.count_run_items().unwrap(), 0);
    }

    #[test]
    fn run_filename_empty_until_set() {
        let store = SqliteItemStore::open_in_memory().unwrap();
        let run_id = store
            .with_immediate_tx(|tx| {
                let run_id = SqliteItemStore::insert_run(tx, Utc::now(), "epub")?;
                SqliteItemStore::mark_run_committed(tx, run_id)?;
                Ok(run_id)
            })
            .unwrap();

        let run = store.get_run(run_id).unwrap().unwrap();
        assert_eq!(run.filename, "");
        assert_eq!(run.status, RunStatus::Committed);
        assert_eq!(run.artifact_type, "epub");
    }

    #[test]
    fn ingest_file_fingerprints_round_trip() {
        let store = SqliteItemStore::open_in_memory().unwrap();
        assert!(store.get_ingest_file("/inbox/a.json").unwrap().is_none());

        let record = IngestFileRecord {
            path: "/inbox/a.json".to_string(),
            size: 120,
            mtime_ns: 1_700_000_000_000_000_000,
            last_ingested_at: Utc::now(),
            status: IngestFileStatus::Ok,
        };
        store.upsert_ingest_file(&record).unwrap();
        let loaded = store.get_ingest_file("/inbox/a.json").unwrap().unwrap();
        assert_eq!(loaded.size, 120);
        assert_eq!(loaded.status, IngestFileStatus::Ok);

        // Upsert replaces in place.
        let changed = IngestFileRecord {
            size: 200,
            status: IngestFileStatus::Warning,
            ..record
        };
        store.upsert_ingest_file(&changed).unwrap();
        let loaded = store.get_ingest_file("/inbox/a.json").unwrap().unwrap();
        assert_eq!(loaded.size, 200);
        assert_eq!(loaded.status, IngestFileStatus::Warning);
    }
}
