//! SQLite schema for the item store.
//!
//! Current-shape table definitions plus the ordered migration chain that
//! brings legacy databases forward. Steps are keyed on detected shape (column
//! presence), not only `user_version`, because the oldest deployments predate
//! the version stamp entirely.

use crate::sqlite_column;
use crate::sqlite_persistence::{
    table_exists, table_has_columns, Column, ForeignKey, Migration, SqlType, Table,
};
use anyhow::Result;
use chrono::Utc;
use rusqlite::{params, Connection};

/// Stamped into `PRAGMA user_version` after a successful migration pass.
pub const SCHEMA_VERSION: i64 = 3;

pub const ITEMS_TABLE: Table = Table {
    name: "items",
    columns: &[
        sqlite_column!("id", SqlType::Integer, is_primary_key = true),
        sqlite_column!("captured_at", SqlType::Text, non_null = true),
        sqlite_column!("payload_ref", SqlType::Text, non_null = true, is_unique = true),
        sqlite_column!("payload_type", SqlType::Text, non_null = true),
        sqlite_column!("source", SqlType::Text, non_null = true),
    ],
    indices: &[],
};

pub const RUNS_TABLE: Table = Table {
    name: "runs",
    columns: &[
        sqlite_column!("id", SqlType::Integer, is_primary_key = true),
        sqlite_column!("run_at", SqlType::Text, non_null = true),
        sqlite_column!("artifact_type", SqlType::Text, non_null = true),
        sqlite_column!("filename", SqlType::Text, non_null = true),
        sqlite_column!("recipe", SqlType::Text, non_null = true),
        sqlite_column!("status", SqlType::Text, non_null = true),
    ],
    indices: &[],
};

const RUN_ITEMS_RUN_FK: ForeignKey = ForeignKey {
    foreign_table: "runs",
    foreign_column: "id",
};

const RUN_ITEMS_ITEM_FK: ForeignKey = ForeignKey {
    foreign_table: "items",
    foreign_column: "id",
};

pub const RUN_ITEMS_TABLE: Table = Table {
    name: "run_items",
    columns: &[
        sqlite_column!("run_id", SqlType::Integer, foreign_key = Some(RUN_ITEMS_RUN_FK)),
        sqlite_column!("item_id", SqlType::Integer, foreign_key = Some(RUN_ITEMS_ITEM_FK)),
        sqlite_column!("action", SqlType::Text),
    ],
    indices: &[("idx_run_items_item_id", "item_id")],
};

pub const INGEST_FILES_TABLE: Table = Table {
    name: "ingest_files",
    columns: &[
        sqlite_column!("path", SqlType::Text, is_primary_key = true),
        sqlite_column!("size", SqlType::Integer, non_null = true),
        sqlite_column!("mtime_ns", SqlType::Integer, non_null = true),
        sqlite_column!("last_ingested_at", SqlType::Text, non_null = true),
        sqlite_column!("status", SqlType::Text, non_null = true),
    ],
    indices: &[],
};

pub const ALL_TABLES: &[Table] = &[ITEMS_TABLE, RUNS_TABLE, RUN_ITEMS_TABLE, INGEST_FILES_TABLE];

// =============================================================================
// Migration chain
// =============================================================================

/// Legacy single-purpose items shape from the first deployment.
fn legacy_items_shape(conn: &Connection) -> Result<bool> {
    table_has_columns(
        conn,
        "items",
        &["url", "url_hash", "obsidian_path", "status", "attempts"],
    )
}

/// Rebuild the legacy items table at the current shape.
///
/// The old table is renamed aside, a fresh table is created, and rows are
/// copied with `url` → payload_ref, a fixed payload_type of "url",
/// `obsidian_path` (or a fallback literal) → source, and `created` (or the
/// migration time) → captured_at. Old id values are preserved.
fn rebuild_legacy_items(conn: &Connection) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    conn.execute("ALTER TABLE items RENAME TO items_legacy_backup", [])?;
    ITEMS_TABLE.create(conn)?;
    conn.execute(
        "INSERT INTO items(id, captured_at, payload_ref, payload_type, source)
         SELECT id, COALESCE(created, ?1), url, 'url',
                COALESCE(obsidian_path, 'obsidian_clipping')
         FROM items_legacy_backup",
        params![now],
    )?;
    conn.execute("DROP TABLE items_legacy_backup", [])?;
    Ok(())
}

fn items_missing(conn: &Connection) -> Result<bool> {
    Ok(!table_exists(conn, "items")?)
}

fn create_items(conn: &Connection) -> Result<()> {
    ITEMS_TABLE.create(conn)
}

/// Runs table exists but predates the artifact-oriented columns
/// (totals-oriented shape, or partially upgraded).
fn runs_missing_artifact_columns(conn: &Connection) -> Result<bool> {
    if !table_exists(conn, "runs")? {
        return Ok(false);
    }
    Ok(!table_has_columns(
        conn,
        "runs",
        &["artifact_type", "filename", "recipe", "status"],
    )?)
}

/// Add whichever artifact columns are missing, in place, with safe defaults.
/// Historical rows are never dropped.
fn add_runs_artifact_columns(conn: &Connection) -> Result<()> {
    const ADDITIONS: &[(&str, &str)] = &[
        ("artifact_type", "TEXT NOT NULL DEFAULT 'epub'"),
        ("filename", "TEXT NOT NULL DEFAULT ''"),
        ("recipe", "TEXT NOT NULL DEFAULT ''"),
        ("status", "TEXT NOT NULL DEFAULT 'committed'"),
    ];
    for &(name, decl) in ADDITIONS {
        if !table_has_columns(conn, "runs", &[name])? {
            conn.execute(&format!("ALTER TABLE runs ADD COLUMN {} {}", name, decl), [])?;
        }
    }
    Ok(())
}

fn runs_missing(conn: &Connection) -> Result<bool> {
    Ok(!table_exists(conn, "runs")?)
}

fn create_runs(conn: &Connection) -> Result<()> {
    RUNS_TABLE.create(conn)
}

/// True when run_items carries foreign keys that no longer point at the
/// current runs/items tables (e.g. at a backup table left by a rebuild).
fn run_items_foreign_keys_broken(conn: &Connection) -> Result<bool> {
    if !table_exists(conn, "run_items")? {
        return Ok(false);
    }
    let mut stmt = conn.prepare("PRAGMA foreign_key_list(run_items);")?;
    let targets: Vec<String> = stmt
        .query_map([], |row| row.get::<_, String>(2))?
        .collect::<rusqlite::Result<_>>()?;
    Ok(targets.iter().any(|t| t != "runs" && t != "items"))
}

/// Rebuild run_items with correct foreign keys, copying all rows.
fn rebuild_run_items(conn: &Connection) -> Result<()> {
    conn.execute("DROP INDEX IF EXISTS idx_run_items_item_id", [])?;
    conn.execute("ALTER TABLE run_items RENAME TO run_items_legacy_backup", [])?;
    RUN_ITEMS_TABLE.create(conn)?;
    conn.execute(
        "INSERT INTO run_items(run_id, item_id, action)
         SELECT run_id, item_id, action FROM run_items_legacy_backup",
        [],
    )?;
    conn.execute("DROP TABLE run_items_legacy_backup", [])?;
    Ok(())
}

fn run_items_missing(conn: &Connection) -> Result<bool> {
    Ok(!table_exists(conn, "run_items")?)
}

fn create_run_items(conn: &Connection) -> Result<()> {
    RUN_ITEMS_TABLE.create(conn)
}

fn ingest_files_missing(conn: &Connection) -> Result<bool> {
    Ok(!table_exists(conn, "ingest_files")?)
}

fn create_ingest_files(conn: &Connection) -> Result<()> {
    INGEST_FILES_TABLE.create(conn)
}

/// Ordered migration chain. On a brand-new database only the create steps
/// apply, producing the latest schema directly; on legacy databases the
/// rebuild/addition steps run first so the create steps become no-ops.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        name: "rebuild legacy items table",
        applies: legacy_items_shape,
        apply: rebuild_legacy_items,
    },
    Migration {
        name: "create items table",
        applies: items_missing,
        apply: create_items,
    },
    Migration {
        name: "add artifact columns to runs",
        applies: runs_missing_artifact_columns,
        apply: add_runs_artifact_columns,
    },
    Migration {
        name: "create runs table",
        applies: runs_missing,
        apply: create_runs,
    },
    Migration {
        name: "repair run_items foreign keys",
        applies: run_items_foreign_keys_broken,
        apply: rebuild_run_items,
    },
    Migration {
        name: "create run_items table",
        applies: run_items_missing,
        apply: create_run_items,
    },
    Migration {
        name: "create ingest_files table",
        applies: ingest_files_missing,
        apply: create_ingest_files,
    },
];
