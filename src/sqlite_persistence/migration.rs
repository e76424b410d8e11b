use anyhow::{Context, Result};
use rusqlite::Connection;
use tracing::info;

/// One step of a shape-detection migration chain.
///
/// Steps are keyed on the observed database shape rather than a version
/// counter alone, because the earliest deployments never stamped one. Each
/// step must be idempotent: `applies` returns false once `apply` has run.
pub struct Migration {
    pub name: &'static str,
    pub applies: fn(&Connection) -> Result<bool>,
    pub apply: fn(&Connection) -> Result<()>,
}

/// Run every applicable step of `chain`, in order, inside one transaction.
///
/// Foreign key enforcement is suspended for the duration so that steps may
/// rebuild referenced tables; callers re-enable it when the connection is
/// configured. Returns the names of the steps that ran.
pub fn run_migrations(conn: &mut Connection, chain: &[Migration]) -> Result<Vec<&'static str>> {
    conn.execute_batch("PRAGMA foreign_keys = OFF;")?;
    let tx = conn.transaction()?;
    let mut applied = Vec::new();
    for step in chain {
        let wanted = (step.applies)(&tx)
            .with_context(|| format!("Failed to probe schema for migration '{}'", step.name))?;
        if wanted {
            info!("Applying schema migration: {}", step.name);
            (step.apply)(&tx)
                .with_context(|| format!("Failed to apply migration '{}'", step.name))?;
            applied.push(step.name);
        }
    }
    tx.commit()?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    Ok(applied)
}

/// True if `table` exists and its column set contains every name in `columns`.
pub(crate) fn table_has_columns(
    conn: &Connection,
    table: &str,
    columns: &[&str],
) -> Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({});", table))?;
    let actual: Vec<String> = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<rusqlite::Result<_>>()?;
    if actual.is_empty() {
        return Ok(false);
    }
    Ok(columns.iter().all(|c| actual.iter().any(|a| a == c)))
}

pub(crate) fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
        [table],
        |r| r.get(0),
    )?;
    Ok(count > 0)
}
