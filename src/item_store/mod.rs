//! Persistent item store.
//!
//! Tracks captured payload references, conversion runs, per-item run
//! outcomes, and ingest-file fingerprints in a single SQLite database.

mod models;
mod schema;
mod sqlite_store;

pub use models::{
    Candidate, IngestFileRecord, IngestFileStatus, Item, PayloadType, Run, RunItem, RunItemAction,
    RunStatus,
};
pub use schema::SCHEMA_VERSION;
pub use sqlite_store::SqliteItemStore;
