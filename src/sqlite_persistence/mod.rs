//! Shared SQLite schema tooling.
//!
//! Declarative table definitions with creation and post-migration validation,
//! plus a shape-detection migration chain runner for databases that predate
//! any version counter.

mod migration;
mod schema_model;

pub use migration::{run_migrations, Migration};
pub(crate) use migration::{table_exists, table_has_columns};
pub use schema_model::{Column, ForeignKey, SqlType, Table};
