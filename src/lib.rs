//! Clipbook Library
//!
//! Ingests web-article references from note vaults, link files, and capture
//! queues, deduplicates them through URL normalization, and converts the
//! pending backlog into EPUB artifacts, tracking all state in SQLite.

pub mod config;
pub mod convert;
pub mod ingest;
pub mod item_store;
pub mod normalize;
pub mod sqlite_persistence;

// Re-export commonly used types for convenience
pub use config::{AppConfig, CliConfig, FileConfig};
pub use convert::{BookBuilder, ConversionEngine, EpubBookWriter, ExtractingBookBuilder};
pub use ingest::{IngestEngine, IngestReport, IngestSource};
pub use item_store::SqliteItemStore;
