//! Common test infrastructure
//!
//! Provides a temp-directory pipeline fixture (database, inbox, output and
//! staging directories) plus scripted builder/extractor stubs so end-to-end
//! tests can drive the whole ingest-and-convert flow without the network.

// Not every test binary uses every helper.
#![allow(dead_code)]

use anyhow::{bail, Result};
use clipbook::convert::{BookBuilder, ContentExtractor, ExtractedArticle};
use clipbook::ingest::{IngestEngine, IngestReport, IngestSource};
use clipbook::item_store::SqliteItemStore;
use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// One self-contained pipeline environment on disk.
pub struct TestPipeline {
    _dir: TempDir,
    pub store: SqliteItemStore,
    pub db_path: PathBuf,
    pub inbox_dir: PathBuf,
    pub output_dir: PathBuf,
    pub staging_dir: PathBuf,
}

impl TestPipeline {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("clipbook.db");
        let inbox_dir = dir.path().join("inbox");
        let output_dir = dir.path().join("out");
        let staging_dir = dir.path().join("staging");
        fs::create_dir(&inbox_dir).unwrap();

        let store = SqliteItemStore::open(&db_path).unwrap();
        Self {
            _dir: dir,
            store,
            db_path,
            inbox_dir,
            output_dir,
            staging_dir,
        }
    }

    pub fn write_inbox_file(&self, name: &str, content: &str) -> PathBuf {
        let path = self.inbox_dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    pub fn ingest_inbox(&self) -> IngestReport {
        IngestEngine::new(&self.store, false)
            .run(&IngestSource::Directory(self.inbox_dir.clone()))
            .unwrap()
    }

    pub fn output_artifacts(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = match fs::read_dir(&self.output_dir) {
            Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
            Err(_) => Vec::new(),
        };
        paths.sort();
        paths
    }
}

/// Builder whose per-URL flags are scripted up front. Writes a placeholder
/// artifact unless told not to, and can abort mid-call.
pub struct ScriptedBuilder {
    flags: Vec<bool>,
    pub write_artifact: bool,
    pub abort: bool,
    pub seen_urls: RefCell<Vec<String>>,
}

impl ScriptedBuilder {
    pub fn returning(flags: Vec<bool>) -> Self {
        Self {
            flags,
            write_artifact: true,
            abort: false,
            seen_urls: RefCell::new(Vec::new()),
        }
    }

    pub fn aborting() -> Self {
        let mut builder = Self::returning(Vec::new());
        builder.abort = true;
        builder
    }
}

impl BookBuilder for ScriptedBuilder {
    fn build(&self, urls: &[String], output_path: &Path) -> Result<Vec<bool>> {
        self.seen_urls.borrow_mut().extend(urls.iter().cloned());
        if self.write_artifact {
            fs::write(output_path, b"epub-bytes")?;
        }
        if self.abort {
            bail!("interrupted mid-build");
        }
        Ok(self.flags.clone())
    }
}

/// Offline extractor: URLs containing "broken" fail, the rest yield a
/// one-paragraph article.
pub struct OfflineExtractor;

impl ContentExtractor for OfflineExtractor {
    fn extract(&self, url: &str) -> Result<ExtractedArticle> {
        if url.contains("broken") {
            bail!("connection refused");
        }
        Ok(ExtractedArticle {
            title: Some(format!("Article at {url}")),
            content_html: format!("<p>Readable content of {url}</p>"),
        })
    }
}
