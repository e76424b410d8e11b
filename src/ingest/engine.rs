//! Ingest engine.
//!
//! Reads candidate link sources, validates and normalizes every reference,
//! and upserts the survivors into the item store. Directory mode keeps
//! per-file fingerprints so unchanged files are skipped on re-ingest.

use super::frontmatter::read_front_matter;
use super::parser::{parse_links, LinkCandidate};
use crate::item_store::{IngestFileRecord, IngestFileStatus, SqliteItemStore};
use crate::normalize;
use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::{info, warn};
use walkdir::WalkDir;

/// Where to read candidate references from. The three kinds are mutually
/// exclusive per invocation.
#[derive(Debug, Clone)]
pub enum IngestSource {
    /// A single links or capture-queue file.
    File(PathBuf),
    /// A directory of mixed `.md`/`.json` files, with fingerprint tracking.
    Directory(PathBuf),
    /// A note vault scanned for Markdown clippings, no fingerprint tracking.
    Vault(PathBuf),
}

/// Best-effort counters for one ingest pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub ready_items: usize,
    pub warnings: usize,
    pub files_seen: usize,
    pub files_processed: usize,
    pub files_skipped_unchanged: usize,
}

pub struct IngestEngine<'a> {
    store: &'a SqliteItemStore,
    dry_run: bool,
}

impl<'a> IngestEngine<'a> {
    pub fn new(store: &'a SqliteItemStore, dry_run: bool) -> Self {
        Self { store, dry_run }
    }

    pub fn run(&self, source: &IngestSource) -> Result<IngestReport> {
        let mut report = IngestReport::default();
        match source {
            IngestSource::File(path) => self.ingest_file(path, &mut report)?,
            IngestSource::Directory(dir) => self.ingest_directory(dir, &mut report)?,
            IngestSource::Vault(vault) => self.ingest_vault(vault, &mut report)?,
        }
        info!(
            ready_items = report.ready_items,
            warnings = report.warnings,
            files_seen = report.files_seen,
            files_processed = report.files_processed,
            files_skipped_unchanged = report.files_skipped_unchanged,
            dry_run = self.dry_run,
            "Ingest pass finished"
        );
        Ok(report)
    }

    fn ingest_file(&self, path: &Path, report: &mut IngestReport) -> Result<()> {
        report.files_seen += 1;
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read links file {:?}", path))?;
        let fallback_source = path.to_string_lossy();
        for candidate in parse_links(&content) {
            self.upsert_candidate(&candidate, &fallback_source, report)?;
        }
        report.files_processed += 1;
        Ok(())
    }

    fn ingest_directory(&self, dir: &Path, report: &mut IngestReport) -> Result<()> {
        if !dir.is_dir() {
            bail!("Input directory does not exist: {:?}", dir);
        }
        for path in sorted_files(dir, &["md", "json"]) {
            report.files_seen += 1;
            let key = path.to_string_lossy().to_string();

            let (size, mtime_ns) = match file_fingerprint(&path) {
                Ok(fingerprint) => fingerprint,
                Err(e) => {
                    report.warnings += 1;
                    warn!("Failed to stat {:?}: {:#}", path, e);
                    continue;
                }
            };
            if let Some(previous) = self.store.get_ingest_file(&key)? {
                if previous.size == size
                    && previous.mtime_ns == mtime_ns
                    && previous.status == IngestFileStatus::Ok
                {
                    report.files_skipped_unchanged += 1;
                    continue;
                }
            }

            let warnings_before = report.warnings;
            let status = match self.process_directory_file(&path, report) {
                Ok(()) if report.warnings == warnings_before => IngestFileStatus::Ok,
                Ok(()) => IngestFileStatus::Warning,
                Err(e) => {
                    report.warnings += 1;
                    warn!("Failed to process {:?}: {:#}", path, e);
                    IngestFileStatus::Error
                }
            };
            report.files_processed += 1;
            if !self.dry_run {
                self.store.upsert_ingest_file(&IngestFileRecord {
                    path: key,
                    size,
                    mtime_ns,
                    last_ingested_at: Utc::now(),
                    status,
                })?;
            }
        }
        Ok(())
    }

    fn ingest_vault(&self, vault: &Path, report: &mut IngestReport) -> Result<()> {
        if !vault.is_dir() {
            bail!("Vault path does not exist: {:?}", vault);
        }
        for path in sorted_files(vault, &["md"]) {
            report.files_seen += 1;
            if let Err(e) = self.ingest_markdown(&path, report) {
                report.warnings += 1;
                warn!("Failed to parse front matter in {:?}: {:#}", path, e);
            }
            report.files_processed += 1;
        }
        Ok(())
    }

    fn process_directory_file(&self, path: &Path, report: &mut IngestReport) -> Result<()> {
        let is_markdown = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("md"));
        if is_markdown {
            self.ingest_markdown(path, report)
        } else {
            let content = std::fs::read_to_string(path)?;
            let fallback_source = path.to_string_lossy();
            for candidate in parse_links(&content) {
                self.upsert_candidate(&candidate, &fallback_source, report)?;
            }
            Ok(())
        }
    }

    fn ingest_markdown(&self, path: &Path, report: &mut IngestReport) -> Result<()> {
        let front_matter = read_front_matter(path)?;
        let Some(url) = front_matter
            .as_ref()
            .and_then(|fm| fm.source_url())
        else {
            report.warnings += 1;
            warn!("Missing source front matter in {:?}", path);
            return Ok(());
        };
        let candidate = LinkCandidate {
            payload_ref: url.to_string(),
            source: None,
            captured_at: front_matter
                .as_ref()
                .and_then(|fm| fm.created.as_deref())
                .and_then(parse_created),
        };
        self.upsert_candidate(&candidate, &path.to_string_lossy(), report)
    }

    /// Validate, normalize, and persist one reference. Invalid references
    /// count as warnings and never reach the store. Dry-run counts but does
    /// not persist.
    fn upsert_candidate(
        &self,
        candidate: &LinkCandidate,
        fallback_source: &str,
        report: &mut IngestReport,
    ) -> Result<()> {
        if !normalize::is_valid(&candidate.payload_ref) {
            report.warnings += 1;
            warn!(
                "Skipping invalid URL in {}: {}",
                fallback_source, candidate.payload_ref
            );
            return Ok(());
        }
        let normalized = normalize::normalize(&candidate.payload_ref)?;
        if !self.dry_run {
            let source = candidate.source.as_deref().unwrap_or(fallback_source);
            self.store
                .upsert_item(&normalized, source, candidate.captured_at)?;
        }
        report.ready_items += 1;
        Ok(())
    }
}

fn sorted_files(root: &Path, extensions: &[&str]) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension()
                .is_some_and(|ext| extensions.iter().any(|e| ext.eq_ignore_ascii_case(e)))
        })
        .collect();
    files.sort();
    files
}

fn file_fingerprint(path: &Path) -> Result<(i64, i64)> {
    let metadata = std::fs::metadata(path)?;
    let mtime_ns = metadata
        .modified()?
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0);
    Ok((metadata.len() as i64, mtime_ns))
}

fn parse_created(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
