//! Conversion engine.
//!
//! Selects pending items, drives the book builder, and commits the artifact
//! file together with the Run/RunItem rows. The store and the filesystem
//! must never disagree about whether a conversion happened, so the artifact
//! is staged at a temp path and promoted inside the write transaction.

use super::builder::BookBuilder;
use crate::item_store::{Candidate, RunItemAction, SqliteItemStore};
use anyhow::{bail, Context, Result};
use chrono::{Local, Utc};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// What one conversion pass did.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ConversionOutcome {
    pub candidates: usize,
    pub converted: usize,
    pub failed: usize,
    pub artifact_path: Option<PathBuf>,
}

pub struct ConversionEngine<'a, B> {
    store: &'a SqliteItemStore,
    builder: B,
}

impl<'a, B: BookBuilder> ConversionEngine<'a, B> {
    pub fn new(store: &'a SqliteItemStore, builder: B) -> Self {
        Self { store, builder }
    }

    /// Convert every pending item into one new artifact.
    ///
    /// With no pending items this is a strict no-op: no Run row, no staging
    /// snapshot, no output file.
    pub fn convert_pending(
        &self,
        output_dir: &Path,
        staging_dir: &Path,
    ) -> Result<ConversionOutcome> {
        let candidates = self.store.select_candidates()?;
        if candidates.is_empty() {
            info!("No pending items to convert");
            return Ok(ConversionOutcome::default());
        }

        fs::create_dir_all(output_dir)
            .with_context(|| format!("Failed to create output directory {:?}", output_dir))?;
        fs::create_dir_all(staging_dir)
            .with_context(|| format!("Failed to create staging directory {:?}", staging_dir))?;

        let base = Local::now().format("%Y-%m-%d").to_string();
        let (staging_path, output_path) = pick_paths(staging_dir, output_dir, &base);

        let urls: Vec<String> = candidates.iter().map(|c| c.payload_ref.clone()).collect();
        // Audit snapshot of the batch, not consulted by later runs.
        fs::write(&staging_path, urls.join("\n") + "\n")
            .with_context(|| format!("Failed to write staging snapshot {:?}", staging_path))?;

        let tmp_path = tmp_artifact_path(&output_path);
        let result = self.commit_conversion(&candidates, &urls, &tmp_path, &output_path, output_dir);
        if result.is_err() && tmp_path.exists() {
            if let Err(e) = fs::remove_file(&tmp_path) {
                warn!("Failed to remove temporary artifact {:?}: {}", tmp_path, e);
            }
        }
        result
    }

    fn commit_conversion(
        &self,
        candidates: &[Candidate],
        urls: &[String],
        tmp_path: &Path,
        output_path: &Path,
        output_dir: &Path,
    ) -> Result<ConversionOutcome> {
        self.store.with_immediate_tx(|tx| {
            let run_id = SqliteItemStore::insert_run(tx, Utc::now(), "epub")?;

            let flags = self.builder.build(urls, tmp_path)?;
            if flags.len() != candidates.len() {
                bail!(
                    "Book builder returned {} results for {} candidates",
                    flags.len(),
                    candidates.len()
                );
            }

            let any_success = flags.iter().any(|flag| *flag);
            let artifact_materialized = if any_success {
                if !tmp_path.exists() {
                    bail!(
                        "Book builder reported success but produced no artifact at {:?}",
                        tmp_path
                    );
                }
                promote_artifact(tmp_path, output_path, output_dir)?;
                SqliteItemStore::set_run_filename(tx, run_id, &output_path.to_string_lossy())?;
                true
            } else {
                if tmp_path.exists() {
                    fs::remove_file(tmp_path)?;
                }
                false
            };

            let mut outcome = ConversionOutcome {
                candidates: candidates.len(),
                artifact_path: artifact_materialized.then(|| output_path.to_path_buf()),
                ..Default::default()
            };
            for (candidate, flag) in candidates.iter().zip(&flags) {
                // A nominally-successful item without a materialized artifact
                // still counts as failed.
                let action = if *flag && artifact_materialized {
                    outcome.converted += 1;
                    RunItemAction::Converted
                } else {
                    outcome.failed += 1;
                    RunItemAction::Failed
                };
                SqliteItemStore::insert_run_item(tx, run_id, candidate.id, action)?;
            }
            SqliteItemStore::mark_run_committed(tx, run_id)?;

            info!(
                run_id,
                converted = outcome.converted,
                failed = outcome.failed,
                artifact = ?outcome.artifact_path,
                "Conversion run committed"
            );
            Ok(outcome)
        })
    }
}

/// Pick paired staging/output filenames from the date base, appending the
/// same numeric suffix to both until neither name is taken.
fn pick_paths(staging_dir: &Path, output_dir: &Path, base: &str) -> (PathBuf, PathBuf) {
    let mut idx = 0;
    loop {
        let (staging_name, output_name) = if idx == 0 {
            (format!("{base}.txt"), format!("{base}.epub"))
        } else {
            (format!("{base}_{idx}.txt"), format!("{base}_{idx}.epub"))
        };
        let staging_path = staging_dir.join(staging_name);
        let output_path = output_dir.join(output_name);
        if !staging_path.exists() && !output_path.exists() {
            return (staging_path, output_path);
        }
        idx += 1;
    }
}

fn tmp_artifact_path(output_path: &Path) -> PathBuf {
    let mut os = output_path.as_os_str().to_os_string();
    os.push(".tmp");
    PathBuf::from(os)
}

/// Atomic rename into place, then flush file data and the directory entry.
/// Directory sync is best-effort; not every platform supports it.
fn promote_artifact(tmp_path: &Path, output_path: &Path, output_dir: &Path) -> Result<()> {
    fs::rename(tmp_path, output_path)
        .with_context(|| format!("Failed to move artifact into place at {:?}", output_path))?;
    File::open(output_path)
        .and_then(|f| f.sync_all())
        .with_context(|| format!("Failed to sync artifact {:?}", output_path))?;
    if let Ok(dir) = File::open(output_dir) {
        let _ = dir.sync_all();
    }
    Ok(())
}
