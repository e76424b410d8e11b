//! Article-batch book building.

use super::epub::{BookWriter, Chapter};
use super::extractor::ContentExtractor;
use anyhow::Result;
use chrono::Local;
use std::path::Path;
use tracing::{info, warn};

/// Turns a URL batch into a single book artifact, reporting per-URL success
/// in input order.
pub trait BookBuilder {
    fn build(&self, urls: &[String], output_path: &Path) -> Result<Vec<bool>>;
}

/// Default builder: extract every URL, collect the survivors as chapters,
/// write one book. A URL that fails to fetch or extract gets a `false` flag
/// and the batch continues.
pub struct ExtractingBookBuilder<E, W> {
    extractor: E,
    writer: W,
}

impl<E: ContentExtractor, W: BookWriter> ExtractingBookBuilder<E, W> {
    pub fn new(extractor: E, writer: W) -> Self {
        Self { extractor, writer }
    }
}

impl<E: ContentExtractor, W: BookWriter> BookBuilder for ExtractingBookBuilder<E, W> {
    fn build(&self, urls: &[String], output_path: &Path) -> Result<Vec<bool>> {
        if urls.is_empty() {
            return Ok(Vec::new());
        }

        let mut chapters = Vec::new();
        let mut flags = Vec::with_capacity(urls.len());
        for (idx, url) in urls.iter().enumerate() {
            match self.extractor.extract(url) {
                Ok(article) => {
                    let title = article
                        .title
                        .unwrap_or_else(|| format!("Article {}", idx + 1));
                    chapters.push(Chapter {
                        title,
                        content_html: article.content_html,
                    });
                    flags.push(true);
                    info!("Added {}", url);
                }
                Err(e) => {
                    flags.push(false);
                    warn!("Failed to process {}: {:#}", url, e);
                }
            }
        }

        let title = format!("Collected Articles - {}", Local::now().format("%Y-%m-%d"));
        self.writer.write_book(&title, &chapters, output_path)?;
        Ok(flags)
    }
}
