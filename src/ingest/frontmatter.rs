//! YAML front-matter extraction for Markdown clippings.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// The front-matter fields the pipeline consumes. Clipping tools write many
/// more, all ignored here.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FrontMatter {
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub created: Option<String>,
}

impl FrontMatter {
    /// The reference to ingest, if the clipping carries a usable one.
    pub fn source_url(&self) -> Option<&str> {
        self.source.as_deref().filter(|s| !s.is_empty())
    }
}

/// Read the leading YAML front-matter block of a Markdown file.
///
/// The block is delimited by a `---` line at the top of the file and a second
/// `---` line. Returns `None` when the file has no such block. Invalid YAML
/// inside the block is an error.
pub fn read_front_matter(file_path: &Path) -> Result<Option<FrontMatter>> {
    let content = std::fs::read_to_string(file_path)
        .with_context(|| format!("Failed to read {:?}", file_path))?;
    let Some(block) = front_matter_block(&content) else {
        return Ok(None);
    };
    if block.trim().is_empty() {
        return Ok(Some(FrontMatter::default()));
    }
    let front_matter: FrontMatter = serde_yaml::from_str(block)
        .with_context(|| format!("Invalid front matter in {:?}", file_path))?;
    Ok(Some(front_matter))
}

fn front_matter_block(content: &str) -> Option<&str> {
    let rest = content.strip_prefix("---\n")?;
    if rest.starts_with("---\n") || rest == "---" {
        return Some("");
    }
    let end = rest
        .find("\n---\n")
        .or_else(|| rest.strip_suffix("\n---").map(|trimmed| trimmed.len()))?;
    Some(&rest[..end])
}
