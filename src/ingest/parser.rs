//! Link-source payload parsing.
//!
//! A single input file can be a plain list of URLs (one per line), a JSON
//! array of URL strings, a JSON array of capture-queue entries, a single
//! capture entry, or a `{"queue": [...]}` wrapper around either array form.
//! Shapes are tried in that order; anything that is not recognizable JSON
//! falls back to line mode.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

/// One entry of a capture-queue JSON file.
#[derive(Debug, Clone, Deserialize)]
pub struct CaptureEntry {
    pub payload_ref: String,
    #[serde(default)]
    pub payload_type: Option<String>,
    #[serde(default)]
    pub captured_at: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

/// A reference extracted from an input file, before validation and
/// normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkCandidate {
    pub payload_ref: String,
    /// Provenance from the entry itself, if the format carries one.
    pub source: Option<String>,
    pub captured_at: Option<DateTime<Utc>>,
}

impl LinkCandidate {
    fn bare(payload_ref: &str) -> Self {
        Self {
            payload_ref: payload_ref.to_string(),
            source: None,
            captured_at: None,
        }
    }
}

/// Extract candidates from a file's text content.
pub fn parse_links(content: &str) -> Vec<LinkCandidate> {
    if let Ok(value) = serde_json::from_str::<Value>(content) {
        if let Some(candidates) = candidates_from_json(&value) {
            return candidates;
        }
        debug!("JSON payload has no recognizable capture shape, using line mode");
    }
    parse_lines(content)
}

fn parse_lines(content: &str) -> Vec<LinkCandidate> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(LinkCandidate::bare)
        .collect()
}

fn candidates_from_json(value: &Value) -> Option<Vec<LinkCandidate>> {
    match value {
        Value::Array(_) => candidates_from_array(value),
        Value::Object(map) => {
            if let Some(queue) = map.get("queue") {
                candidates_from_array(queue)
            } else {
                let entry: CaptureEntry = serde_json::from_value(value.clone()).ok()?;
                Some(candidates_from_entries(vec![entry]))
            }
        }
        _ => None,
    }
}

fn candidates_from_array(value: &Value) -> Option<Vec<LinkCandidate>> {
    let items = value.as_array()?;
    if items.iter().all(Value::is_string) {
        return Some(
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(LinkCandidate::bare)
                .collect(),
        );
    }
    let entries: Vec<CaptureEntry> = serde_json::from_value(value.clone()).ok()?;
    Some(candidates_from_entries(entries))
}

fn candidates_from_entries(entries: Vec<CaptureEntry>) -> Vec<LinkCandidate> {
    entries
        .into_iter()
        // Entries of a kind we cannot convert are dropped, without a warning.
        .filter(|entry| {
            entry
                .payload_type
                .as_deref()
                .map_or(true, |kind| kind == "url")
        })
        .map(|entry| LinkCandidate {
            payload_ref: entry.payload_ref,
            source: entry.source,
            captured_at: entry.captured_at.as_deref().and_then(parse_timestamp),
        })
        .collect()
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
