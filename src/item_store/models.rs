//! Data models for the item store.
//!
//! Items, conversion runs, per-item run outcomes, and ingest-file
//! fingerprint records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of payload an item references. Only URLs are convertible today;
/// capture queues may carry other kinds, which ingest drops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadType {
    Url,
}

impl PayloadType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayloadType::Url => "url",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "url" => Some(PayloadType::Url),
            _ => None,
        }
    }
}

/// Status of a conversion run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    InProgress,
    Committed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::InProgress => "in_progress",
            RunStatus::Committed => "committed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "in_progress" => Some(RunStatus::InProgress),
            "committed" => Some(RunStatus::Committed),
            _ => None,
        }
    }
}

/// Terminal outcome of one item within one run. An item with any recorded
/// action is excluded from future candidate selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunItemAction {
    Converted,
    Failed,
}

impl RunItemAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunItemAction::Converted => "converted",
            RunItemAction::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "converted" => Some(RunItemAction::Converted),
            "failed" => Some(RunItemAction::Failed),
            _ => None,
        }
    }
}

/// Outcome recorded against an ingest-file fingerprint. Only files whose
/// previous pass ended `Ok` are eligible for the unchanged-skip fast path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestFileStatus {
    Ok,
    Warning,
    Error,
}

impl IngestFileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestFileStatus::Ok => "ok",
            IngestFileStatus::Warning => "warning",
            IngestFileStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ok" => Some(IngestFileStatus::Ok),
            "warning" => Some(IngestFileStatus::Warning),
            "error" => Some(IngestFileStatus::Error),
            _ => None,
        }
    }
}

/// A deduplicated payload reference.
#[derive(Debug, Clone)]
pub struct Item {
    pub id: i64,
    pub captured_at: DateTime<Utc>,
    /// Canonical reference string (normalized URL). Globally unique.
    pub payload_ref: String,
    pub payload_type: PayloadType,
    /// Provenance: originating file path or capture-tool name.
    pub source: String,
}

/// One conversion attempt producing one artifact.
///
/// `filename` is non-empty iff the run committed with at least one converted
/// item. Orphaned `in_progress` rows indicate an aborted run and are retained
/// for diagnosis.
#[derive(Debug, Clone)]
pub struct Run {
    pub id: i64,
    pub run_at: DateTime<Utc>,
    pub artifact_type: String,
    pub filename: String,
    pub recipe: String,
    pub status: RunStatus,
}

/// Outcome of one item within one run.
#[derive(Debug, Clone)]
pub struct RunItem {
    pub run_id: i64,
    pub item_id: i64,
    pub action: RunItemAction,
}

/// Fingerprint record enabling incremental directory ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestFileRecord {
    /// Absolute path, primary key.
    pub path: String,
    pub size: i64,
    /// Modification time in nanoseconds since the Unix epoch.
    pub mtime_ns: i64,
    pub last_ingested_at: DateTime<Utc>,
    pub status: IngestFileStatus,
}

/// An item eligible for conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub id: i64,
    pub payload_ref: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_enums_round_trip() {
        for status in [RunStatus::InProgress, RunStatus::Committed] {
            assert_eq!(RunStatus::parse(status.as_str()), Some(status));
        }
        for action in [RunItemAction::Converted, RunItemAction::Failed] {
            assert_eq!(RunItemAction::parse(action.as_str()), Some(action));
        }
        for status in [
            IngestFileStatus::Ok,
            IngestFileStatus::Warning,
            IngestFileStatus::Error,
        ] {
            assert_eq!(IngestFileStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(PayloadType::parse("url"), Some(PayloadType::Url));
        assert_eq!(PayloadType::parse("note"), None);
    }
}
