//! Records, per-image and per-record outcomes, and the run summary.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque record identifier. PostgREST hands back whatever the column type is,
/// so both integer and text/uuid keys are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Int(i64),
    Text(String),
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Int(n) => write!(f, "{n}"),
            RecordId::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for RecordId {
    fn from(n: i64) -> Self {
        RecordId::Int(n)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        RecordId::Text(s.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub id: RecordId,
    pub source_images: Vec<String>,
    /// Destination list as stored before this run; `None` when never written.
    pub destination_images: Option<Vec<String>>,
}

impl Record {
    pub fn new(id: impl Into<RecordId>, source_images: Vec<String>) -> Self {
        Self {
            id: id.into(),
            source_images,
            destination_images: None,
        }
    }
}

/// Result of migrating a single source location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ImageOutcome {
    Uploaded { destination: String },
    Failed { source: String, reason: String },
}

impl ImageOutcome {
    pub fn destination(&self) -> Option<&str> {
        match self {
            ImageOutcome::Uploaded { destination } => Some(destination),
            ImageOutcome::Failed { .. } => None,
        }
    }
}

/// Destination list in source order, failed items omitted.
pub fn destination_list(outcomes: &[ImageOutcome]) -> Vec<String> {
    outcomes
        .iter()
        .filter_map(|o| o.destination().map(str::to_string))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MigrationOutcome {
    /// No source images; the sink was not called.
    Skipped,
    /// Destination list written (possibly shorter than the source list).
    Completed,
    /// Images were migrated but the write-back failed.
    RecordUpdateFailed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedImage {
    pub source: String,
    pub reason: String,
}

/// Everything needed to reconcile one record by hand after the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordReport {
    pub id: RecordId,
    #[serde(flatten)]
    pub outcome: MigrationOutcome,
    pub uploaded: Vec<String>,
    pub failed: Vec<FailedImage>,
}

impl RecordReport {
    pub fn skipped(id: RecordId) -> Self {
        Self {
            id,
            outcome: MigrationOutcome::Skipped,
            uploaded: Vec::new(),
            failed: Vec::new(),
        }
    }

    pub fn from_images(id: RecordId, outcome: MigrationOutcome, images: Vec<ImageOutcome>) -> Self {
        let mut uploaded = Vec::new();
        let mut failed = Vec::new();
        for image in images {
            match image {
                ImageOutcome::Uploaded { destination } => uploaded.push(destination),
                ImageOutcome::Failed { source, reason } => failed.push(FailedImage { source, reason }),
            }
        }
        Self {
            id,
            outcome,
            uploaded,
            failed,
        }
    }
}

/// Tally of one pass. Uploads and persistence are counted independently.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub skipped: usize,
    pub completed: usize,
    pub record_update_failed: usize,
    pub images_uploaded: usize,
    pub images_failed: usize,
    pub records: Vec<RecordReport>,
}

impl RunSummary {
    pub fn record(&mut self, report: RecordReport) {
        match report.outcome {
            MigrationOutcome::Skipped => self.skipped += 1,
            MigrationOutcome::Completed => self.completed += 1,
            MigrationOutcome::RecordUpdateFailed { .. } => self.record_update_failed += 1,
        }
        self.images_uploaded += report.uploaded.len();
        self.images_failed += report.failed.len();
        self.records.push(report);
    }

    pub fn records_processed(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn has_failures(&self) -> bool {
        self.record_update_failed > 0 || self.images_failed > 0
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "records={} completed={} skipped={} update_failed={} images_uploaded={} images_failed={}",
            self.records_processed(),
            self.completed,
            self.skipped,
            self.record_update_failed,
            self.images_uploaded,
            self.images_failed
        )
    }
}
