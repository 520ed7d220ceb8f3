use futures::{stream, StreamExt};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::image_migrator::migrate_images;
use super::{ImageUploader, RecordSink, RecordSource};
use crate::error::SourceError;
use crate::model::{destination_list, MigrationOutcome, Record, RecordReport, RunSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Idle,
    Fetching,
    PerRecordLoop,
    Summarizing,
    Done,
}

#[derive(Debug, Clone)]
pub struct DriverOptions {
    /// Records in flight at once. Images within a record are always sequential.
    pub concurrency: usize,
    /// Process at most this many records (in source order).
    pub limit: Option<usize>,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            concurrency: 1,
            limit: None,
        }
    }
}

/// One-shot pass: fetch once, migrate and write back each record, tally.
pub struct MigrationDriver {
    source: Arc<dyn RecordSource>,
    sink: Arc<dyn RecordSink>,
    uploader: Arc<dyn ImageUploader>,
    options: DriverOptions,
    state: DriverState,
    summary: RunSummary,
}

impl MigrationDriver {
    pub fn new(
        source: Arc<dyn RecordSource>,
        sink: Arc<dyn RecordSink>,
        uploader: Arc<dyn ImageUploader>,
        options: DriverOptions,
    ) -> Self {
        Self {
            source,
            sink,
            uploader,
            options,
            state: DriverState::Idle,
            summary: RunSummary::default(),
        }
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    fn transition(&mut self, next: DriverState) {
        debug!(from = ?self.state, to = ?next, "driver state");
        self.state = next;
    }

    /// Run the pass to completion. Only a failed fetch is an error; in that case
    /// nothing is processed and the summary stays empty.
    pub async fn run(&mut self) -> Result<RunSummary, SourceError> {
        self.transition(DriverState::Fetching);
        let records = match self.source.fetch_records(self.options.limit).await {
            Ok(records) => records,
            Err(e) => {
                error!(error = %e, "record fetch failed; no records processed");
                self.transition(DriverState::Done);
                return Err(e);
            }
        };
        info!(records = records.len(), limit = ?self.options.limit, "records fetched");

        self.transition(DriverState::PerRecordLoop);
        let uploader = Arc::clone(&self.uploader);
        let sink = Arc::clone(&self.sink);
        let reports: Vec<RecordReport> = stream::iter(records)
            .map(|record| process_record(uploader.as_ref(), sink.as_ref(), record))
            .buffered(self.options.concurrency.max(1))
            .collect()
            .await;

        self.transition(DriverState::Summarizing);
        let mut summary = RunSummary::default();
        for report in reports {
            summary.record(report);
        }
        info!(
            records = summary.records_processed(),
            completed = summary.completed,
            skipped = summary.skipped,
            update_failed = summary.record_update_failed,
            images_uploaded = summary.images_uploaded,
            images_failed = summary.images_failed,
            "migration pass finished"
        );
        self.summary = summary;
        self.transition(DriverState::Done);
        Ok(self.summary.clone())
    }
}

/// Migrate one record's images and write the result back exactly once.
async fn process_record(uploader: &dyn ImageUploader, sink: &dyn RecordSink, record: Record) -> RecordReport {
    let id = record.id;
    if record.source_images.is_empty() {
        debug!(record_id = %id, "no source images; skipped");
        return RecordReport::skipped(id);
    }

    let images = migrate_images(uploader, &id, &record.source_images).await;
    let destinations = destination_list(&images);

    // The write overwrites; a transient failure on a re-run can shrink what is stored.
    if let Some(previous) = &record.destination_images {
        if destinations.len() < previous.len() {
            warn!(
                record_id = %id,
                previous = previous.len(),
                new = destinations.len(),
                "destination list shrinks; previously hosted URLs will be replaced"
            );
        }
    }

    let outcome = match sink.update_record(&id, &destinations).await {
        Ok(()) => {
            info!(
                record_id = %id,
                images = destinations.len(),
                failed = images.len() - destinations.len(),
                "record updated"
            );
            MigrationOutcome::Completed
        }
        Err(e) => {
            warn!(record_id = %id, error = %e, "record update failed");
            MigrationOutcome::RecordUpdateFailed { reason: e.to_string() }
        }
    };
    RecordReport::from_images(id, outcome, images)
}
