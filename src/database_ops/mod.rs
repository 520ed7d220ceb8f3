//! Collaborator seams for the migration pass and their production implementations.

pub mod cloudinary;
pub mod driver;
pub mod image_migrator;
pub mod report;
pub mod supabase;

use async_trait::async_trait;

use crate::error::{SinkError, SourceError, UploadError};
use crate::model::{Record, RecordId};

/// Offset/limit cursor for paging through the backing store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub offset: usize,
    pub limit: usize,
}

impl PageRequest {
    pub fn first(limit: usize) -> Self {
        Self {
            offset: 0,
            limit: limit.max(1),
        }
    }

    /// Cursor for the page after this one, given how many rows it returned.
    /// The store may cap a response below `limit` (PostgREST `db-max-rows`),
    /// so only an empty page means there is nothing more.
    pub fn next_after(&self, returned: usize) -> Option<Self> {
        (returned > 0).then(|| Self {
            offset: self.offset + returned,
            limit: self.limit,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecordPage {
    pub records: Vec<Record>,
    pub next: Option<PageRequest>,
}

#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Page size used by `fetch_records`.
    fn page_size(&self) -> usize {
        500
    }

    async fn fetch_page(&self, page: PageRequest) -> Result<RecordPage, SourceError>;

    /// Records in source order, at most `max` of them when given. An empty vec
    /// is a valid result; any failing page fails the whole fetch.
    async fn fetch_records(&self, max: Option<usize>) -> Result<Vec<Record>, SourceError> {
        let mut out = Vec::new();
        let mut cursor = Some(PageRequest::first(self.page_size()));
        while let Some(mut page) = cursor {
            if let Some(max) = max {
                let remaining = max.saturating_sub(out.len());
                if remaining == 0 {
                    break;
                }
                page.limit = page.limit.min(remaining);
            }
            let fetched = self.fetch_page(page).await?;
            tracing::debug!(
                offset = page.offset,
                returned = fetched.records.len(),
                "fetched record page"
            );
            out.extend(fetched.records);
            cursor = fetched.next.map(|next| PageRequest {
                limit: self.page_size().max(1),
                ..next
            });
        }
        if let Some(max) = max {
            out.truncate(max);
        }
        Ok(out)
    }
}

#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Overwrite the destination list of one record. Only that field is touched.
    async fn update_record(&self, id: &RecordId, destination_images: &[String]) -> Result<(), SinkError>;
}

#[async_trait]
pub trait ImageUploader: Send + Sync {
    /// Upload by reference; returns the permanent hosted URL.
    async fn upload(&self, source: &str) -> Result<String, UploadError>;
}
