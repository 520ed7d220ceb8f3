use futures::{stream, StreamExt};
use tracing::{info, warn};

use super::ImageUploader;
use crate::model::{ImageOutcome, RecordId};

/// Re-host every source location of one record, strictly in order.
///
/// Each location gets exactly one outcome; a failure is recorded and the next
/// location is still attempted. Calling this twice with the same input is safe
/// (uploads are at-least-once; dedup is the media service's business).
pub async fn migrate_images(
    uploader: &dyn ImageUploader,
    record_id: &RecordId,
    sources: &[String],
) -> Vec<ImageOutcome> {
    stream::iter(sources)
        .then(|source| migrate_one(uploader, record_id, source))
        .collect()
        .await
}

async fn migrate_one(uploader: &dyn ImageUploader, record_id: &RecordId, source: &str) -> ImageOutcome {
    match uploader.upload(source).await {
        Ok(destination) => {
            info!(record_id = %record_id, source = %source, destination = %destination, "image uploaded");
            ImageOutcome::Uploaded { destination }
        }
        Err(e) => {
            warn!(record_id = %record_id, source = %source, error = %e, "image upload failed");
            ImageOutcome::Failed {
                source: source.to_string(),
                reason: e.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UploadError;
    use crate::model::destination_list;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Uploads succeed unless the location contains "bad".
    #[derive(Default)]
    struct ScriptedUploader {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ImageUploader for ScriptedUploader {
        async fn upload(&self, source: &str) -> Result<String, UploadError> {
            self.calls.lock().unwrap().push(source.to_string());
            if source.contains("bad") {
                return Err(UploadError::Rejected {
                    status: 400,
                    message: format!("Resource not found - {source}"),
                });
            }
            Ok(source.replace("http://a/", "https://res.cloudinary.com/demo/products/"))
        }
    }

    fn sources(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn one_outcome_per_source_in_order() {
        let uploader = ScriptedUploader::default();
        let input = sources(&["http://a/1.jpg", "http://bad/2.jpg", "http://a/3.jpg"]);
        let outcomes = migrate_images(&uploader, &RecordId::Int(1), &input).await;

        assert_eq!(outcomes.len(), 3);
        assert_eq!(
            outcomes[0],
            ImageOutcome::Uploaded {
                destination: "https://res.cloudinary.com/demo/products/1.jpg".into()
            }
        );
        assert!(matches!(&outcomes[1], ImageOutcome::Failed { source, .. } if source == "http://bad/2.jpg"));
        assert_eq!(
            destination_list(&outcomes),
            vec![
                "https://res.cloudinary.com/demo/products/1.jpg",
                "https://res.cloudinary.com/demo/products/3.jpg"
            ]
        );
        assert_eq!(*uploader.calls.lock().unwrap(), input);
    }

    #[tokio::test]
    async fn failure_reason_keeps_service_message() {
        let uploader = ScriptedUploader::default();
        let outcomes = migrate_images(&uploader, &RecordId::Int(2), &sources(&["http://bad/1.jpg"])).await;
        match &outcomes[0] {
            ImageOutcome::Failed { reason, .. } => assert!(reason.contains("Resource not found")),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_input_makes_no_calls() {
        let uploader = ScriptedUploader::default();
        assert!(migrate_images(&uploader, &RecordId::Int(3), &[]).await.is_empty());
        assert!(uploader.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn repeated_calls_are_safe() {
        let uploader = ScriptedUploader::default();
        let input = sources(&["http://a/1.jpg"]);
        let first = migrate_images(&uploader, &RecordId::Int(1), &input).await;
        let second = migrate_images(&uploader, &RecordId::Int(1), &input).await;
        assert_eq!(first, second);
        assert_eq!(uploader.calls.lock().unwrap().len(), 2);
    }
}
