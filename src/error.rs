//! Error types for the three external boundaries.
//!
//! `SourceError` is fatal for a run. `UploadError` and `SinkError` are recorded
//! against the image or record they belong to and never stop the pass.

use thiserror::Error;

use crate::model::RecordId;

/// The backing store could not be read.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("record source unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("record source rejected read (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("record source returned malformed data: {0}")]
    Malformed(String),
}

/// The write-back of a destination list failed.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("record store unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("record store rejected update (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("update matched no record with id {0}")]
    NoMatchingRecord(RecordId),
    #[error("record store returned malformed update response: {0}")]
    Malformed(String),
}

/// One image could not be re-hosted.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("invalid source location {location:?}: {reason}")]
    InvalidLocation { location: String, reason: String },
    #[error("media service unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("media service rejected upload (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("media service returned malformed response: {0}")]
    Malformed(String),
}

/// Pull a human-readable message out of an error body. Both PostgREST
/// (`{"message": ..}`) and Cloudinary (`{"error": {"message": ..}}`) shapes are
/// understood; anything else is returned truncated.
pub fn service_message(body: &str) -> String {
    if let Ok(v) = serde_json::from_str::<serde_json::Value>(body) {
        let msg = v
            .get("message")
            .or_else(|| v.get("error").and_then(|e| e.get("message")))
            .or_else(|| v.get("error"))
            .and_then(|m| m.as_str());
        if let Some(m) = msg {
            return m.to_string();
        }
    }
    truncate_for_log(body.trim().to_string(), 500)
}

pub fn truncate_for_log(mut s: String, max_len: usize) -> String {
    if s.len() > max_len {
        let mut cut = max_len;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        s.truncate(cut);
        s.push('…');
    }
    s
}
