use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use sha1::{Digest, Sha1};
use std::collections::BTreeMap;

use super::ImageUploader;
use crate::config::CloudinaryConfig;
use crate::error::{service_message, UploadError};

const API_BASE: &str = "https://api.cloudinary.com/v1_1";
const PUBLIC_ID_HEX_LEN: usize = 20;
const ACCEPTED_SCHEMES: &[&str] = &["http", "https", "ftp", "s3", "gs", "data"];

/// Signed Cloudinary uploads by remote reference: the service fetches the
/// bytes itself, nothing is buffered locally.
#[derive(Debug, Clone)]
pub struct CloudinaryUploader {
    upload_url: String,
    http: Client,
    cfg: CloudinaryConfig,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: Option<String>,
    #[serde(default)]
    existing: bool,
}

impl CloudinaryUploader {
    pub fn new(cfg: CloudinaryConfig, http: Client) -> Self {
        Self::with_base(cfg, http, API_BASE)
    }

    pub fn with_base(cfg: CloudinaryConfig, http: Client, base: &str) -> Self {
        let upload_url = format!("{}/{}/image/upload", base.trim_end_matches('/'), cfg.cloud_name);
        Self { upload_url, http, cfg }
    }

    /// Form fields for one upload, signature included.
    fn upload_form(&self, source: &str, timestamp: i64) -> BTreeMap<&'static str, String> {
        let mut signed: BTreeMap<&'static str, String> = BTreeMap::new();
        signed.insert("folder", self.cfg.folder.clone());
        signed.insert("timestamp", timestamp.to_string());
        if self.cfg.deterministic_ids {
            signed.insert("public_id", public_id_for(source));
            signed.insert("overwrite", "false".to_string());
        }

        let signature = sign(&signed, &self.cfg.api_secret);
        let mut form = signed;
        form.insert("file", source.to_string());
        form.insert("api_key", self.cfg.api_key.clone());
        form.insert("signature", signature);
        form
    }
}

#[async_trait]
impl ImageUploader for CloudinaryUploader {
    async fn upload(&self, source: &str) -> Result<String, UploadError> {
        validate_source(source)?;

        let form = self.upload_form(source, Utc::now().timestamp());
        let resp = self.http.post(&self.upload_url).form(&form).send().await?;
        let status = resp.status().as_u16();
        let body = resp.text().await?;
        let hosted = parse_upload_response(status, &body)?;
        tracing::debug!(source, hosted = %hosted, "upload accepted");
        Ok(hosted)
    }
}

/// Status and body of an upload call, as the permanent hosted URL.
fn parse_upload_response(status: u16, body: &str) -> Result<String, UploadError> {
    if !(200..300).contains(&status) {
        return Err(UploadError::Rejected {
            status,
            message: service_message(body),
        });
    }
    let parsed: UploadResponse = serde_json::from_str(body).map_err(|e| UploadError::Malformed(e.to_string()))?;
    if parsed.existing {
        tracing::debug!("media service reused an existing asset");
    }
    parsed
        .secure_url
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| UploadError::Malformed("response has no secure_url".into()))
}

/// Reject locations the media service can never fetch before spending a request on them.
pub fn validate_source(source: &str) -> Result<(), UploadError> {
    let invalid = |reason: &str| UploadError::InvalidLocation {
        location: source.to_string(),
        reason: reason.to_string(),
    };
    let trimmed = source.trim();
    if trimmed.is_empty() {
        return Err(invalid("empty location"));
    }
    let parsed = url::Url::parse(trimmed).map_err(|e| invalid(&e.to_string()))?;
    if !ACCEPTED_SCHEMES.contains(&parsed.scheme()) {
        return Err(invalid(&format!("unsupported scheme {}", parsed.scheme())));
    }
    Ok(())
}

/// SHA-1 hex over `k=v` pairs in key order joined by `&`, followed by the secret.
fn sign(params: &BTreeMap<&'static str, String>, api_secret: &str) -> String {
    let to_sign = params
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");
    let mut hasher = Sha1::new();
    hasher.update(to_sign.as_bytes());
    hasher.update(api_secret.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn public_id_for(source: &str) -> String {
    let digest = Sha1::digest(source.trim().as_bytes());
    let hex = format!("{:x}", digest);
    hex.chars().take(PUBLIC_ID_HEX_LEN).collect()
}
