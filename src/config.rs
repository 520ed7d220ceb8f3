//! Startup configuration. Built once from the environment and passed into the
//! source, sink and uploader constructors.

use anyhow::{anyhow, Context, Result};
use std::path::PathBuf;
use std::time::Duration;

use crate::util::env::{env_first, env_flag, env_opt, env_parse, env_parse_opt, env_req, preflight_check};

pub const DEFAULT_TABLE: &str = "products";
pub const DEFAULT_SOURCE_COLUMN: &str = "images";
pub const DEFAULT_DESTINATION_COLUMN: &str = "used_images";
pub const DEFAULT_FOLDER: &str = "products";

const SUPABASE_KEY_VARS: &[&str] = &[
    "SUPABASE_SERVICE_ROLE_KEY",
    "SUPABASE_KEY",
    "SUPABASE_ANON_KEY",
];

#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    /// Project base URL, e.g. `https://<ref>.supabase.co`.
    pub url: String,
    pub api_key: String,
    pub table: String,
    pub source_column: String,
    pub destination_column: String,
}

impl SupabaseConfig {
    pub fn rest_endpoint(&self) -> String {
        format!("{}/rest/v1/{}", self.url.trim_end_matches('/'), self.table)
    }
}

#[derive(Debug, Clone)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    pub folder: String,
    pub deterministic_ids: bool,
}

impl CloudinaryConfig {
    /// Parse `cloudinary://<api_key>:<api_secret>@<cloud_name>`.
    pub fn from_url(raw: &str, folder: &str) -> Result<Self> {
        let u = url::Url::parse(raw.trim()).context("CLOUDINARY_URL is not a valid URL")?;
        if u.scheme() != "cloudinary" {
            return Err(anyhow!("CLOUDINARY_URL must use the cloudinary:// scheme"));
        }
        let cloud_name = u
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| anyhow!("CLOUDINARY_URL is missing the cloud name"))?;
        let api_key = u.username();
        let api_secret = u
            .password()
            .ok_or_else(|| anyhow!("CLOUDINARY_URL is missing the api secret"))?;
        if api_key.is_empty() {
            return Err(anyhow!("CLOUDINARY_URL is missing the api key"));
        }
        Ok(Self {
            cloud_name: cloud_name.to_string(),
            api_key: api_key.to_string(),
            api_secret: api_secret.to_string(),
            folder: folder.to_string(),
            deterministic_ids: false,
        })
    }
}

#[derive(Debug, Clone)]
pub struct MigrationConfig {
    pub supabase: SupabaseConfig,
    pub cloudinary: CloudinaryConfig,
    pub http_timeout: Duration,
    pub page_size: usize,
    pub concurrency: usize,
    pub limit: Option<usize>,
    pub report_path: Option<PathBuf>,
}

impl MigrationConfig {
    pub fn from_env() -> Result<Self> {
        let cloudinary_url = env_opt("CLOUDINARY_URL");
        let mut required: Vec<&[&str]> = vec![&["SUPABASE_URL"][..], SUPABASE_KEY_VARS];
        if cloudinary_url.is_none() {
            required.extend_from_slice(&[
                &["CLOUDINARY_CLOUD_NAME"][..],
                &["CLOUDINARY_API_KEY"][..],
                &["CLOUDINARY_API_SECRET"][..],
            ]);
        }
        preflight_check(
            "migrate_images",
            &required,
            &[
                "SUPABASE_URL",
                "SUPABASE_TABLE",
                "SUPABASE_SERVICE_ROLE_KEY",
                "CLOUDINARY_URL",
                "CLOUDINARY_CLOUD_NAME",
                "CLOUDINARY_FOLDER",
                "HTTP_TIMEOUT_SECS",
                "MIGRATE_PAGE_SIZE",
                "MIGRATE_CONCURRENCY",
            ],
        )?;

        let supabase = SupabaseConfig {
            url: env_req("SUPABASE_URL")?,
            api_key: env_first(SUPABASE_KEY_VARS)
                .ok_or_else(|| anyhow!("missing env var {}", SUPABASE_KEY_VARS.join("|")))?,
            table: env_opt("SUPABASE_TABLE").unwrap_or_else(|| DEFAULT_TABLE.into()),
            source_column: env_opt("SOURCE_IMAGES_COLUMN")
                .unwrap_or_else(|| DEFAULT_SOURCE_COLUMN.into()),
            destination_column: env_opt("DESTINATION_IMAGES_COLUMN")
                .unwrap_or_else(|| DEFAULT_DESTINATION_COLUMN.into()),
        };

        let folder = env_opt("CLOUDINARY_FOLDER").unwrap_or_else(|| DEFAULT_FOLDER.into());
        let mut cloudinary = match cloudinary_url {
            Some(raw) => CloudinaryConfig::from_url(&raw, &folder)?,
            None => CloudinaryConfig {
                cloud_name: env_req("CLOUDINARY_CLOUD_NAME")?,
                api_key: env_req("CLOUDINARY_API_KEY")?,
                api_secret: env_req("CLOUDINARY_API_SECRET")?,
                folder,
                deterministic_ids: false,
            },
        };
        cloudinary.deterministic_ids = env_flag("CLOUDINARY_DETERMINISTIC_IDS", false);

        Ok(Self {
            supabase,
            cloudinary,
            http_timeout: Duration::from_secs(env_parse("HTTP_TIMEOUT_SECS", 30u64).max(1)),
            page_size: env_parse("MIGRATE_PAGE_SIZE", 500usize).max(1),
            concurrency: env_parse("MIGRATE_CONCURRENCY", 1usize).max(1),
            limit: env_parse_opt("MIGRATE_LIMIT"),
            report_path: env_opt("MIGRATE_REPORT_PATH").map(PathBuf::from),
        })
    }
}
