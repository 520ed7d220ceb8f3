//! migrate_images.rs
//! Re-host every product image on Cloudinary and store the hosted URLs in `used_images`.
//! Runs with no arguments; flags override the matching env vars.
//! Exit status is non-zero only when configuration is incomplete or the initial fetch fails.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use image_rehost::config::MigrationConfig;
use image_rehost::database_ops::cloudinary::CloudinaryUploader;
use image_rehost::database_ops::report::{write_report, RunReport};
use image_rehost::database_ops::supabase::SupabaseStore;
use image_rehost::logging::{init_tracing, DEFAULT_FILTER};
use image_rehost::util::env as env_util;
use image_rehost::{DriverOptions, MigrationDriver};
use reqwest::Client;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "migrate_images", version, about = "Re-host product images and record the hosted URLs")]
struct Cli {
    /// Process at most this many records (MIGRATE_LIMIT)
    #[arg(long)]
    limit: Option<usize>,
    /// Rows per page when reading the store (MIGRATE_PAGE_SIZE)
    #[arg(long)]
    page_size: Option<usize>,
    /// Records migrated concurrently (MIGRATE_CONCURRENCY)
    #[arg(long)]
    concurrency: Option<usize>,
    /// Write a JSON reconciliation report here (MIGRATE_REPORT_PATH)
    #[arg(long)]
    report: Option<PathBuf>,
    /// Destination folder on the media service (CLOUDINARY_FOLDER)
    #[arg(long)]
    folder: Option<String>,
}

impl Cli {
    fn apply(self, cfg: &mut MigrationConfig) {
        if let Some(limit) = self.limit {
            cfg.limit = Some(limit);
        }
        if let Some(page_size) = self.page_size {
            cfg.page_size = page_size.max(1);
        }
        if let Some(concurrency) = self.concurrency {
            cfg.concurrency = concurrency.max(1);
        }
        if let Some(report) = self.report {
            cfg.report_path = Some(report);
        }
        if let Some(folder) = self.folder {
            cfg.cloudinary.folder = folder;
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    env_util::init_env();
    if let Err(e) = init_tracing(DEFAULT_FILTER) {
        eprintln!("{e}");
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = ?e, "migration aborted");
            eprintln!("migration aborted: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut cfg = MigrationConfig::from_env()?;
    cli.apply(&mut cfg);

    let http = Client::builder()
        .user_agent(concat!("image-rehost/", env!("CARGO_PKG_VERSION")))
        .timeout(cfg.http_timeout)
        .build()
        .context("building http client")?;

    let store = Arc::new(SupabaseStore::new(&cfg.supabase, http.clone(), cfg.page_size));
    let uploader = Arc::new(CloudinaryUploader::new(cfg.cloudinary.clone(), http));
    let options = DriverOptions {
        concurrency: cfg.concurrency,
        limit: cfg.limit,
    };
    info!(
        table = %cfg.supabase.table,
        folder = %cfg.cloudinary.folder,
        concurrency = options.concurrency,
        limit = ?options.limit,
        "starting image migration"
    );

    let mut driver = MigrationDriver::new(store.clone(), store, uploader, options);
    let summary = driver.run().await.context("fetching records")?;

    println!("{summary}");
    if summary.has_failures() {
        warn!("some images or records failed; see the log or report for details");
    }

    if let Some(path) = &cfg.report_path {
        let report = RunReport {
            generated_at: Utc::now(),
            table: &cfg.supabase.table,
            folder: &cfg.cloudinary.folder,
            summary: &summary,
        };
        match write_report(path, &report) {
            Ok(()) => info!(path = %path.display(), "report written"),
            Err(e) => warn!(path = %path.display(), error = ?e, "report write failed"),
        }
    }
    Ok(())
}
