//! Re-host product images: read each record's source image URLs from Supabase,
//! upload them to Cloudinary by reference, and write the hosted URLs back.

pub mod config;
pub mod database_ops;
pub mod error;
pub mod logging;
pub mod model;

pub mod util {
    pub mod env;
}

pub use config::MigrationConfig;
pub use database_ops::driver::{DriverOptions, DriverState, MigrationDriver};
pub use model::{ImageOutcome, MigrationOutcome, Record, RecordId, RunSummary};
