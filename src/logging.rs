use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

/// Filter used when `RUST_LOG` is not set: per-image and per-record events from
/// the library and the binary, nothing from reqwest/hyper.
pub const DEFAULT_FILTER: &str = "image_rehost=info,migrate_images=info";

/// Install the global subscriber for a migration run.
///
/// Events go to stderr; stdout carries only the final summary so it can be
/// piped. A second call returns an error.
pub fn init_tracing(default_filter: &str) -> Result<(), anyhow::Error> {
    SubscriberBuilder::default()
        .with_env_filter(run_filter(default_filter))
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_line_number(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {}", e))
}

fn run_filter(default_filter: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_FILTER).is_ok());
    }

    #[test]
    fn second_init_is_an_error_not_a_panic() {
        let _ = init_tracing(DEFAULT_FILTER);
        assert!(init_tracing(DEFAULT_FILTER).is_err());
    }
}
