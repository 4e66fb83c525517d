use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LoggingConfig;

fn env_filter(level: &str, verbose: bool) -> EnvFilter {
    let fallback = if verbose {
        "docfraud=debug,tower_http=debug,info".to_string()
    } else {
        level.to_string()
    };
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&fallback))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Compact output for terminals, JSON for log collectors; both on stderr.
/// `RUST_LOG` wins over the configured level.
pub fn init_logger(config: &LoggingConfig, verbose: bool) {
    let filter = env_filter(&config.level, verbose);
    let registry = tracing_subscriber::registry().with(filter);

    if config.json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false)
                    .json(),
            )
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false)
                    .compact(),
            )
            .init();
    }
}
