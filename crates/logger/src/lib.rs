use std::env::var;

use tracing::{level_filters::LevelFilter, warn};
use tracing_subscriber::{Layer, filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing at INFO unless RUST_LOG overrides it.
pub fn init() {
    init_with(LevelFilter::INFO);
}

/// Initialize tracing with an explicit default level.
///
/// `RUST_LOG` still takes precedence, and `RUST_LOG_FORMAT=json` switches to
/// machine-readable output. Safe to call more than once; later calls keep
/// the first subscriber, which lets every test set up logging freely.
pub fn init_with(level: LevelFilter) {
    let env_filter = EnvFilter::builder().with_default_directive(level.into()).from_env_lossy();

    let log_format = var("RUST_LOG_FORMAT")
        .inspect_err(|error| {
            if matches!(error, std::env::VarError::NotUnicode(_)) {
                warn!("RUST_LOG_FORMAT is not valid unicode, falling back to default: {error}");
            }
        })
        .unwrap_or_default();

    let log_layer = match log_format.as_str() {
        "json" => tracing_subscriber::fmt::layer().json().with_filter(env_filter).boxed(),
        _ => tracing_subscriber::fmt::layer()
            .compact()
            .with_target(false)
            .with_filter(env_filter)
            .boxed(),
    };

    let _ = tracing_subscriber::registry().with(log_layer).try_init();
}
