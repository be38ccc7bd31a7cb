use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

/// Install the global tracing subscriber. `RUST_LOG` wins when it is set;
/// otherwise the configured log level seeds the filter for the ferry crates.
pub fn init_tracing(log_level: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(log_level)));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .compact()
                .with_target(true)
                .with_thread_ids(false),
        )
        .init();
}

/// Filter directives applying the configured level to the ferry crates while
/// keeping dependencies at info.
fn default_directives(log_level: &str) -> String {
    let level = if log_level.is_empty() {
        "info"
    } else {
        log_level
    };
    format!("info,ferry={level},ferry_proxy={level},ferry_core={level},ferry_config={level}")
}
