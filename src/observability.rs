use tracing_subscriber::{fmt, EnvFilter};

/// Initializes the global tracing subscriber: env-filter driven, JSON output
/// when `json` is set. Safe to call more than once; later calls are no-ops.
pub fn init_tracing(default_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.to_string()));
    let builder = fmt().with_env_filter(filter);
    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if result.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
