//! Logging setup.
//!
//! `ETHRPC_LOG_LEVEL` recognizes the `winston`-style level set {error,
//! warn, info, http, verbose, debug, silly}. `tracing` has no
//! `http`/`verbose`/`silly` levels, so this module maps them onto the
//! nearest `tracing::Level` (documented in DESIGN.md):
//! `http` becomes `INFO` tagged with `target="http"` so an operator can
//! still filter it independently via `EnvFilter` directives
//! (`ethrpc_gateway::http=info`); `verbose` and `debug` both become
//! `DEBUG`; `silly` becomes `TRACE`.

use tracing_subscriber::EnvFilter;

/// Resolves the configured level name to a `tracing_subscriber::EnvFilter`
/// directive string.
pub fn level_filter_directive(level: &str) -> &'static str {
    match level.to_ascii_lowercase().as_str() {
        "error" => "error",
        "warn" => "warn",
        "info" => "info",
        "http" => "info",
        "verbose" | "debug" => "debug",
        "silly" => "trace",
        _ => "info",
    }
}

/// Initializes the global `tracing` subscriber from `ETHRPC_LOG_LEVEL` (or
/// the `--log-level` override), falling back to `info` on an unrecognized
/// value.
pub fn init(level: &str) {
    let directive = level_filter_directive(level);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

/// Logs at the `http` pseudo-level used for "successful result" tracing.
#[macro_export]
macro_rules! log_http {
    ($($arg:tt)*) => {
        tracing::info!(target: "ethrpc_gateway::http", $($arg)*)
    };
}
