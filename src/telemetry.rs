//! Tracing initialization for the CLI.
//!
//! Events go to stderr, filtered by the `WARREN_LOG` env var (default:
//! `warn`). Set `WARREN_LOG_FORMAT=json` for line-oriented JSON output
//! suitable for log collectors.

use tracing_subscriber::EnvFilter;

/// Env var holding the tracing filter directive.
pub const LOG_ENV: &str = "WARREN_LOG";

/// Initialize the global tracing subscriber. Call once, from `main`.
pub fn init() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let json = std::env::var("WARREN_LOG_FORMAT").is_ok_and(|v| v == "json");

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if json {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}
