//! Logging setup for the provider binary.
//!
//! All logs are written to **stderr**; stdout carries the plugin handshake
//! and nothing else.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: full `EnvFilter` directives, e.g. `zabbix_provider=debug`.
//! - `TF_LOG`: level set by the plugin host (`TRACE`, `DEBUG`, `INFO`,
//!   `WARN`, `ERROR`, `JSON`). Only consulted when `RUST_LOG` is unset.
//!
//! ```bash
//! # Log every Zabbix API call with its duration
//! RUST_LOG=zabbix_provider::zabbix=debug terraform plan
//!
//! # Same, driven by the host
//! TF_LOG=DEBUG terraform plan
//! ```

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Environment variable read when `RUST_LOG` is not set.
pub const TF_LOG_ENV: &str = "TF_LOG";

/// Map a `TF_LOG` value to a tracing level directive.
///
/// Returns `None` for empty or unknown values.
pub fn level_from_tf_log(value: &str) -> Option<&'static str> {
    match value.trim().to_ascii_lowercase().as_str() {
        "trace" | "json" => Some("trace"),
        "debug" => Some("debug"),
        "info" => Some("info"),
        "warn" => Some("warn"),
        "error" => Some("error"),
        _ => None,
    }
}

fn resolve_filter(default_level: &str) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    let level = std::env::var(TF_LOG_ENV)
        .ok()
        .and_then(|value| level_from_tf_log(&value))
        .unwrap_or(default_level);
    EnvFilter::new(level)
}

fn subscriber(default_level: &str) -> impl tracing::Subscriber + Send + Sync + 'static {
    tracing_subscriber::registry().with(resolve_filter(default_level)).with(
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false),
    )
}

/// Initialize the global subscriber at `info` unless the environment says
/// otherwise.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging() {
    init_logging_with_default("info");
}

/// Like [`init_logging`], with a custom fallback level.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging_with_default(default_level: &str) {
    subscriber(default_level).init();
}

/// Try to initialize logging, returning false if a subscriber was already
/// set.
pub fn try_init_logging() -> bool {
    subscriber("info").try_init().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_tf_log_levels() {
        assert_eq!(level_from_tf_log("TRACE"), Some("trace"));
        assert_eq!(level_from_tf_log("debug"), Some("debug"));
        assert_eq!(level_from_tf_log(" Info "), Some("info"));
        assert_eq!(level_from_tf_log("WARN"), Some("warn"));
        assert_eq!(level_from_tf_log("ERROR"), Some("error"));
        assert_eq!(level_from_tf_log("JSON"), Some("trace"));
        assert_eq!(level_from_tf_log(""), None);
        assert_eq!(level_from_tf_log("verbose"), None);
    }

    #[test]
    fn test_env_filter_parsing() {
        assert!(EnvFilter::try_new("info").is_ok());
        assert!(EnvFilter::try_new("zabbix_provider=debug").is_ok());
        assert!(EnvFilter::try_new("warn,zabbix_provider::zabbix=debug").is_ok());
    }

    #[test]
    #[serial]
    fn test_resolve_filter_prefers_rust_log() {
        std::env::set_var("RUST_LOG", "warn");
        std::env::set_var(TF_LOG_ENV, "TRACE");
        assert_eq!(resolve_filter("info").to_string(), "warn");

        std::env::remove_var("RUST_LOG");
        assert_eq!(resolve_filter("info").to_string(), "trace");

        std::env::remove_var(TF_LOG_ENV);
        assert_eq!(resolve_filter("info").to_string(), "info");
    }
}
