#![deny(missing_docs)]
//! Shared logging utilities for the marketplace client workspace.
//!
//! This crate provides the `market_*` logging macros used across the codebase
//! and a minimal test initializer for the global logger. Every crate that
//! invokes the macros must also depend on `log`.

/// Logs a trace-level message using the global logging facade.
#[macro_export]
macro_rules! market_trace {
    ($($arg:tt)*) => {{
        log::trace!($($arg)*);
    }};
}

/// Logs a debug-level message using the global logging facade.
#[macro_export]
macro_rules! market_debug {
    ($($arg:tt)*) => {{
        log::debug!($($arg)*);
    }};
}

/// Logs an info-level message using the global logging facade.
#[macro_export]
macro_rules! market_info {
    ($($arg:tt)*) => {{
        log::info!($($arg)*);
    }};
}

/// Logs a warn-level message using the global logging facade.
#[macro_export]
macro_rules! market_warn {
    ($($arg:tt)*) => {{
        log::warn!($($arg)*);
    }};
}

/// Logs an error-level message using the global logging facade.
#[macro_export]
macro_rules! market_error {
    ($($arg:tt)*) => {{
        log::error!($($arg)*);
    }};
}

/// Masks a bearer or refresh token so it can appear in log lines.
///
/// Only the last four characters survive; shorter values are fully masked.
pub fn redact_token(token: &str) -> String {
    let tail: String = token
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    if token.chars().count() <= 4 {
        "****".to_string()
    } else {
        format!("****{tail}")
    }
}

/// Environment variable that overrides the level picked by [`initialize_for_tests`].
pub const TEST_LOG_ENV: &str = "MARKETPLACE_TEST_LOG";

/// Initializes a terminal logger for use in tests.
///
/// The level comes from `MARKETPLACE_TEST_LOG` (`off`, `error` .. `trace`) and defaults to
/// debug. Calling it again, or after another logger was installed, does nothing.
pub fn initialize_for_tests() {
    use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};

    let level = std::env::var(TEST_LOG_ENV)
        .ok()
        .and_then(|raw| raw.trim().parse::<log::LevelFilter>().ok())
        .unwrap_or(log::LevelFilter::Debug);

    let _ = TermLogger::init(level, Config::default(), TerminalMode::Stderr, ColorChoice::Never);
}
