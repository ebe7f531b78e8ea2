//! Diagnostics for the sheetlog workspace
//!
//! Structured logging shared by every crate, built on `emit`. Output goes to
//! stderr so that the `sheet` binary can keep stdout for responses.
//!
//! Usage:
//! - SHEETLOG_LOG=off (default) - no logs
//! - SHEETLOG_LOG=info - log appends, rollbacks and commits
//! - SHEETLOG_LOG=debug - also log replays, cache hits and engine calls

use std::sync::Once;

// Re-export emit so macros can use it
pub use emit;

/// Environment variable that selects the minimum level.
pub const LOG_ENV: &str = "SHEETLOG_LOG";

static INIT: Once = Once::new();

/// Parse a level name. `None` means logging is switched off.
///
/// Unknown names fall back to `Info`.
#[must_use]
pub fn parse_level(value: &str) -> Option<emit::Level> {
    match value.trim().to_ascii_lowercase().as_str() {
        "off" | "" => None,
        "debug" => Some(emit::Level::Debug),
        "warn" => Some(emit::Level::Warn),
        "error" => Some(emit::Level::Error),
        _ => Some(emit::Level::Info),
    }
}

/// Initialize diagnostics from the SHEETLOG_LOG environment variable.
///
/// Safe to call more than once; only the first call has an effect.
pub fn init_diagnostics() {
    INIT.call_once(|| {
        let value = std::env::var(LOG_ENV).unwrap_or_else(|_| "off".to_string());
        let Some(level) = parse_level(&value) else {
            return;
        };

        let rt = emit::setup()
            .emit_to(emit_term::stderr())
            .emit_when(emit::level::min_filter(level))
            .init();

        // The runtime lives for the rest of the process.
        std::mem::forget(rt);
    });
}

/// Log operations a user cares about: appends, rollbacks, commits.
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::emit::info!($($arg)*)
    };
}

/// Log replay steps, cache decisions and other internal detail.
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        $crate::emit::debug!($($arg)*)
    };
}

/// Log rejected requests and other recoverable conditions.
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::emit::warn!($($arg)*)
    };
}

/// Log engine failures and failed commits.
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        $crate::emit::error!($($arg)*)
    };
}

#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {
        $crate::emit::info!($($arg)*)
    };
}

#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => {
        $crate::emit::debug!($($arg)*)
    };
}

#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {
        $crate::emit::warn!($($arg)*)
    };
}

#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {
        $crate::emit::error!($($arg)*)
    };
}

pub use init_diagnostics as init;
