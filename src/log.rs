//! Structured logging setup.
//!
//! Log levels:
//! - ERROR: run-level aborts (backend unavailable)
//! - WARN: routing ambiguity, retries, backend fallbacks
//! - INFO: plan and run milestones
//! - DEBUG: per-task routing and dispatch detail
//! - TRACE: pattern scores
//!
//! Debug mode can be enabled with the `--debug` flag or `SWITCHYARD_DEBUG=1`.
//! `RUST_LOG` overrides both when set.

use std::fs::File;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

/// Environment variable that turns on debug logging.
pub const DEBUG_ENV: &str = "SWITCHYARD_DEBUG";

static DEBUG_ENABLED: AtomicBool = AtomicBool::new(false);

/// Whether the debug env var is set to a truthy value.
pub fn debug_from_env() -> bool {
    std::env::var(DEBUG_ENV)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Level used when `RUST_LOG` is absent.
pub fn fallback_level(debug: bool) -> &'static str {
    if debug {
        "debug"
    } else {
        "info"
    }
}

/// Install the global subscriber.
///
/// With a log file the file is truncated and written without ANSI colours;
/// otherwise output goes to stderr so stdout stays free for JSON.
/// Calling this more than once is harmless: later calls are ignored.
pub fn init(debug: bool, log_file: Option<&Path>) {
    let debug_enabled = debug || debug_from_env();
    DEBUG_ENABLED.store(debug_enabled, Ordering::SeqCst);

    let level = fallback_level(debug_enabled);
    let make_filter = || {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(level))
            .unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let (writer, open_error) = match log_file.map(open_log_file) {
        Some(Ok(file)) => (Some(file), None),
        Some(Err(e)) => (None, Some(e)),
        None => (None, None),
    };

    match writer {
        Some(file) => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(make_filter())
                .with_target(true)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init();
        }
        None => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(make_filter())
                .with_target(true)
                .with_writer(std::io::stderr)
                .try_init();
        }
    }

    if let (Some(path), Some(e)) = (log_file, open_error) {
        tracing::warn!(path = %path.display(), error = %e, "cannot open log file, logging to stderr");
    }
}

/// Create the log file, truncating it, along with any missing parent directories.
fn open_log_file(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    File::create(path)
}

/// Check if debug mode is enabled.
pub fn is_debug() -> bool {
    DEBUG_ENABLED.load(Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_level() {
        assert_eq!(fallback_level(true), "debug");
        assert_eq!(fallback_level(false), "info");
    }

    #[test]
    fn test_init_with_file_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("switchyard.log");
        init(true, Some(&path));
        assert!(path.exists());
        assert!(is_debug());

        // A second subscriber cannot be installed; must not panic.
        init(true, None);
    }

    #[test]
    fn test_unwritable_log_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "").unwrap();
        let path = blocker.join("switchyard.log");

        assert!(open_log_file(&path).is_err());
        init(false, Some(&path));
        assert!(!path.exists());
    }
}
