//! # Logging Initialization
//!
//! A single entry point, [`init_logging`], sets up the global `tracing`
//! subscriber. It is guarded by a `std::sync::Once`, so repeated calls are
//! harmless.
//!
//! - **Filter**: `RUST_LOG` when set, otherwise `<level>,warden=debug`.
//! - **File (default)**: a daily rolling `warden.log` in the user cache
//!   directory reported by `directories`, without ANSI colors.
//! - **Stderr**: used when `log_to_file` is false, or when the cache
//!   directory cannot be determined or written.
//!
//! Security events (blocked access, integrity violations) are emitted at
//! `error` level with a `severity = "CRITICAL"` field so they can be filtered
//! out of the stream.

use anyhow::Result;
use directories::ProjectDirs;
use std::{io::stderr, path::Path, sync::Once};
use tracing_subscriber::{EnvFilter, fmt::layer, prelude::*};

static INIT: Once = Once::new();

/// Initialize verbose logging for tests.
pub fn init_test_logging() {
    let _ = init_logging("trace", false);
}

/// Initializes the logging system.
///
/// # Errors
///
/// Currently infallible; the `Result` leaves room for subscriber setup that
/// can fail.
pub fn init_logging(log_level: &str, log_to_file: bool) -> Result<()> {
    INIT.call_once(|| {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("{log_level},warden=debug")));

        if log_to_file && let Some(proj_dirs) = ProjectDirs::from("com", "Warden", "warden") {
            let log_dir = proj_dirs.cache_dir();

            // tracing_appender::rolling::daily panics on permission errors.
            let file_appender = if can_write(log_dir) {
                std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    tracing_appender::rolling::daily(log_dir, "warden.log")
                }))
                .ok()
            } else {
                None
            };

            if let Some(file_appender) = file_appender {
                let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(layer().with_writer(non_blocking).with_ansi(false))
                    .init();
                // Leaked so buffered lines are flushed at exit.
                Box::leak(Box::new(guard));
                return;
            }
        }

        tracing_subscriber::registry()
            .with(env_filter)
            .with(layer().with_writer(stderr).with_ansi(true))
            .init();
    });

    Ok(())
}

fn can_write(dir: &Path) -> bool {
    if std::fs::create_dir_all(dir).is_err() {
        return false;
    }
    let marker = dir.join(".warden_log_check");
    match std::fs::write(&marker, "ok") {
        Ok(()) => {
            let _ = std::fs::remove_file(&marker);
            true
        }
        Err(_) => false,
    }
}
