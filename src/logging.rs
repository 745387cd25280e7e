//! Tracing setup shared by the binaries.

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Where log lines go.
pub enum LogTarget<'a> {
    /// stderr, optionally as JSON
    Stderr { json: bool },
    /// A daily-rotated file in `dir`; used while the terminal UI owns the screen
    File { dir: &'a Path },
}

/// Install the global subscriber. `RUST_LOG` wins over the `info` default.
///
/// Keep the returned guard alive for the life of the process when logging
/// to a file, or buffered lines are lost.
pub fn init_tracing(target: LogTarget<'_>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match target {
        LogTarget::Stderr { json: true } => {
            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .try_init();
            None
        }
        LogTarget::Stderr { json: false } => {
            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .try_init();
            None
        }
        LogTarget::File { dir } => {
            let appender = tracing_appender::rolling::daily(dir, "deal-board.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(writer),
                )
                .try_init();
            Some(guard)
        }
    }
}
