use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

const DEBUG_ENV: &str = "IMGCONVERTER_DEBUG";

/// Initialize logging.
///
/// With `IMGCONVERTER_DEBUG` set, everything down to DEBUG goes to a daily log
/// file under the user data directory and the returned guard must be kept
/// alive. Otherwise logs go to stderr, filtered by `RUST_LOG` or `verbosity`.
pub fn init_logging(verbosity: u8) -> Option<WorkerGuard> {
    if std::env::var(DEBUG_ENV).is_ok() {
        let log_dir = dirs::data_local_dir()
            .unwrap_or_else(|| std::path::PathBuf::from("."))
            .join("imgconverter");

        let _ = std::fs::create_dir_all(&log_dir);

        let file_appender = tracing_appender::rolling::daily(&log_dir, "imgconverter.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        tracing_subscriber::fmt()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into()),
            )
            .init();

        tracing::info!("imgconverter logging initialized in {}", log_dir.display());
        Some(guard)
    } else {
        let default_level = match verbosity {
            0 => "warn",
            1 => "info",
            _ => "debug",
        };
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("imgconverter={}", default_level)));

        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_env_filter(filter)
            .init();
        None
    }
}
