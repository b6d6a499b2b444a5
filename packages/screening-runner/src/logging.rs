use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::RunnerConfig;

/// Keeps the background log writer alive; drop it only at exit.
pub struct FileLogGuard {
    _guard: WorkerGuard,
}

pub fn init_tracing(config: &RunnerConfig) -> Option<FileLogGuard> {
    let env_filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_target(true);

    if config.file_logs {
        let log_dir = &config.log_dir;
        if let Err(err) = std::fs::create_dir_all(log_dir) {
            eprintln!("failed to create log directory {}: {err}", log_dir.display());
        } else {
            let file_appender = RollingFileAppender::new(Rotation::DAILY, log_dir, "screening.log");
            let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
            let file_layer = fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_target(true);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(stderr_layer)
                .with(file_layer)
                .init();

            return Some(FileLogGuard { _guard: guard });
        }
    }

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .init();

    None
}
