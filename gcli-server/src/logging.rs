use anyhow::Result;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber: stdout always, plus a daily-rotated file
/// under `log_dir` when set. `RUST_LOG` wins over `level`.
///
/// The returned guard flushes the file writer and must live until exit.
pub fn init_logging(level: &str, log_dir: Option<&str>) -> Result<Option<WorkerGuard>> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level)?,
    };
    let stdout = fmt::layer().with_target(false);

    match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, "gcli-gateway.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file = fmt::layer().with_ansi(false).with_target(false).with_writer(writer);
            tracing_subscriber::registry().with(filter).with(stdout).with(file).try_init()?;
            Ok(Some(guard))
        },
        None => {
            tracing_subscriber::registry().with(filter).with(stdout).try_init()?;
            Ok(None)
        },
    }
}
