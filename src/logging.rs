use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialise the diagnostic log (stdout). The statistics file is written
/// separately by [`crate::stats::StatsWriter`]; everything here is runtime
/// tracing only, filtered through `RUST_LOG` (default `info`).
///
/// The returned guard must stay alive for the duration of the process so
/// the non-blocking writer gets flushed on exit.
pub fn init_logging() -> WorkerGuard {
    let (non_blocking, guard) = tracing_appender::non_blocking(std::io::stdout());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let layer = fmt::layer()
        .with_target(false)
        .with_writer(non_blocking)
        .with_ansi(false);

    tracing_subscriber::registry().with(filter).with(layer).init();

    guard
}
