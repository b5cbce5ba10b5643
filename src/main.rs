//! market-sim entry point.
//!
//! ```text
//! market-sim <config_file> <log_file>
//! ```
//!
//! The run has no natural end: the market keeps re-admitting customers
//! until SIGHUP (graceful close) or SIGQUIT (abrupt close) arrives. Both
//! signals are blocked before any worker thread is spawned and reaped by a
//! dedicated bridge thread.

use anyhow::Context;
use market_sim::logging::init_logging;
use market_sim::market::Market;
use market_sim::signals;
use std::path::Path;
use std::process::ExitCode;
use tracing::info;

fn usage(program: &str) {
    eprintln!("usage: {program} <config_file> <log_file>");
}

fn run(config_path: &Path, log_path: &Path) -> anyhow::Result<()> {
    // Mask the shutdown signals first; every thread spawned from here on
    // inherits the mask and only the bridge thread consumes them.
    let sigset = signals::block_shutdown_signals().context("cannot mask shutdown signals")?;

    let market = Market::open(config_path, log_path).context("market startup failed")?;
    market.start();

    let bridge = signals::spawn_bridge(market.clone(), sigset);

    market.join();
    bridge.join().expect("signal bridge thread panicked");

    info!(log = %log_path.display(), "simulation results written");
    Ok(())
}

fn main() -> ExitCode {
    let _log_guard = init_logging();

    let args: Vec<String> = std::env::args().collect();
    if args.len() != 3 {
        usage(args.first().map(String::as_str).unwrap_or("market-sim"));
        return ExitCode::from(2);
    }

    match run(Path::new(&args[1]), Path::new(&args[2])) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("market-sim: {err:#}");
            ExitCode::FAILURE
        }
    }
}
