//! Shutdown signal plumbing.
//!
//! No work happens in signal-handler context. SIGHUP and SIGQUIT are
//! blocked in the main thread before anything else is spawned, so every
//! worker inherits the mask; one dedicated bridge thread `sigwait`s for
//! them, records the shutdown mode and wakes the market. The bridge
//! terminates after the first signal — later signals cannot change the
//! mode anyway.

use crate::market::Market;
use crate::shutdown::ShutdownMode;
use nix::sys::signal::{SigSet, Signal, SigmaskHow, pthread_sigmask};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{info, warn};

/// Block SIGHUP/SIGQUIT for the calling thread (and every thread it will
/// spawn). Must run before any worker thread exists.
pub fn block_shutdown_signals() -> anyhow::Result<SigSet> {
    let mut set = SigSet::empty();
    set.add(Signal::SIGHUP);
    set.add(Signal::SIGQUIT);
    pthread_sigmask(SigmaskHow::SIG_BLOCK, Some(&set), None)?;
    Ok(set)
}

/// Spawn the bridge thread reaping the blocked shutdown signals.
pub fn spawn_bridge(market: Arc<Market>, set: SigSet) -> JoinHandle<()> {
    std::thread::spawn(move || match set.wait() {
        Ok(Signal::SIGHUP) => {
            info!("received SIGHUP");
            market.request_shutdown(ShutdownMode::Graceful);
        }
        Ok(Signal::SIGQUIT) => {
            info!("received SIGQUIT");
            market.request_shutdown(ShutdownMode::Abrupt);
        }
        Ok(other) => warn!(signal = %other, "unexpected signal, ignoring"),
        Err(err) => warn!(%err, "sigwait failed"),
    })
}
