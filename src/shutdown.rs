//! Shutdown flags shared by every thread in the simulation.
//!
//! Two shutdown modes exist: graceful (finish all work in flight) and
//! abrupt (push everyone to the exit without serving them). Whichever
//! request lands first wins; the cell is monotone, so a reader that has
//! observed a mode can rely on it never changing again.

use std::sync::atomic::{AtomicU8, Ordering};

const RUNNING: u8 = 0;
const GRACEFUL: u8 = 1;
const ABRUPT: u8 = 2;

/// How the market is being asked to close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMode {
    /// Complete all current work, then stop.
    Graceful,
    /// Route remaining customers straight to the exit without serving them.
    Abrupt,
}

/// One atomic cell holding the requested shutdown mode.
#[derive(Debug, Default)]
pub struct ShutdownFlags {
    mode: AtomicU8,
}

impl ShutdownFlags {
    pub fn new() -> Self {
        Self {
            mode: AtomicU8::new(RUNNING),
        }
    }

    /// Record a shutdown request. Returns `true` if this call won the race;
    /// a request arriving after another mode was recorded is ignored.
    pub fn request(&self, mode: ShutdownMode) -> bool {
        let raw = match mode {
            ShutdownMode::Graceful => GRACEFUL,
            ShutdownMode::Abrupt => ABRUPT,
        };
        self.mode
            .compare_exchange(RUNNING, raw, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// The mode recorded by the winning request, if any.
    pub fn mode(&self) -> Option<ShutdownMode> {
        match self.mode.load(Ordering::SeqCst) {
            GRACEFUL => Some(ShutdownMode::Graceful),
            ABRUPT => Some(ShutdownMode::Abrupt),
            _ => None,
        }
    }

    /// Has any shutdown been requested?
    pub fn is_requested(&self) -> bool {
        self.mode.load(Ordering::SeqCst) != RUNNING
    }

    pub fn is_graceful(&self) -> bool {
        self.mode.load(Ordering::SeqCst) == GRACEFUL
    }

    pub fn is_abrupt(&self) -> bool {
        self.mode.load(Ordering::SeqCst) == ABRUPT
    }
}
