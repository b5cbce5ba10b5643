//! Millisecond helpers for modelled time.
//!
//! Every delay in the simulation (shopping, service, notify ticks) is a
//! millisecond count from the configuration. `std::thread::sleep` already
//! resumes across spurious wakeups and, since the shutdown signals are
//! blocked in every worker thread, a sleep is never cut short by a handler.

use std::time::Duration;

/// Sleep for `ms` milliseconds of modelled time.
#[inline]
pub fn sleep_ms(ms: u64) {
    std::thread::sleep(Duration::from_millis(ms));
}

/// Render a duration as fractional seconds with millisecond precision,
/// the unit used by every statistics line.
#[inline]
pub fn secs(d: Duration) -> f64 {
    d.as_secs_f64()
}
