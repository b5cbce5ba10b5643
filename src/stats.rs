//! Statistics sink — the append-only results file of a simulation run.
//!
//! One line per customer pass and one line per cash desk, in the fixed
//! formats consumed by the grading scripts of the original simulation:
//!
//! ```text
//! [User <id>]: products=<p> tot_time_market=<sec.ms> tot_time_queue=<sec.ms> queue_visited=<n>
//! [CashDesk <id>]: products=<P> clients=<U> open_time=<sec.ms> avg_service_time=<sec.ms> closures=<C>
//! ```
//!
//! All writes go through one mutex; the buffer is flushed explicitly at the
//! end of the run and again on drop.

use crate::timing;
use chrono::Local;
use parking_lot::Mutex;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::time::Duration;

/// Snapshot of one customer pass, ready to be written out.
#[derive(Debug, Clone)]
pub struct UserStats {
    pub id: u64,
    pub products: u64,
    pub time_in_market: Duration,
    pub time_in_queue: Duration,
    pub queues_visited: u32,
}

/// Lifetime counters of one cash desk.
#[derive(Debug, Clone)]
pub struct DeskStats {
    pub id: usize,
    pub products_processed: u64,
    pub clients_served: u64,
    pub open_time: Duration,
    pub avg_service_time: Duration,
    pub closures: u64,
}

/// Render a customer statistics line (without trailing newline).
pub fn format_user_line(s: &UserStats) -> String {
    format!(
        "[User {}]: products={} tot_time_market={:.3} tot_time_queue={:.3} queue_visited={}",
        s.id,
        s.products,
        timing::secs(s.time_in_market),
        timing::secs(s.time_in_queue),
        s.queues_visited,
    )
}

/// Render a cash-desk statistics line (without trailing newline).
pub fn format_desk_line(s: &DeskStats) -> String {
    format!(
        "[CashDesk {}]: products={} clients={} open_time={:.3} avg_service_time={:.3} closures={}",
        s.id,
        s.products_processed,
        s.clients_served,
        timing::secs(s.open_time),
        timing::secs(s.avg_service_time),
        s.closures,
    )
}

/// Serialised writer for the statistics file.
pub struct StatsWriter {
    out: Mutex<BufWriter<File>>,
}

impl StatsWriter {
    /// Create (or overwrite) the statistics file and stamp a header line.
    pub fn create(path: &Path) -> io::Result<Self> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        writeln!(
            writer,
            "// market-sim results, run started {}",
            Local::now().format("%Y-%m-%d %H:%M:%S")
        )?;
        Ok(Self {
            out: Mutex::new(writer),
        })
    }

    pub fn user(&self, s: &UserStats) {
        let mut out = self.out.lock();
        writeln!(out, "{}", format_user_line(s)).expect("statistics file write failed");
    }

    pub fn desk(&self, s: &DeskStats) {
        let mut out = self.out.lock();
        writeln!(out, "{}", format_desk_line(s)).expect("statistics file write failed");
    }

    pub fn flush(&self) {
        self.out
            .lock()
            .flush()
            .expect("statistics file flush failed");
    }
}

impl Drop for StatsWriter {
    fn drop(&mut self) {
        let _ = self.out.lock().flush();
    }
}
