//! Director actor: capacity decisions and authorization releases.
//!
//! Desks report their status every `TD` ms. The director keeps the latest
//! report per desk; once every desk has contributed one, the round is
//! complete and the thresholds are evaluated over the whole set. Reacting
//! per-round instead of per-message matches what the thresholds mean:
//! counts of desks, not counts of messages.
//!
//! A sub-thread drains the authorization queue: customers with an empty
//! cart only need the director's nod before leaving.

use crate::desk::{DeskNotice, DeskState};
use crate::market::Market;
use crate::queue::SimQueue;
use crate::timing;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, info};

/// Outcome of evaluating one complete notification round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RoundDecision {
    pub open_one: bool,
    pub close_one: bool,
}

/// Threshold policy over one complete round of desk reports.
///
/// `open_one` when any open desk has at least `open_threshold` customers
/// waiting; `close_one` when at least `close_threshold` open desks have at
/// most one. When both hold, the open is applied first.
pub(crate) fn review_round(
    round: &[DeskNotice],
    close_threshold: usize,
    open_threshold: usize,
) -> RoundDecision {
    let mut idle = 0usize;
    let mut open_one = false;
    for notice in round {
        if notice.state != DeskState::Open {
            continue;
        }
        if notice.queued <= 1 {
            idle += 1;
        }
        if notice.queued >= open_threshold {
            open_one = true;
        }
    }
    RoundDecision {
        open_one,
        close_one: idle >= close_threshold,
    }
}

/// Director record: the notification queue and the two wakeup channels.
pub struct Director {
    notices: SimQueue<DeskNotice>,
    gate: Mutex<()>,
    desk_news: Condvar,
    auth_news: Condvar,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Director {
    pub fn new() -> Self {
        Self {
            notices: SimQueue::unbounded(),
            gate: Mutex::new(()),
            desk_news: Condvar::new(),
            auth_news: Condvar::new(),
            thread: Mutex::new(None),
        }
    }

    /// Deliver a desk status report and wake the director.
    pub(crate) fn desk_report(&self, notice: DeskNotice) {
        self.notices
            .push(notice)
            .expect("notification queue is unbounded, push cannot fail");
        let _gate = self.gate.lock();
        self.desk_news.notify_all();
    }

    /// Wake the authorization sub-thread (a customer joined the auth queue).
    pub(crate) fn auth_report(&self) {
        let _gate = self.gate.lock();
        self.auth_news.notify_all();
    }

    /// Wake both loops so they observe the shutdown flags.
    pub(crate) fn signal_all(&self) {
        let _gate = self.gate.lock();
        self.desk_news.notify_all();
        self.auth_news.notify_all();
    }

    pub(crate) fn start(&self, market: Arc<Market>) {
        let handle = std::thread::spawn(move || director_main(market));
        *self.thread.lock() = Some(handle);
    }

    pub(crate) fn join(&self) {
        if let Some(handle) = self.thread.lock().take() {
            handle.join().expect("director thread panicked");
        }
    }
}

impl Default for Director {
    fn default() -> Self {
        Self::new()
    }
}

/// Main loop: aggregate desk reports into rounds and act on each round.
fn director_main(market: Arc<Market>) {
    let director = market.director();
    let total_desks = market.config().max_desks;
    let close_threshold = market.config().close_threshold;
    let open_threshold = market.config().open_threshold;

    let auth_handler = {
        let market = market.clone();
        std::thread::spawn(move || auth_main(market))
    };
    debug!("director thread running");

    let mut latest: Vec<Option<DeskNotice>> = vec![None; total_desks];
    let mut filled = 0usize;

    loop {
        {
            let mut gate = director.gate.lock();
            while !market.shutdown().is_requested() && director.notices.is_empty() {
                director.desk_news.wait(&mut gate);
            }
        }
        if market.shutdown().is_requested() {
            break;
        }
        let Ok(notice) = director.notices.pop() else {
            continue;
        };
        debug!(desk = notice.desk_id, queued = notice.queued, "desk report");
        let desk_id = notice.desk_id;
        if latest[desk_id].is_none() {
            filled += 1;
        }
        latest[desk_id] = Some(notice);

        if filled == total_desks {
            let round: Vec<DeskNotice> = latest
                .iter_mut()
                .map(|slot| slot.take().expect("round completed with an empty slot"))
                .collect();
            filled = 0;
            let decision = review_round(&round, close_threshold, open_threshold);
            if decision.open_one {
                info!("opening one more desk");
                market.pay_area().try_open_one();
            }
            if decision.close_one {
                info!("closing one desk");
                market.pay_area().try_close_one();
            }
        }
    }

    auth_handler
        .join()
        .expect("authorization handler thread panicked");
    debug!("director thread done");
}

/// Authorization sub-thread: release empty-cart customers to the exit.
fn auth_main(market: Arc<Market>) {
    let director = market.director();
    loop {
        {
            let mut gate = director.gate.lock();
            while !market.shutdown().is_requested() && market.auth_is_empty() {
                director.auth_news.wait(&mut gate);
            }
        }
        if market.shutdown().is_requested() {
            // Release everyone already waiting, and keep watching until no
            // shopper can still arrive here.
            loop {
                while let Some(user) = market.take_from_auth() {
                    market.move_to_exit(&user);
                }
                if market.shoppers_remaining() == 0 && market.auth_is_empty() {
                    break;
                }
                timing::sleep_ms(1);
            }
            break;
        }
        if let Some(user) = market.take_from_auth() {
            info!(user = user.id(), "authorized to leave");
            market.move_to_exit(&user);
        }
    }
}
