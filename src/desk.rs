//! Cash-desk actor.
//!
//! A desk runs two threads: the server loop, which parks until there is a
//! customer to serve, a state change to apply or a shutdown to honor, and a
//! notifier sub-thread, which reports `{id, state, queue length}` to the
//! director every `TD` milliseconds.
//!
//! A closed desk never serves. On shutdown the desk drains its own queue:
//! under a graceful closure waiting customers are still served (while the
//! desk is open), under an abrupt one they are pushed to the exit unserved.

use crate::market::Market;
use crate::queue::SimQueue;
use crate::stats::DeskStats;
use crate::timing;
use crate::user::User;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Whether a desk is accepting and serving customers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeskState {
    Open,
    Closed,
}

/// Periodic status report sent to the director. At most one per desk is
/// live in any director round.
#[derive(Debug, Clone)]
pub struct DeskNotice {
    pub desk_id: usize,
    pub state: DeskState,
    pub queued: usize,
}

/// Total time to serve one customer at a desk.
#[inline]
pub fn service_time_ms(service_const_ms: u64, products: u64, ms_per_product: u64) -> u64 {
    service_const_ms + products * ms_per_product
}

#[derive(Debug)]
struct DeskBody {
    state: DeskState,
    clients: u64,
    products: u64,
    closures: u64,
    open_time: Duration,
    service_sum_ms: u64,
}

/// One cash desk: its customer FIFO, counters and service constant.
pub struct CashDesk {
    pub(crate) id: usize,
    /// Fixed component of the service time, drawn in [20, 80] ms at boot.
    service_const_ms: u64,
    queue: SimQueue<Arc<User>>,
    body: Mutex<DeskBody>,
    news: Condvar,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl CashDesk {
    pub fn new(id: usize, service_const_ms: u64, initial: DeskState) -> Arc<Self> {
        Arc::new(Self {
            id,
            service_const_ms,
            queue: SimQueue::unbounded(),
            body: Mutex::new(DeskBody {
                state: initial,
                clients: 0,
                products: 0,
                closures: 0,
                open_time: Duration::ZERO,
                service_sum_ms: 0,
            }),
            news: Condvar::new(),
            thread: Mutex::new(None),
        })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn state(&self) -> DeskState {
        self.body.lock().state
    }

    /// Flip the desk state and wake the server loop so it can apply the
    /// transition (stopwatch, closure counter).
    pub(crate) fn set_state(&self, state: DeskState) {
        let mut body = self.body.lock();
        body.state = state;
        self.news.notify_all();
    }

    /// Customers currently waiting at this desk.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub(crate) fn queue_is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Append a customer to the desk FIFO and wake the server.
    pub(crate) fn add_user(&self, user: Arc<User>) {
        self.queue
            .push(user)
            .expect("desk queues are unbounded, push cannot fail");
        self.signal();
    }

    pub(crate) fn take_waiting(&self) -> Option<Arc<User>> {
        self.queue.pop().ok()
    }

    /// Wake the server loop so it re-evaluates its wait predicate.
    pub(crate) fn signal(&self) {
        let _body = self.body.lock();
        self.news.notify_all();
    }

    pub fn stats_snapshot(&self) -> DeskStats {
        let body = self.body.lock();
        let avg_ms = if body.clients > 0 {
            body.service_sum_ms / body.clients
        } else {
            0
        };
        DeskStats {
            id: self.id,
            products_processed: body.products,
            clients_served: body.clients,
            open_time: body.open_time,
            avg_service_time: Duration::from_millis(avg_ms),
            closures: body.closures,
        }
    }

    /// Spawn the server thread (which in turn spawns the notifier).
    pub fn start(self: &Arc<Self>, market: Arc<Market>) {
        let desk = self.clone();
        let handle = std::thread::spawn(move || desk_main(desk, market));
        *self.thread.lock() = Some(handle);
    }

    pub fn join(&self) {
        if let Some(handle) = self.thread.lock().take() {
            handle.join().expect("cash desk thread panicked");
        }
    }
}

/// Serve one customer: count it, sleep the service time, push it to exit.
fn serve(desk: &CashDesk, market: &Market, user: &Arc<User>) {
    let products = user.products();
    let ms = service_time_ms(
        desk.service_const_ms,
        products,
        market.config().ms_per_product,
    );
    debug!(desk = desk.id, user = user.id(), service_ms = ms, "serving");
    {
        let mut body = desk.body.lock();
        body.clients += 1;
        body.products += products;
        body.service_sum_ms += ms;
    }
    timing::sleep_ms(ms);
    debug!(desk = desk.id, user = user.id(), "served");
    market.move_to_exit(user);
}

/// Server loop of one desk.
fn desk_main(desk: Arc<CashDesk>, market: Arc<Market>) {
    let notifier = {
        let desk = desk.clone();
        let market = market.clone();
        std::thread::spawn(move || notifier_main(desk, market))
    };

    let mut last_state = desk.state();
    let mut open_since = Instant::now();
    debug!(desk = desk.id, ?last_state, "desk thread running");

    loop {
        let current = {
            let mut body = desk.body.lock();
            loop {
                if market.shutdown().is_requested()
                    || !desk.queue.is_empty()
                    || body.state != last_state
                {
                    break body.state;
                }
                desk.news.wait(&mut body);
            }
        };

        if market.shutdown().is_requested() {
            break;
        }

        if current != last_state {
            info!(desk = desk.id, state = ?current, "desk state changed");
            let mut body = desk.body.lock();
            match current {
                DeskState::Open => open_since = Instant::now(),
                DeskState::Closed => {
                    body.open_time += open_since.elapsed();
                    body.closures += 1;
                }
            }
            last_state = current;
        }

        if current == DeskState::Open {
            if let Ok(user) = desk.queue.pop() {
                serve(&desk, &market, &user);
            }
        }
    }

    // Closing: drain the queue; customers may still arrive from the
    // shopping floor until no shopper remains.
    let graceful = market.shutdown().is_graceful();
    loop {
        match desk.queue.pop() {
            Ok(user) => {
                if graceful && desk.state() == DeskState::Open {
                    serve(&desk, &market, &user);
                } else {
                    debug!(desk = desk.id, user = user.id(), "leaves without paying");
                    market.move_to_exit(&user);
                }
            }
            Err(_) => {
                // A customer is pushed to a desk before the shopper gauge
                // drops, so "no shoppers, still empty" is a final state.
                if market.shoppers_remaining() == 0 && desk.queue_is_empty() {
                    break;
                }
                timing::sleep_ms(1);
            }
        }
    }
    {
        let mut body = desk.body.lock();
        if body.state == DeskState::Open {
            body.open_time += open_since.elapsed();
        }
    }

    notifier.join().expect("desk notifier thread panicked");
    debug!(desk = desk.id, "desk thread done");
}

/// Notifier sub-thread: one status report to the director every `TD` ms.
fn notifier_main(desk: Arc<CashDesk>, market: Arc<Market>) {
    let interval = market.config().notify_interval_ms;
    while !market.shutdown().is_requested() {
        timing::sleep_ms(interval);
        market.director().desk_report(DeskNotice {
            desk_id: desk.id,
            state: desk.state(),
            queued: desk.queued(),
        });
    }
}
