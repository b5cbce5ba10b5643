//! Customer actor.
//!
//! Each customer is a long-lived thread cycling through
//! ready → shopping → (pay | auth) → exit. After an exit the market resets
//! the record (fresh id, fresh cart, fresh shopping budget) and re-admits
//! it with the next batch, so threads are reused rather than respawned.
//!
//! The record is mutated by its own thread while the customer is active and
//! by the market only while the thread is parked in `NotReady`; the single
//! body mutex makes either access exclusive.

use crate::market::Market;
use crate::stats::UserStats;
use crate::timing;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::debug;

/// Source of unique, monotonically increasing customer ids. A reset takes
/// a fresh id, so ids identify passes through the market, not threads.
static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn next_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::SeqCst)
}

/// Lifecycle state of a customer actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserState {
    /// A shopping pass may begin.
    Ready,
    /// Parked, waiting for the next admission batch.
    NotReady,
    /// The market is closing; the thread must terminate.
    Quit,
}

#[derive(Debug)]
struct UserBody {
    id: u64,
    state: UserState,
    products: u64,
    shopping_ms: u64,
    entered: Option<Instant>,
    exited: Option<Instant>,
    queue_started: Option<Instant>,
    queues_visited: u32,
}

/// Customer record plus the condvar its thread parks on.
pub struct User {
    body: Mutex<UserBody>,
    news: Condvar,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl User {
    /// A new customer, `Ready` to start its first shopping pass.
    pub fn new(products: u64, shopping_ms: u64) -> Arc<Self> {
        Arc::new(Self {
            body: Mutex::new(UserBody {
                id: next_id(),
                state: UserState::Ready,
                products,
                shopping_ms,
                entered: None,
                exited: None,
                queue_started: None,
                queues_visited: 0,
            }),
            news: Condvar::new(),
            thread: Mutex::new(None),
        })
    }

    /// Prepare the record for another pass: fresh id, fresh cart, fresh
    /// shopping budget, cleared time stamps.
    ///
    /// The caller must know the thread is parked in `NotReady` (it is,
    /// whenever the customer has been popped from the exit queue).
    pub fn reset(&self, products: u64, shopping_ms: u64) {
        let mut body = self.body.lock();
        body.id = next_id();
        body.products = products;
        body.shopping_ms = shopping_ms;
        body.entered = None;
        body.exited = None;
        body.queue_started = None;
        body.queues_visited = 0;
    }

    pub fn id(&self) -> u64 {
        self.body.lock().id
    }

    pub fn products(&self) -> u64 {
        self.body.lock().products
    }

    pub fn state(&self) -> UserState {
        self.body.lock().state
    }

    pub fn queues_visited(&self) -> u32 {
        self.body.lock().queues_visited
    }

    /// Wake the actor for its next pass.
    pub fn set_ready(&self) {
        let mut body = self.body.lock();
        body.state = UserState::Ready;
        self.news.notify_all();
    }

    /// Tell the actor to terminate; it reacts the next time it parks.
    pub fn set_quit(&self) {
        let mut body = self.body.lock();
        body.state = UserState::Quit;
        self.news.notify_all();
    }

    /// Stamp the moment the customer joined a pay or auth queue and count
    /// the visit.
    pub(crate) fn enter_queue(&self) {
        let mut body = self.body.lock();
        body.queue_started = Some(Instant::now());
        body.queues_visited += 1;
    }

    /// Count a forced move to another queue (desk closure migration).
    pub(crate) fn count_queue_change(&self) {
        self.body.lock().queues_visited += 1;
    }

    pub(crate) fn mark_exit(&self) {
        self.body.lock().exited = Some(Instant::now());
    }

    /// Total order on customer ids; `Equal` is the predicate the market
    /// uses to pull a specific customer out of the shopping queue.
    pub fn compare_by_id(a: &User, b: &User) -> std::cmp::Ordering {
        a.id().cmp(&b.id())
    }

    /// Statistics snapshot for the log file. Stages the customer never
    /// reached report a zero duration.
    pub fn stats_snapshot(&self) -> UserStats {
        let body = self.body.lock();
        let span = |from: Option<Instant>, to: Option<Instant>| match (from, to) {
            (Some(a), Some(b)) => b.saturating_duration_since(a),
            _ => Duration::ZERO,
        };
        UserStats {
            id: body.id,
            products: body.products,
            time_in_market: span(body.entered, body.exited),
            time_in_queue: span(body.queue_started, body.exited),
            queues_visited: body.queues_visited,
        }
    }

    /// Spawn the actor thread.
    pub fn start(self: &Arc<Self>, market: Arc<Market>) {
        let user = self.clone();
        let handle = std::thread::spawn(move || user_main(user, market));
        *self.thread.lock() = Some(handle);
    }

    /// Join the actor thread, if it was started.
    pub fn join(&self) {
        if let Some(handle) = self.thread.lock().take() {
            handle.join().expect("customer thread panicked");
        }
    }
}

/// Entry point of a customer thread.
fn user_main(user: Arc<User>, market: Arc<Market>) {
    loop {
        let (id, products, shopping_ms) = {
            let mut body = user.body.lock();
            while body.state == UserState::NotReady {
                user.news.wait(&mut body);
            }
            if body.state == UserState::Quit {
                break;
            }
            // Ready: the pass begins now.
            body.state = UserState::NotReady;
            body.entered = Some(Instant::now());
            (body.id, body.products, body.shopping_ms)
        };

        if market.shutdown().is_abrupt() {
            market.from_shopping_to_exit(&user);
            break;
        }

        debug!(user = id, budget_ms = shopping_ms, "start shopping");
        timing::sleep_ms(shopping_ms);

        if market.shutdown().is_abrupt() {
            market.from_shopping_to_exit(&user);
            break;
        }
        debug!(user = id, "end shopping");

        if products > 0 {
            market.from_shopping_to_pay(&user);
        } else {
            market.from_shopping_to_auth(&user);
        }
    }
    debug!(user = user.id(), "customer thread done");
}
