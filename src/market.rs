//! Market orchestrator.
//!
//! The market owns the configuration, the three stage queues (shopping,
//! authorization, exit), the pay area, the director and the statistics
//! writer. Exactly `C` customer records exist; the market seeds them,
//! re-admits them in batches of `E` as they exit, and tears everything
//! down when a shutdown signal arrives.
//!
//! Drain order on shutdown: wake every parked actor, let desks drain their
//! queues and join them, join the director (which drains authorization),
//! push the staged customers to the exit, then pop the exit until all `C`
//! customers are logged, quit and joined. Every wait predicate in the
//! actors includes the shutdown flags, so one wakeup per condvar is enough
//! for forward progress, and every queue has exactly one consumer during
//! the drain, so nobody is lost.

use crate::config::SimConfig;
use crate::director::Director;
use crate::pay_area::PayArea;
use crate::queue::SimQueue;
use crate::shutdown::{ShutdownFlags, ShutdownMode};
use crate::stats::StatsWriter;
use crate::user::User;
use anyhow::Context;
use parking_lot::{Condvar, Mutex};
use rand::Rng;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::JoinHandle;
use tracing::{debug, info};

/// Initial cart and shopping budget for one seeded customer.
#[derive(Debug, Clone, Copy)]
pub struct UserSpec {
    pub products: u64,
    pub shopping_ms: u64,
}

/// The whole simulation: queues, actors, statistics, shutdown flags.
pub struct Market {
    config: SimConfig,
    stats: StatsWriter,
    flags: ShutdownFlags,
    shopping: SimQueue<Arc<User>>,
    auth: SimQueue<Arc<User>>,
    exit: SimQueue<Arc<User>>,
    /// Customers still in the shopping stage or in transit out of it.
    /// Lets the drain loops tell "momentarily empty" from "done for good".
    roaming: AtomicUsize,
    pay_area: PayArea,
    director: Director,
    gate: Mutex<()>,
    news: Condvar,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Market {
    /// Load the configuration file and create the statistics file.
    pub fn open(config_path: &Path, log_path: &Path) -> anyhow::Result<Arc<Self>> {
        let config = SimConfig::load(config_path)
            .with_context(|| format!("invalid configuration {}", config_path.display()))?;
        Self::with_config(config, log_path)
    }

    /// Build a market from an already validated configuration.
    pub fn with_config(config: SimConfig, log_path: &Path) -> anyhow::Result<Arc<Self>> {
        config.validate()?;
        let stats = StatsWriter::create(log_path)
            .with_context(|| format!("cannot create log file {}", log_path.display()))?;
        Ok(Arc::new(Self {
            pay_area: PayArea::new(config.max_desks, config.open_at_boot),
            director: Director::new(),
            stats,
            flags: ShutdownFlags::new(),
            shopping: SimQueue::unbounded(),
            auth: SimQueue::unbounded(),
            exit: SimQueue::unbounded(),
            roaming: AtomicUsize::new(0),
            gate: Mutex::new(()),
            news: Condvar::new(),
            thread: Mutex::new(None),
            config,
        }))
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn shutdown(&self) -> &ShutdownFlags {
        &self.flags
    }

    pub fn pay_area(&self) -> &PayArea {
        &self.pay_area
    }

    pub(crate) fn director(&self) -> &Director {
        &self.director
    }

    pub fn shopping_len(&self) -> usize {
        self.shopping.len()
    }

    pub fn auth_len(&self) -> usize {
        self.auth.len()
    }

    pub fn exit_len(&self) -> usize {
        self.exit.len()
    }

    pub(crate) fn auth_is_empty(&self) -> bool {
        self.auth.is_empty()
    }

    pub(crate) fn take_from_auth(&self) -> Option<Arc<User>> {
        self.auth.pop().ok()
    }

    /// Customers that may still route themselves out of the shopping stage.
    pub(crate) fn shoppers_remaining(&self) -> usize {
        self.roaming.load(Ordering::SeqCst)
    }

    /// Start the simulation with a randomly drawn population.
    pub fn start(self: &Arc<Self>) {
        let mut rng = rand::thread_rng();
        let specs: Vec<UserSpec> = (0..self.config.customers)
            .map(|_| UserSpec {
                products: rng.gen_range(0..=self.config.max_products),
                shopping_ms: rng.gen_range(10..=self.config.max_shopping_ms),
            })
            .collect();
        self.start_with_population(&specs);
    }

    /// Start the simulation with an explicit population (deterministic
    /// runs, test scenarios). Returns the ids assigned to the seeded
    /// customers, in input order.
    ///
    /// Startup order matters: desks first, then the population, then the
    /// director, so no stage ever observes a half-built market.
    pub fn start_with_population(self: &Arc<Self>, specs: &[UserSpec]) -> Vec<u64> {
        assert_eq!(
            specs.len(),
            self.config.customers,
            "population size must match the configured customer count"
        );
        info!(
            desks = self.config.max_desks,
            open = self.config.open_at_boot,
            customers = self.config.customers,
            "market opening"
        );
        self.pay_area.start_all(self);

        let mut ids = Vec::with_capacity(specs.len());
        for spec in specs {
            let user = User::new(spec.products, spec.shopping_ms);
            ids.push(user.id());
            self.roaming.fetch_add(1, Ordering::SeqCst);
            self.shopping
                .push(user.clone())
                .expect("shopping queue is unbounded, push cannot fail");
            user.start(self.clone());
        }

        self.director.start(self.clone());

        let market = self.clone();
        let handle = std::thread::spawn(move || market_main(market));
        *self.thread.lock() = Some(handle);
        ids
    }

    /// Wait for the market thread (it returns once the drain completed).
    pub fn join(&self) {
        if let Some(handle) = self.thread.lock().take() {
            handle.join().expect("market thread panicked");
        }
    }

    /// Ask the market to close. The first request fixes the mode; the
    /// signal bridge and the test harness both enter here.
    pub fn request_shutdown(&self, mode: ShutdownMode) {
        if self.flags.request(mode) {
            info!(?mode, "shutdown requested");
        }
        self.signal_news();
    }

    pub(crate) fn signal_news(&self) {
        let _gate = self.gate.lock();
        self.news.notify_all();
    }

    fn take_from_shopping(&self, user: &Arc<User>) {
        self.shopping
            .remove_first(|u| User::compare_by_id(u, user).is_eq())
            .expect("customer was not in the shopping queue");
    }

    /// Shopping → pay area. The customer leaves the shopping queue first,
    /// then joins a random open desk; the stamps happen at admission.
    pub(crate) fn from_shopping_to_pay(&self, user: &Arc<User>) {
        self.take_from_shopping(user);
        self.pay_area.admit(user.clone());
        self.roaming.fetch_sub(1, Ordering::SeqCst);
    }

    /// Shopping → authorization queue (empty cart).
    pub(crate) fn from_shopping_to_auth(&self, user: &Arc<User>) {
        self.take_from_shopping(user);
        user.enter_queue();
        self.auth
            .push(user.clone())
            .expect("auth queue is unbounded, push cannot fail");
        self.director.auth_report();
        self.roaming.fetch_sub(1, Ordering::SeqCst);
    }

    /// Shopping → exit, skipping every queue (abrupt shutdown path).
    pub(crate) fn from_shopping_to_exit(&self, user: &Arc<User>) {
        self.take_from_shopping(user);
        self.move_to_exit(user);
        self.roaming.fetch_sub(1, Ordering::SeqCst);
    }

    /// Final stage: stamp the exit time, queue for the market thread.
    pub(crate) fn move_to_exit(&self, user: &Arc<User>) {
        user.mark_exit();
        self.exit
            .push(user.clone())
            .expect("exit queue is unbounded, push cannot fail");
        self.signal_news();
    }
}

/// Market thread: the re-admission loop, then the shutdown drain.
fn market_main(market: Arc<Market>) {
    let batch_size = market.config.batch_size;
    let mut staged: Vec<Arc<User>> = Vec::new();
    let mut exited_in_batch = 0usize;
    debug!("market thread running");

    loop {
        {
            let mut gate = market.gate.lock();
            while !market.flags.is_requested() && market.exit.is_empty() {
                market.news.wait(&mut gate);
            }
        }
        if market.flags.is_requested() {
            break;
        }
        let Ok(user) = market.exit.pop() else {
            continue;
        };

        market.stats.user(&user.stats_snapshot());
        let (products, shopping_ms) = {
            let mut rng = rand::thread_rng();
            (
                rng.gen_range(0..=market.config.max_products),
                rng.gen_range(10..=market.config.max_shopping_ms),
            )
        };
        user.reset(products, shopping_ms);
        staged.push(user);
        exited_in_batch += 1;

        if exited_in_batch == batch_size {
            // The signal bridge may have raised a flag while this batch was
            // being collected; once a shutdown is requested no batch may be
            // admitted, so leave the staged customers for the drain.
            if market.flags.is_requested() {
                break;
            }
            debug!(batch = batch_size, "re-admitting a batch");
            for user in staged.drain(..) {
                market.roaming.fetch_add(1, Ordering::SeqCst);
                market
                    .shopping
                    .push(user.clone())
                    .expect("shopping queue is unbounded, push cannot fail");
                user.set_ready();
            }
            exited_in_batch = 0;
        }
    }

    drain_market(&market, staged);
}

/// Tear the simulation down without losing a customer.
fn drain_market(market: &Arc<Market>, staged: Vec<Arc<User>>) {
    let mode = market.flags.mode();
    info!(?mode, "market closing");

    // Wake everything that may be parked; the flags are already visible.
    market.pay_area.signal_all();
    market.director.signal_all();

    // Desks drain their own queues (serving only under a graceful close),
    // then stop. The director drains authorization the same way.
    market.pay_area.join_all();
    market.director.join();

    // The consumers are gone; sweep anything that slipped in after them.
    while let Some(user) = market.take_from_auth() {
        market.move_to_exit(&user);
    }
    // Customers reset but never re-admitted leave through the exit as well.
    for user in staged {
        market.move_to_exit(&user);
    }

    let mut remaining = market.config.customers;
    while remaining > 0 {
        let user = market.exit.pop_blocking();
        market.stats.user(&user.stats_snapshot());
        user.set_quit();
        user.join();
        remaining -= 1;
    }

    for desk in market.pay_area.desks() {
        market.stats.desk(&desk.stats_snapshot());
    }
    market.stats.flush();
    info!("market closed");
}
