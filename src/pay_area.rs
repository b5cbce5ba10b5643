//! The payment area: the fixed set of cash desks and the open/close
//! protocol over them.
//!
//! One mutex serialises every capacity operation (admission, open, close),
//! so the counts and the per-desk states can never be observed mid-change.
//! Desk queues keep their own internal locks.
//!
//! Invariants: `open + closed = total`, and at least one desk stays open
//! while customers may still need to pay (a close is refused below two
//! open desks).

use crate::desk::{CashDesk, DeskState};
use crate::market::Market;
use crate::user::User;
use parking_lot::Mutex;
use rand::Rng;
use std::sync::Arc;
use tracing::info;

#[derive(Debug)]
struct AreaCounts {
    open: usize,
    closed: usize,
}

/// Aggregate of all cash desks with open/close bookkeeping.
pub struct PayArea {
    desks: Vec<Arc<CashDesk>>,
    counts: Mutex<AreaCounts>,
}

impl PayArea {
    /// Build `total` desks; the first `open_at_boot` start open, the rest
    /// closed. Each desk draws its service constant uniformly in [20, 80] ms.
    pub fn new(total: usize, open_at_boot: usize) -> Self {
        assert!(
            total >= 1 && open_at_boot >= 1 && open_at_boot <= total,
            "desk counts must satisfy 0 < open_at_boot <= total"
        );
        let mut rng = rand::thread_rng();
        let desks = (0..total)
            .map(|id| {
                let state = if id < open_at_boot {
                    DeskState::Open
                } else {
                    DeskState::Closed
                };
                CashDesk::new(id, rng.gen_range(20..=80), state)
            })
            .collect();
        Self {
            desks,
            counts: Mutex::new(AreaCounts {
                open: open_at_boot,
                closed: total - open_at_boot,
            }),
        }
    }

    pub fn desks(&self) -> &[Arc<CashDesk>] {
        &self.desks
    }

    pub fn total_desks(&self) -> usize {
        self.desks.len()
    }

    pub fn open_desks(&self) -> usize {
        self.counts.lock().open
    }

    pub fn closed_desks(&self) -> usize {
        self.counts.lock().closed
    }

    /// No customer is waiting at any desk.
    pub fn is_empty(&self) -> bool {
        self.desks.iter().all(|d| d.queue_is_empty())
    }

    /// Uniformly random desk currently in `want` state. The caller must
    /// hold the counts lock and know at least one such desk exists.
    fn pick_random(&self, want: DeskState) -> Arc<CashDesk> {
        let candidates: Vec<&Arc<CashDesk>> = self
            .desks
            .iter()
            .filter(|d| d.state() == want)
            .collect();
        assert!(
            !candidates.is_empty(),
            "no desk in state {want:?} while one was required"
        );
        let pick = rand::thread_rng().gen_range(0..candidates.len());
        candidates[pick].clone()
    }

    /// Queue a customer at a uniformly random open desk, stamping the
    /// queue-entry time and counting the visit. Random choice avoids the
    /// pile-up on the lowest-index desk that first-fit selection causes.
    pub fn admit(&self, user: Arc<User>) {
        let _counts = self.counts.lock();
        let desk = self.pick_random(DeskState::Open);
        user.enter_queue();
        desk.add_user(user);
    }

    /// Open one closed desk, chosen at random; no-op when all are open.
    pub fn try_open_one(&self) {
        let mut counts = self.counts.lock();
        if counts.open == self.desks.len() {
            return;
        }
        let desk = self.pick_random(DeskState::Closed);
        desk.set_state(DeskState::Open);
        counts.open += 1;
        counts.closed -= 1;
        info!(desk = desk.id(), open = counts.open, "desk opened");
    }

    /// Close one open desk, chosen at random; refused when it would leave
    /// the area without an open desk.
    pub fn try_close_one(&self) {
        let mut counts = self.counts.lock();
        if counts.open < 2 {
            return;
        }
        let desk = self.pick_random(DeskState::Open);
        self.close_desk(&mut counts, &desk);
    }

    /// Flip `desk` to closed and migrate everyone in its queue to other
    /// open desks (there is always at least one left). Each migrated
    /// customer is charged one queue change.
    fn close_desk(&self, counts: &mut AreaCounts, desk: &Arc<CashDesk>) {
        desk.set_state(DeskState::Closed);
        counts.open -= 1;
        counts.closed += 1;
        let mut migrated = 0usize;
        while let Some(user) = desk.take_waiting() {
            let target = self.pick_random(DeskState::Open);
            user.count_queue_change();
            target.add_user(user);
            migrated += 1;
        }
        info!(
            desk = desk.id(),
            open = counts.open,
            migrated,
            "desk closed"
        );
    }

    pub fn start_all(&self, market: &Arc<Market>) {
        for desk in &self.desks {
            desk.start(market.clone());
        }
    }

    pub fn join_all(&self) {
        for desk in &self.desks {
            desk.join();
        }
    }

    /// Wake every desk server so it re-checks its wait predicate.
    pub fn signal_all(&self) {
        for desk in &self.desks {
            desk.signal();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boot_layout_and_counts() {
        let area = PayArea::new(4, 2);
        assert_eq!(area.total_desks(), 4);
        assert_eq!(area.open_desks(), 2);
        assert_eq!(area.closed_desks(), 2);
        assert_eq!(area.desks()[0].state(), DeskState::Open);
        assert_eq!(area.desks()[1].state(), DeskState::Open);
        assert_eq!(area.desks()[2].state(), DeskState::Closed);
        assert_eq!(area.desks()[3].state(), DeskState::Closed);
        assert!(area.is_empty());
    }

    #[test]
    fn test_open_then_close_restores_counts() {
        let area = PayArea::new(3, 1);
        area.try_open_one();
        assert_eq!(area.open_desks(), 2);
        assert_eq!(area.closed_desks(), 1);
        area.try_close_one();
        assert_eq!(area.open_desks(), 1);
        assert_eq!(area.closed_desks(), 2);
        assert_eq!(area.open_desks() + area.closed_desks(), area.total_desks());
    }

    #[test]
    fn test_close_refused_at_one_open_desk() {
        let area = PayArea::new(2, 1);
        area.try_close_one();
        assert_eq!(area.open_desks(), 1);
    }

    #[test]
    fn test_open_refused_when_all_open() {
        let area = PayArea::new(2, 2);
        area.try_open_one();
        assert_eq!(area.open_desks(), 2);
    }

    #[test]
    fn test_admit_stamps_queue_visit() {
        let area = PayArea::new(2, 1);
        let user = User::new(3, 20);
        area.admit(user.clone());
        assert_eq!(user.queues_visited(), 1);
        assert!(!area.is_empty());
        // only desk 0 is open, so the customer must be there
        assert_eq!(area.desks()[0].queued(), 1);
    }

    #[test]
    fn test_closing_a_desk_migrates_its_waiters() {
        let area = PayArea::new(3, 3);
        let a = User::new(1, 20);
        let b = User::new(2, 20);
        area.desks()[0].add_user(a.clone());
        area.desks()[0].add_user(b.clone());

        let desk0 = area.desks()[0].clone();
        {
            let mut counts = area.counts.lock();
            area.close_desk(&mut counts, &desk0);
        }

        assert_eq!(desk0.state(), DeskState::Closed);
        assert_eq!(desk0.queued(), 0);
        assert_eq!(area.open_desks(), 2);
        // nobody lost, one forced queue change each
        let elsewhere: usize = area.desks()[1..].iter().map(|d| d.queued()).sum();
        assert_eq!(elsewhere, 2);
        assert_eq!(a.queues_visited(), 1);
        assert_eq!(b.queues_visited(), 1);
    }
}
