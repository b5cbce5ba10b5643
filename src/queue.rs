//! Blocking FIFO queue shared by every stage of the simulation.
//!
//! One mutex guards the buffer; two condition variables back the blocking
//! variants (`not_full` for producers, `not_empty` for consumers). A queue
//! built with [`SimQueue::bounded`] rejects or blocks pushes at capacity;
//! an [`SimQueue::unbounded`] queue never reports `Full`.
//!
//! Ordering: insertion order is preserved, so consumers observe FIFO per
//! producer. Predicates and visitors run while the internal lock is held —
//! they must not call back into the queue.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use thiserror::Error;

/// Errors reported by the non-blocking queue operations.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    #[error("queue is full")]
    Full,
    #[error("queue is empty")]
    Empty,
    #[error("no element matched the predicate")]
    NotFound,
    #[error("index {0} is out of range")]
    OutOfRange(usize),
}

/// Mutex/condvar FIFO with optional capacity.
pub struct SimQueue<T> {
    items: Mutex<VecDeque<T>>,
    cap: Option<usize>,
    not_full: Condvar,
    not_empty: Condvar,
}

impl<T> SimQueue<T> {
    /// A queue with no capacity limit; `push` never fails.
    pub fn unbounded() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            cap: None,
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
        }
    }

    /// A queue holding at most `cap` elements.
    pub fn bounded(cap: usize) -> Self {
        assert!(cap > 0, "queue capacity must be positive");
        Self {
            items: Mutex::new(VecDeque::with_capacity(cap)),
            cap: Some(cap),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
        }
    }

    fn at_capacity(&self, len: usize) -> bool {
        self.cap.is_some_and(|cap| len >= cap)
    }

    /// Append at the tail; `Full` if the queue is bounded and at capacity.
    pub fn push(&self, item: T) -> Result<(), QueueError> {
        let mut items = self.items.lock();
        if self.at_capacity(items.len()) {
            return Err(QueueError::Full);
        }
        items.push_back(item);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Append at the tail, waiting for space if the queue is full.
    pub fn push_blocking(&self, item: T) {
        let mut items = self.items.lock();
        while self.at_capacity(items.len()) {
            self.not_full.wait(&mut items);
        }
        items.push_back(item);
        self.not_empty.notify_one();
    }

    /// Remove the head element; `Empty` if there is none.
    pub fn pop(&self) -> Result<T, QueueError> {
        let mut items = self.items.lock();
        match items.pop_front() {
            Some(item) => {
                self.not_full.notify_one();
                Ok(item)
            }
            None => Err(QueueError::Empty),
        }
    }

    /// Remove the head element, waiting until one is available.
    pub fn pop_blocking(&self) -> T {
        let mut items = self.items.lock();
        loop {
            if let Some(item) = items.pop_front() {
                self.not_full.notify_one();
                return item;
            }
            self.not_empty.wait(&mut items);
        }
    }

    /// Remove and return the first element for which `pred` is true.
    ///
    /// Linear scan under the internal lock; the predicate must not touch
    /// this queue.
    pub fn remove_first<F>(&self, mut pred: F) -> Result<T, QueueError>
    where
        F: FnMut(&T) -> bool,
    {
        let mut items = self.items.lock();
        match items.iter().position(|item| pred(item)) {
            Some(idx) => {
                let item = items.remove(idx).expect("position came from the same scan");
                self.not_full.notify_one();
                Ok(item)
            }
            None => Err(QueueError::NotFound),
        }
    }

    /// Position of the first element for which `pred` is true (0 = head).
    pub fn position_of<F>(&self, mut pred: F) -> Option<usize>
    where
        F: FnMut(&T) -> bool,
    {
        let items = self.items.lock();
        items.iter().position(|item| pred(item))
    }

    /// Remove and return the element at position `idx` (0 = head).
    pub fn remove_at(&self, idx: usize) -> Result<T, QueueError> {
        let mut items = self.items.lock();
        if idx >= items.len() {
            return Err(QueueError::OutOfRange(idx));
        }
        let item = items.remove(idx).expect("index checked against length");
        self.not_full.notify_one();
        Ok(item)
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    pub fn is_full(&self) -> bool {
        let items = self.items.lock();
        self.at_capacity(items.len())
    }

    /// Visit every element in FIFO order while holding the internal lock.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&T),
    {
        let items = self.items.lock();
        for item in items.iter() {
            f(item);
        }
    }
}
