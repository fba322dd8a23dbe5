//! Bounded, drop-oldest hand-off queue
//!
//! The producer never blocks: pushing into a full queue evicts the oldest
//! entry. Consumers block on `pop_timeout` and treat a timeout as their own
//! shutdown signal. With the default capacity of 1 the queue behaves as a
//! latest-value slot.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// FIFO between one producer and its consumer(s)
pub struct HandoffQueue<T> {
    items: Mutex<VecDeque<T>>,
    available: Condvar,
    capacity: usize,
}

impl<T> HandoffQueue<T> {
    /// Create a queue holding at most `capacity` entries (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            available: Condvar::new(),
            capacity,
        }
    }

    /// Enqueue without blocking
    ///
    /// Returns the evicted entry when the queue was full.
    pub fn push(&self, item: T) -> Option<T> {
        let evicted = {
            let mut items = self.items.lock();
            let evicted = if items.len() >= self.capacity {
                items.pop_front()
            } else {
                None
            };
            items.push_back(item);
            evicted
        };
        self.available.notify_one();
        evicted
    }

    /// Dequeue, waiting up to `timeout` for an entry
    pub fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        let mut items = self.items.lock();
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            // Timeout too large to represent: wait without deadline
            loop {
                if let Some(item) = items.pop_front() {
                    return Some(item);
                }
                self.available.wait(&mut items);
            }
        };

        loop {
            if let Some(item) = items.pop_front() {
                return Some(item);
            }
            if self.available.wait_until(&mut items, deadline).timed_out() {
                return items.pop_front();
            }
        }
    }

    /// Dequeue without waiting
    pub fn try_pop(&self) -> Option<T> {
        self.items.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
