//! Thread-safe FIFO queues for outgoing and incoming messages.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::registry::Message;

/// A mutex-guarded FIFO of owned messages.
///
/// Ownership transfers from the caller on push and to the consumer on pop.
/// The lock is held only across the push/pop itself, never across I/O; the
/// worker uses [`MessageQueue::drain_all`] to move everything out in a
/// single critical section and transmit outside the lock.
pub(crate) struct MessageQueue {
    inner: Mutex<VecDeque<Box<dyn Message>>>,
}

impl MessageQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
        }
    }

    pub fn push(&self, message: Box<dyn Message>) {
        self.lock().push_back(message);
    }

    /// Non-blocking take of the oldest message.
    pub fn pop(&self) -> Option<Box<dyn Message>> {
        self.lock().pop_front()
    }

    /// Moves all pending messages into a local sequence, preserving order.
    pub fn drain_all(&self) -> Vec<Box<dyn Message>> {
        let mut queue = self.lock();
        queue.drain(..).collect()
    }

    #[allow(dead_code)] // Useful for tests and diagnostics.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Box<dyn Message>>> {
        // A poisoned queue still holds structurally sound messages.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
