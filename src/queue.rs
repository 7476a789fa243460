//! Bounded FIFO hand-off between the receive worker and consumers.
//!
//! # Responsibilities
//! - Fixed-capacity FIFO of opaque items
//! - Blocking `push` when full, blocking `pop` when empty (backpressure)
//! - FIFO order: items come out in the order they went in
//!
//! # Design Decisions
//! - Two wakeup conditions (not-empty, not-full) modelled with
//!   `tokio::sync::Notify`; the `Notified` future is armed *before* the state
//!   re-check so a signal between check and await is never lost
//! - Waiting is a cooperative cancellation point: dropping the `push`/`pop`
//!   future abandons the wait without corrupting the queue
//! - `try_size` reads an atomic mirror of the length: an instantaneous,
//!   racy snapshot for diagnostics only

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use tokio::sync::Notify;

/// Error returned by `push` once the queue has been closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueClosed;

impl std::fmt::Display for QueueClosed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "queue closed")
    }
}

impl std::error::Error for QueueClosed {}

struct Inner<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// A fixed-capacity, internally synchronized FIFO.
///
/// Once the owning session's workers are running, this queue is the single
/// hand-off point between the receive loop and downstream consumers.
pub struct BoundedQueue<T> {
    inner: Mutex<Inner<T>>,
    capacity: usize,
    /// Racy length mirror for `try_size`.
    len: AtomicUsize,
    not_empty: Notify,
    not_full: Notify,
}

impl<T> BoundedQueue<T> {
    /// Create a queue holding at most `capacity` items.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            capacity,
            len: AtomicUsize::new(0),
            not_empty: Notify::new(),
            not_full: Notify::new(),
        }
    }

    /// Maximum number of items the queue holds.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append `item`, waiting while the queue is full.
    ///
    /// Fails once the queue has been closed; the item is dropped in that
    /// case, which is fine for the session's use (a closed queue means the
    /// session is halting and inbound data is being discarded anyway).
    pub async fn push(&self, item: T) -> Result<(), QueueClosed> {
        let mut item = Some(item);
        loop {
            let notified = self.not_full.notified();
            {
                let mut inner = self.inner.lock().expect("queue lock poisoned");
                if inner.closed {
                    return Err(QueueClosed);
                }
                if inner.items.len() < self.capacity {
                    inner.items.push_back(item.take().expect("item consumed twice"));
                    self.len.store(inner.items.len(), Ordering::Relaxed);
                    drop(inner);
                    self.not_empty.notify_one();
                    return Ok(());
                }
            }
            notified.await;
        }
    }

    /// Remove the oldest item, waiting while the queue is empty.
    ///
    /// Returns `None` once the queue is closed and fully drained.
    pub async fn pop(&self) -> Option<T> {
        loop {
            let notified = self.not_empty.notified();
            {
                let mut inner = self.inner.lock().expect("queue lock poisoned");
                if let Some(item) = inner.items.pop_front() {
                    self.len.store(inner.items.len(), Ordering::Relaxed);
                    drop(inner);
                    self.not_full.notify_one();
                    return Some(item);
                }
                if inner.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Close the queue: pending and future `push` calls fail, `pop` drains
    /// what is left and then returns `None`.
    pub fn close(&self) {
        let mut inner = self.inner.lock().expect("queue lock poisoned");
        inner.closed = true;
        drop(inner);
        self.not_empty.notify_waiters();
        self.not_full.notify_waiters();
    }

    /// Instantaneous, racy length snapshot. Diagnostics only.
    pub fn try_size(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }
}

impl<T> std::fmt::Debug for BoundedQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedQueue")
            .field("capacity", &self.capacity)
            .field("len", &self.try_size())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn fifo_order() {
        let queue = BoundedQueue::new(8);
        for i in 0..5u32 {
            queue.push(i).await.unwrap();
        }
        for i in 0..5u32 {
            assert_eq!(queue.pop().await, Some(i));
        }
    }

    #[tokio::test]
    async fn size_arithmetic() {
        let queue = BoundedQueue::new(10);
        for i in 0..7u32 {
            queue.push(i).await.unwrap();
        }
        assert_eq!(queue.try_size(), 7);
        for _ in 0..3 {
            queue.pop().await;
        }
        assert_eq!(queue.try_size(), 4);
    }

    #[tokio::test]
    async fn push_blocks_at_capacity_and_unblocks_after_pop() {
        let queue = Arc::new(BoundedQueue::new(2));
        queue.push(1u32).await.unwrap();
        queue.push(2).await.unwrap();

        // A third push must not complete while the queue is full.
        let q = Arc::clone(&queue);
        let blocked = tokio::spawn(async move { q.push(3).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!blocked.is_finished());

        // One pop frees exactly one slot; the push completes promptly.
        assert_eq!(queue.pop().await, Some(1));
        timeout(Duration::from_secs(1), blocked)
            .await
            .expect("push did not unblock")
            .unwrap()
            .unwrap();

        assert_eq!(queue.pop().await, Some(2));
        assert_eq!(queue.pop().await, Some(3));
    }

    #[tokio::test]
    async fn full_capacity_scenario() {
        // Fill to the session default, pop one, and the next push must
        // succeed immediately in the single freed slot.
        let queue = Arc::new(BoundedQueue::new(100));
        for i in 0..100u32 {
            queue.push(i).await.unwrap();
        }
        assert_eq!(queue.pop().await, Some(0));
        timeout(Duration::from_millis(100), queue.push(100))
            .await
            .expect("push into freed slot blocked")
            .unwrap();
        assert_eq!(queue.try_size(), 100);
    }

    #[tokio::test]
    async fn pop_waits_for_push() {
        let queue = Arc::new(BoundedQueue::new(4));
        let q = Arc::clone(&queue);
        let popper = tokio::spawn(async move { q.pop().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.push(9u32).await.unwrap();
        assert_eq!(popper.await.unwrap(), Some(9));
    }

    #[tokio::test]
    async fn close_drains_then_ends() {
        let queue = BoundedQueue::new(4);
        queue.push("a").await.unwrap();
        queue.push("b").await.unwrap();
        queue.close();

        assert_eq!(queue.push("c").await, Err(QueueClosed));
        assert_eq!(queue.pop().await, Some("a"));
        assert_eq!(queue.pop().await, Some("b"));
        assert_eq!(queue.pop().await, None);
    }

    #[tokio::test]
    async fn close_wakes_blocked_pop() {
        let queue = Arc::new(BoundedQueue::<u32>::new(4));
        let q = Arc::clone(&queue);
        let popper = tokio::spawn(async move { q.pop().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.close();
        assert_eq!(
            timeout(Duration::from_secs(1), popper).await.unwrap().unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn concurrent_producer_consumer_preserves_order() {
        let queue = Arc::new(BoundedQueue::new(4));
        let q = Arc::clone(&queue);
        let producer = tokio::spawn(async move {
            for i in 0..200u32 {
                q.push(i).await.unwrap();
            }
        });

        let mut received = Vec::with_capacity(200);
        for _ in 0..200 {
            received.push(queue.pop().await.unwrap());
        }
        producer.await.unwrap();

        let expected: Vec<u32> = (0..200).collect();
        assert_eq!(received, expected);
    }
}
