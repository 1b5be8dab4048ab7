//! Blocking FIFO that hands accepted connections from the accept loop to the
//! worker threads.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard};

struct State<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Unbounded, thread-safe FIFO with a blocking `pop`.
///
/// All mutation happens under one mutex; `not_empty` is signalled on every
/// push and broadcast on close.
pub struct ConnectionQueue<T> {
    state: Mutex<State<T>>,
    not_empty: Condvar,
}

impl<T> ConnectionQueue<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                items: VecDeque::new(),
                closed: false,
            }),
            not_empty: Condvar::new(),
        }
    }

    // A panic while holding the lock cannot leave `State` half-updated, so a
    // poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append `item`. Returns it back if the queue has been closed.
    pub fn push(&self, item: T) -> Result<(), T> {
        let mut state = self.lock();
        if state.closed {
            return Err(item);
        }
        state.items.push_back(item);
        drop(state);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Remove the oldest item, blocking while the queue is empty.
    ///
    /// Returns `None` once the queue is closed.
    pub fn pop(&self) -> Option<T> {
        let mut state = self.lock();
        loop {
            if state.closed {
                return None;
            }
            if let Some(item) = state.items.pop_front() {
                return Some(item);
            }
            state = self
                .not_empty
                .wait(state)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    /// Close the queue: wake every blocked `pop`, refuse further pushes, and
    /// drop whatever was still waiting to be served.
    pub fn close(&self) {
        let pending = {
            let mut state = self.lock();
            state.closed = true;
            std::mem::take(&mut state.items)
        };
        self.not_empty.notify_all();
        // Dropped outside the lock; for sockets this closes them.
        drop(pending);
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for ConnectionQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    use super::ConnectionQueue;

    #[test]
    fn test_fifo_order() {
        let queue = ConnectionQueue::new();
        for i in 0..5 {
            queue.push(i).unwrap();
        }
        assert_eq!(queue.len(), 5);
        let popped: Vec<i32> = (0..5).filter_map(|_| queue.pop()).collect();
        assert_eq!(popped, vec![0, 1, 2, 3, 4]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_pop_blocks_until_push() {
        let queue = Arc::new(ConnectionQueue::new());
        let (tx, rx) = mpsc::channel();

        let consumer = {
            let queue = queue.clone();
            thread::spawn(move || {
                tx.send(queue.pop()).unwrap();
            })
        };

        // Still blocked: nothing has been pushed.
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());

        queue.push(42).unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), Some(42));
        consumer.join().unwrap();
    }

    #[test]
    fn test_close_wakes_all_poppers() {
        let queue: Arc<ConnectionQueue<u32>> = Arc::new(ConnectionQueue::new());
        let poppers: Vec<_> = (0..4)
            .map(|_| {
                let queue = queue.clone();
                thread::spawn(move || queue.pop())
            })
            .collect();

        thread::sleep(Duration::from_millis(20));
        queue.close();

        for popper in poppers {
            assert_eq!(popper.join().unwrap(), None);
        }
    }

    #[test]
    fn test_close_drops_pending_and_rejects_push() {
        let marker = Arc::new(());
        let queue = ConnectionQueue::new();
        queue.push(marker.clone()).unwrap();
        assert_eq!(Arc::strong_count(&marker), 2);

        queue.close();
        assert!(queue.is_closed());
        assert_eq!(Arc::strong_count(&marker), 1);
        assert!(queue.pop().is_none());
        assert!(queue.push(marker.clone()).is_err());
    }

    #[test]
    fn test_concurrent_producers_and_consumers() {
        const PRODUCERS: usize = 4;
        const PER_PRODUCER: usize = 250;

        let queue = Arc::new(ConnectionQueue::new());
        let (tx, rx) = mpsc::channel();

        let consumers: Vec<_> = (0..3)
            .map(|_| {
                let queue = queue.clone();
                let tx = tx.clone();
                thread::spawn(move || {
                    while let Some(item) = queue.pop() {
                        tx.send(item).unwrap();
                    }
                })
            })
            .collect();
        drop(tx);

        let producers: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let queue = queue.clone();
                thread::spawn(move || {
                    for i in 0..PER_PRODUCER {
                        queue.push(p * PER_PRODUCER + i).unwrap();
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }

        let mut seen: Vec<usize> = rx.iter().take(PRODUCERS * PER_PRODUCER).collect();
        queue.close();
        for consumer in consumers {
            consumer.join().unwrap();
        }

        seen.sort_unstable();
        let expected: Vec<usize> = (0..PRODUCERS * PER_PRODUCER).collect();
        assert_eq!(seen, expected, "every item delivered exactly once");
    }
}
