//! Non-blocking fan-out of job events to stream subscribers.

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

struct Inner<T> {
    members: Vec<mpsc::Sender<T>>,
    closed: bool,
}

/// A set of bounded subscriber queues fed by one producer.
///
/// Publishing never waits: each subscriber gets the value if its queue has
/// room, and simply misses it otherwise. A subscriber that hung up is pruned
/// on the next publish. Once closed, the set stays closed, and late
/// subscribers get a receiver that reports end-of-stream immediately.
pub struct BroadcastSet<T> {
    inner: Mutex<Inner<T>>,
}

impl<T: Clone> BroadcastSet<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                members: Vec::new(),
                closed: false,
            }),
        }
    }

    /// Add a subscriber with its own queue of `capacity` slots.
    pub fn subscribe(&self, capacity: usize) -> mpsc::Receiver<T> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let mut inner = self.inner.lock();
        if !inner.closed {
            inner.members.push(tx);
        }
        // When closed, tx drops here and rx yields None on first recv.
        rx
    }

    /// Offer `value` to every live subscriber without blocking.
    pub fn publish(&self, value: &T) {
        let mut inner = self.inner.lock();
        inner.members.retain(|tx| match tx.try_send(value.clone()) {
            Ok(()) => true,
            // Slow consumer: this value is lost for them, queue stays.
            Err(TrySendError::Full(_)) => true,
            Err(TrySendError::Closed(_)) => false,
        });
    }

    /// Drop every subscriber queue and refuse new ones. Idempotent.
    pub fn close_all(&self) {
        let mut inner = self.inner.lock();
        inner.members.clear();
        inner.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    #[cfg(test)]
    fn member_count(&self) -> usize {
        self.inner.lock().members.len()
    }
}

impl<T: Clone> Default for BroadcastSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_in_order_to_every_subscriber() {
        let set = BroadcastSet::new();
        let mut a = set.subscribe(8);
        let mut b = set.subscribe(8);

        for v in 1..=3 {
            set.publish(&v);
        }

        for rx in [&mut a, &mut b] {
            assert_eq!(rx.recv().await, Some(1));
            assert_eq!(rx.recv().await, Some(2));
            assert_eq!(rx.recv().await, Some(3));
        }
    }

    #[tokio::test]
    async fn full_queue_drops_for_that_subscriber_only() {
        let set = BroadcastSet::new();
        let mut slow = set.subscribe(1);
        let mut fast = set.subscribe(8);

        set.publish(&1);
        set.publish(&2); // slow's queue is full; only fast sees this

        assert_eq!(slow.recv().await, Some(1));
        assert_eq!(fast.recv().await, Some(1));
        assert_eq!(fast.recv().await, Some(2));

        // slow stays a member and catches later values
        set.publish(&3);
        assert_eq!(slow.recv().await, Some(3));
    }

    #[tokio::test]
    async fn hung_up_subscriber_is_pruned() {
        let set = BroadcastSet::new();
        let rx = set.subscribe(4);
        let _keep = set.subscribe(4);
        drop(rx);

        set.publish(&1);
        assert_eq!(set.member_count(), 1);
    }

    #[tokio::test]
    async fn close_ends_existing_streams() {
        let set = BroadcastSet::<u32>::new();
        let mut rx = set.subscribe(4);
        set.publish(&7);
        set.close_all();

        assert_eq!(rx.recv().await, Some(7));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn late_subscriber_sees_closed_stream() {
        let set = BroadcastSet::<u32>::new();
        set.close_all();
        set.close_all(); // idempotent

        let mut rx = set.subscribe(4);
        assert_eq!(rx.recv().await, None);
        assert!(set.is_closed());
    }

    #[tokio::test]
    async fn publish_after_close_is_a_no_op() {
        let set = BroadcastSet::new();
        set.close_all();
        set.publish(&1);
        assert_eq!(set.member_count(), 0);
    }
}
