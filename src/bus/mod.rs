//! Bounded fan-out event bus.
//!
//! Every subscriber owns a bounded delivery queue. Publishing never blocks:
//! when a queue is full the oldest event for that subscriber is dropped and
//! counted. A slow subscriber therefore only ever costs itself events,
//! never the publisher or its peers.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::Notify;

/// Default per-subscriber queue capacity.
pub const DEFAULT_CAPACITY: usize = 64;

struct SubscriberQueue<T> {
    queue: Mutex<VecDeque<T>>,
    notify: Notify,
    dropped: AtomicU64,
}

pub struct EventBus<T> {
    subscribers: Mutex<HashMap<u64, Arc<SubscriberQueue<T>>>>,
    next_id: AtomicU64,
    capacity: usize,
    closed: AtomicBool,
}

impl<T> EventBus<T> {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(EventBus {
            subscribers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            capacity,
            closed: AtomicBool::new(false),
        })
    }

    /// Registers a new subscriber with an empty queue.
    pub fn subscribe(self: &Arc<Self>) -> Subscription<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let queue = Arc::new(SubscriberQueue {
            queue: Mutex::new(VecDeque::with_capacity(self.capacity)),
            notify: Notify::new(),
            dropped: AtomicU64::new(0),
        });
        self.subscribers
            .lock()
            .expect("subscriber registry poisoned")
            .insert(id, queue.clone());
        Subscription {
            id,
            queue,
            bus: Arc::downgrade(self),
        }
    }

    /// Closes every queue; pending events stay readable, then `recv`
    /// returns `None`.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        let subscribers = self
            .subscribers
            .lock()
            .expect("subscriber registry poisoned");
        for subscriber in subscribers.values() {
            subscriber.notify.notify_one();
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .expect("subscriber registry poisoned")
            .len()
    }

    fn unsubscribe(&self, id: u64) {
        self.subscribers
            .lock()
            .expect("subscriber registry poisoned")
            .remove(&id);
    }
}

impl<T: Clone> EventBus<T> {
    /// Delivers one event to every subscriber, dropping each subscriber's
    /// oldest pending event on overflow.
    pub fn publish(&self, event: T) {
        let subscribers = self
            .subscribers
            .lock()
            .expect("subscriber registry poisoned");
        for (id, subscriber) in subscribers.iter() {
            {
                let mut queue = subscriber.queue.lock().expect("subscriber queue poisoned");
                if queue.len() >= self.capacity {
                    queue.pop_front();
                    let dropped = subscriber.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                    log::debug!("Subscriber {id}: queue full, dropped oldest ({dropped} total)");
                }
                queue.push_back(event.clone());
            }
            subscriber.notify.notify_one();
        }
    }
}

/// One subscriber's end of the bus. Dropping it unregisters the subscriber
/// and discards anything still pending.
pub struct Subscription<T> {
    id: u64,
    queue: Arc<SubscriberQueue<T>>,
    bus: Weak<EventBus<T>>,
}

impl<T> Subscription<T> {
    /// Waits for the next event. Returns `None` once the bus is closed and
    /// the queue is drained.
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            let notified = self.queue.notify.notified();
            {
                let mut queue = self.queue.queue.lock().expect("subscriber queue poisoned");
                if let Some(event) = queue.pop_front() {
                    return Some(event);
                }
            }
            let closed = self
                .bus
                .upgrade()
                .map(|bus| bus.closed.load(Ordering::Acquire))
                .unwrap_or(true);
            if closed {
                return None;
            }
            notified.await;
        }
    }

    /// Events this subscriber lost to backpressure.
    pub fn dropped(&self) -> u64 {
        self.queue.dropped.load(Ordering::Relaxed)
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.unsubscribe(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_publish_and_receive_in_order() {
        let bus = EventBus::new(8);
        let mut subscription = bus.subscribe();
        bus.publish(1);
        bus.publish(2);
        bus.publish(3);
        assert_eq!(subscription.recv().await, Some(1));
        assert_eq!(subscription.recv().await, Some(2));
        assert_eq!(subscription.recv().await, Some(3));
    }

    #[tokio::test]
    async fn test_queue_full_drops_oldest() {
        let bus = EventBus::new(2);
        let mut subscription = bus.subscribe();
        bus.publish(1);
        bus.publish(2);
        bus.publish(3);
        assert_eq!(subscription.dropped(), 1);
        assert_eq!(subscription.recv().await, Some(2));
        assert_eq!(subscription.recv().await, Some(3));
    }

    #[tokio::test]
    async fn test_slow_subscriber_does_not_affect_fast_one() {
        let bus = EventBus::new(2);
        let mut fast = bus.subscribe();
        let _slow = bus.subscribe(); // never reads
        for n in 0..100 {
            bus.publish(n);
            assert_eq!(fast.recv().await, Some(n));
        }
        assert_eq!(fast.dropped(), 0);
    }

    #[tokio::test]
    async fn test_drop_unregisters() {
        let bus = EventBus::new(4);
        let subscription = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
        drop(subscription);
        assert_eq!(bus.subscriber_count(), 0);
        // Publishing to nobody is fine.
        bus.publish(42);
    }

    #[tokio::test]
    async fn test_close_drains_then_ends() {
        let bus = EventBus::new(4);
        let mut subscription = bus.subscribe();
        bus.publish(7);
        bus.close();
        assert_eq!(subscription.recv().await, Some(7));
        assert_eq!(subscription.recv().await, None);
    }

    #[tokio::test]
    async fn test_recv_wakes_on_later_publish() {
        let bus = EventBus::new(4);
        let mut subscription = bus.subscribe();
        let publisher = bus.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            publisher.publish(9);
        });
        let received = tokio::time::timeout(Duration::from_secs(1), subscription.recv())
            .await
            .expect("recv must wake");
        assert_eq!(received, Some(9));
        handle.await.unwrap();
    }
}
