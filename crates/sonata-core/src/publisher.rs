//! Event fan-out.
//!
//! Each subscriber owns an unbounded queue, so `publish` never waits on a
//! slow consumer and never drops an event for a live one. Callback
//! subscribers get a delivery thread of their own; a panicking callback is
//! logged and delivery continues with the next event.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;

use crate::models::PlayerEvent;

/// Identifies one subscription for [`EventPublisher::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }

    pub fn from_u64(id: u64) -> Self {
        Self(id)
    }
}

/// A channel subscription. Drain it with [`Subscription::recv`] and friends.
///
/// Once the publisher closes (or the subscription is removed) the queue
/// still yields what was already published, then reports end-of-stream.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    rx: Receiver<PlayerEvent>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Block until the next event. `None` once the stream ended.
    pub fn recv(&self) -> Option<PlayerEvent> {
        self.rx.recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<PlayerEvent> {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Next queued event without blocking.
    pub fn try_recv(&self) -> Option<PlayerEvent> {
        match self.rx.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Everything queued right now.
    pub fn drain(&self) -> Vec<PlayerEvent> {
        self.rx.try_iter().collect()
    }
}

impl Iterator for Subscription {
    type Item = PlayerEvent;

    fn next(&mut self) -> Option<PlayerEvent> {
        self.recv()
    }
}

struct Subscriber {
    id: SubscriptionId,
    tx: Sender<PlayerEvent>,
    /// Delivery thread for callback subscribers.
    worker: Option<JoinHandle<()>>,
}

/// Fans coordinator events out to subscribers in publish order.
pub struct EventPublisher {
    subscribers: Mutex<Vec<Subscriber>>,
    next_id: AtomicU64,
}

impl EventPublisher {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn allocate_id(&self) -> SubscriptionId {
        SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Register a channel subscriber.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel();
        let id = self.allocate_id();
        self.subscribers.lock().push(Subscriber {
            id,
            tx,
            worker: None,
        });
        log::debug!("sonata: subscriber {} added", id.0);
        Subscription { id, rx }
    }

    /// Register a callback run on its own delivery thread.
    pub fn subscribe_with<F>(&self, mut callback: F) -> SubscriptionId
    where
        F: FnMut(&PlayerEvent) + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<PlayerEvent>();
        let id = self.allocate_id();
        let worker = thread::Builder::new()
            .name(format!("sonata-subscriber-{}", id.0))
            .spawn(move || {
                for event in rx.iter() {
                    let outcome = panic::catch_unwind(AssertUnwindSafe(|| callback(&event)));
                    if outcome.is_err() {
                        log::error!("sonata: subscriber {} panicked on {:?}", id.0, event);
                    }
                }
            });
        let worker = match worker {
            Ok(handle) => Some(handle),
            Err(e) => {
                log::error!("sonata: failed to spawn subscriber thread: {}", e);
                None
            }
        };
        if worker.is_some() {
            self.subscribers.lock().push(Subscriber { id, tx, worker });
        }
        id
    }

    /// Remove a subscriber. Returns false if it was not registered.
    ///
    /// Events already queued for a channel subscriber stay readable.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = {
            let mut subs = self.subscribers.lock();
            subs.iter()
                .position(|s| s.id == id)
                .map(|idx| subs.remove(idx))
        };
        match removed {
            Some(sub) => {
                finish(sub);
                log::debug!("sonata: subscriber {} removed", id.0);
                true
            }
            None => false,
        }
    }

    /// Deliver `event` to every live subscriber. Never fails.
    pub fn publish(&self, event: PlayerEvent) {
        let mut subs = self.subscribers.lock();
        subs.retain(|sub| {
            if sub.tx.send(event.clone()).is_ok() {
                true
            } else {
                log::debug!("sonata: subscriber {} disconnected, pruning", sub.id.0);
                false
            }
        });
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Drop every subscriber. Receivers see end-of-stream after draining.
    pub fn close(&self) {
        let subs: Vec<Subscriber> = self.subscribers.lock().drain(..).collect();
        for sub in subs {
            finish(sub);
        }
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new()
    }
}

/// Close a subscriber's queue and let its delivery thread run dry.
fn finish(sub: Subscriber) {
    let Subscriber { tx, worker, .. } = sub;
    drop(tx);
    if let Some(handle) = worker {
        // Joining from the delivery thread itself would deadlock.
        if handle.thread().id() != thread::current().id() {
            let _ = handle.join();
        }
    }
}
