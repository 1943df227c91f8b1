//! Publish/subscribe registry for live-update events.
//!
//! The hub keeps one unbounded queue per connected client. Publishing walks
//! the registry under a mutex and pushes a copy of the event into every
//! queue; pushes never block, and a queue whose receiver is gone is simply
//! skipped for that event.
//!
//! # Lifecycle
//!
//! ```text
//! subscribe() ──▶ Subscription ──(drop)──▶ unsubscribe(id)
//!                     │
//!                     ▼
//!             recv() / into_stream()  ◀── publish(name, data)
//! ```
//!
//! Dropping a [`Subscription`] unregisters it, so a torn-down connection
//! cleans up after itself without the handler doing anything.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use futures_util::stream::{self, Stream};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};

// =============================================================================
// Event
// =============================================================================

/// A named event with a JSON payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    /// Event name, e.g. `processed` or `connected`
    pub name: String,

    /// Arbitrary payload; the hub never inspects it
    pub data: Value,
}

impl Event {
    pub fn new(name: impl Into<String>, data: Value) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    /// Text event-stream framing: `event: NAME\ndata: JSON\n\n`.
    pub fn to_sse_frame(&self) -> String {
        format!("event: {}\ndata: {}\n\n", self.name, self.data)
    }
}

// =============================================================================
// Broadcast Hub
// =============================================================================

/// Identifier of a registered subscriber.
pub type SubscriberId = u64;

struct HubInner {
    subscribers: Mutex<HashMap<SubscriberId, UnboundedSender<Event>>>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl HubInner {
    fn lock(&self) -> MutexGuard<'_, HashMap<SubscriberId, UnboundedSender<Event>>> {
        // A panic while holding the lock cannot leave the map half-updated
        self.subscribers.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn remove(&self, id: SubscriberId) -> bool {
        self.lock().remove(&id).is_some()
    }
}

/// Registry of live subscriber queues.
///
/// Cheap to clone; all clones share the same registry.
#[derive(Clone)]
pub struct BroadcastHub {
    inner: Arc<HubInner>,
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(HubInner {
                subscribers: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Register a new subscriber queue.
    ///
    /// After [`close`](Self::close) the returned subscription is already
    /// ended and is not registered.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);

        // close() flips the flag under this same lock
        let mut subscribers = self.inner.lock();
        if !self.inner.closed.load(Ordering::Acquire) {
            subscribers.insert(id, tx);
            tracing::debug!("Subscriber {} connected", id);
        }
        drop(subscribers);

        Subscription {
            id,
            receiver: rx,
            hub: Arc::downgrade(&self.inner),
            registered: true,
        }
    }

    /// Remove a subscriber. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: SubscriberId) {
        if self.inner.remove(id) {
            tracing::debug!("Subscriber {} disconnected", id);
        }
    }

    /// Push an event to every registered subscriber.
    ///
    /// Returns how many queues accepted it. A queue whose receiver has gone
    /// away misses this event but stays registered until it unsubscribes.
    pub fn publish(&self, name: impl Into<String>, data: Value) -> usize {
        let event = Event::new(name, data);
        let subscribers = self.inner.lock();

        let mut delivered = 0;
        for (id, tx) in subscribers.iter() {
            match tx.send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(_) => tracing::debug!("Subscriber {} missed event {}", id, event.name),
            }
        }
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().len()
    }

    /// Drop every subscriber queue and refuse new registrations.
    ///
    /// Open subscriptions drain what was already queued and then end.
    pub fn close(&self) {
        let dropped = {
            let mut subscribers = self.inner.lock();
            self.inner.closed.store(true, Ordering::Release);
            let count = subscribers.len();
            subscribers.clear();
            count
        };
        tracing::debug!("Broadcast hub closed ({} subscribers dropped)", dropped);
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

// =============================================================================
// Subscription
// =============================================================================

/// One subscriber's receiving end. Unregisters itself when dropped.
pub struct Subscription {
    id: SubscriberId,
    receiver: UnboundedReceiver<Event>,
    hub: Weak<HubInner>,
    registered: bool,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Wait for the next event. `None` once the hub is closed and drained.
    pub async fn recv(&mut self) -> Option<Event> {
        self.receiver.recv().await
    }

    /// Next queued event without waiting.
    pub fn try_recv(&mut self) -> Option<Event> {
        match self.receiver.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Unregister now. Calling it again, or dropping afterwards, is a no-op.
    pub fn unsubscribe(&mut self) {
        if !self.registered {
            return;
        }
        self.registered = false;
        if let Some(hub) = self.hub.upgrade() {
            if hub.remove(self.id) {
                tracing::debug!("Subscriber {} disconnected", self.id);
            }
        }
    }

    /// Turn the subscription into a stream of events.
    pub fn into_stream(self) -> impl Stream<Item = Event> + Send + 'static {
        stream::unfold(self, |mut sub| async move {
            sub.receiver.recv().await.map(|event| (event, sub))
        })
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("registered", &self.registered)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
