use std::collections::VecDeque;
use std::fmt;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use chrono::{DateTime, Utc};
use futures_util::Stream;
use indexmap::IndexMap;
use parking_lot::Mutex;
use relay_protocol::Event;
use tokio::sync::mpsc;
use tracing::{debug, instrument, trace};

/// How many events a buffer keeps for late-joining viewers.
pub const DEFAULT_CAPACITY: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

type Outbox = mpsc::UnboundedSender<Arc<Event>>;

#[derive(Debug, Default)]
struct BufferState {
    events: VecDeque<Arc<Event>>,
    subscribers: IndexMap<SubscriberId, Outbox>,
    next_subscriber: u64,
    last_at: Option<DateTime<Utc>>,
}

/// Recent events plus the set of live stream subscribers.
///
/// `publish`, `subscribe` and `unsubscribe` run under one lock, so a new
/// subscriber's replay and the live events that follow it form one gap-free,
/// duplicate-free sequence. Nothing awaits while the lock is held.
#[derive(Debug, Clone)]
pub struct EventBuffer {
    state: Arc<Mutex<BufferState>>,
    capacity: usize,
}

impl Default for EventBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(BufferState::default())),
            capacity: capacity.max(1),
        }
    }

    /// Stores `event`, evicting the oldest entries past capacity, and hands it
    /// to every registered subscriber in registration order.
    ///
    /// `at` is raised to the previous event's timestamp if the event was
    /// stamped earlier, keeping the stream non-decreasing in publish order.
    /// Subscribers whose receiving side is gone are dropped from the registry;
    /// delivery to the rest continues.
    #[instrument(
        skip(self, event),
        fields(platform = %event.platform, direction = ?event.direction)
    )]
    pub fn publish(&self, mut event: Event) -> Arc<Event> {
        let mut state = self.state.lock();

        if let Some(last_at) = state.last_at
            && event.at < last_at
        {
            event.at = last_at;
        }
        state.last_at = Some(event.at);

        let event = Arc::new(event);
        state.events.push_back(event.clone());
        while state.events.len() > self.capacity {
            state.events.pop_front();
        }

        let before = state.subscribers.len();
        state
            .subscribers
            .retain(|_, outbox| outbox.send(event.clone()).is_ok());
        let dropped = before - state.subscribers.len();
        if dropped > 0 {
            debug!(dropped, "removed disconnected subscribers");
        }

        trace!(
            buffered = state.events.len(),
            subscribers = state.subscribers.len(),
            "event published"
        );
        event
    }

    /// Registers a subscriber whose stream starts with the current buffer
    /// contents, oldest first, followed by every later publish.
    pub fn subscribe(&self) -> Subscription {
        let (outbox, inbox) = mpsc::unbounded_channel();
        let mut state = self.state.lock();

        let id = SubscriberId(state.next_subscriber);
        state.next_subscriber += 1;

        // The receiver is alive, so queueing the replay cannot fail.
        for event in &state.events {
            let _ = outbox.send(event.clone());
        }
        let replayed = state.events.len();
        state.subscribers.insert(id, outbox);

        debug!(
            subscriber = %id,
            replayed,
            subscribers = state.subscribers.len(),
            "subscriber registered"
        );

        Subscription {
            id,
            replayed,
            inbox,
            registry: Arc::downgrade(&self.state),
        }
    }

    /// Removes a subscriber. Returns whether it was still registered; calling
    /// it again is a no-op.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        deregister(&self.state, id)
    }

    /// Buffered events, oldest first.
    pub fn snapshot(&self) -> Vec<Arc<Event>> {
        self.state.lock().events.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn subscriber_count(&self) -> usize {
        self.state.lock().subscribers.len()
    }
}

fn deregister(state: &Mutex<BufferState>, id: SubscriberId) -> bool {
    let removed = state.lock().subscribers.shift_remove(&id).is_some();
    if removed {
        debug!(subscriber = %id, "subscriber removed");
    }
    removed
}

/// One open stream: the replayed backlog followed by live events.
///
/// Dropping the subscription deregisters it, which is how a closed client
/// connection releases its slot.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    replayed: usize,
    inbox: mpsc::UnboundedReceiver<Arc<Event>>,
    registry: Weak<Mutex<BufferState>>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Number of buffered events queued ahead of live delivery.
    pub fn replayed(&self) -> usize {
        self.replayed
    }

    pub async fn recv(&mut self) -> Option<Arc<Event>> {
        self.inbox.recv().await
    }

    /// Returns an event that is already queued, without waiting.
    pub fn try_recv(&mut self) -> Option<Arc<Event>> {
        self.inbox.try_recv().ok()
    }
}

impl Stream for Subscription {
    type Item = Arc<Event>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inbox.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(state) = self.registry.upgrade() {
            deregister(&state, self.id);
        }
    }
}
