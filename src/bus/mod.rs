//! In-process event bus.
//!
//! Publishing synchronously drains the queue: the first publisher on
//! the call stack becomes the drainer, and events published from
//! inside a handler are enqueued and picked up by the same drain loop
//! instead of recursing. Two backends are available, selected at
//! construction: a priority heap (lower value dispatches first, FIFO
//! within a class) or a bounded FIFO buffer with an overflow policy.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::config::EventBusConfig;
use crate::queue::{BoundedBuffer, PriorityQueue};
use crate::types::{Event, PublishOpts, SubscriptionId};

/// A subscription topic: either an exact event type or a `*` wildcard
/// matching everything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Topic {
    Exact(String),
    Wildcard,
}

impl Topic {
    pub fn parse(pattern: &str) -> Self {
        if pattern == "*" {
            Topic::Wildcard
        } else {
            Topic::Exact(pattern.to_string())
        }
    }

    pub fn matches(&self, event_type: &str) -> bool {
        match self {
            Topic::Wildcard => true,
            Topic::Exact(topic) => topic == event_type,
        }
    }
}

/// An event handler. Handlers run synchronously inside the drain loop
/// and must not block.
pub type EventHandler = Arc<dyn Fn(&Event) + Send + Sync>;

struct Subscription {
    id: SubscriptionId,
    topic: Topic,
    handler: EventHandler,
}

enum BusBackend {
    Priority(PriorityQueue<Event>),
    Fifo(BoundedBuffer<Event>),
}

struct BusInner {
    backend: BusBackend,
    subscriptions: Vec<Subscription>,
    next_event_id: u64,
    /// True while a drain loop is running on some call stack.
    draining: bool,
    published: u64,
    dispatched: u64,
}

/// Counters snapshot for the bus.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BusStats {
    pub published: u64,
    pub dispatched: u64,
    pub dropped: u64,
    pub pending: usize,
    pub subscriptions: usize,
}

pub struct EventBus {
    inner: Mutex<BusInner>,
    default_priority: u8,
}

impl EventBus {
    /// Bus backed by the priority heap.
    pub fn priority(config: &EventBusConfig) -> Self {
        Self::with_backend(
            BusBackend::Priority(PriorityQueue::new()),
            config.default_priority,
        )
    }

    /// Bus backed by the bounded FIFO buffer.
    pub fn fifo(config: &EventBusConfig) -> Self {
        let buffer = BoundedBuffer::new(config.fifo_capacity, config.fifo_overflow);
        Self::with_backend(BusBackend::Fifo(buffer), config.default_priority)
    }

    fn with_backend(backend: BusBackend, default_priority: u8) -> Self {
        Self {
            inner: Mutex::new(BusInner {
                backend,
                subscriptions: Vec::new(),
                next_event_id: 1,
                draining: false,
                published: 0,
                dispatched: 0,
            }),
            default_priority,
        }
    }

    /// Register a handler for `pattern` (an event type, or `*`).
    pub fn subscribe(&self, pattern: &str, handler: EventHandler) -> SubscriptionId {
        let id = SubscriptionId::generate();
        let mut inner = self.inner.lock().unwrap();
        inner.subscriptions.push(Subscription {
            id,
            topic: Topic::parse(pattern),
            handler,
        });
        debug!(subscription = %id, pattern, "subscribed");
        id
    }

    /// Remove a subscription. Returns false if the id was not found.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.subscriptions.len();
        inner.subscriptions.retain(|s| s.id != id);
        inner.subscriptions.len() < before
    }

    /// Publish an event with default options.
    pub fn publish(&self, event_type: &str, payload: Value) {
        self.publish_with(event_type, payload, PublishOpts::default());
    }

    /// Publish an event with explicit priority/source/correlation
    /// options, then drain unless a drain is already in progress.
    pub fn publish_with(&self, event_type: &str, payload: Value, opts: PublishOpts) {
        let already_draining = {
            let mut inner = self.inner.lock().unwrap();
            let id = inner.next_event_id;
            inner.next_event_id += 1;
            let event = Event {
                id,
                event_type: event_type.to_string(),
                payload,
                priority: opts.priority.unwrap_or(self.default_priority),
                timestamp: Utc::now(),
                source: opts.source,
                correlation_id: opts.correlation_id,
                metadata: opts.metadata,
            };

            let priority = event.priority;
            let accepted = match &mut inner.backend {
                BusBackend::Priority(queue) => {
                    queue.enqueue(event, priority);
                    true
                }
                BusBackend::Fifo(buffer) => buffer.push(event),
            };
            if accepted {
                inner.published += 1;
            } else {
                warn!(event_type, "event dropped by overflow policy");
            }

            inner.draining
        };

        if !already_draining {
            self.drain();
        }
    }

    /// Dispatch queued events until the queue is empty. Handlers run
    /// outside the bus lock so they may publish and subscribe freely.
    fn drain(&self) {
        {
            let mut inner = self.inner.lock().unwrap();
            if inner.draining {
                return;
            }
            inner.draining = true;
        }

        loop {
            let step = {
                let mut inner = self.inner.lock().unwrap();
                let next = match &mut inner.backend {
                    BusBackend::Priority(queue) => queue.dequeue(),
                    BusBackend::Fifo(buffer) => buffer.pop(),
                };
                match next {
                    Some(event) => {
                        inner.dispatched += 1;
                        let handlers: Vec<EventHandler> = inner
                            .subscriptions
                            .iter()
                            .filter(|s| s.topic.matches(&event.event_type))
                            .map(|s| Arc::clone(&s.handler))
                            .collect();
                        Some((event, handlers))
                    }
                    None => {
                        inner.draining = false;
                        None
                    }
                }
            };

            let Some((event, handlers)) = step else {
                break;
            };
            trace!(event_type = %event.event_type, handlers = handlers.len(), "dispatching");
            for handler in handlers {
                handler(&event);
            }
        }
    }

    /// Number of events waiting in the queue.
    pub fn pending(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        match &inner.backend {
            BusBackend::Priority(queue) => queue.len(),
            BusBackend::Fifo(buffer) => buffer.len(),
        }
    }

    pub fn stats(&self) -> BusStats {
        let inner = self.inner.lock().unwrap();
        let (pending, dropped) = match &inner.backend {
            BusBackend::Priority(queue) => (queue.len(), 0),
            BusBackend::Fifo(buffer) => (buffer.len(), buffer.stats().overflowed),
        };
        BusStats {
            published: inner.published,
            dispatched: inner.dispatched,
            dropped,
            pending,
            subscriptions: inner.subscriptions.len(),
        }
    }

    /// Discard queued events and all subscriptions.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        match &mut inner.backend {
            BusBackend::Priority(queue) => queue.clear(),
            BusBackend::Fifo(buffer) => buffer.clear(),
        }
        inner.subscriptions.clear();
    }
}
