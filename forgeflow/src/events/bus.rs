//! In-process publish/subscribe bus with a bounded replay buffer.

use super::{DeliveryMetrics, EventSink};
use crate::core::ProgressEvent;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Handle returned by [`EventBus::attach`], used to detach later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

struct Observer {
    id: SubscriptionId,
    sink: Arc<dyn EventSink>,
}

#[derive(Default)]
struct BusState {
    next_sequence: u64,
    next_subscription: u64,
    buffer: VecDeque<ProgressEvent>,
    observers: Vec<Observer>,
}

/// Fans progress events out to every attached observer.
///
/// The bus keeps the last `capacity` events so that an observer attaching
/// mid-run can rebuild recent history. Replay, registration and publication
/// all happen under one lock, so an observer sees the retained events and
/// then every later event exactly once, in publication order.
///
/// Observers whose delivery fails are dropped silently; publication never
/// fails and never waits on an observer.
pub struct EventBus {
    capacity: usize,
    state: Mutex<BusState>,
    metrics: DeliveryMetrics,
}

impl EventBus {
    /// Creates a bus retaining up to `capacity` recent events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(BusState {
                next_sequence: 1,
                buffer: VecDeque::with_capacity(capacity),
                ..BusState::default()
            }),
            metrics: DeliveryMetrics::default(),
        }
    }

    /// Registers an observer and synchronously replays the retained events to it.
    ///
    /// If the observer fails during replay it is never registered; the
    /// returned id is then simply inert.
    pub fn attach(&self, sink: Arc<dyn EventSink>) -> SubscriptionId {
        let mut state = self.state.lock();
        let id = SubscriptionId(state.next_subscription);
        state.next_subscription += 1;

        for event in &state.buffer {
            if let Err(e) = sink.try_deliver(event) {
                warn!(subscription = %id, error = %e, "Observer failed during replay, dropping");
                self.metrics.record_eviction();
                return id;
            }
            self.metrics.record_delivery();
        }

        debug!(subscription = %id, replayed = state.buffer.len(), "Observer attached");
        state.observers.push(Observer { id, sink });
        id
    }

    /// Publishes an event and returns the sequence number it was given.
    pub fn publish(&self, mut event: ProgressEvent) -> u64 {
        let mut state = self.state.lock();
        let sequence = state.next_sequence;
        state.next_sequence += 1;
        event.sequence = sequence;

        let metrics = &self.metrics;
        metrics.record_publish();
        state.observers.retain(|observer| match observer.sink.try_deliver(&event) {
            Ok(()) => {
                metrics.record_delivery();
                true
            }
            Err(e) => {
                warn!(
                    subscription = %observer.id,
                    error = %e,
                    sequence,
                    "Dropping observer after failed delivery"
                );
                metrics.record_eviction();
                false
            }
        });

        state.buffer.push_back(event);
        while state.buffer.len() > self.capacity {
            state.buffer.pop_front();
        }
        sequence
    }

    /// Removes an observer. Returns false if it was not attached.
    pub fn detach(&self, id: SubscriptionId) -> bool {
        let mut state = self.state.lock();
        let before = state.observers.len();
        state.observers.retain(|o| o.id != id);
        before != state.observers.len()
    }

    /// Empties the replay buffer. Attached observers stay attached.
    pub fn clear(&self) {
        self.state.lock().buffer.clear();
    }

    /// Returns a copy of the retained events, oldest first.
    #[must_use]
    pub fn replay(&self) -> Vec<ProgressEvent> {
        self.state.lock().buffer.iter().cloned().collect()
    }

    /// Returns the number of attached observers.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.state.lock().observers.len()
    }

    /// Returns the replay buffer bound.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the delivery metrics.
    #[must_use]
    pub const fn metrics(&self) -> &DeliveryMetrics {
        &self.metrics
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("EventBus")
            .field("capacity", &self.capacity)
            .field("retained", &state.buffer.len())
            .field("observers", &state.observers.len())
            .finish()
    }
}
