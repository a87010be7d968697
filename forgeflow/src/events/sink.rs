//! Observer sinks that receive progress events from the bus.

use crate::core::{EventPayload, JobId, ProgressEvent};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn, Level};

/// Why a sink could not take an event. Either way the bus evicts it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// The observer is gone.
    #[error("observer disconnected")]
    Closed,
    /// The observer is not keeping up.
    #[error("observer queue full")]
    Full,
}

/// Trait for observers attached to the [`EventBus`](super::EventBus).
///
/// Delivery must not block: the bus calls this while holding its lock, and a
/// slow observer must never stall publication to the others.
pub trait EventSink: Send + Sync {
    /// Hands an event to the observer without waiting.
    fn try_deliver(&self, event: &ProgressEvent) -> Result<(), DeliveryError>;
}

/// A sink that discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

impl EventSink for NoOpEventSink {
    fn try_deliver(&self, _event: &ProgressEvent) -> Result<(), DeliveryError> {
        Ok(())
    }
}

/// A sink that mirrors events into the tracing log.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingEventSink {
    /// Creates a new logging event sink with the specified level.
    #[must_use]
    pub const fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level logging sink.
    #[must_use]
    pub const fn debug() -> Self {
        Self::new(Level::DEBUG)
    }

    fn log_event(&self, event: &ProgressEvent) {
        if let EventPayload::Error { message, artifact } = &event.payload {
            warn!(
                job_id = %event.job_id,
                sequence = event.sequence,
                artifact = ?artifact,
                "Job error: {}", message
            );
            return;
        }
        if self.level == Level::DEBUG {
            debug!(
                job_id = %event.job_id,
                sequence = event.sequence,
                kind = event.kind(),
                payload = ?event.payload,
                "Event: {}", event.kind()
            );
        } else {
            info!(
                job_id = %event.job_id,
                sequence = event.sequence,
                kind = event.kind(),
                payload = ?event.payload,
                "Event: {}", event.kind()
            );
        }
    }
}

impl EventSink for LoggingEventSink {
    fn try_deliver(&self, event: &ProgressEvent) -> Result<(), DeliveryError> {
        self.log_event(event);
        Ok(())
    }
}

/// A sink backed by a bounded tokio channel, for transports such as
/// websocket connections.
///
/// A full queue or a dropped receiver makes the sink report an error, after
/// which the bus drops it.
#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    tx: mpsc::Sender<ProgressEvent>,
}

impl ChannelEventSink {
    /// Creates a sink and the receiver its events arrive on.
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ProgressEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelEventSink {
    fn try_deliver(&self, event: &ProgressEvent) -> Result<(), DeliveryError> {
        self.tx.try_send(event.clone()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::Full,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }
}

/// A collecting event sink for testing purposes.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: RwLock<Vec<ProgressEvent>>,
    closed: AtomicBool,
}

impl CollectingEventSink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.read().clone()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if no events have been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Clears all collected events.
    pub fn clear(&self) {
        self.events.write().clear();
    }

    /// Returns events of one kind (`"progress"`, `"error"`, ...).
    #[must_use]
    pub fn events_of_kind(&self, kind: &str) -> Vec<ProgressEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.kind() == kind)
            .cloned()
            .collect()
    }

    /// Returns the events of a single job.
    #[must_use]
    pub fn events_for(&self, job_id: JobId) -> Vec<ProgressEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.job_id == job_id)
            .cloned()
            .collect()
    }

    /// Makes every later delivery fail as if the observer disconnected.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

impl EventSink for CollectingEventSink {
    fn try_deliver(&self, event: &ProgressEvent) -> Result<(), DeliveryError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DeliveryError::Closed);
        }
        self.events.write().push(event.clone());
        Ok(())
    }
}
