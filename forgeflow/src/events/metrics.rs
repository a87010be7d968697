//! Delivery counters for the event bus.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters describing how the bus is keeping up with its observers.
#[derive(Debug, Default)]
pub struct DeliveryMetrics {
    published: AtomicU64,
    delivered: AtomicU64,
    evicted: AtomicU64,
}

impl DeliveryMetrics {
    /// Records a published event.
    pub fn record_publish(&self) {
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a successful delivery to one observer.
    pub fn record_delivery(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an observer dropped after a failed delivery.
    pub fn record_eviction(&self) {
        self.evicted.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the number of published events.
    #[must_use]
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Returns the number of per-observer deliveries, replays included.
    #[must_use]
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Returns the number of evicted observers.
    #[must_use]
    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }

    /// Converts metrics to a dictionary.
    #[must_use]
    pub fn to_dict(&self) -> serde_json::Value {
        serde_json::json!({
            "published": self.published(),
            "delivered": self.delivered(),
            "evicted": self.evicted(),
        })
    }
}
