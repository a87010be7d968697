//! Progress event fan-out.
//!
//! This module provides the [`EventBus`] that the pipeline publishes to and
//! the [`EventSink`] observers that transports, loggers and tests attach.

mod bus;
mod metrics;
mod sink;

pub use bus::{EventBus, SubscriptionId};
pub use metrics::DeliveryMetrics;
pub use sink::{
    ChannelEventSink, CollectingEventSink, DeliveryError, EventSink, LoggingEventSink,
    NoOpEventSink,
};
