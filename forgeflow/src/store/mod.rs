//! Durable run records.
//!
//! The [`RunRecordStore`] owns every [`RunRecord`](crate::core::RunRecord);
//! a [`RecordPersistence`] backend decides where the collection lives.

mod persistence;
mod records;

pub use persistence::{InMemoryPersistence, JsonFilePersistence, RecordPersistence};
pub use records::RunRecordStore;
