//! Utility functions for identifiers, timestamps and output paths.

pub mod naming;
pub mod timestamps;

pub use naming::{output_dir_name, sanitize_name};
pub use timestamps::{format_iso, now_utc, Timestamp};

use uuid::Uuid;

/// Generates a new UUID v4.
#[must_use]
pub fn generate_uuid() -> Uuid {
    Uuid::new_v4()
}
