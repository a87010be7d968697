//! The control surface.

mod control;
#[cfg(test)]
mod scenario_tests;

pub use control::{Capabilities, GenerationService};
