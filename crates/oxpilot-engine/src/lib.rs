//! The oxpilot policy controller.
//!
//! Owns the authoritative in-memory policy index, runs the periodic
//! evaluation loop that joins policies to metrics providers, and sequences
//! condition matching, cooldown checks, and action dispatch.

pub mod controller;
pub mod error;
pub mod evaluator;
pub mod events;

#[cfg(test)]
mod tests;

pub use controller::PolicyController;
pub use error::{EngineError, Result};
pub use events::LogEventSink;
