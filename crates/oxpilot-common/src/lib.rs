//! Shared data model for the oxpilot storage autoscaler.
//!
//! Policy documents, telemetry vectors, and the status-event surface used by
//! every other crate in the workspace live here so that the provider,
//! probation, action, and engine crates only depend on each other through
//! these types.

pub mod events;
pub mod metrics;
pub mod types;
