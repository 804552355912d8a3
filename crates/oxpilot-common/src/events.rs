//! Status-event surface. Events are fire-and-forget reporting attached to a
//! policy; the control loop never consults them for decisions.

use serde::{Deserialize, Serialize};

/// Severity of a status event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    Normal,
    Warning,
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventType::Normal => write!(f, "Normal"),
            EventType::Warning => write!(f, "Warning"),
        }
    }
}

/// A policy's conditions were met on an object.
pub const REASON_CONDITION_MET: &str = "ConditionMet";
/// A remediation action completed.
pub const REASON_ACTION_TRIGGERED: &str = "ActionTriggered";
/// A remediation action failed.
pub const REASON_ACTION_FAILED: &str = "ActionFailed";
/// A policy could not be evaluated (object resolution failed, malformed
/// configuration).
pub const REASON_EVALUATION_FAILED: &str = "EvaluationFailed";

/// Sink for human-readable status events.
///
/// Implementations must not block: the control loop emits events inline from
/// the evaluation tick.
pub trait EventSink: Send + Sync {
    fn emit(&self, subject: &str, event_type: EventType, reason: &str, message: &str);
}
