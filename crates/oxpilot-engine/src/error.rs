use oxpilot_probation::ProbationError;

/// Errors from the policy controller.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// `start` was called with a zero tick interval.
    #[error("engine: tick interval must be greater than zero")]
    InvalidTickInterval,

    /// The cooldown manager failed to start.
    #[error("engine: probation error: {0}")]
    Probation(#[from] ProbationError),
}

/// Convenience `Result` alias for controller operations.
pub type Result<T> = std::result::Result<T, EngineError>;
