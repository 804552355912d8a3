/// Errors from the probation manager.
#[derive(Debug, thiserror::Error)]
pub enum ProbationError {
    /// The key is already held and the caller asked not to replace it.
    #[error("probation: key '{0}' is already in probation")]
    AlreadyInProbation(String),
}

/// Convenience `Result` alias for probation operations.
pub type Result<T> = std::result::Result<T, ProbationError>;
