/// Errors from action dispatch.
///
/// Unknown object type and unsupported action type are distinct variants so
/// callers can log them differently.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    /// The action name does not match `<objectType>/<actionType>` with
    /// exactly one `/`.
    #[error("action: malformed action name '{0}'")]
    MalformedActionName(String),

    /// No executor is registered for the object type.
    #[error("action: no executor for object type '{0}'")]
    UnsupportedObjectType(String),

    /// The object type is known but does not support the action type.
    #[error("action: object type '{object_type}' does not support action '{action_type}'")]
    UnsupportedActionType {
        object_type: String,
        action_type: String,
    },

    /// Looking up the claim behind a volume failed.
    #[error("action: claim lookup for volume '{volume}' failed")]
    Claim {
        volume: String,
        #[source]
        source: anyhow::Error,
    },

    /// Submitting the capacity update failed.
    #[error("action: capacity update for claim '{claim}' failed")]
    Mutation {
        claim: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Convenience `Result` alias for action operations.
pub type Result<T> = std::result::Result<T, ActionError>;
