/// Errors from the metrics provider layer.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// No provider type is registered under the requested name.
    #[error("metrics: unknown provider '{0}' (missing registration?)")]
    UnknownProvider(String),

    /// Provider configuration is missing a required param or holds an
    /// invalid value.
    #[error("metrics: invalid provider configuration: {0}")]
    InvalidConfig(String),

    /// The backend reported a query error.
    #[error("metrics: backend error: {error_type}: {message}")]
    Backend { error_type: String, message: String },

    /// The backend answered with a non-success HTTP status.
    #[error("metrics: query returned HTTP status {0}")]
    UnexpectedStatus(u16),

    /// The backend response could not be interpreted.
    #[error("metrics: invalid response payload: {0}")]
    InvalidPayload(String),

    /// An HTTP request to the backend failed.
    #[error("metrics: HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON decoding of the backend response failed.
    #[error("metrics: JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience `Result` alias for provider operations.
pub type Result<T> = std::result::Result<T, MetricsError>;
