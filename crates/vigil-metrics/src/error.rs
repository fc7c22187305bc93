/// Errors from the metric query subsystem.
///
/// `UnknownAlgorithm` and `EmptyPeriod` are configuration errors: the engine
/// raises them before issuing any query. The remaining variants are backend
/// query failures and are isolated per scan phase.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// The policy names an aggregation method that is not in the registry.
    #[error("Metrics: unknown aggregation algorithm '{0}'")]
    UnknownAlgorithm(String),

    /// A query was requested without a period configured.
    #[error("Metrics: policy period is empty")]
    EmptyPeriod,

    /// An HTTP request to the metric backend failed.
    #[error("Metrics: HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend answered with a non-success HTTP status.
    #[error("Metrics: backend returned status {status}: {body}")]
    BadStatus { status: u16, body: String },

    /// The backend response could not be decoded.
    #[error("Metrics: JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience `Result` alias for metric query operations.
pub type Result<T> = std::result::Result<T, MetricsError>;
