use vigil_metrics::error::MetricsError;

/// Errors raised while scanning one policy.
///
/// `Config` is fatal and aborts the run before any query. `Backend` failures
/// are isolated per evaluation phase (the phase yields empty results), except
/// during scope resolution and the query pre-check, which are critical.
/// `Notification` and `Snapshot` failures are always caught by the
/// orchestrator; the run completes regardless.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    /// The policy configuration is invalid (unknown algorithm, missing
    /// metric definition, ...).
    #[error("Scan: invalid policy configuration: {0}")]
    Config(String),

    /// The metric backend was unreachable or returned a malformed response.
    #[error("Scan: metric backend query failed: {0}")]
    Backend(#[from] MetricsError),

    /// A persistence operation failed.
    #[error("Scan: persistence failed: {0}")]
    Persistence(anyhow::Error),

    /// Notification dispatch bookkeeping failed.
    #[error("Scan: notification dispatch failed: {0}")]
    Notification(String),

    /// Snapshot maintenance failed.
    #[error("Scan: snapshot update failed: {0}")]
    Snapshot(String),
}

/// Convenience `Result` alias for scan operations.
pub type Result<T> = std::result::Result<T, ScanError>;
