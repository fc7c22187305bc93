//! Monitoring policy evaluation engine.
//!
//! Given a [`vigil_common::types::Policy`] and a window of time-series data,
//! one [`scanner::PolicyScanner`] run classifies monitored instances as
//! abnormal or normal, creates/escalates/recovers alert records, persists
//! detection events with raw-data evidence, dispatches notifications, and
//! appends audit snapshots.
//!
//! The engine talks to its collaborators through ports: the metric backend
//! (`vigil_metrics::MetricBackend`), persistence
//! (`vigil_storage::MonitorStore`), and notification dispatch
//! (`vigil_notify::Notifier`). Scheduling and policy CRUD live outside.

pub mod context;
pub mod error;
pub mod evaluate;
pub mod lifecycle;
pub mod notify;
pub mod record;
pub mod scanner;
pub mod scope;
pub mod snapshot;
pub mod units;

#[cfg(test)]
mod tests;

pub use context::ScanContext;
pub use error::ScanError;
pub use scanner::PolicyScanner;
