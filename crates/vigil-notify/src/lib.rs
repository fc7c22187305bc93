//! Notification dispatch port for the policy evaluation engine.
//!
//! The engine hands finished events to a [`Notifier`]; delivery itself is an
//! external concern. A webhook implementation is provided as the default
//! channel. Dispatch failures are reported through [`SendOutcome`] or
//! [`error::NotifyError`] and are always caught by the engine — a failed
//! notification never fails a scan.

pub mod channels;
pub mod error;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Outcome of one dispatch attempt, mirrored into the event's
/// `notice_result` column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendOutcome {
    pub result: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SendOutcome {
    pub fn ok() -> Self {
        Self { result: true, message: None }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self { result: false, message: Some(message.into()) }
    }
}

/// A notification dispatch target.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Delivers one message to a channel.
    ///
    /// # Errors
    ///
    /// Returns an error only on transport failures; a delivered-but-rejected
    /// message is reported as `SendOutcome { result: false, .. }`.
    async fn send(
        &self,
        channel_id: &str,
        title: &str,
        content: &str,
        recipients: &[String],
    ) -> error::Result<SendOutcome>;
}
