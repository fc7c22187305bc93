use crate::error::{NotifyError, Result};
use crate::{Notifier, SendOutcome};
use async_trait::async_trait;
use std::time::Duration;

/// Webhook dispatch channel: posts one JSON message per send.
pub struct WebhookNotifier {
    endpoint: String,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(endpoint: &str, timeout_secs: u64) -> Result<Self> {
        if endpoint.is_empty() {
            return Err(NotifyError::InvalidConfig("missing webhook endpoint".into()));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            endpoint: endpoint.to_string(),
            client,
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(
        &self,
        channel_id: &str,
        title: &str,
        content: &str,
        recipients: &[String],
    ) -> Result<SendOutcome> {
        let body = serde_json::json!({
            "channel_id": channel_id,
            "title": title,
            "content": content,
            "recipients": recipients,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            tracing::debug!(channel_id, "webhook notification delivered");
            return Ok(SendOutcome::ok());
        }

        let text = response.text().await.unwrap_or_default();
        tracing::warn!(
            channel_id,
            status = status.as_u16(),
            "webhook notification rejected"
        );
        Ok(SendOutcome::failed(format!("status {}: {}", status.as_u16(), text)))
    }
}
