use crate::error::MetricsError;
use crate::{MetricBackend, MetricResponse};
use async_trait::async_trait;
use std::time::Duration;

/// HTTP client for the VictoriaMetrics range-query API.
pub struct VictoriaMetricsClient {
    base_url: String,
    client: reqwest::Client,
}

impl VictoriaMetricsClient {
    /// `base_url` without a trailing slash, e.g. `http://vm:8428`.
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, MetricsError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[async_trait]
impl MetricBackend for VictoriaMetricsClient {
    async fn query_range(
        &self,
        expr: &str,
        start: i64,
        end: i64,
        step: &str,
    ) -> Result<MetricResponse, MetricsError> {
        let url = format!("{}/api/v1/query_range", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("query", expr.to_string()),
                ("start", start.to_string()),
                ("end", end.to_string()),
                ("step", step.to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MetricsError::BadStatus {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        let parsed: MetricResponse = serde_json::from_str(&body)?;
        tracing::debug!(
            query = expr,
            series = parsed.data.result.len(),
            "range query completed"
        );
        Ok(parsed)
    }
}
