//! Metric backend port and VictoriaMetrics client.
//!
//! The policy engine consumes time-series data through the [`MetricBackend`]
//! trait; [`client::VictoriaMetricsClient`] is the HTTP implementation.
//! Aggregation methods are a fixed registry ([`aggregate::Aggregate`]) keyed
//! by the policy's algorithm name.

pub mod aggregate;
pub mod client;
pub mod error;
pub mod query;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::aggregate::Aggregate;
use crate::error::MetricsError;

/// One series of a range/aggregate query result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricSeries {
    #[serde(default)]
    pub metric: HashMap<String, String>,
    /// `[timestamp, value-as-string]` pairs, oldest first.
    #[serde(default)]
    pub values: Vec<(f64, String)>,
}

impl MetricSeries {
    pub fn label(&self, key: &str) -> Option<&str> {
        self.metric.get(key).map(String::as_str)
    }

    /// Latest sample parsed as a float, if present and parseable.
    pub fn last_value(&self) -> Option<f64> {
        self.values.last().and_then(|(_, v)| v.parse().ok())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricData {
    #[serde(default)]
    pub result: Vec<MetricSeries>,
}

/// Range-query response shape shared by VictoriaMetrics and Prometheus.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub data: MetricData,
}

/// Time-series query backend consumed by the policy engine.
///
/// Implementations must bound every call with their own timeout; the engine
/// adds no waits and no retries on top.
#[async_trait]
pub trait MetricBackend: Send + Sync {
    /// Executes a raw range query.
    async fn query_range(
        &self,
        expr: &str,
        start: i64,
        end: i64,
        step: &str,
    ) -> Result<MetricResponse, MetricsError>;

    /// Executes an aggregated range query, grouping series by `group_by`
    /// labels using the given aggregation method.
    async fn query_aggregate(
        &self,
        expr: &str,
        start: i64,
        end: i64,
        step: &str,
        group_by: &[String],
        aggregate: Aggregate,
    ) -> Result<MetricResponse, MetricsError> {
        let wrapped = aggregate.wrap_expr(expr, step, group_by);
        self.query_range(&wrapped, start, end, step).await
    }
}
