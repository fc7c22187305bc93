use std::collections::BTreeMap;
use std::str::FromStr;

use vigil_common::types::{Policy, QueryCondition};
use vigil_metrics::aggregate::Aggregate;
use vigil_metrics::query;
use vigil_storage::{AlertRow, MonitorStore};

use crate::error::ScanError;
use crate::scope::InstanceScopeResolver;

/// Immutable per-run view of a policy scan.
///
/// Built once at run start and passed by reference through the phases, so a
/// reused orchestrator can never observe stale scope or alert state from a
/// previous run.
pub struct ScanContext {
    /// `instance_id -> instance_name`; empty means unconstrained when the
    /// policy has no source.
    pub scope: BTreeMap<String, String>,
    /// Alerts with `status = new` at run start, scope-filtered when the
    /// policy has a source.
    pub active_alerts: Vec<AlertRow>,
    /// Labels whose values identify an instance in query results.
    pub instance_id_keys: Vec<String>,
    /// Fully-rendered query expression.
    pub query_expr: String,
    /// Metric display name for content templates; empty for raw queries.
    pub metric_name: String,
    pub aggregate: Aggregate,
}

impl ScanContext {
    /// Builds the run context: scope resolution, query pre-check, algorithm
    /// lookup, and the active-alert snapshot.
    ///
    /// Returns `Ok(None)` when the policy has a configured source that
    /// resolves to no instances — the entire scan (including no-data
    /// detection) is skipped in that case.
    pub async fn build(
        policy: &Policy,
        store: &dyn MonitorStore,
    ) -> Result<Option<ScanContext>, ScanError> {
        let scope = InstanceScopeResolver::new(store).resolve(policy).await?;
        if policy.source.is_some() && scope.is_empty() {
            return Ok(None);
        }

        let (query_expr, instance_id_keys, metric_name) = resolve_query(policy, store).await?;
        let aggregate = Aggregate::from_str(&policy.algorithm)
            .map_err(|e| ScanError::Config(e.to_string()))?;

        let scope_ids: Vec<String> = scope.keys().cloned().collect();
        let scoped = policy.source.is_some().then_some(scope_ids.as_slice());
        let active_alerts = store
            .active_alerts(policy.id, scoped)
            .await
            .map_err(ScanError::Persistence)?;

        Ok(Some(ScanContext {
            scope,
            active_alerts,
            instance_id_keys,
            query_expr,
            metric_name,
            aggregate,
        }))
    }

    /// The label whose value is the instance id in query results.
    pub fn instance_key(&self) -> &str {
        self.instance_id_keys
            .first()
            .map(String::as_str)
            .unwrap_or("instance_id")
    }
}

async fn resolve_query(
    policy: &Policy,
    store: &dyn MonitorStore,
) -> Result<(String, Vec<String>, String), ScanError> {
    match &policy.query_condition {
        QueryCondition::Pmq { query, instance_id_keys } => {
            // trap collection reports under the "source" label
            let keys = if policy.collect_type == "trap" {
                vec!["source".to_string()]
            } else if instance_id_keys.is_empty() {
                vec!["instance_id".to_string()]
            } else {
                instance_id_keys.clone()
            };
            Ok((query.clone(), keys, String::new()))
        }
        QueryCondition::Metric { metric_id, filter } => {
            let metric = store
                .metric_by_id(metric_id)
                .await
                .map_err(ScanError::Persistence)?
                .ok_or_else(|| {
                    ScanError::Config(format!("metric does not exist [{metric_id}]"))
                })?;
            let filter_str = query::render_label_filter(filter);
            let expr = query::apply_label_template(&metric.query, &filter_str);
            Ok((expr, metric.instance_id_keys, metric.name))
        }
    }
}
