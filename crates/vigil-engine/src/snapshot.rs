use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use serde_json::json;

use vigil_common::types::{DetectedEvent, Policy};
use vigil_metrics::{query, MetricBackend};
use vigil_storage::{AlertRow, EventRow, MonitorStore};

use crate::context::ScanContext;
use crate::error::ScanError;
use crate::lifecycle::ProcessedEvents;

/// Maximum lookback when synthesizing a pre-alert baseline entry.
const MAX_PRE_ALERT_LOOKBACK_DAYS: i64 = 7;

/// Maintains the append-only evidence timeline of each alert.
///
/// Entry types: `pre_alert` (baseline window preceding the alert, added once
/// on the alert's first snapshot) and `event` (one per detection event,
/// deduplicated by event id, never reordered or deleted).
pub struct SnapshotManager<'a> {
    policy: &'a Policy,
    store: &'a dyn MonitorStore,
    backend: &'a dyn MetricBackend,
}

impl<'a> SnapshotManager<'a> {
    pub fn new(
        policy: &'a Policy,
        store: &'a dyn MonitorStore,
        backend: &'a dyn MetricBackend,
    ) -> Self {
        Self { policy, store, backend }
    }

    pub async fn update(
        &self,
        ctx: &ScanContext,
        processed: &ProcessedEvents,
        info_events: &[DetectedEvent],
        now: DateTime<Utc>,
    ) -> Result<(), ScanError> {
        let mut all_active: Vec<&AlertRow> = ctx.active_alerts.iter().collect();
        all_active.extend(processed.new_alerts.iter());
        if all_active.is_empty() {
            return Ok(());
        }

        let has_data = !info_events.is_empty()
            || !processed.rows.is_empty()
            || !processed.new_alerts.is_empty();
        if !has_data {
            return Ok(());
        }

        // instance -> raw payload: event evidence first, info events fill gaps
        let mut raw_map: HashMap<&str, &serde_json::Value> = HashMap::new();
        for event in processed.events.iter().chain(info_events) {
            if let Some(raw) = &event.raw_data {
                raw_map.entry(event.instance_id.as_str()).or_insert(raw);
            }
        }

        let mut event_map: HashMap<&str, Vec<&EventRow>> = HashMap::new();
        for row in &processed.rows {
            event_map.entry(row.instance_id.as_str()).or_default().push(row);
        }

        let new_ids: HashSet<i64> = processed.new_alerts.iter().map(|a| a.id).collect();

        for alert in all_active {
            let related = event_map.get(alert.instance_id.as_str());
            let raw = match raw_map.get(alert.instance_id.as_str()) {
                Some(r) => Some((*r).clone()),
                None => self.fallback_raw_data(ctx, &alert.instance_id).await,
            };
            let is_new = new_ids.contains(&alert.id);
            if related.is_none() && raw.is_none() && !is_new {
                continue;
            }

            let snapshot = self
                .store
                .get_or_create_snapshot(alert.id, self.policy.id, &alert.instance_id)
                .await
                .map_err(|e| ScanError::Snapshot(e.to_string()))?;
            let mut entries = snapshot.entries;
            let mut appended = false;

            if is_new && snapshot.created {
                if let Some(entry) = self
                    .build_pre_alert_entry(ctx, &alert.instance_id, alert.start_event_time, now)
                    .await
                {
                    entries.push(entry);
                    appended = true;
                    tracing::info!(
                        alert_id = alert.id,
                        instance_id = %alert.instance_id,
                        "added pre-alert snapshot entry"
                    );
                }
            }

            if let (Some(related), Some(raw)) = (related, &raw) {
                let mut seen: HashSet<String> = entries
                    .iter()
                    .filter(|e| e["type"] == "event")
                    .filter_map(|e| e["event_id"].as_str().map(str::to_string))
                    .collect();
                for row in related {
                    if seen.contains(&row.id) {
                        continue;
                    }
                    entries.push(json!({
                        "type": "event",
                        "event_id": row.id,
                        "event_time": row.event_time.to_rfc3339(),
                        "snapshot_time": self.policy.last_run_time.to_rfc3339(),
                        "raw_data": raw,
                    }));
                    seen.insert(row.id.clone());
                    appended = true;
                    tracing::debug!(alert_id = alert.id, event_id = %row.id, "added event snapshot entry");
                }
            }

            // only persist when something was actually appended
            if appended {
                self.store
                    .save_snapshot_entries(alert.id, &entries)
                    .await
                    .map_err(|e| ScanError::Snapshot(e.to_string()))?;
                tracing::info!(
                    alert_id = alert.id,
                    total = entries.len(),
                    "saved alert snapshot"
                );
            }
        }

        Ok(())
    }

    /// Raw-data fallback for a pre-existing alert with no event evidence this
    /// run: a plain range query over the policy period.
    async fn fallback_raw_data(
        &self,
        ctx: &ScanContext,
        instance_id: &str,
    ) -> Option<serde_json::Value> {
        let end = self.policy.last_run_time.timestamp();
        let start = end - self.policy.period.as_seconds();
        let step = query::format_step(&self.policy.period, 1);

        let response = match self
            .backend
            .query_range(&ctx.query_expr, start, end, &step)
            .await
        {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(
                    policy_id = self.policy.id,
                    error = %e,
                    "fallback raw-data query failed"
                );
                return None;
            }
        };

        let key = ctx.instance_key();
        response
            .data
            .result
            .iter()
            .find(|s| s.label(key) == Some(instance_id))
            .and_then(|s| serde_json::to_value(s).ok())
    }

    /// Queries the aggregation window immediately preceding the alert's
    /// start time. Skipped silently on query failure, on an empty result,
    /// or when the window falls outside the maximum lookback.
    async fn build_pre_alert_entry(
        &self,
        ctx: &ScanContext,
        instance_id: &str,
        start_event_time: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Option<serde_json::Value> {
        let period_secs = self.policy.period.as_seconds();
        let pre_time = start_event_time - Duration::seconds(period_secs);

        if pre_time < now - Duration::days(MAX_PRE_ALERT_LOOKBACK_DAYS) {
            tracing::warn!(
                policy_id = self.policy.id,
                instance_id,
                "pre-alert window beyond max lookback, skipping"
            );
            return None;
        }

        let end = pre_time.timestamp();
        let start = end - period_secs;
        let step = query::format_step(&self.policy.period, 1);

        let response = match self
            .backend
            .query_aggregate(
                &ctx.query_expr,
                start,
                end,
                &step,
                &ctx.instance_id_keys,
                ctx.aggregate,
            )
            .await
        {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(
                    policy_id = self.policy.id,
                    error = %e,
                    "pre-alert query failed, skipping entry"
                );
                return None;
            }
        };

        let key = ctx.instance_key();
        let series = response
            .data
            .result
            .iter()
            .find(|s| s.label(key) == Some(instance_id))?;

        Some(json!({
            "type": "pre_alert",
            "snapshot_time": pre_time.to_rfc3339(),
            "raw_data": serde_json::to_value(series).ok()?,
        }))
    }
}
