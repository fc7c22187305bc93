//! Persistence layer for the policy evaluation engine.
//!
//! The engine consumes storage through the [`MonitorStore`] trait; the
//! default implementation ([`store::SqlMonitorStore`]) uses SeaORM over
//! SQLite or PostgreSQL with schema migrations applied on connect.
//! Raw time-series data is not stored here — it stays behind the metric
//! backend port in `vigil-metrics`.

pub mod entities;
pub mod store;


use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use store::{
    AlertEscalation, AlertRow, EventRow, InstanceRow, MetricRow, NewAlert, NewEvent,
    SnapshotRow, SqlMonitorStore,
};

/// Persistence port consumed by the policy evaluation engine.
///
/// Implementations must be safe to share across threads (`Send + Sync`);
/// distinct policies may be scanned concurrently.
///
/// Bulk alert creation must never assume the backend echoes generated ids:
/// [`MonitorStore::create_alerts`] returns the created rows by requerying on
/// the natural key (policy, instance set, start_event_time, status=new).
#[async_trait]
pub trait MonitorStore: Send + Sync {
    /// Instances of a monitored object type among `ids`, deleted ones excluded.
    async fn instances_by_ids(
        &self,
        monitor_object_id: i64,
        ids: &[String],
    ) -> Result<Vec<InstanceRow>>;

    /// Instances of a monitored object type whose organization membership
    /// intersects `organizations`.
    async fn instances_by_organizations(
        &self,
        monitor_object_id: i64,
        organizations: &[String],
    ) -> Result<Vec<InstanceRow>>;

    /// Looks up a metric definition by id.
    async fn metric_by_id(&self, id: &str) -> Result<Option<MetricRow>>;

    /// Alerts with `status = new` for a policy, optionally restricted to a
    /// set of instance ids.
    async fn active_alerts(
        &self,
        policy_id: i64,
        instance_ids: Option<&[String]>,
    ) -> Result<Vec<AlertRow>>;

    /// Bulk-creates alerts and returns the created rows with their ids.
    async fn create_alerts(&self, alerts: Vec<NewAlert>) -> Result<Vec<AlertRow>>;

    /// Applies level/value/content escalation updates to existing alerts.
    async fn update_alert_escalations(&self, updates: Vec<AlertEscalation>) -> Result<()>;

    /// Increments `info_event_count` by one for the given alerts.
    async fn increment_info_count(&self, alert_ids: &[i64]) -> Result<u64>;

    /// Resets `info_event_count` to zero for the given alerts.
    async fn reset_info_count(&self, alert_ids: &[i64]) -> Result<u64>;

    /// Recovers alerts among `alert_ids` whose `info_event_count` reached
    /// `recovery_condition`. Returns the number of recovered rows.
    async fn recover_threshold_alerts(
        &self,
        alert_ids: &[i64],
        recovery_condition: i32,
        end_time: DateTime<Utc>,
    ) -> Result<u64>;

    /// Recovers active no-data alerts of a policy for instances whose data
    /// reappeared. Returns the number of recovered rows.
    async fn recover_no_data_alerts(
        &self,
        policy_id: i64,
        instance_ids: &[String],
        end_time: DateTime<Utc>,
    ) -> Result<u64>;

    /// Bulk-inserts detection events.
    async fn insert_events(&self, events: Vec<NewEvent>) -> Result<Vec<EventRow>>;

    /// Persists one raw-data payload for one event. Must stay a per-record
    /// write: backing stores may trigger side effects only on individual
    /// saves.
    async fn insert_event_raw_data(
        &self,
        event_id: &str,
        data: &serde_json::Value,
    ) -> Result<()>;

    /// Records notification dispatch outcomes onto event rows.
    async fn set_event_notice_results(&self, results: Vec<(String, String)>) -> Result<()>;

    /// Fetches the snapshot row of an alert, creating an empty one if absent.
    async fn get_or_create_snapshot(
        &self,
        alert_id: i64,
        policy_id: i64,
        instance_id: &str,
    ) -> Result<SnapshotRow>;

    /// Saves the full (append-only) snapshot entry list of an alert.
    async fn save_snapshot_entries(
        &self,
        alert_id: i64,
        entries: &[serde_json::Value],
    ) -> Result<()>;
}

#[async_trait]
impl MonitorStore for SqlMonitorStore {
    async fn instances_by_ids(
        &self,
        monitor_object_id: i64,
        ids: &[String],
    ) -> Result<Vec<InstanceRow>> {
        SqlMonitorStore::instances_by_ids(self, monitor_object_id, ids).await
    }

    async fn instances_by_organizations(
        &self,
        monitor_object_id: i64,
        organizations: &[String],
    ) -> Result<Vec<InstanceRow>> {
        SqlMonitorStore::instances_by_organizations(self, monitor_object_id, organizations).await
    }

    async fn metric_by_id(&self, id: &str) -> Result<Option<MetricRow>> {
        SqlMonitorStore::metric_by_id(self, id).await
    }

    async fn active_alerts(
        &self,
        policy_id: i64,
        instance_ids: Option<&[String]>,
    ) -> Result<Vec<AlertRow>> {
        SqlMonitorStore::active_alerts(self, policy_id, instance_ids).await
    }

    async fn create_alerts(&self, alerts: Vec<NewAlert>) -> Result<Vec<AlertRow>> {
        SqlMonitorStore::create_alerts(self, alerts).await
    }

    async fn update_alert_escalations(&self, updates: Vec<AlertEscalation>) -> Result<()> {
        SqlMonitorStore::update_alert_escalations(self, updates).await
    }

    async fn increment_info_count(&self, alert_ids: &[i64]) -> Result<u64> {
        SqlMonitorStore::increment_info_count(self, alert_ids).await
    }

    async fn reset_info_count(&self, alert_ids: &[i64]) -> Result<u64> {
        SqlMonitorStore::reset_info_count(self, alert_ids).await
    }

    async fn recover_threshold_alerts(
        &self,
        alert_ids: &[i64],
        recovery_condition: i32,
        end_time: DateTime<Utc>,
    ) -> Result<u64> {
        SqlMonitorStore::recover_threshold_alerts(self, alert_ids, recovery_condition, end_time)
            .await
    }

    async fn recover_no_data_alerts(
        &self,
        policy_id: i64,
        instance_ids: &[String],
        end_time: DateTime<Utc>,
    ) -> Result<u64> {
        SqlMonitorStore::recover_no_data_alerts(self, policy_id, instance_ids, end_time).await
    }

    async fn insert_events(&self, events: Vec<NewEvent>) -> Result<Vec<EventRow>> {
        SqlMonitorStore::insert_events(self, events).await
    }

    async fn insert_event_raw_data(
        &self,
        event_id: &str,
        data: &serde_json::Value,
    ) -> Result<()> {
        SqlMonitorStore::insert_event_raw_data(self, event_id, data).await
    }

    async fn set_event_notice_results(&self, results: Vec<(String, String)>) -> Result<()> {
        SqlMonitorStore::set_event_notice_results(self, results).await
    }

    async fn get_or_create_snapshot(
        &self,
        alert_id: i64,
        policy_id: i64,
        instance_id: &str,
    ) -> Result<SnapshotRow> {
        SqlMonitorStore::get_or_create_snapshot(self, alert_id, policy_id, instance_id).await
    }

    async fn save_snapshot_entries(
        &self,
        alert_id: i64,
        entries: &[serde_json::Value],
    ) -> Result<()> {
        SqlMonitorStore::save_snapshot_entries(self, alert_id, entries).await
    }
}
