use vigil_common::types::{DetectedEvent, Policy};
use vigil_storage::{EventRow, MonitorStore, NewEvent};

use crate::error::ScanError;

/// Persists detection events and their raw-data evidence.
pub struct EventRecorder<'a> {
    policy: &'a Policy,
    store: &'a dyn MonitorStore,
}

impl<'a> EventRecorder<'a> {
    pub fn new(policy: &'a Policy, store: &'a dyn MonitorStore) -> Self {
        Self { policy, store }
    }

    /// Bulk-inserts events (ids generated here) and writes raw payloads one
    /// row at a time — the raw-data store triggers its upload side effect
    /// only on individual saves.
    ///
    /// Events without a resolved alert id are skipped; the returned rows are
    /// aligned with the surviving input events.
    pub async fn persist(&self, events: &[DetectedEvent]) -> Result<Vec<EventRow>, ScanError> {
        if events.is_empty() {
            return Ok(Vec::new());
        }

        let new_events: Vec<NewEvent> = events
            .iter()
            .filter_map(|e| {
                e.alert_id.map(|alert_id| NewEvent {
                    id: vigil_common::id::next_id(),
                    alert_id,
                    policy_id: self.policy.id,
                    instance_id: e.instance_id.clone(),
                    value: e.value,
                    level: e.level.to_string(),
                    content: e.content.clone(),
                    event_time: self.policy.last_run_time,
                })
            })
            .collect();

        let rows = self
            .store
            .insert_events(new_events)
            .await
            .map_err(ScanError::Persistence)?;

        let mut raw_count = 0usize;
        for (event, row) in events.iter().filter(|e| e.alert_id.is_some()).zip(&rows) {
            if let Some(raw) = &event.raw_data {
                self.store
                    .insert_event_raw_data(&row.id, raw)
                    .await
                    .map_err(ScanError::Persistence)?;
                raw_count += 1;
            }
        }
        if raw_count > 0 {
            tracing::info!(
                policy_id = self.policy.id,
                raw_count,
                "created raw data records"
            );
        }

        Ok(rows)
    }
}
