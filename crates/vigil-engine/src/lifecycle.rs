use std::collections::{BTreeSet, HashMap};

use vigil_common::types::{AlertLevel, AlertType, DetectedEvent, EventKind, Policy};
use vigil_storage::{AlertEscalation, AlertRow, EventRow, MonitorStore, NewAlert};

use crate::context::ScanContext;
use crate::error::ScanError;
use crate::record::EventRecorder;

/// Output of lifecycle processing; `events[i]` corresponds to `rows[i]`.
#[derive(Debug, Default)]
pub struct ProcessedEvents {
    pub events: Vec<DetectedEvent>,
    pub rows: Vec<EventRow>,
    pub new_alerts: Vec<AlertRow>,
}

/// Drives the per-alert state machine: (absent) -> new -> recovered.
///
/// The threshold and no-data tracks run independently per alert type; an
/// instance may hold one active alert of each type at a time, never two of
/// the same type.
pub struct AlertLifecycleManager<'a> {
    policy: &'a Policy,
    store: &'a dyn MonitorStore,
}

impl<'a> AlertLifecycleManager<'a> {
    pub fn new(policy: &'a Policy, store: &'a dyn MonitorStore) -> Self {
        Self { policy, store }
    }

    /// Partitions events into new-alert vs existing-alert, creates alert
    /// records for the former, persists all events with resolved alert ids,
    /// and escalates existing alerts whose event outranks them.
    pub async fn process(
        &self,
        events: Vec<DetectedEvent>,
        ctx: &ScanContext,
    ) -> Result<ProcessedEvents, ScanError> {
        if events.is_empty() {
            return Ok(ProcessedEvents::default());
        }

        let active_map: HashMap<(String, &str), &AlertRow> = ctx
            .active_alerts
            .iter()
            .map(|a| ((a.alert_type.clone(), a.instance_id.as_str()), a))
            .collect();

        let mut fresh = Vec::new();
        let mut existing = Vec::new();
        for mut event in events {
            let key = (event.kind.alert_type().to_string(), event.instance_id.clone());
            if let Some(alert) = active_map.get(&(key.0.clone(), key.1.as_str())) {
                event.alert_id = Some(alert.id);
                existing.push(event);
            } else {
                fresh.push(event);
            }
        }

        let new_alerts = if fresh.is_empty() {
            Vec::new()
        } else {
            self.create_alerts(&mut fresh, ctx).await?
        };

        let escalations = self.build_escalations(&existing, &active_map);

        let mut all: Vec<DetectedEvent> = fresh;
        all.extend(existing);
        let dropped = all.iter().filter(|e| e.alert_id.is_none()).count();
        if dropped > 0 {
            tracing::warn!(
                policy_id = self.policy.id,
                dropped,
                "filtered out events without alert_id"
            );
        }
        all.retain(|e| e.alert_id.is_some());

        let rows = EventRecorder::new(self.policy, self.store).persist(&all).await?;

        if !escalations.is_empty() {
            let upgraded = escalations.len();
            self.store
                .update_alert_escalations(escalations)
                .await
                .map_err(ScanError::Persistence)?;
            tracing::info!(
                policy_id = self.policy.id,
                upgraded,
                "updated alerts with higher severity levels"
            );
        }

        Ok(ProcessedEvents { events: all, rows, new_alerts })
    }

    /// Single alert-construction path for both alert types.
    fn build_alert(&self, event: &DetectedEvent, ctx: &ScanContext) -> NewAlert {
        let instance_name = ctx
            .scope
            .get(&event.instance_id)
            .cloned()
            .unwrap_or_else(|| event.instance_id.clone());

        let (alert_type, level, value) = match event.kind {
            EventKind::Threshold => (AlertType::Alert, event.level, event.value),
            EventKind::NoData => (AlertType::NoData, self.policy.no_data_level, None),
        };

        NewAlert {
            policy_id: self.policy.id,
            instance_id: event.instance_id.clone(),
            instance_name,
            alert_type: alert_type.to_string(),
            level: level.to_string(),
            value,
            content: event.content.clone(),
            start_event_time: self.policy.last_run_time,
        }
    }

    async fn create_alerts(
        &self,
        fresh: &mut [DetectedEvent],
        ctx: &ScanContext,
    ) -> Result<Vec<AlertRow>, ScanError> {
        let new_alerts = fresh.iter().map(|e| self.build_alert(e, ctx)).collect();
        let created = self
            .store
            .create_alerts(new_alerts)
            .await
            .map_err(ScanError::Persistence)?;

        if created.len() != fresh.len() {
            tracing::error!(
                policy_id = self.policy.id,
                expected = fresh.len(),
                got = created.len(),
                "alert creation count mismatch"
            );
        }

        let id_map: HashMap<(&str, &str), i64> = created
            .iter()
            .map(|a| ((a.alert_type.as_str(), a.instance_id.as_str()), a.id))
            .collect();

        for event in fresh.iter_mut() {
            let key = (event.kind.alert_type(), event.instance_id.clone());
            match id_map.get(&(key.0.to_string().as_str(), key.1.as_str())) {
                Some(id) => event.alert_id = Some(*id),
                None => {
                    tracing::error!(
                        policy_id = self.policy.id,
                        instance_id = %event.instance_id,
                        "failed to resolve created alert for event"
                    );
                }
            }
        }

        tracing::info!(
            policy_id = self.policy.id,
            created = created.len(),
            "created new alerts"
        );
        Ok(created)
    }

    fn build_escalations(
        &self,
        existing: &[DetectedEvent],
        active_map: &HashMap<(String, &str), &AlertRow>,
    ) -> Vec<AlertEscalation> {
        let mut updates = Vec::new();
        for event in existing {
            // no-data events carry no severity signal
            if event.kind == EventKind::NoData {
                continue;
            }
            let key = (
                event.kind.alert_type().to_string(),
                event.instance_id.as_str(),
            );
            let Some(alert) = active_map.get(&key) else { continue };

            if event.level.weight() > AlertLevel::weight_of(&alert.level) {
                tracing::debug!(
                    alert_id = alert.id,
                    from = %alert.level,
                    to = %event.level,
                    "upgrading alert level"
                );
                updates.push(AlertEscalation {
                    alert_id: alert.id,
                    level: event.level.to_string(),
                    value: event.value,
                    content: event.content.clone(),
                });
            }
        }
        updates
    }

    /// Updates per-alert info counters: instances producing only a normal
    /// event this run count up, instances producing an abnormal event reset.
    pub async fn count_events(
        &self,
        alert_events: &[DetectedEvent],
        info_events: &[DetectedEvent],
        active_alerts: &[AlertRow],
    ) -> Result<(), ScanError> {
        let alerts_map: HashMap<&str, i64> = active_alerts
            .iter()
            .filter(|a| a.alert_type == AlertType::Alert.to_string())
            .map(|a| (a.instance_id.as_str(), a.id))
            .collect();

        let info_ids: Vec<i64> = info_events
            .iter()
            .filter_map(|e| alerts_map.get(e.instance_id.as_str()).copied())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let abnormal_ids: Vec<i64> = alert_events
            .iter()
            .filter_map(|e| alerts_map.get(e.instance_id.as_str()).copied())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        self.store
            .increment_info_count(&info_ids)
            .await
            .map_err(ScanError::Persistence)?;
        self.store
            .reset_info_count(&abnormal_ids)
            .await
            .map_err(ScanError::Persistence)?;
        Ok(())
    }

    /// Recovers threshold alerts that reached the recovery condition.
    /// A condition of zero disables auto-recovery permanently.
    pub async fn recover_threshold(&self, active_alerts: &[AlertRow]) -> Result<(), ScanError> {
        if self.policy.recovery_condition == 0 {
            return Ok(());
        }
        let ids: Vec<i64> = active_alerts
            .iter()
            .filter(|a| a.alert_type == AlertType::Alert.to_string())
            .map(|a| a.id)
            .collect();

        let recovered = self
            .store
            .recover_threshold_alerts(
                &ids,
                self.policy.recovery_condition as i32,
                self.policy.last_run_time,
            )
            .await
            .map_err(ScanError::Persistence)?;
        if recovered > 0 {
            tracing::info!(policy_id = self.policy.id, recovered, "recovered threshold alerts");
        }
        Ok(())
    }

    /// Recovers no-data alerts for instances present again in the recovery
    /// window. Idempotent: already-recovered alerts never match.
    pub async fn recover_no_data(&self, present_instances: &[String]) -> Result<(), ScanError> {
        let recovered = self
            .store
            .recover_no_data_alerts(self.policy.id, present_instances, self.policy.last_run_time)
            .await
            .map_err(ScanError::Persistence)?;
        if recovered > 0 {
            tracing::info!(policy_id = self.policy.id, recovered, "recovered no-data alerts");
        }
        Ok(())
    }
}
