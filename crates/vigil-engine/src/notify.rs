use vigil_common::types::{AlertLevel, DetectedEvent, EventKind, Policy};
use vigil_notify::{Notifier, SendOutcome};
use vigil_storage::{EventRow, MonitorStore};

use crate::error::ScanError;

/// Filters and dispatches notifications for this run's persisted events.
///
/// Dispatch failures are caught per event and recorded in the event's
/// `notice_result`; they never abort the run.
pub struct EventNotifier<'a> {
    policy: &'a Policy,
    store: &'a dyn MonitorStore,
    notifier: &'a dyn Notifier,
}

impl<'a> EventNotifier<'a> {
    pub fn new(
        policy: &'a Policy,
        store: &'a dyn MonitorStore,
        notifier: &'a dyn Notifier,
    ) -> Self {
        Self { policy, store, notifier }
    }

    /// `events[i]` must correspond to `rows[i]` (the lifecycle manager's
    /// output contract).
    pub async fn notify(
        &self,
        events: &[DetectedEvent],
        rows: &[EventRow],
    ) -> Result<(), ScanError> {
        let mut results = Vec::new();

        for (event, row) in events.iter().zip(rows) {
            match event.kind {
                // normal events are never notified
                EventKind::Threshold if event.level == AlertLevel::Info => continue,
                // no-data notifications are gated by the policy
                EventKind::NoData if self.policy.no_data_alert <= 0 => continue,
                _ => {}
            }

            let title = format!("Alert notification: {}", self.policy.name);
            let outcome = match self
                .notifier
                .send(
                    &self.policy.notice_type_id,
                    &title,
                    &row.content,
                    &self.policy.notice_users,
                )
                .await
            {
                Ok(outcome) => {
                    if outcome.result {
                        tracing::info!(
                            policy = %self.policy.name,
                            event_id = %row.id,
                            "send notice success"
                        );
                    } else {
                        tracing::error!(
                            policy = %self.policy.name,
                            event_id = %row.id,
                            message = outcome.message.as_deref().unwrap_or("unknown error"),
                            "send notice failed"
                        );
                    }
                    outcome
                }
                Err(e) => {
                    tracing::error!(
                        policy = %self.policy.name,
                        event_id = %row.id,
                        error = %e,
                        "send notice exception"
                    );
                    SendOutcome::failed(e.to_string())
                }
            };

            let payload = serde_json::to_string(&outcome).unwrap_or_default();
            results.push((row.id.clone(), payload));
        }

        if !results.is_empty() {
            self.store
                .set_event_notice_results(results)
                .await
                .map_err(|e| ScanError::Notification(e.to_string()))?;
        }
        Ok(())
    }
}
