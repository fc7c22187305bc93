use std::future::Future;

use chrono::Utc;
use vigil_common::types::{DetectedEvent, EventKind, PeriodSpec, Policy};
use vigil_metrics::{query, MetricBackend, MetricResponse};
use vigil_notify::Notifier;
use vigil_storage::MonitorStore;

use crate::context::ScanContext;
use crate::error::ScanError;
use crate::evaluate::{
    aggregation_instances, convert_series_units, series_by_instance, NoDataDetector,
    ThresholdEvaluator,
};
use crate::lifecycle::AlertLifecycleManager;
use crate::notify::EventNotifier;
use crate::snapshot::SnapshotManager;

/// Orchestrates one scan of one policy.
///
/// Phases run in strict order: resolve scope (critical) -> threshold
/// evaluation (isolated) -> no-data evaluation (isolated) -> event/alert
/// creation (critical) -> notification (isolated) -> snapshots (isolated).
/// An isolated phase that fails is logged and yields its empty value; the
/// run continues.
///
/// One scan is sequential; distinct policies may be scanned concurrently,
/// but the caller must guarantee at most one concurrent run per policy id —
/// two runs of the same policy would race the read-active-alerts /
/// create-or-update sequence and break the one-active-alert invariant.
pub struct PolicyScanner<'a> {
    policy: &'a Policy,
    store: &'a dyn MonitorStore,
    backend: &'a dyn MetricBackend,
    notifier: &'a dyn Notifier,
}

impl<'a> PolicyScanner<'a> {
    pub fn new(
        policy: &'a Policy,
        store: &'a dyn MonitorStore,
        backend: &'a dyn MetricBackend,
        notifier: &'a dyn Notifier,
    ) -> Self {
        Self { policy, store, backend, notifier }
    }

    pub async fn run(&self) -> Result<(), ScanError> {
        let policy = self.policy;

        let Some(ctx) = ScanContext::build(policy, self.store).await? else {
            tracing::warn!(
                policy_id = policy.id,
                "policy has source but no instances, skipping scan"
            );
            return Ok(());
        };

        let lifecycle = AlertLifecycleManager::new(policy, self.store);

        let (alert_events, info_events) = if policy.enable_alerts.contains(&EventKind::Threshold)
        {
            self.isolated(
                "process threshold alerts",
                (Vec::new(), Vec::new()),
                self.process_threshold(&ctx, &lifecycle),
            )
            .await
        } else {
            (Vec::new(), Vec::new())
        };

        let no_data_events = if policy.enable_alerts.contains(&EventKind::NoData) {
            self.isolated(
                "process no-data alerts",
                Vec::new(),
                self.process_no_data(&ctx, &lifecycle),
            )
            .await
        } else {
            Vec::new()
        };

        let mut events = alert_events;
        events.extend(no_data_events);
        if events.is_empty() {
            return Ok(());
        }

        // critical: a failure here aborts the rest of the run
        let processed = lifecycle.process(events, &ctx).await?;
        tracing::info!(
            policy_id = policy.id,
            events = processed.rows.len(),
            new_alerts = processed.new_alerts.len(),
            "created events and alerts"
        );

        if policy.notice && !processed.rows.is_empty() {
            let notifier = EventNotifier::new(policy, self.store, self.notifier);
            self.isolated(
                "send notifications",
                (),
                notifier.notify(&processed.events, &processed.rows),
            )
            .await;
        }

        let snapshots = SnapshotManager::new(policy, self.store, self.backend);
        self.isolated(
            "create metric snapshots",
            (),
            snapshots.update(&ctx, &processed, &info_events, Utc::now()),
        )
        .await;

        Ok(())
    }

    /// Runs one isolated step: failures are logged and replaced by `default`.
    async fn isolated<T, F>(&self, step: &str, default: T, fut: F) -> T
    where
        F: Future<Output = Result<T, ScanError>>,
    {
        match fut.await {
            Ok(value) => {
                tracing::info!(policy_id = self.policy.id, step, "step completed");
                value
            }
            Err(e) => {
                tracing::error!(policy_id = self.policy.id, step, error = %e, "step failed");
                default
            }
        }
    }

    async fn query_aggregate(
        &self,
        ctx: &ScanContext,
        period: &PeriodSpec,
    ) -> Result<MetricResponse, ScanError> {
        let end = self.policy.last_run_time.timestamp();
        let start = end - period.as_seconds();
        let step = query::format_step(period, 1);
        Ok(self
            .backend
            .query_aggregate(
                &ctx.query_expr,
                start,
                end,
                &step,
                &ctx.instance_id_keys,
                ctx.aggregate,
            )
            .await?)
    }

    async fn process_threshold(
        &self,
        ctx: &ScanContext,
        lifecycle: &AlertLifecycleManager<'_>,
    ) -> Result<(Vec<DetectedEvent>, Vec<DetectedEvent>), ScanError> {
        let response = self.query_aggregate(ctx, &self.policy.period).await?;
        let mut series = series_by_instance(&response, &ctx.instance_id_keys);
        convert_series_units(&mut series, self.policy);

        let (alert_events, info_events) =
            ThresholdEvaluator::evaluate(self.policy, &series, &ctx.scope, &ctx.metric_name);

        lifecycle
            .count_events(&alert_events, &info_events, &ctx.active_alerts)
            .await?;
        lifecycle.recover_threshold(&ctx.active_alerts).await?;

        tracing::info!(
            policy_id = self.policy.id,
            alerts = alert_events.len(),
            infos = info_events.len(),
            "threshold evaluation finished"
        );
        Ok((alert_events, info_events))
    }

    async fn process_no_data(
        &self,
        ctx: &ScanContext,
        lifecycle: &AlertLifecycleManager<'_>,
    ) -> Result<Vec<DetectedEvent>, ScanError> {
        let mut events = Vec::new();

        if let Some(period) = &self.policy.no_data_period {
            // undefined without a bounded scope
            if self.policy.source.is_some() {
                let response = self.query_aggregate(ctx, period).await?;
                let present =
                    aggregation_instances(&response, &ctx.instance_id_keys, &ctx.scope);
                events =
                    NoDataDetector::detect(self.policy, &present, &ctx.scope, &ctx.metric_name);
                tracing::info!(
                    policy_id = self.policy.id,
                    events = events.len(),
                    "no-data evaluation finished"
                );
            }
        }

        if let Some(period) = &self.policy.no_data_recovery_period {
            let response = self.query_aggregate(ctx, period).await?;
            let present = aggregation_instances(&response, &ctx.instance_id_keys, &ctx.scope);
            let ids: Vec<String> = present.into_iter().collect();
            lifecycle.recover_no_data(&ids).await?;
        }

        Ok(events)
    }
}
