use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;

use vigil_common::types::{
    AlertLevel, CompareMethod, DetectedEvent, EventKind, PeriodSpec, PeriodUnit, Policy,
    PolicySource, QueryCondition, SourceType, ThresholdRule,
};
use vigil_metrics::error::MetricsError;
use vigil_metrics::{MetricBackend, MetricData, MetricResponse, MetricSeries};
use vigil_notify::{error::Result as NotifyResult, Notifier, SendOutcome};
use vigil_storage::{
    AlertEscalation, AlertRow, EventRow, InstanceRow, MetricRow, MonitorStore, NewAlert,
    NewEvent, SnapshotRow,
};

use crate::context::ScanContext;
use crate::error::ScanError;
use crate::lifecycle::ProcessedEvents;
use crate::scanner::PolicyScanner;
use crate::snapshot::SnapshotManager;

// ---- in-memory ports ----

#[derive(Default)]
struct StoreState {
    instances: Vec<(String, String, i64)>,
    organizations: Vec<(String, String)>,
    metrics: Vec<MetricRow>,
    alerts: Vec<AlertRow>,
    next_alert_id: i64,
    events: Vec<EventRow>,
    raw_data: Vec<(String, serde_json::Value)>,
    snapshots: HashMap<i64, Vec<serde_json::Value>>,
}

struct MemoryStore {
    state: Mutex<StoreState>,
}

impl MemoryStore {
    fn new() -> Self {
        Self {
            state: Mutex::new(StoreState { next_alert_id: 1, ..Default::default() }),
        }
    }

    fn with_instances(self, instances: &[(&str, &str)]) -> Self {
        {
            let mut st = self.state.lock().unwrap();
            for (id, name) in instances {
                st.instances.push((id.to_string(), name.to_string(), 1));
            }
        }
        self
    }

    fn seed_alert(&self, policy_id: i64, instance: &str, alert_type: &str, level: &str) -> i64 {
        let mut st = self.state.lock().unwrap();
        let id = st.next_alert_id;
        st.next_alert_id += 1;
        st.alerts.push(AlertRow {
            id,
            policy_id,
            instance_id: instance.to_string(),
            instance_name: instance.to_string(),
            alert_type: alert_type.to_string(),
            level: level.to_string(),
            value: Some(0.0),
            content: "seed".to_string(),
            status: "new".to_string(),
            start_event_time: Utc::now() - Duration::minutes(30),
            end_event_time: None,
            info_event_count: 0,
            operator: String::new(),
        });
        id
    }

    fn alerts(&self) -> Vec<AlertRow> {
        self.state.lock().unwrap().alerts.clone()
    }

    fn events(&self) -> Vec<EventRow> {
        self.state.lock().unwrap().events.clone()
    }

    fn raw_data_count(&self) -> usize {
        self.state.lock().unwrap().raw_data.len()
    }

    fn snapshot_entries(&self, alert_id: i64) -> Vec<serde_json::Value> {
        self.state
            .lock()
            .unwrap()
            .snapshots
            .get(&alert_id)
            .cloned()
            .unwrap_or_default()
    }

    fn snapshot_count(&self) -> usize {
        self.state.lock().unwrap().snapshots.len()
    }
}

#[async_trait]
impl MonitorStore for MemoryStore {
    async fn instances_by_ids(
        &self,
        monitor_object_id: i64,
        ids: &[String],
    ) -> Result<Vec<InstanceRow>> {
        let st = self.state.lock().unwrap();
        Ok(st
            .instances
            .iter()
            .filter(|(id, _, obj)| *obj == monitor_object_id && ids.contains(id))
            .map(|(id, name, _)| InstanceRow { id: id.clone(), name: name.clone() })
            .collect())
    }

    async fn instances_by_organizations(
        &self,
        monitor_object_id: i64,
        organizations: &[String],
    ) -> Result<Vec<InstanceRow>> {
        let st = self.state.lock().unwrap();
        let member_ids: Vec<String> = st
            .organizations
            .iter()
            .filter(|(_, org)| organizations.contains(org))
            .map(|(id, _)| id.clone())
            .collect();
        Ok(st
            .instances
            .iter()
            .filter(|(id, _, obj)| *obj == monitor_object_id && member_ids.contains(id))
            .map(|(id, name, _)| InstanceRow { id: id.clone(), name: name.clone() })
            .collect())
    }

    async fn metric_by_id(&self, id: &str) -> Result<Option<MetricRow>> {
        let st = self.state.lock().unwrap();
        Ok(st.metrics.iter().find(|m| m.id == id).cloned())
    }

    async fn active_alerts(
        &self,
        policy_id: i64,
        instance_ids: Option<&[String]>,
    ) -> Result<Vec<AlertRow>> {
        let st = self.state.lock().unwrap();
        Ok(st
            .alerts
            .iter()
            .filter(|a| a.policy_id == policy_id && a.status == "new")
            .filter(|a| instance_ids.is_none_or(|ids| ids.contains(&a.instance_id)))
            .cloned()
            .collect())
    }

    async fn create_alerts(&self, alerts: Vec<NewAlert>) -> Result<Vec<AlertRow>> {
        let mut st = self.state.lock().unwrap();
        let mut created = Vec::new();
        for a in alerts {
            let id = st.next_alert_id;
            st.next_alert_id += 1;
            let row = AlertRow {
                id,
                policy_id: a.policy_id,
                instance_id: a.instance_id,
                instance_name: a.instance_name,
                alert_type: a.alert_type,
                level: a.level,
                value: a.value,
                content: a.content,
                status: "new".to_string(),
                start_event_time: a.start_event_time,
                end_event_time: None,
                info_event_count: 0,
                operator: String::new(),
            };
            st.alerts.push(row.clone());
            created.push(row);
        }
        Ok(created)
    }

    async fn update_alert_escalations(&self, updates: Vec<AlertEscalation>) -> Result<()> {
        let mut st = self.state.lock().unwrap();
        for u in updates {
            if let Some(alert) = st.alerts.iter_mut().find(|a| a.id == u.alert_id) {
                alert.level = u.level;
                alert.value = u.value;
                alert.content = u.content;
            }
        }
        Ok(())
    }

    async fn increment_info_count(&self, alert_ids: &[i64]) -> Result<u64> {
        let mut st = self.state.lock().unwrap();
        let mut n = 0;
        for alert in st.alerts.iter_mut().filter(|a| alert_ids.contains(&a.id)) {
            alert.info_event_count += 1;
            n += 1;
        }
        Ok(n)
    }

    async fn reset_info_count(&self, alert_ids: &[i64]) -> Result<u64> {
        let mut st = self.state.lock().unwrap();
        let mut n = 0;
        for alert in st.alerts.iter_mut().filter(|a| alert_ids.contains(&a.id)) {
            alert.info_event_count = 0;
            n += 1;
        }
        Ok(n)
    }

    async fn recover_threshold_alerts(
        &self,
        alert_ids: &[i64],
        recovery_condition: i32,
        end_time: DateTime<Utc>,
    ) -> Result<u64> {
        let mut st = self.state.lock().unwrap();
        let mut n = 0;
        for alert in st.alerts.iter_mut().filter(|a| {
            alert_ids.contains(&a.id)
                && a.status == "new"
                && a.info_event_count >= recovery_condition
        }) {
            alert.status = "recovered".to_string();
            alert.end_event_time = Some(end_time);
            alert.operator = "system".to_string();
            n += 1;
        }
        Ok(n)
    }

    async fn recover_no_data_alerts(
        &self,
        policy_id: i64,
        instance_ids: &[String],
        end_time: DateTime<Utc>,
    ) -> Result<u64> {
        let mut st = self.state.lock().unwrap();
        let mut n = 0;
        for alert in st.alerts.iter_mut().filter(|a| {
            a.policy_id == policy_id
                && a.alert_type == "no_data"
                && a.status == "new"
                && instance_ids.contains(&a.instance_id)
        }) {
            alert.status = "recovered".to_string();
            alert.end_event_time = Some(end_time);
            alert.operator = "system".to_string();
            n += 1;
        }
        Ok(n)
    }

    async fn insert_events(&self, events: Vec<NewEvent>) -> Result<Vec<EventRow>> {
        let mut st = self.state.lock().unwrap();
        let mut rows = Vec::new();
        for e in events {
            let row = EventRow {
                id: e.id,
                alert_id: e.alert_id,
                policy_id: e.policy_id,
                instance_id: e.instance_id,
                value: e.value,
                level: e.level,
                content: e.content,
                notice_result: None,
                event_time: e.event_time,
            };
            st.events.push(row.clone());
            rows.push(row);
        }
        Ok(rows)
    }

    async fn insert_event_raw_data(
        &self,
        event_id: &str,
        data: &serde_json::Value,
    ) -> Result<()> {
        let mut st = self.state.lock().unwrap();
        st.raw_data.push((event_id.to_string(), data.clone()));
        Ok(())
    }

    async fn set_event_notice_results(&self, results: Vec<(String, String)>) -> Result<()> {
        let mut st = self.state.lock().unwrap();
        for (event_id, notice_result) in results {
            if let Some(event) = st.events.iter_mut().find(|e| e.id == event_id) {
                event.notice_result = Some(notice_result);
            }
        }
        Ok(())
    }

    async fn get_or_create_snapshot(
        &self,
        alert_id: i64,
        _policy_id: i64,
        _instance_id: &str,
    ) -> Result<SnapshotRow> {
        let mut st = self.state.lock().unwrap();
        match st.snapshots.get(&alert_id) {
            Some(entries) => Ok(SnapshotRow {
                alert_id,
                entries: entries.clone(),
                created: false,
            }),
            None => {
                st.snapshots.insert(alert_id, Vec::new());
                Ok(SnapshotRow { alert_id, entries: Vec::new(), created: true })
            }
        }
    }

    async fn save_snapshot_entries(
        &self,
        alert_id: i64,
        entries: &[serde_json::Value],
    ) -> Result<()> {
        let mut st = self.state.lock().unwrap();
        st.snapshots.insert(alert_id, entries.to_vec());
        Ok(())
    }
}

struct MemoryBackend {
    default: MetricResponse,
    by_duration: HashMap<i64, MetricResponse>,
    fail: bool,
    calls: Mutex<Vec<(i64, i64)>>,
}

impl MemoryBackend {
    fn new(default: MetricResponse) -> Self {
        Self {
            default,
            by_duration: HashMap::new(),
            fail: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Answers queries whose window length matches `duration_secs` with a
    /// dedicated response; everything else gets the default.
    fn with_duration(mut self, duration_secs: i64, response: MetricResponse) -> Self {
        self.by_duration.insert(duration_secs, response);
        self
    }

    fn failing() -> Self {
        let mut backend = Self::new(resp(&[]));
        backend.fail = true;
        backend
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl MetricBackend for MemoryBackend {
    async fn query_range(
        &self,
        _expr: &str,
        start: i64,
        end: i64,
        _step: &str,
    ) -> std::result::Result<MetricResponse, MetricsError> {
        if self.fail {
            return Err(MetricsError::BadStatus { status: 500, body: "backend down".into() });
        }
        self.calls.lock().unwrap().push((start, end));
        Ok(self
            .by_duration
            .get(&(end - start))
            .cloned()
            .unwrap_or_else(|| self.default.clone()))
    }
}

#[derive(Default)]
struct MemoryNotifier {
    sends: Mutex<Vec<(String, String, String, Vec<String>)>>,
}

impl MemoryNotifier {
    fn sends(&self) -> Vec<(String, String, String, Vec<String>)> {
        self.sends.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn send(
        &self,
        channel_id: &str,
        title: &str,
        content: &str,
        recipients: &[String],
    ) -> NotifyResult<SendOutcome> {
        self.sends.lock().unwrap().push((
            channel_id.to_string(),
            title.to_string(),
            content.to_string(),
            recipients.to_vec(),
        ));
        Ok(SendOutcome::ok())
    }
}

// ---- fixtures ----

fn resp(series: &[(&str, f64)]) -> MetricResponse {
    MetricResponse {
        status: Some("success".into()),
        data: MetricData {
            result: series
                .iter()
                .map(|(id, value)| MetricSeries {
                    metric: HashMap::from([("instance_id".to_string(), id.to_string())]),
                    values: vec![(0.0, value.to_string())],
                })
                .collect(),
        },
    }
}

fn base_policy() -> Policy {
    Policy {
        id: 1,
        name: "cpu usage".into(),
        monitor_object_id: 1,
        monitor_object_name: "Host".into(),
        collect_type: String::new(),
        source: Some(PolicySource {
            source_type: SourceType::Instance,
            values: vec!["a".into(), "b".into()],
        }),
        period: PeriodSpec { unit: PeriodUnit::Min, value: 5 },
        no_data_period: None,
        no_data_recovery_period: None,
        algorithm: "avg".into(),
        query_condition: QueryCondition::Pmq {
            query: "cpu_usage".into(),
            instance_id_keys: vec!["instance_id".into()],
        },
        threshold: vec![ThresholdRule {
            method: CompareMethod::Gte,
            value: 90.0,
            level: AlertLevel::Critical,
        }],
        recovery_condition: 0,
        no_data_level: AlertLevel::Warning,
        no_data_alert: 1,
        alert_name: "${instance_name} cpu at ${value}".into(),
        no_data_alert_name: None,
        notice: false,
        notice_type_id: "channel-1".into(),
        notice_users: vec!["ops".into()],
        metric_unit: None,
        calculation_unit: None,
        last_run_time: Utc::now(),
        enable_alerts: vec![EventKind::Threshold],
    }
}

async fn run(
    policy: &Policy,
    store: &MemoryStore,
    backend: &MemoryBackend,
    notifier: &MemoryNotifier,
) -> std::result::Result<(), ScanError> {
    PolicyScanner::new(policy, store, backend, notifier).run().await
}

// ---- scenarios ----

#[tokio::test]
async fn threshold_breach_creates_one_alert_with_linked_event() {
    let store = MemoryStore::new().with_instances(&[("a", "Host A"), ("b", "Host B")]);
    let backend = MemoryBackend::new(resp(&[("a", 95.0), ("b", 50.0)]));
    let notifier = MemoryNotifier::default();
    let policy = base_policy();

    run(&policy, &store, &backend, &notifier).await.unwrap();

    let alerts = store.alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].instance_id, "a");
    assert_eq!(alerts[0].alert_type, "alert");
    assert_eq!(alerts[0].level, "critical");
    assert_eq!(alerts[0].status, "new");
    assert_eq!(alerts[0].value, Some(95.0));
    assert_eq!(alerts[0].instance_name, "Host A");

    // B only produced an info event, which is never persisted
    let events = store.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].instance_id, "a");
    assert_eq!(events[0].alert_id, alerts[0].id);
    assert_eq!(events[0].level, "critical");
    assert_eq!(events[0].content, "Host A cpu at 95");
    assert_eq!(store.raw_data_count(), 1);

    // notice disabled on the base policy
    assert!(notifier.sends().is_empty());
}

#[tokio::test]
async fn alert_recovers_after_consecutive_info_runs() {
    let store = MemoryStore::new().with_instances(&[("a", "Host A"), ("b", "Host B")]);
    let notifier = MemoryNotifier::default();
    let mut policy = base_policy();
    policy.recovery_condition = 3;

    let t0 = Utc::now();
    policy.last_run_time = t0;
    let breach = MemoryBackend::new(resp(&[("a", 95.0)]));
    run(&policy, &store, &breach, &notifier).await.unwrap();
    assert_eq!(store.alerts().len(), 1);

    let calm = MemoryBackend::new(resp(&[("a", 40.0)]));
    let mut t3 = t0;
    for i in 1..=3i64 {
        policy.last_run_time = t0 + Duration::minutes(5 * i);
        t3 = policy.last_run_time;
        run(&policy, &store, &calm, &notifier).await.unwrap();
    }

    let alerts = store.alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].status, "recovered");
    assert_eq!(alerts[0].end_event_time, Some(t3));
    assert_eq!(alerts[0].operator, "system");
    // info-only runs persist no events
    assert_eq!(store.events().len(), 1);
}

#[tokio::test]
async fn recovery_condition_zero_disables_auto_recovery() {
    let store = MemoryStore::new().with_instances(&[("a", "Host A"), ("b", "Host B")]);
    let notifier = MemoryNotifier::default();
    let mut policy = base_policy();
    policy.recovery_condition = 0;
    store.seed_alert(1, "a", "alert", "critical");

    let calm = MemoryBackend::new(resp(&[("a", 40.0)]));
    for i in 0..4i64 {
        policy.last_run_time = Utc::now() + Duration::minutes(i);
        run(&policy, &store, &calm, &notifier).await.unwrap();
    }

    let alerts = store.alerts();
    assert_eq!(alerts[0].status, "new");
    assert_eq!(alerts[0].info_event_count, 4);
}

#[tokio::test]
async fn missing_instance_raises_no_data_alert() {
    let store = MemoryStore::new().with_instances(&[("c", "Host C")]);
    let backend = MemoryBackend::new(resp(&[]));
    let notifier = MemoryNotifier::default();
    let mut policy = base_policy();
    policy.source = Some(PolicySource {
        source_type: SourceType::Instance,
        values: vec!["c".into()],
    });
    policy.enable_alerts = vec![EventKind::NoData];
    policy.no_data_period = Some(PeriodSpec { unit: PeriodUnit::Min, value: 10 });

    run(&policy, &store, &backend, &notifier).await.unwrap();

    let alerts = store.alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].instance_id, "c");
    assert_eq!(alerts[0].alert_type, "no_data");
    assert_eq!(alerts[0].level, "warning");
    assert_eq!(alerts[0].value, None);

    let events = store.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].alert_id, alerts[0].id);
    assert_eq!(events[0].value, None);
    assert_eq!(events[0].content, "no data");
}

#[tokio::test]
async fn values_converted_to_calculation_unit_before_comparison() {
    let store = MemoryStore::new().with_instances(&[("a", "Host A"), ("b", "Host B")]);
    let backend = MemoryBackend::new(resp(&[("a", 2048.0)]));
    let notifier = MemoryNotifier::default();
    let mut policy = base_policy();
    policy.metric_unit = Some("bytes".into());
    policy.calculation_unit = Some("kibibytes".into());
    policy.threshold = vec![ThresholdRule {
        method: CompareMethod::Gte,
        value: 2.0,
        level: AlertLevel::Warning,
    }];

    run(&policy, &store, &backend, &notifier).await.unwrap();

    let alerts = store.alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].value, Some(2.0));
    assert_eq!(store.events()[0].value, Some(2.0));
}

#[tokio::test]
async fn snapshot_gets_pre_alert_and_event_entries_without_duplicates() {
    let store = MemoryStore::new().with_instances(&[("a", "Host A")]);
    let backend = MemoryBackend::new(resp(&[("a", 95.0)]));
    let mut policy = base_policy();
    policy.source = Some(PolicySource {
        source_type: SourceType::Instance,
        values: vec!["a".into()],
    });

    // context snapshotted before the alert exists
    let ctx = ScanContext::build(&policy, &store).await.unwrap().unwrap();

    let created = store
        .create_alerts(vec![NewAlert {
            policy_id: 1,
            instance_id: "a".into(),
            instance_name: "Host A".into(),
            alert_type: "alert".into(),
            level: "critical".into(),
            value: Some(95.0),
            content: "x".into(),
            start_event_time: policy.last_run_time,
        }])
        .await
        .unwrap();
    let alert_id = created[0].id;

    let processed = ProcessedEvents {
        events: vec![DetectedEvent {
            kind: EventKind::Threshold,
            instance_id: "a".into(),
            value: Some(95.0),
            level: AlertLevel::Critical,
            content: "x".into(),
            raw_data: Some(json!({"metric": {"instance_id": "a"}})),
            alert_id: Some(alert_id),
        }],
        rows: vec![EventRow {
            id: "evt-1".into(),
            alert_id,
            policy_id: 1,
            instance_id: "a".into(),
            value: Some(95.0),
            level: "critical".into(),
            content: "x".into(),
            notice_result: None,
            event_time: policy.last_run_time,
        }],
        new_alerts: created,
    };

    let manager = SnapshotManager::new(&policy, &store, &backend);
    manager.update(&ctx, &processed, &[], Utc::now()).await.unwrap();

    let entries = store.snapshot_entries(alert_id);
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["type"], "pre_alert");
    assert_eq!(entries[1]["type"], "event");
    assert_eq!(entries[1]["event_id"], "evt-1");

    // same event id again: nothing is appended
    manager.update(&ctx, &processed, &[], Utc::now()).await.unwrap();
    assert_eq!(store.snapshot_entries(alert_id).len(), 2);
}

// ---- scope semantics ----

#[tokio::test]
async fn configured_but_empty_scope_skips_entire_run() {
    let store = MemoryStore::new().with_instances(&[("a", "Host A")]);
    let backend = MemoryBackend::new(resp(&[("a", 95.0)]));
    let notifier = MemoryNotifier::default();
    let mut policy = base_policy();
    policy.source = Some(PolicySource {
        source_type: SourceType::Instance,
        values: vec!["ghost".into()],
    });
    policy.enable_alerts = vec![EventKind::Threshold, EventKind::NoData];
    policy.no_data_period = Some(PeriodSpec { unit: PeriodUnit::Min, value: 10 });

    run(&policy, &store, &backend, &notifier).await.unwrap();

    assert_eq!(backend.call_count(), 0, "no query may be issued");
    assert!(store.alerts().is_empty());
    assert!(store.events().is_empty());
}

#[tokio::test]
async fn unknown_source_type_resolves_empty_and_skips() {
    let store = MemoryStore::new().with_instances(&[("a", "Host A")]);
    let backend = MemoryBackend::new(resp(&[("a", 95.0)]));
    let notifier = MemoryNotifier::default();
    let mut policy = base_policy();
    policy.source = Some(PolicySource {
        source_type: SourceType::Unknown,
        values: vec!["a".into()],
    });

    run(&policy, &store, &backend, &notifier).await.unwrap();

    assert_eq!(backend.call_count(), 0);
    assert!(store.alerts().is_empty());
}

#[tokio::test]
async fn absent_source_is_unconstrained_but_disables_no_data() {
    let store = MemoryStore::new();
    let backend = MemoryBackend::new(resp(&[("z", 99.0)]));
    let notifier = MemoryNotifier::default();
    let mut policy = base_policy();
    policy.source = None;
    policy.enable_alerts = vec![EventKind::Threshold, EventKind::NoData];
    policy.no_data_period = Some(PeriodSpec { unit: PeriodUnit::Min, value: 10 });

    run(&policy, &store, &backend, &notifier).await.unwrap();

    // "z" is not a registered instance but the scope is unconstrained
    let alerts = store.alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].instance_id, "z");
    assert_eq!(alerts[0].alert_type, "alert");
}

// ---- lifecycle semantics ----

#[tokio::test]
async fn second_breach_attaches_to_existing_alert() {
    let store = MemoryStore::new().with_instances(&[("a", "Host A"), ("b", "Host B")]);
    let backend = MemoryBackend::new(resp(&[("a", 95.0)]));
    let notifier = MemoryNotifier::default();
    let mut policy = base_policy();

    run(&policy, &store, &backend, &notifier).await.unwrap();
    policy.last_run_time = Utc::now() + Duration::minutes(5);
    run(&policy, &store, &backend, &notifier).await.unwrap();

    let alerts = store.alerts();
    assert_eq!(alerts.len(), 1, "one active alert per (policy, instance, type)");

    let events = store.events();
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|e| e.alert_id == alerts[0].id));
}

#[tokio::test]
async fn escalation_upgrades_level_only_upward() {
    let store = MemoryStore::new().with_instances(&[("a", "Host A"), ("b", "Host B")]);
    let notifier = MemoryNotifier::default();
    let seeded = store.seed_alert(1, "a", "alert", "warning");

    // critical event outranks the warning alert
    let mut policy = base_policy();
    let backend = MemoryBackend::new(resp(&[("a", 95.0)]));
    run(&policy, &store, &backend, &notifier).await.unwrap();

    let alerts = store.alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].id, seeded);
    assert_eq!(alerts[0].level, "critical");
    assert_eq!(alerts[0].value, Some(95.0));

    // a warning event later must not downgrade the alert
    policy.threshold = vec![ThresholdRule {
        method: CompareMethod::Gte,
        value: 90.0,
        level: AlertLevel::Warning,
    }];
    policy.last_run_time = Utc::now() + Duration::minutes(5);
    run(&policy, &store, &backend, &notifier).await.unwrap();

    let alerts = store.alerts();
    assert_eq!(alerts[0].level, "critical");
    // the lower-severity event is still recorded
    assert_eq!(store.events().len(), 2);
}

#[tokio::test]
async fn no_data_recovery_is_idempotent() {
    let store = MemoryStore::new().with_instances(&[("c", "Host C")]);
    let notifier = MemoryNotifier::default();
    let mut policy = base_policy();
    policy.source = Some(PolicySource {
        source_type: SourceType::Instance,
        values: vec!["c".into()],
    });
    policy.enable_alerts = vec![EventKind::NoData];
    policy.no_data_period = Some(PeriodSpec { unit: PeriodUnit::Min, value: 10 });
    policy.no_data_recovery_period = Some(PeriodSpec { unit: PeriodUnit::Min, value: 15 });
    store.seed_alert(1, "c", "no_data", "warning");

    // data is back in both the detection and the recovery window
    let backend = MemoryBackend::new(resp(&[]))
        .with_duration(600, resp(&[("c", 1.0)]))
        .with_duration(900, resp(&[("c", 1.0)]));

    run(&policy, &store, &backend, &notifier).await.unwrap();
    let alerts = store.alerts();
    assert_eq!(alerts[0].status, "recovered");
    let first_end = alerts[0].end_event_time;

    // unchanged backend data: no double-recovery, no error
    policy.last_run_time = Utc::now() + Duration::minutes(15);
    run(&policy, &store, &backend, &notifier).await.unwrap();
    let alerts = store.alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].status, "recovered");
    assert_eq!(alerts[0].end_event_time, first_end);
}

#[tokio::test]
async fn zero_events_produce_no_side_effects() {
    let store = MemoryStore::new().with_instances(&[("a", "Host A"), ("b", "Host B")]);
    let backend = MemoryBackend::new(resp(&[("a", 50.0), ("b", 40.0)]));
    let notifier = MemoryNotifier::default();
    let policy = base_policy();

    run(&policy, &store, &backend, &notifier).await.unwrap();

    assert!(store.alerts().is_empty());
    assert!(store.events().is_empty());
    assert_eq!(store.snapshot_count(), 0);
    assert!(notifier.sends().is_empty());
}

// ---- error handling ----

#[tokio::test]
async fn unknown_algorithm_aborts_before_any_query() {
    let store = MemoryStore::new().with_instances(&[("a", "Host A"), ("b", "Host B")]);
    let backend = MemoryBackend::new(resp(&[("a", 95.0)]));
    let notifier = MemoryNotifier::default();
    let mut policy = base_policy();
    policy.algorithm = "percentile99".into();

    let err = run(&policy, &store, &backend, &notifier).await.unwrap_err();
    assert!(matches!(err, ScanError::Config(_)));
    assert_eq!(backend.call_count(), 0);
}

#[tokio::test]
async fn missing_metric_definition_is_a_config_error() {
    let store = MemoryStore::new().with_instances(&[("a", "Host A"), ("b", "Host B")]);
    let backend = MemoryBackend::new(resp(&[]));
    let notifier = MemoryNotifier::default();
    let mut policy = base_policy();
    policy.query_condition = QueryCondition::Metric {
        metric_id: "m404".into(),
        filter: Vec::new(),
    };

    let err = run(&policy, &store, &backend, &notifier).await.unwrap_err();
    assert!(matches!(err, ScanError::Config(_)));
}

#[tokio::test]
async fn backend_failure_is_isolated_per_phase() {
    let store = MemoryStore::new().with_instances(&[("a", "Host A"), ("b", "Host B")]);
    let backend = MemoryBackend::failing();
    let notifier = MemoryNotifier::default();
    let policy = base_policy();

    // the run completes; the failed phase yields no events
    run(&policy, &store, &backend, &notifier).await.unwrap();
    assert!(store.alerts().is_empty());
    assert!(store.events().is_empty());
}

// ---- notification ----

#[tokio::test]
async fn notifications_filter_info_and_gated_no_data_events() {
    let store = MemoryStore::new().with_instances(&[("a", "Host A"), ("c", "Host C")]);
    let backend = MemoryBackend::new(resp(&[("a", 95.0)]));
    let notifier = MemoryNotifier::default();
    let mut policy = base_policy();
    policy.source = Some(PolicySource {
        source_type: SourceType::Instance,
        values: vec!["a".into(), "c".into()],
    });
    policy.enable_alerts = vec![EventKind::Threshold, EventKind::NoData];
    policy.no_data_period = Some(PeriodSpec { unit: PeriodUnit::Min, value: 10 });
    policy.no_data_alert = 0; // gate no-data notifications off
    policy.notice = true;

    run(&policy, &store, &backend, &notifier).await.unwrap();

    // both events persisted: threshold for A, no-data for C
    assert_eq!(store.events().len(), 2);
    assert_eq!(store.alerts().len(), 2);

    // only the threshold event is dispatched
    let sends = notifier.sends();
    assert_eq!(sends.len(), 1);
    assert_eq!(sends[0].0, "channel-1");
    assert!(sends[0].1.contains("cpu usage"));
    assert_eq!(sends[0].2, "Host A cpu at 95");
    assert_eq!(sends[0].3, vec!["ops".to_string()]);

    // dispatch outcome is written back onto the event row
    let events = store.events();
    let threshold_event = events.iter().find(|e| e.instance_id == "a").unwrap();
    assert_eq!(threshold_event.notice_result.as_deref(), Some(r#"{"result":true}"#));
    let no_data_event = events.iter().find(|e| e.instance_id == "c").unwrap();
    assert!(no_data_event.notice_result.is_none());
}
