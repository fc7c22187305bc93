use std::collections::{BTreeMap, BTreeSet, HashMap};

use vigil_common::types::{render_template, AlertLevel, DetectedEvent, EventKind, Policy};
use vigil_metrics::MetricResponse;

use crate::units;

/// Trailing samples a threshold rule must match before an event fires.
const WINDOW_POINTS: usize = 1;

/// One instance's aggregated series with its untouched raw payload.
#[derive(Debug, Clone)]
pub struct InstanceSeries {
    pub instance_id: String,
    /// `(timestamp, value)` pairs, oldest first; unparseable samples dropped.
    pub values: Vec<(f64, f64)>,
    pub raw_data: serde_json::Value,
}

/// Groups a query response into per-instance series keyed by the first
/// instance identity label.
pub fn series_by_instance(
    response: &MetricResponse,
    instance_id_keys: &[String],
) -> Vec<InstanceSeries> {
    let key = instance_id_keys
        .first()
        .map(String::as_str)
        .unwrap_or("instance_id");

    response
        .data
        .result
        .iter()
        .map(|series| InstanceSeries {
            instance_id: series.label(key).unwrap_or_default().to_string(),
            values: series
                .values
                .iter()
                .filter_map(|(ts, v)| v.parse().ok().map(|f| (*ts, f)))
                .collect(),
            raw_data: serde_json::to_value(series).unwrap_or_default(),
        })
        .collect()
}

/// Converts series values into the policy's calculation unit, fail-open:
/// a non-convertible unit pair leaves the raw values in place.
pub fn convert_series_units(series: &mut [InstanceSeries], policy: &Policy) {
    let (Some(from), Some(to)) = (&policy.metric_unit, &policy.calculation_unit) else {
        return;
    };
    if from == to {
        return;
    }
    if !units::is_convertible(from, to) {
        tracing::warn!(
            policy_id = policy.id,
            metric_unit = %from,
            calculation_unit = %to,
            "units are not in the same system, skipping conversion"
        );
        return;
    }

    for s in series.iter_mut() {
        let values: Vec<f64> = s.values.iter().map(|(_, v)| *v).collect();
        if let Some(converted) = units::convert_values(&values, from, to) {
            for ((_, v), c) in s.values.iter_mut().zip(converted) {
                *v = c;
            }
        }
    }
    tracing::debug!(
        policy_id = policy.id,
        "converted metric values {} -> {}",
        from,
        to
    );
}

fn render_content(
    policy: &Policy,
    template: &str,
    instance_id: &str,
    scope: &BTreeMap<String, String>,
    metric_name: &str,
    level: AlertLevel,
    value: Option<f64>,
) -> String {
    let mut ctx = HashMap::new();
    ctx.insert("instance_id", instance_id.to_string());
    ctx.insert(
        "instance_name",
        scope
            .get(instance_id)
            .cloned()
            .unwrap_or_else(|| instance_id.to_string()),
    );
    ctx.insert("monitor_object", policy.monitor_object_name.clone());
    ctx.insert("metric_name", metric_name.to_string());
    ctx.insert("level", level.to_string());
    ctx.insert("value", value.map(|v| v.to_string()).unwrap_or_default());
    render_template(template, &ctx)
}

/// Classifies per-instance series into abnormal and normal events.
///
/// Pure: identical inputs always produce identical partitions. The ordered
/// threshold rules are checked against the last [`WINDOW_POINTS`] samples;
/// the first rule matched by all of them decides the event level. Instances
/// matching no rule yield an info event.
pub struct ThresholdEvaluator;

impl ThresholdEvaluator {
    pub fn evaluate(
        policy: &Policy,
        series: &[InstanceSeries],
        scope: &BTreeMap<String, String>,
        metric_name: &str,
    ) -> (Vec<DetectedEvent>, Vec<DetectedEvent>) {
        let mut alert_events = Vec::new();
        let mut info_events = Vec::new();

        for s in series {
            if s.values.len() < WINDOW_POINTS {
                continue;
            }
            let window = &s.values[s.values.len() - WINDOW_POINTS..];
            let last = window[window.len() - 1].1;

            let mut fired = false;
            for rule in &policy.threshold {
                if window.iter().all(|(_, v)| rule.method.check(*v, rule.value)) {
                    let content = render_content(
                        policy,
                        &policy.alert_name,
                        &s.instance_id,
                        scope,
                        metric_name,
                        rule.level,
                        Some(last),
                    );
                    alert_events.push(DetectedEvent {
                        kind: EventKind::Threshold,
                        instance_id: s.instance_id.clone(),
                        value: Some(last),
                        level: rule.level,
                        content,
                        raw_data: Some(s.raw_data.clone()),
                        alert_id: None,
                    });
                    fired = true;
                    break;
                }
            }

            if !fired {
                info_events.push(DetectedEvent {
                    kind: EventKind::Threshold,
                    instance_id: s.instance_id.clone(),
                    value: Some(last),
                    level: AlertLevel::Info,
                    content: "info".to_string(),
                    raw_data: Some(s.raw_data.clone()),
                    alert_id: None,
                });
            }
        }

        // Defensive re-filter: the backend may return overlapping label sets
        // even though the query was already constrained by the same keys.
        if policy.source.is_some() {
            alert_events.retain(|e| scope.contains_key(&e.instance_id));
            info_events.retain(|e| scope.contains_key(&e.instance_id));
        }

        (alert_events, info_events)
    }
}

/// Instance ids present in an aggregation result, scope-filtered when a
/// scope is configured.
pub fn aggregation_instances(
    response: &MetricResponse,
    instance_id_keys: &[String],
    scope: &BTreeMap<String, String>,
) -> BTreeSet<String> {
    let key = instance_id_keys
        .first()
        .map(String::as_str)
        .unwrap_or("instance_id");

    response
        .data
        .result
        .iter()
        .filter_map(|s| s.label(key))
        .filter(|id| scope.is_empty() || scope.contains_key(*id))
        .map(|id| id.to_string())
        .collect()
}

/// Flags scoped instances missing from an aggregation window.
///
/// Only meaningful with a non-empty scope: no-data detection against an
/// unbounded instance domain is undefined and never attempted.
pub struct NoDataDetector;

impl NoDataDetector {
    pub fn detect(
        policy: &Policy,
        present: &BTreeSet<String>,
        scope: &BTreeMap<String, String>,
        metric_name: &str,
    ) -> Vec<DetectedEvent> {
        let template = policy.no_data_alert_name.as_deref().unwrap_or("no data");

        scope
            .keys()
            .filter(|id| !present.contains(*id))
            .map(|id| DetectedEvent {
                kind: EventKind::NoData,
                instance_id: id.clone(),
                value: None,
                level: policy.no_data_level,
                content: render_content(
                    policy,
                    template,
                    id,
                    scope,
                    metric_name,
                    policy.no_data_level,
                    None,
                ),
                raw_data: None,
                alert_id: None,
            })
            .collect()
    }
}
