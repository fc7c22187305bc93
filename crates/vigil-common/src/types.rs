use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Alert severity level, ordered from lowest to highest.
///
/// # Examples
///
/// ```
/// use vigil_common::types::AlertLevel;
///
/// let level: AlertLevel = "warning".parse().unwrap();
/// assert_eq!(level, AlertLevel::Warning);
/// assert_eq!(level.to_string(), "warning");
/// assert!(AlertLevel::Critical > AlertLevel::Error);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Info,
    Warning,
    Error,
    Critical,
}

impl AlertLevel {
    /// Escalation weight. Unknown levels in stored rows weigh 0 and are
    /// always superseded (see [`AlertLevel::weight_of`]).
    pub fn weight(self) -> u8 {
        match self {
            AlertLevel::Info => 1,
            AlertLevel::Warning => 2,
            AlertLevel::Error => 3,
            AlertLevel::Critical => 4,
        }
    }

    /// Weight of a stored level string; unparseable values weigh 0.
    pub fn weight_of(level: &str) -> u8 {
        level.parse::<AlertLevel>().map(AlertLevel::weight).unwrap_or(0)
    }
}

impl std::fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertLevel::Info => write!(f, "info"),
            AlertLevel::Warning => write!(f, "warning"),
            AlertLevel::Error => write!(f, "error"),
            AlertLevel::Critical => write!(f, "critical"),
        }
    }
}

impl std::str::FromStr for AlertLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "info" => Ok(AlertLevel::Info),
            "warning" => Ok(AlertLevel::Warning),
            "error" => Ok(AlertLevel::Error),
            "critical" => Ok(AlertLevel::Critical),
            _ => Err(format!("unknown alert level: {s}")),
        }
    }
}

/// Alert record kind: threshold breach or missing data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    Alert,
    NoData,
}

impl std::fmt::Display for AlertType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertType::Alert => write!(f, "alert"),
            AlertType::NoData => write!(f, "no_data"),
        }
    }
}

/// Lifecycle status of an alert record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    New,
    Recovered,
}

impl std::fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertStatus::New => write!(f, "new"),
            AlertStatus::Recovered => write!(f, "recovered"),
        }
    }
}

/// Detection track produced by the evaluator: threshold or no-data.
/// Also used as the `enable_alerts` policy flag values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Threshold,
    NoData,
}

impl EventKind {
    /// The alert record type an event of this kind belongs to.
    pub fn alert_type(self) -> AlertType {
        match self {
            EventKind::Threshold => AlertType::Alert,
            EventKind::NoData => AlertType::NoData,
        }
    }
}

/// Evaluation window unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodUnit {
    Min,
    Hour,
    Day,
}

/// Evaluation window, e.g. `{"type": "min", "value": 5}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodSpec {
    #[serde(rename = "type")]
    pub unit: PeriodUnit,
    pub value: u32,
}

impl PeriodSpec {
    pub fn as_seconds(&self) -> i64 {
        let unit_secs: i64 = match self.unit {
            PeriodUnit::Min => 60,
            PeriodUnit::Hour => 3600,
            PeriodUnit::Day => 86400,
        };
        unit_secs * i64::from(self.value)
    }
}

/// Threshold comparison method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareMethod {
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
}

impl CompareMethod {
    pub fn check(&self, value: f64, threshold: f64) -> bool {
        match self {
            CompareMethod::Gt => value > threshold,
            CompareMethod::Lt => value < threshold,
            CompareMethod::Gte => value >= threshold,
            CompareMethod::Lte => value <= threshold,
            CompareMethod::Eq => value == threshold,
            CompareMethod::Ne => value != threshold,
        }
    }
}

impl std::str::FromStr for CompareMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            ">" | "gt" => Ok(CompareMethod::Gt),
            "<" | "lt" => Ok(CompareMethod::Lt),
            ">=" | "gte" => Ok(CompareMethod::Gte),
            "<=" | "lte" => Ok(CompareMethod::Lte),
            "=" | "eq" => Ok(CompareMethod::Eq),
            "!=" | "ne" => Ok(CompareMethod::Ne),
            _ => Err(format!("unknown threshold method: {s}")),
        }
    }
}

/// One ordered threshold rule; the first matching rule decides the event level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdRule {
    pub method: CompareMethod,
    pub value: f64,
    pub level: AlertLevel,
}

/// Scope source kind. Unknown kinds resolve to an empty scope without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SourceType {
    Instance,
    Organization,
    Unknown,
}

impl From<String> for SourceType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "instance" => SourceType::Instance,
            "organization" => SourceType::Organization,
            _ => SourceType::Unknown,
        }
    }
}

impl From<SourceType> for String {
    fn from(t: SourceType) -> Self {
        match t {
            SourceType::Instance => "instance".to_string(),
            SourceType::Organization => "organization".to_string(),
            SourceType::Unknown => "unknown".to_string(),
        }
    }
}

/// Instance scope constraint of a policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicySource {
    #[serde(rename = "type")]
    pub source_type: SourceType,
    pub values: Vec<String>,
}

/// Label filter method used when building a query from a metric template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterMethod {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "include")]
    Include,
    #[serde(rename = "exclude")]
    Exclude,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterCondition {
    pub name: String,
    pub method: FilterMethod,
    pub value: String,
}

/// How the policy obtains its query expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum QueryCondition {
    /// A raw MetricsQL expression supplied by the policy itself.
    Pmq {
        query: String,
        #[serde(default)]
        instance_id_keys: Vec<String>,
    },
    /// A query template looked up from the metric definitions table.
    Metric {
        metric_id: String,
        #[serde(default)]
        filter: Vec<FilterCondition>,
    },
}

/// Monitoring policy configuration. Read-only to the evaluation engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    pub id: i64,
    pub name: String,
    pub monitor_object_id: i64,
    /// Monitored object display name, used in alert content templates.
    #[serde(default)]
    pub monitor_object_name: String,
    #[serde(default)]
    pub collect_type: String,
    pub source: Option<PolicySource>,
    pub period: PeriodSpec,
    pub no_data_period: Option<PeriodSpec>,
    pub no_data_recovery_period: Option<PeriodSpec>,
    pub algorithm: String,
    pub query_condition: QueryCondition,
    pub threshold: Vec<ThresholdRule>,
    /// Consecutive normal events required before auto-recovery; 0 disables it.
    pub recovery_condition: u32,
    pub no_data_level: AlertLevel,
    /// No-data notification gate: no-data events are dispatched only when > 0.
    pub no_data_alert: i32,
    /// Content template for threshold events (`$var` substitution).
    pub alert_name: String,
    /// Content template for no-data events; defaults to `"no data"`.
    pub no_data_alert_name: Option<String>,
    pub notice: bool,
    pub notice_type_id: String,
    pub notice_users: Vec<String>,
    pub metric_unit: Option<String>,
    pub calculation_unit: Option<String>,
    pub last_run_time: DateTime<Utc>,
    pub enable_alerts: Vec<EventKind>,
}

/// One classified detection produced by an evaluation run.
///
/// Replaces the loosely-typed event dicts of older revisions with a tagged
/// struct; `alert_id` is resolved exactly once during lifecycle processing
/// and must be set before the event is persisted.
#[derive(Debug, Clone)]
pub struct DetectedEvent {
    pub kind: EventKind,
    pub instance_id: String,
    pub value: Option<f64>,
    pub level: AlertLevel,
    pub content: String,
    pub raw_data: Option<serde_json::Value>,
    pub alert_id: Option<i64>,
}

/// Substitute `$var` / `${var}` placeholders from `ctx`, leaving unknown
/// placeholders untouched and `$$` as a literal dollar sign.
///
/// # Examples
///
/// ```
/// use std::collections::HashMap;
/// use vigil_common::types::render_template;
///
/// let mut ctx = HashMap::new();
/// ctx.insert("instance_name", "web-01".to_string());
/// let s = render_template("CPU high on ${instance_name}: $value", &ctx);
/// assert_eq!(s, "CPU high on web-01: $value");
/// ```
pub fn render_template(template: &str, ctx: &HashMap<&str, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        match chars.peek().copied() {
            Some('$') => {
                chars.next();
                out.push('$');
            }
            Some('{') => {
                chars.next();
                let mut name = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    name.push(c);
                }
                match ctx.get(name.as_str()) {
                    Some(v) if closed => out.push_str(v),
                    _ => {
                        out.push_str("${");
                        out.push_str(&name);
                        if closed {
                            out.push('}');
                        }
                    }
                }
            }
            Some(c) if c.is_ascii_alphanumeric() || c == '_' => {
                let mut name = String::new();
                while let Some(c) = chars.peek().copied() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        name.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                match ctx.get(name.as_str()) {
                    Some(v) => out.push_str(v),
                    None => {
                        out.push('$');
                        out.push_str(&name);
                    }
                }
            }
            _ => out.push('$'),
        }
    }

    out
}
