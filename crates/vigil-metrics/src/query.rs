use vigil_common::types::{FilterCondition, FilterMethod, PeriodSpec, PeriodUnit};

/// Placeholder in metric query templates replaced by the rendered filter.
pub const LABELS_PLACEHOLDER: &str = "__$labels__";

/// Formats a period into the backend's duration syntax, dividing the window
/// across `points` samples (`{type: min, value: 5}` with 1 point → `"5m"`).
pub fn format_step(period: &PeriodSpec, points: u32) -> String {
    let suffix = match period.unit {
        PeriodUnit::Min => "m",
        PeriodUnit::Hour => "h",
        PeriodUnit::Day => "d",
    };
    let value = period.value / points.max(1);
    format!("{value}{suffix}")
}

/// Renders policy filter conditions into label matchers,
/// e.g. `device="sda",mount=~"/data.*"`.
pub fn render_label_filter(filters: &[FilterCondition]) -> String {
    let matchers: Vec<String> = filters
        .iter()
        .map(|f| {
            let op = match f.method {
                FilterMethod::Eq => "=",
                FilterMethod::Ne => "!=",
                FilterMethod::Include => "=~",
                FilterMethod::Exclude => "!~",
            };
            format!("{}{}\"{}\"", f.name, op, f.value)
        })
        .collect();
    matchers.join(",")
}

/// Substitutes the label placeholder of a metric query template.
pub fn apply_label_template(query: &str, filter_str: &str) -> String {
    query.replace(LABELS_PLACEHOLDER, filter_str)
}
