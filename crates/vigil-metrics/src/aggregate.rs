use crate::error::MetricsError;

/// Fixed registry of aggregation methods a policy may name.
///
/// An algorithm name outside this registry is a fatal configuration error;
/// the scan aborts before any query is issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    Sum,
    Avg,
    Max,
    Min,
    Count,
    Last,
}

impl std::str::FromStr for Aggregate {
    type Err = MetricsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sum" => Ok(Aggregate::Sum),
            "avg" => Ok(Aggregate::Avg),
            "max" => Ok(Aggregate::Max),
            "min" => Ok(Aggregate::Min),
            "count" => Ok(Aggregate::Count),
            "last" => Ok(Aggregate::Last),
            _ => Err(MetricsError::UnknownAlgorithm(s.to_string())),
        }
    }
}

impl Aggregate {
    fn fn_name(self) -> &'static str {
        match self {
            Aggregate::Sum => "sum",
            Aggregate::Avg => "avg",
            Aggregate::Max => "max",
            Aggregate::Min => "min",
            Aggregate::Count => "count",
            Aggregate::Last => "last",
        }
    }

    fn rollup_name(self) -> &'static str {
        match self {
            Aggregate::Sum => "sum_over_time",
            Aggregate::Avg => "avg_over_time",
            Aggregate::Max => "max_over_time",
            Aggregate::Min => "min_over_time",
            Aggregate::Count => "count_over_time",
            Aggregate::Last => "last_over_time",
        }
    }

    /// Wraps a base expression into an aggregated rollup grouped by the
    /// instance identity labels, e.g.
    /// `avg by (instance_id) (avg_over_time((node_cpu_usage)[5m]))`.
    pub fn wrap_expr(self, expr: &str, step: &str, group_by: &[String]) -> String {
        let by = group_by.join(",");
        match self {
            // the rollup keeps the grouping labels, no outer aggregation
            Aggregate::Last => format!("last_over_time(({expr})[{step}])"),
            // sample counts per group sum up
            Aggregate::Count => format!("sum by ({by}) (count_over_time(({expr})[{step}]))"),
            _ => format!(
                "{outer} by ({by}) ({rollup}(({expr})[{step}]))",
                outer = self.fn_name(),
                rollup = self.rollup_name()
            ),
        }
    }
}
