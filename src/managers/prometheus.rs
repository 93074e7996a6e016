use crate::constants::reports::{LOOKBACK_DAYS, PROMQL_SCHEMA_WINDOW_MINUTES, PROMQL_STEP};
use crate::errors::ToolError;
use crate::services::prometheus_client::flatten_series;
use crate::services::registry::{Precondition, ToolDescriptor, ToolMode};
use crate::services::tool_executor::{ToolContext, ToolHandler};
use chrono::Duration;
use serde_json::Value;

const RELEVANT_METRICS: &[(&str, &str)] = &[
    ("jobs_total", "Total number of jobs executed in the Dremio cluster"),
    ("jobs_failed_total", "Total number of failed jobs executed in the Dremio cluster"),
    ("jobs_command_pool_queue_size", "Total number of jobs queued before planning"),
    (
        "jvm_gc_pause_seconds",
        "Indicates how long the JVM was paused for garbage collection, and also is a rubric to know if the system is in use",
    ),
    ("memory_heap_usage", "Indicates the amount of memory used by the JVM"),
    ("memory_heap_committed", "Indicates the amount of memory committed by the JVM"),
    (
        "dremio_engine_executors",
        "Number of executors running in the Dremio engine. It correlates to dremio_engine_replica_running using engine_id label",
    ),
    (
        "dremio_engine_replica_running",
        "Number of running replicas in the Dremio engine. It correlates to dremio_engine_executors using engine_id label",
    ),
];

fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    args.get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ToolError::invalid_params(format!("{} must be a non-empty string", key)))
}

pub struct GetRelevantMetrics;

impl GetRelevantMetrics {
    pub const NAME: &'static str = "GetRelevantMetrics";

    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::tool(
            Self::NAME,
            "Get the names and descriptions of the relevant prometheus metrics for the Dremio cluster. \
             A metric that shares the same value for label 'daas_dremio_com_coordinator_project_id' \
             belongs to the same project.\n\
             Returns a dictionary of metric name to description.",
            &[ToolMode::ForPrometheus],
        )
        .with_precondition(Precondition::PrometheusConfigured)
    }
}

#[async_trait::async_trait]
impl ToolHandler for GetRelevantMetrics {
    async fn handle(&self, _ctx: &ToolContext, _args: Value) -> Result<Value, ToolError> {
        Ok(Value::Object(
            RELEVANT_METRICS
                .iter()
                .map(|(name, description)| {
                    (name.to_string(), Value::String(description.to_string()))
                })
                .collect(),
        ))
    }
}

pub struct GetMetricSchema;

impl GetMetricSchema {
    pub const NAME: &'static str = "GetMetricSchema";

    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::tool(
            Self::NAME,
            "Given the name of the metric, this will return all the labels you can expect to see for that metric.\n\
             Returns a dictionary of label name to a sample value of the label.",
            &[ToolMode::ForPrometheus],
        )
        .with_precondition(Precondition::PrometheusConfigured)
        .with_schema(serde_json::json!({
            "type": "object",
            "properties": {
                "metric": {"type": "string", "description": "The name of the metric"}
            },
            "required": ["metric"]
        }))
    }
}

#[async_trait::async_trait]
impl ToolHandler for GetMetricSchema {
    async fn handle(&self, ctx: &ToolContext, args: Value) -> Result<Value, ToolError> {
        let metric = required_str(&args, "metric")?;
        let labels = ctx
            .prometheus
            .metric_labels(metric, Duration::minutes(PROMQL_SCHEMA_WINDOW_MINUTES))
            .await?;
        Ok(Value::Object(labels.into_iter().collect()))
    }
}

pub struct RunPromQL;

impl RunPromQL {
    pub const NAME: &'static str = "RunPromQL";

    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::tool(
            Self::NAME,
            "Runs a prometheus query over the last 7 days and returns the results",
            &[ToolMode::ForPrometheus],
        )
        .with_precondition(Precondition::PrometheusConfigured)
        .with_schema(serde_json::json!({
            "type": "object",
            "properties": {
                "promql_query": {"type": "string", "description": "The PromQL query to run"}
            },
            "required": ["promql_query"]
        }))
    }
}

#[async_trait::async_trait]
impl ToolHandler for RunPromQL {
    async fn handle(&self, ctx: &ToolContext, args: Value) -> Result<Value, ToolError> {
        let query = required_str(&args, "promql_query")?;
        let data = ctx
            .prometheus
            .query_range(query, Duration::days(LOOKBACK_DAYS), PROMQL_STEP)
            .await?;
        let metrics = flatten_series(&data)?;
        Ok(serde_json::json!({
            "columns": ["time", "value", "labels", "name"],
            "row_count": metrics.len(),
            "metrics": metrics,
        }))
    }
}
