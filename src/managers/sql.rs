use crate::constants::reports::LOOKBACK_DAYS;
use crate::errors::{QueryError, ToolError};
use crate::services::jobs::{parse_timestamp, Query};
use crate::services::registry::{ToolDescriptor, ToolMode};
use crate::services::result_fetcher::{AssembledResult, Cell};
use crate::services::tool_executor::{ToolContext, ToolHandler};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

const QUERY_FAILED_MESSAGE: &str = "The query failed. Please check the syntax and try again";

/// Job failures come back as data so the agent can fix its SQL; every other
/// error is raised.
fn query_failure(err: QueryError) -> Result<Value, ToolError> {
    if err.is_job_outcome() {
        return Ok(serde_json::json!({
            "error": err.to_string(),
            "message": QUERY_FAILED_MESSAGE,
        }));
    }
    Err(ToolError::from(err))
}

fn dtypes(result: &AssembledResult) -> Map<String, Value> {
    match &result.schema {
        Some(schema) => schema
            .iter()
            .map(|column| (column.name.clone(), Value::String(column.type_name().to_string())))
            .collect(),
        None => Map::new(),
    }
}

pub struct RunSqlQuery;

impl RunSqlQuery {
    pub const NAME: &'static str = "RunSqlQuery";

    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::tool(
            Self::NAME,
            "Run a SELECT sql query on the Dremio cluster and return the results.\n\
             Ensure that SQL keywords like 'day', 'month', 'count', 'table' etc are enclosed in double quotes.\n\
             You are permitted to run only SELECT queries. No DML statements are allowed.",
            &[ToolMode::ForSelf, ToolMode::ForDataPatterns],
        )
        .with_schema(serde_json::json!({
            "type": "object",
            "properties": {
                "sql": {"type": "string", "description": "The sql query to run"}
            },
            "required": ["sql"]
        }))
    }
}

#[async_trait::async_trait]
impl ToolHandler for RunSqlQuery {
    async fn handle(&self, ctx: &ToolContext, args: Value) -> Result<Value, ToolError> {
        let sql = args.get("sql").and_then(|v| v.as_str()).unwrap_or("");
        let outcome = ctx
            .engine
            .run_sql(sql, Self::NAME, ctx.settings.allow_mutations(), true)
            .await;
        let result = match outcome {
            Ok(result) => result,
            Err(err) => return query_failure(err),
        };
        Ok(serde_json::json!({
            "rows": result.rows_as_json(),
            "columns": result.column_names(),
            "row_count": result.len(),
            "dtypes": dtypes(&result),
        }))
    }
}

/// Counts rows per distinct key tuple, sorted by key. Rows with a null key
/// column are left out.
fn group_counts(rows: &[Map<String, Value>], keys: &[&str]) -> Vec<Value> {
    let mut groups: BTreeMap<String, (Vec<Value>, u64)> = BTreeMap::new();
    for row in rows {
        let values: Option<Vec<Value>> = keys
            .iter()
            .map(|key| row.get(*key).filter(|v| !v.is_null()).cloned())
            .collect();
        let Some(values) = values else {
            continue;
        };
        let sort_key = values
            .iter()
            .map(|v| match v {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join("\u{1f}");
        groups.entry(sort_key).or_insert((values, 0)).1 += 1;
    }
    groups
        .into_values()
        .map(|(values, count)| {
            let mut record: Map<String, Value> = keys
                .iter()
                .map(|key| key.to_string())
                .zip(values)
                .collect();
            record.insert("count".to_string(), Value::from(count));
            Value::Object(record)
        })
        .collect()
}

/// One row per queried dataset; rows without datasets are dropped.
fn explode(rows: &[Map<String, Value>], column: &str) -> Vec<Map<String, Value>> {
    let mut exploded = Vec::new();
    for row in rows {
        let items = match row.get(column) {
            Some(Value::Array(items)) => items.clone(),
            Some(Value::Null) | None => Vec::new(),
            Some(other) => vec![other.clone()],
        };
        for item in items {
            let mut copy = row.clone();
            copy.insert(column.to_string(), item);
            exploded.push(copy);
        }
    }
    exploded
}

fn with_dates(result: &AssembledResult) -> Vec<Map<String, Value>> {
    result
        .rows
        .iter()
        .map(|row| {
            let date = row.get("startTime").and_then(|cell| match cell {
                Cell::Timestamp(ts) => Some(*ts),
                Cell::Value(value) => parse_timestamp(value),
            });
            let mut record: Map<String, Value> = row
                .iter()
                .map(|(key, cell)| (key.clone(), cell.as_value()))
                .collect();
            record.insert(
                "date".to_string(),
                date.map(|ts| Value::String(ts.date_naive().to_string()))
                    .unwrap_or(Value::Null),
            );
            record
        })
        .collect()
}

fn failed_jobs_sql(table: &str) -> String {
    format!(
        "select job_id as id,
            query_type as queryType,
            status as state,
            submitted_ts as startTime,
            query,
            (final_state_epoch_millis - submitted_epoch_millis) / 1000 as duration,
            queried_datasets as queriedDatasets,
            user_name as \"user\",
            engine,
            error_msg
            from {}
            where to_date(submitted_ts) >= current_date - interval '{}' day
            and status in ('CANCELED', 'FAILED')",
        table, LOOKBACK_DAYS
    )
}

pub struct GetFailedJobDetails;

impl GetFailedJobDetails {
    pub const NAME: &'static str = "GetFailedJobDetails";

    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::tool(
            Self::NAME,
            "Get the stats and details of failed or canceled jobs executed in the Dremio cluster in the past 7 days \
             along with a split by job type.\n\
             Returns the number of jobs over 7 days and job counts grouped by day and queryType together with \
             state, engine, user, queried dataset and error message.",
            &[ToolMode::ForSelf],
        )
    }

    pub fn summarize(result: &AssembledResult) -> Value {
        let rows = with_dates(result);
        serde_json::json!({
            "Number of jobs over 7 days": rows.len(),
            "Job categories by day, queryType and state": group_counts(&rows, &["date", "queryType", "state"]),
            "Job count by day, queryType and engine": group_counts(&rows, &["date", "queryType", "engine"]),
            "Job count by day, queryType, user": group_counts(&rows, &["date", "queryType", "user"]),
            "Job count by day, queriedDataset and state": group_counts(
                &explode(&rows, "queriedDatasets"),
                &["date", "queriedDatasets", "state"],
            ),
            "Job count by day, queryType and error": group_counts(&rows, &["date", "queryType", "error_msg"]),
        })
    }
}

#[async_trait::async_trait]
impl ToolHandler for GetFailedJobDetails {
    async fn handle(&self, ctx: &ToolContext, _args: Value) -> Result<Value, ToolError> {
        let query = Query::new(failed_jobs_sql(ctx.settings.jobs_table())).tagged(Self::NAME);
        match ctx.engine.run_query(&query, true).await {
            Ok(result) => Ok(Self::summarize(&result)),
            Err(err) => query_failure(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::jobs::ColumnSchema;

    fn rows(values: Value) -> Vec<Map<String, Value>> {
        values
            .as_array()
            .expect("array")
            .iter()
            .map(|v| v.as_object().expect("object").clone())
            .collect()
    }

    #[test]
    fn group_counts_skips_null_keys_and_sorts() {
        let rows = rows(serde_json::json!([
            {"date": "2025-05-02", "engine": "e1"},
            {"date": "2025-05-01", "engine": "e2"},
            {"date": "2025-05-02", "engine": "e1"},
            {"date": "2025-05-02", "engine": null},
        ]));
        let grouped = group_counts(&rows, &["date", "engine"]);
        assert_eq!(
            grouped,
            vec![
                serde_json::json!({"date": "2025-05-01", "engine": "e2", "count": 1}),
                serde_json::json!({"date": "2025-05-02", "engine": "e1", "count": 2}),
            ]
        );
    }

    #[test]
    fn explode_emits_one_row_per_dataset() {
        let rows = rows(serde_json::json!([
            {"id": "a", "queriedDatasets": ["s.t1", "s.t2"]},
            {"id": "b", "queriedDatasets": []},
            {"id": "c", "queriedDatasets": "s.t3"},
        ]));
        let exploded = explode(&rows, "queriedDatasets");
        let datasets: Vec<&str> = exploded
            .iter()
            .filter_map(|row| row.get("queriedDatasets").and_then(|v| v.as_str()))
            .collect();
        assert_eq!(datasets, vec!["s.t1", "s.t2", "s.t3"]);
    }

    #[test]
    fn failed_job_summary_groups_by_submission_day() {
        let mut result = AssembledResult::empty("job-1");
        result.schema = Some(vec![
            ColumnSchema::new("startTime", "TIMESTAMP"),
            ColumnSchema::new("queryType", "VARCHAR"),
        ]);
        for (ts, query_type, state) in [
            ("2025-05-01T10:00:00Z", "UI_RUN", "FAILED"),
            ("2025-05-01T23:59:00Z", "UI_RUN", "FAILED"),
            ("2025-05-02T01:00:00Z", "JDBC", "CANCELED"),
        ] {
            let mut row = BTreeMap::new();
            row.insert(
                "startTime".to_string(),
                Cell::Timestamp(ts.parse().expect("timestamp")),
            );
            row.insert("queryType".to_string(), Cell::Value(Value::from(query_type)));
            row.insert("state".to_string(), Cell::Value(Value::from(state)));
            result.rows.push(row);
        }
        result.row_count = 3;

        let summary = GetFailedJobDetails::summarize(&result);
        assert_eq!(summary["Number of jobs over 7 days"], 3);
        assert_eq!(
            summary["Job categories by day, queryType and state"],
            serde_json::json!([
                {"date": "2025-05-01", "queryType": "UI_RUN", "state": "FAILED", "count": 2},
                {"date": "2025-05-02", "queryType": "JDBC", "state": "CANCELED", "count": 1},
            ])
        );
        assert_eq!(summary["Job count by day, queryType and engine"], serde_json::json!([]));
    }

    #[test]
    fn job_failures_become_result_payloads() {
        let payload = query_failure(QueryError::JobFailed {
            job_id: "j".to_string(),
            message: "boom".to_string(),
        })
        .expect("payload");
        assert_eq!(payload["error"], "Job j failed: boom");
        assert_eq!(payload["message"], QUERY_FAILED_MESSAGE);

        let err = query_failure(QueryError::UnsafeQueryRejected { reason: None })
            .expect_err("raised");
        assert_eq!(err.code, "UNSAFE_QUERY");
    }
}
