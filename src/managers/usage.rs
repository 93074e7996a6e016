use crate::constants::reports::{LOOKBACK_DAYS, USAGE_PAGE_SIZE};
use crate::errors::ToolError;
use crate::services::jobs::parse_timestamp;
use crate::services::registry::{Precondition, ToolDescriptor, ToolMode};
use crate::services::tool_executor::{ToolContext, ToolHandler};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageData {
    id: String,
    #[serde(rename = "type", default)]
    usage_type: String,
    #[serde(default)]
    start_time: Value,
    #[serde(default)]
    end_time: Value,
    #[serde(default)]
    usage: f64,
}

impl UsageData {
    fn start(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.start_time)
    }

    fn end(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.end_time)
    }

    fn record(&self, id_key: &str) -> serde_json::Map<String, Value> {
        let render = |ts: Option<DateTime<Utc>>, raw: &Value| {
            ts.map(|t| Value::String(t.to_rfc3339())).unwrap_or_else(|| raw.clone())
        };
        let mut record = serde_json::Map::new();
        record.insert(id_key.to_string(), Value::String(self.id.clone()));
        record.insert("type".to_string(), Value::String(self.usage_type.clone()));
        record.insert("start".to_string(), render(self.start(), &self.start_time));
        record.insert("end".to_string(), render(self.end(), &self.end_time));
        record.insert("usage".to_string(), Value::from(self.usage));
        record
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsagePage {
    #[serde(default)]
    data: Vec<UsageData>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Clone, Default)]
struct UsageQuery {
    group_by: Option<&'static str>,
    start_ms: i64,
    end_ms: Option<i64>,
}

impl UsageQuery {
    fn filter(&self) -> String {
        let mut clauses = vec![format!("start_time >= {}", self.start_ms)];
        if let Some(end) = self.end_ms {
            clauses.push(format!("start_time <= {}", end));
        }
        clauses.join(" && ")
    }

    fn params(&self, page_token: Option<&str>) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("maxResults", USAGE_PAGE_SIZE.to_string()),
            ("filter", self.filter()),
        ];
        if let Some(group_by) = self.group_by {
            params.push(("groupBy", group_by.to_string()));
        }
        if let Some(token) = page_token {
            params.push(("pageToken", token.to_string()));
        }
        params
    }
}

/// Every page of a usage query, keeping only entries with non-zero usage.
async fn fetch_usage(ctx: &ToolContext, query: &UsageQuery) -> Result<Vec<UsageData>, ToolError> {
    let mut collected = Vec::new();
    let mut page_token: Option<String> = None;
    loop {
        let raw = ctx.dremio.usage(&query.params(page_token.as_deref())).await?;
        let page: UsagePage = serde_json::from_value(raw)
            .map_err(|err| ToolError::upstream(format!("unexpected usage response: {}", err)))?;
        collected.extend(page.data.into_iter().filter(|d| d.usage > 0.0));
        match page.next_page_token {
            Some(token) if !token.is_empty() => page_token = Some(token),
            _ => break,
        }
    }
    Ok(collected)
}

pub struct BuildUsageReport;

impl BuildUsageReport {
    pub const NAME: &'static str = "BuildUsageReport";

    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::tool(
            Self::NAME,
            "Build a usage report for the project grouped by engines for the past 7 days.\n\
             Hint: This is useful to plot a visualization",
            &[ToolMode::ForSelf],
        )
        .with_precondition(Precondition::ProjectId)
        .with_schema(serde_json::json!({
            "type": "object",
            "properties": {
                "by": {
                    "type": "string",
                    "enum": ["PROJECT", "ENGINE"],
                    "description": "grouping the usage by 'PROJECT' or 'ENGINE'"
                }
            }
        }))
    }
}

#[async_trait::async_trait]
impl ToolHandler for BuildUsageReport {
    async fn handle(&self, ctx: &ToolContext, args: Value) -> Result<Value, ToolError> {
        let by = args.get("by").and_then(|v| v.as_str()).unwrap_or("ENGINE");
        let since = Utc::now() - Duration::days(LOOKBACK_DAYS);
        let projects = fetch_usage(
            ctx,
            &UsageQuery {
                start_ms: since.timestamp_millis(),
                ..Default::default()
            },
        )
        .await?;

        if by == "PROJECT" {
            return Ok(Value::Array(
                projects
                    .iter()
                    .map(|usage| Value::Object(usage.record("project_id")))
                    .collect(),
            ));
        }

        let lookups = projects.iter().map(|project| async move {
            let query = UsageQuery {
                group_by: Some("ENGINE"),
                start_ms: project.start().unwrap_or(since).timestamp_millis(),
                end_ms: project.end().map(|t| t.timestamp_millis()),
            };
            let engines = fetch_usage(ctx, &query).await?;
            Ok::<_, ToolError>(
                engines
                    .iter()
                    .map(|engine| {
                        let mut record = engine.record("engine_id");
                        record.insert("project_id".to_string(), Value::String(project.id.clone()));
                        Value::Object(record)
                    })
                    .collect::<Vec<_>>(),
            )
        });
        let per_project = ctx.fan_out().run(lookups).await?;
        Ok(Value::Array(per_project.into_iter().flatten().collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_covers_window_bounds() {
        let open = UsageQuery {
            start_ms: 1_000,
            ..Default::default()
        };
        assert_eq!(open.filter(), "start_time >= 1000");
        let bounded = UsageQuery {
            group_by: Some("ENGINE"),
            start_ms: 1_000,
            end_ms: Some(2_000),
        };
        assert_eq!(bounded.filter(), "start_time >= 1000 && start_time <= 2000");
        let params = bounded.params(Some("next"));
        assert!(params.contains(&("groupBy", "ENGINE".to_string())));
        assert!(params.contains(&("pageToken", "next".to_string())));
        assert!(params.contains(&("maxResults", "500".to_string())));
    }

    #[test]
    fn usage_records_rename_the_id_column() {
        let page: UsagePage = serde_json::from_value(serde_json::json!({
            "data": [{
                "id": "p-1",
                "type": "PROJECT",
                "startTime": "2025-05-01T00:00:00Z",
                "endTime": "2025-05-02T00:00:00Z",
                "usage": 1.5
            }],
            "nextPageToken": null
        }))
        .expect("page");
        let record = page.data[0].record("project_id");
        assert_eq!(record["project_id"], "p-1");
        assert_eq!(record["start"], "2025-05-01T00:00:00+00:00");
        assert_eq!(record["usage"], 1.5);
        assert!(page.next_page_token.is_none());
    }
}
