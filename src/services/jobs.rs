use crate::errors::ApiError;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReferenceKind {
    Branch,
    Tag,
    Commit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceReference {
    #[serde(rename = "type")]
    pub kind: ReferenceKind,
    pub value: String,
}

/// A SQL statement with optional execution context. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Query {
    sql: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    references: Option<BTreeMap<String, SourceReference>>,
}

impl Query {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            context: None,
            references: None,
        }
    }

    pub fn with_context(mut self, context: Vec<String>) -> Self {
        self.context = Some(context).filter(|c| !c.is_empty());
        self
    }

    pub fn with_reference(mut self, source: impl Into<String>, reference: SourceReference) -> Self {
        self.references
            .get_or_insert_with(BTreeMap::new)
            .insert(source.into(), reference);
        self
    }

    /// Prepends a `/* dremioai: submitter=<name> */` marker line.
    pub fn tagged(mut self, submitter: &str) -> Self {
        self.sql = format!(
            "/* {}={} */\n{}",
            crate::constants::server::SQL_SUBMITTER_TAG,
            submitter,
            self.sql
        );
        self
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn context(&self) -> Option<&[String]> {
        self.context.as_deref()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    NotSubmitted,
    Starting,
    Running,
    Completed,
    Canceled,
    Failed,
    CancellationRequested,
    Enqueued,
    Planning,
    Pending,
    MetadataRetrieval,
    Queued,
    EngineStart,
    ExecutionPlanning,
    #[serde(other)]
    InvalidState,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Canceled | JobState::Failed)
    }

    pub fn succeeded(self) -> bool {
        self == JobState::Completed
    }
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|text| !text.trim().is_empty()))
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(parse_timestamp))
}

/// Accepts RFC3339, `YYYY-MM-DD HH:MM:SS[.fff]` and epoch milliseconds.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(num) => num
            .as_i64()
            .and_then(|millis| DateTime::<Utc>::from_timestamp_millis(millis)),
        Value::String(text) => {
            let text = text.trim();
            if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
                return Some(parsed.with_timezone(&Utc));
            }
            ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"]
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
                .map(|naive| naive.and_utc())
        }
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub job_state: JobState,
    #[serde(default)]
    pub row_count: Option<u64>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub error_message: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub query_type: Option<String>,
    #[serde(default)]
    pub queue_name: Option<String>,
    #[serde(default)]
    pub queue_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub resource_scheduling_started_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub resource_scheduling_ended_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub cancellation_reason: Option<String>,
    #[serde(default)]
    pub acceleration: Option<Value>,
}

impl Job {
    pub fn is_done(&self) -> bool {
        self.job_state.is_terminal()
    }

    /// Error text for an unsuccessful job: the error message, else the
    /// cancellation reason of a canceled job, else "Unknown error".
    pub fn failure_message(&self) -> String {
        if let Some(message) = &self.error_message {
            return message.clone();
        }
        if self.job_state == JobState::Canceled {
            if let Some(reason) = &self.cancellation_reason {
                return reason.clone();
            }
        }
        "Unknown error".to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobHandle {
    id: String,
}

impl JobHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnType {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
}

impl ColumnSchema {
    pub fn new(name: &str, type_name: &str) -> Self {
        Self {
            name: name.to_string(),
            column_type: ColumnType {
                name: type_name.to_string(),
            },
        }
    }

    pub fn type_name(&self) -> &str {
        &self.column_type.name
    }

    pub fn is_timestamp(&self) -> bool {
        self.column_type.name.eq_ignore_ascii_case("TIMESTAMP")
    }
}

pub type Row = serde_json::Map<String, Value>;

/// One offset-addressed slice of a job's rows as returned by the remote side.
/// `row_count` is the job total the server reports with every page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultPage {
    pub row_count: u64,
    #[serde(default)]
    pub schema: Option<Vec<ColumnSchema>>,
    #[serde(default)]
    pub rows: Vec<Row>,
}

impl ResultPage {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.schema
            .as_ref()
            .map(|schema| schema.iter().map(|c| c.name.clone()).collect())
            .unwrap_or_default()
    }
}

/// The three remote operations the query engine depends on.
#[async_trait]
pub trait JobApi: Send + Sync {
    async fn submit_query(&self, query: &Query) -> Result<String, ApiError>;

    async fn get_job_status(&self, job_id: &str) -> Result<Job, ApiError>;

    async fn get_job_result_page(
        &self,
        job_id: &str,
        offset: u64,
        limit: u64,
    ) -> Result<ResultPage, ApiError>;
}
