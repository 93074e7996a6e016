#![allow(dead_code)]

use async_trait::async_trait;
use dremioai::errors::ApiError;
use dremioai::services::jobs::{ColumnSchema, Job, JobApi, Query, ResultPage, Row};
use once_cell::sync::Lazy;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex as StdMutex;
use std::time::Duration;
use tokio::sync::Mutex;

pub static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

pub fn restore_env(key: &str, previous: Option<String>) {
    match previous {
        Some(value) => std::env::set_var(key, value),
        None => std::env::remove_var(key),
    }
}

pub fn job(state: &str, row_count: Option<u64>) -> Job {
    let mut raw = serde_json::json!({ "jobState": state });
    if let Some(count) = row_count {
        raw["rowCount"] = serde_json::Value::from(count);
    }
    serde_json::from_value(raw).expect("job")
}

pub fn failed_job(state: &str, error: Option<&str>, reason: Option<&str>) -> Job {
    serde_json::from_value(serde_json::json!({
        "jobState": state,
        "errorMessage": error,
        "cancellationReason": reason,
    }))
    .expect("job")
}

/// Scripted stand-in for the remote job API. Status calls walk through the
/// scripted states and repeat the last one. Result pages are cut from a
/// generated table of `table_rows` rows with columns `id` and `created_at`.
pub struct FakeJobApi {
    job_id: String,
    states: StdMutex<VecDeque<Job>>,
    last_state: StdMutex<Option<Job>>,
    table_rows: u64,
    schema: Vec<ColumnSchema>,
    page_schemas: HashMap<u64, Vec<ColumnSchema>>,
    delays: HashMap<u64, Duration>,
    failing_offsets: Vec<u64>,
    pub submitted: StdMutex<Vec<String>>,
    pub page_requests: StdMutex<Vec<(u64, u64)>>,
    pub completed_offsets: StdMutex<Vec<u64>>,
    pub status_calls: StdMutex<u64>,
}

impl FakeJobApi {
    pub fn new(job_id: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            states: StdMutex::new(VecDeque::new()),
            last_state: StdMutex::new(None),
            table_rows: 0,
            schema: vec![
                ColumnSchema::new("id", "BIGINT"),
                ColumnSchema::new("created_at", "TIMESTAMP"),
            ],
            page_schemas: HashMap::new(),
            delays: HashMap::new(),
            failing_offsets: Vec::new(),
            submitted: StdMutex::new(Vec::new()),
            page_requests: StdMutex::new(Vec::new()),
            completed_offsets: StdMutex::new(Vec::new()),
            status_calls: StdMutex::new(0),
        }
    }

    pub fn with_states(self, states: Vec<Job>) -> Self {
        *self.states.lock().expect("states") = states.into();
        self
    }

    pub fn with_table_rows(mut self, rows: u64) -> Self {
        self.table_rows = rows;
        self
    }

    pub fn with_page_schema(mut self, offset: u64, schema: Vec<ColumnSchema>) -> Self {
        self.page_schemas.insert(offset, schema);
        self
    }

    pub fn with_delay(mut self, offset: u64, delay: Duration) -> Self {
        self.delays.insert(offset, delay);
        self
    }

    pub fn with_failing_page(mut self, offset: u64) -> Self {
        self.failing_offsets.push(offset);
        self
    }

    pub fn requests(&self) -> Vec<(u64, u64)> {
        self.page_requests.lock().expect("requests").clone()
    }

    pub fn completion_order(&self) -> Vec<u64> {
        self.completed_offsets.lock().expect("completed").clone()
    }

    pub fn submitted_sql(&self) -> Vec<String> {
        self.submitted.lock().expect("submitted").clone()
    }

    pub fn status_call_count(&self) -> u64 {
        *self.status_calls.lock().expect("calls")
    }

    fn row(&self, index: u64) -> Row {
        let mut row = Row::new();
        row.insert("id".to_string(), serde_json::Value::from(index));
        row.insert(
            "created_at".to_string(),
            serde_json::Value::String(format!("2025-05-01 10:00:{:02}.000", index % 60)),
        );
        row
    }
}

#[async_trait]
impl JobApi for FakeJobApi {
    async fn submit_query(&self, query: &Query) -> Result<String, ApiError> {
        self.submitted.lock().expect("submitted").push(query.sql().to_string());
        Ok(self.job_id.clone())
    }

    async fn get_job_status(&self, job_id: &str) -> Result<Job, ApiError> {
        assert_eq!(job_id, self.job_id);
        *self.status_calls.lock().expect("calls") += 1;
        let next = self.states.lock().expect("states").pop_front();
        let mut last = self.last_state.lock().expect("last");
        if let Some(next) = next {
            *last = Some(next);
        }
        last.clone()
            .ok_or_else(|| ApiError::Remote("no job state scripted".to_string()))
    }

    async fn get_job_result_page(
        &self,
        job_id: &str,
        offset: u64,
        limit: u64,
    ) -> Result<ResultPage, ApiError> {
        assert_eq!(job_id, self.job_id);
        self.page_requests.lock().expect("requests").push((offset, limit));
        if let Some(delay) = self.delays.get(&offset) {
            tokio::time::sleep(*delay).await;
        }
        if self.failing_offsets.contains(&offset) {
            return Err(ApiError::Http {
                status: 503,
                url: format!("fake://job/{}/results?offset={}", job_id, offset),
                body: "unavailable".to_string(),
            });
        }
        let end = (offset + limit).min(self.table_rows);
        let rows = (offset..end).map(|index| self.row(index)).collect();
        self.completed_offsets.lock().expect("completed").push(offset);
        Ok(ResultPage {
            row_count: self.table_rows,
            schema: Some(
                self.page_schemas
                    .get(&offset)
                    .cloned()
                    .unwrap_or_else(|| self.schema.clone()),
            ),
            rows,
        })
    }
}
