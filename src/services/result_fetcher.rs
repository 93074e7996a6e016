use crate::errors::QueryError;
use crate::services::jobs::{parse_timestamp, ColumnSchema, JobApi, JobHandle, ResultPage, Row};
use crate::services::logger::Logger;
use crate::services::parallel::BoundedExecutor;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub offset: u64,
    pub limit: u64,
}

/// Partitions `[0, row_count)` into consecutive windows of `min(page_size,
/// row_count)` rows; the last window holds the remainder.
pub fn plan_windows(row_count: u64, page_size: u64) -> Vec<Window> {
    if row_count == 0 {
        return Vec::new();
    }
    let step = page_size.max(1).min(row_count);
    (0..row_count)
        .step_by(step as usize)
        .map(|offset| Window {
            offset,
            limit: step.min(row_count - offset),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Timestamp(DateTime<Utc>),
    Value(Value),
}

impl Cell {
    pub fn as_value(&self) -> Value {
        match self {
            Cell::Timestamp(ts) => Value::String(ts.to_rfc3339()),
            Cell::Value(value) => value.clone(),
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Cell::Timestamp(ts) => Some(*ts),
            Cell::Value(_) => None,
        }
    }
}

pub type AssembledRow = BTreeMap<String, Cell>;

/// All pages of one job concatenated in offset order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssembledResult {
    pub job_id: String,
    pub row_count: u64,
    pub schema: Option<Vec<ColumnSchema>>,
    pub rows: Vec<AssembledRow>,
}

impl AssembledResult {
    pub fn empty(job_id: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            row_count: 0,
            schema: None,
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Schema order when known, otherwise the keys of the first row.
    pub fn column_names(&self) -> Vec<String> {
        match &self.schema {
            Some(schema) => schema.iter().map(|c| c.name.clone()).collect(),
            None => self
                .rows
                .first()
                .map(|row| row.keys().cloned().collect())
                .unwrap_or_default(),
        }
    }

    pub fn rows_as_json(&self) -> Vec<Value> {
        self.rows
            .iter()
            .map(|row| {
                Value::Object(
                    row.iter()
                        .map(|(key, cell)| (key.clone(), cell.as_value()))
                        .collect(),
                )
            })
            .collect()
    }
}

fn convert_row(row: Row, timestamp_columns: &HashSet<String>) -> AssembledRow {
    row.into_iter()
        .map(|(key, value)| {
            let cell = if timestamp_columns.contains(&key) {
                parse_timestamp(&value)
                    .map(Cell::Timestamp)
                    .unwrap_or(Cell::Value(value))
            } else {
                Cell::Value(value)
            };
            (key, cell)
        })
        .collect()
}

#[derive(Clone)]
pub struct ResultFetcher {
    api: Arc<dyn JobApi>,
    executor: BoundedExecutor,
    page_size: u64,
    validate_schema: bool,
    logger: Logger,
}

impl ResultFetcher {
    pub fn new(
        api: Arc<dyn JobApi>,
        executor: BoundedExecutor,
        page_size: u64,
        validate_schema: bool,
        logger: Logger,
    ) -> Self {
        Self {
            api,
            executor,
            page_size: page_size.max(1),
            validate_schema,
            logger: logger.child("fetcher"),
        }
    }

    /// Fetches every page of a completed job and assembles them. With
    /// `typed`, TIMESTAMP columns become structured timestamps.
    pub async fn fetch_all(
        &self,
        handle: &JobHandle,
        row_count: u64,
        typed: bool,
    ) -> Result<AssembledResult, QueryError> {
        if row_count == 0 {
            return Ok(AssembledResult::empty(handle.id()));
        }
        let windows = plan_windows(row_count, self.page_size);
        self.logger.debug(
            "fetching pages",
            Some(&serde_json::json!({
                "job_id": handle.id(),
                "row_count": row_count,
                "pages": windows.len(),
            })),
        );

        let api = &self.api;
        let job_id = handle.id();
        let pages: Vec<ResultPage> = self
            .executor
            .run(windows.iter().map(|window| async move {
                api.get_job_result_page(job_id, window.offset, window.limit)
                    .await
                    .map_err(|source| QueryError::Fetch {
                        job_id: job_id.to_string(),
                        offset: window.offset,
                        source,
                    })
            }))
            .await?;

        self.assemble(handle, row_count, &windows, pages, typed)
    }

    fn assemble(
        &self,
        handle: &JobHandle,
        row_count: u64,
        windows: &[Window],
        pages: Vec<ResultPage>,
        typed: bool,
    ) -> Result<AssembledResult, QueryError> {
        let schema = pages.first().and_then(|page| page.schema.clone());

        if self.validate_schema {
            let expected: Vec<String> = schema
                .as_ref()
                .map(|s| s.iter().map(|c| c.name.clone()).collect())
                .unwrap_or_default();
            for (window, page) in windows.iter().zip(pages.iter()).skip(1) {
                if page.schema.is_none() || schema.is_none() {
                    continue;
                }
                let actual = page.column_names();
                if actual != expected {
                    return Err(QueryError::SchemaMismatch {
                        job_id: handle.id().to_string(),
                        offset: window.offset,
                        expected,
                        actual,
                    });
                }
            }
        }

        let fetched: u64 = pages.iter().map(|page| page.len() as u64).sum();
        if fetched != row_count {
            return Err(QueryError::IncompleteResult {
                job_id: handle.id().to_string(),
                expected: row_count,
                actual: fetched,
            });
        }

        let timestamp_columns: HashSet<String> = if typed {
            schema
                .iter()
                .flatten()
                .filter(|column| column.is_timestamp())
                .map(|column| column.name.clone())
                .collect()
        } else {
            HashSet::new()
        };

        let rows = pages
            .into_iter()
            .flat_map(|page| page.rows)
            .map(|row| convert_row(row, &timestamp_columns))
            .collect();

        Ok(AssembledResult {
            job_id: handle.id().to_string(),
            row_count,
            schema,
            rows,
        })
    }
}
