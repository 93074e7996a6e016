use crate::errors::ApiError;
use crate::services::logger::Logger;
use crate::services::settings::Settings;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use url::Url;

#[derive(Debug, Clone, Deserialize)]
pub struct PromSeries {
    #[serde(default)]
    pub metric: BTreeMap<String, Value>,
    #[serde(default)]
    pub values: Vec<(Value, Value)>,
    #[serde(default)]
    pub value: Option<(Value, Value)>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PromData {
    #[serde(rename = "resultType")]
    pub result_type: String,
    #[serde(default)]
    pub result: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PromResponse {
    pub status: String,
    #[serde(default)]
    pub data: Option<PromData>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default, rename = "errorType")]
    pub error_type: Option<String>,
}

impl PromResponse {
    fn into_data(self) -> Result<PromData, ApiError> {
        if self.status != "success" {
            return Err(ApiError::Remote(
                self.error
                    .or(self.error_type)
                    .unwrap_or_else(|| "prometheus query failed".to_string()),
            ));
        }
        self.data
            .ok_or_else(|| ApiError::Remote("prometheus response has no data".to_string()))
    }
}

fn sample_time(raw: &Value) -> Option<DateTime<Utc>> {
    let seconds = raw.as_f64().or_else(|| raw.as_str().and_then(|s| s.parse().ok()))?;
    DateTime::<Utc>::from_timestamp_millis((seconds * 1000.0) as i64)
}

fn sample_value(raw: &Value) -> Value {
    raw.as_str()
        .and_then(|s| s.parse::<f64>().ok())
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .unwrap_or_else(|| raw.clone())
}

fn series_labels(metric: &BTreeMap<String, Value>) -> String {
    metric
        .iter()
        .filter(|(key, _)| !key.starts_with("__"))
        .map(|(key, value)| match value {
            Value::String(text) => format!("{}={}", key, text),
            other => format!("{}={}", key, other),
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Flattens matrix and vector results into `{time, value, labels, name}` rows.
pub fn flatten_series(data: &PromData) -> Result<Vec<Value>, ApiError> {
    if data.result_type != "matrix" && data.result_type != "vector" {
        return Ok(data.result.as_array().cloned().unwrap_or_default());
    }
    let series: Vec<PromSeries> =
        serde_json::from_value(data.result.clone()).map_err(|err| ApiError::Decode {
            url: "prometheus".to_string(),
            message: err.to_string(),
        })?;
    let mut rows = Vec::new();
    for item in &series {
        let labels = series_labels(&item.metric);
        let name = item.metric.get("__name__").cloned().unwrap_or(Value::Null);
        let samples = item.values.iter().chain(item.value.iter());
        for (ts, value) in samples {
            let mut row = Map::new();
            row.insert(
                "time".to_string(),
                sample_time(ts)
                    .map(|t| Value::String(t.to_rfc3339()))
                    .unwrap_or(Value::Null),
            );
            row.insert("value".to_string(), sample_value(value));
            row.insert("labels".to_string(), Value::String(labels.clone()));
            row.insert("name".to_string(), name.clone());
            rows.push(Value::Object(row));
        }
    }
    Ok(rows)
}

#[derive(Clone)]
pub struct PrometheusClient {
    http: Client,
    uri: Option<String>,
    token: Option<String>,
    logger: Logger,
}

impl PrometheusClient {
    pub fn new(http: Client, settings: &Settings, logger: Logger) -> Self {
        let prometheus = settings.prometheus.clone().unwrap_or_default();
        Self {
            http,
            uri: prometheus.uri,
            token: prometheus.token,
            logger: logger.child("prometheus"),
        }
    }

    fn url(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let base = self
            .uri
            .as_deref()
            .ok_or_else(|| ApiError::Config("prometheus.uri is not set".to_string()))?;
        let mut url = Url::parse(base)
            .map_err(|err| ApiError::Config(format!("invalid uri {}: {}", base, err)))?;
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| ApiError::Config(format!("uri {} cannot carry a path", base)))?;
            path.pop_if_empty();
            path.extend(segments);
        }
        Ok(url)
    }

    async fn get(&self, url: Url, params: &[(&str, String)]) -> Result<PromResponse, ApiError> {
        self.logger.debug("GET", Some(&serde_json::json!({ "path": url.path() })));
        let mut builder = self.http.get(url.clone()).query(params);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        let response = builder.send().await.map_err(|source| ApiError::Request {
            url: url.to_string(),
            source,
        })?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(|source| ApiError::Request {
            url: url.to_string(),
            source,
        })?;
        let parsed: Result<PromResponse, _> = serde_json::from_slice(&bytes);
        match parsed {
            Ok(body) => Ok(body),
            Err(_) if !status.is_success() => Err(ApiError::Http {
                status: status.as_u16(),
                url: url.to_string(),
                body: String::from_utf8_lossy(&bytes).chars().take(2048).collect(),
            }),
            Err(err) => Err(ApiError::Decode {
                url: url.to_string(),
                message: err.to_string(),
            }),
        }
    }

    /// Range query from `now - lookback` to now.
    pub async fn query_range(
        &self,
        query: &str,
        lookback: Duration,
        step: &str,
    ) -> Result<PromData, ApiError> {
        let end = Utc::now();
        let start = end - lookback;
        let url = self.url(&["api", "v1", "query_range"])?;
        let params = [
            ("query", query.to_string()),
            ("start", start.timestamp().to_string()),
            ("end", end.timestamp().to_string()),
            ("step", step.to_string()),
        ];
        self.get(url, &params).await?.into_data()
    }

    /// Labels of the first series returned for `metric` over a short window.
    pub async fn metric_labels(
        &self,
        metric: &str,
        lookback: Duration,
    ) -> Result<BTreeMap<String, Value>, ApiError> {
        let data = self.query_range(metric, lookback, "1m").await?;
        let series: Vec<PromSeries> = serde_json::from_value(data.result).unwrap_or_default();
        Ok(series.into_iter().next().map(|s| s.metric).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matrix_results_flatten_to_rows() {
        let response: PromResponse = serde_json::from_value(serde_json::json!({
            "status": "success",
            "data": {
                "resultType": "matrix",
                "result": [{
                    "metric": {"__name__": "jobs_total", "instance": "coord-0", "state": "ok"},
                    "values": [[1714557600, "3"], [1714561200, "5.5"]]
                }]
            }
        }))
        .expect("response");
        let data = response.into_data().expect("data");
        let rows = flatten_series(&data).expect("rows");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["name"], "jobs_total");
        assert_eq!(rows[0]["labels"], "instance=coord-0,state=ok");
        assert_eq!(rows[1]["value"], 5.5);
        assert_eq!(rows[0]["time"], "2024-05-01T10:00:00+00:00");
    }

    #[test]
    fn error_status_surfaces_message() {
        let response: PromResponse = serde_json::from_value(serde_json::json!({
            "status": "error",
            "errorType": "bad_data",
            "error": "parse error at char 4"
        }))
        .expect("response");
        let err = response.into_data().expect_err("error");
        assert_eq!(err.to_string(), "parse error at char 4");
    }
}
