use crate::errors::ApiError;
use crate::services::jobs::{Job, JobApi, Query, ResultPage};
use crate::services::logger::Logger;
use crate::services::settings::Settings;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

#[derive(Debug, Deserialize)]
struct QuerySubmission {
    id: String,
}

/// Bearer-token JSON client for the analytics platform REST API.
#[derive(Clone)]
pub struct DremioClient {
    http: Client,
    uri: Option<String>,
    pat: Option<String>,
    project_id: Option<String>,
    logger: Logger,
}

impl DremioClient {
    pub fn new(http: Client, settings: &Settings, logger: Logger) -> Self {
        Self {
            http,
            uri: settings.connection.uri.clone(),
            pat: settings.connection.pat.clone(),
            project_id: settings.connection.project_id.clone(),
            logger: logger.child("dremio"),
        }
    }

    pub fn project_id(&self) -> Option<&str> {
        self.project_id.as_deref()
    }

    fn prefix_segments(&self) -> Vec<String> {
        match &self.project_id {
            Some(project_id) => vec!["v0".to_string(), "projects".to_string(), project_id.clone()],
            None => vec!["api".to_string(), "v3".to_string()],
        }
    }

    fn build_url(&self, segments: &[String]) -> Result<Url, ApiError> {
        let base = self
            .uri
            .as_deref()
            .ok_or_else(|| ApiError::Config("connection.uri is not set".to_string()))?;
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

    /// URL under the job/catalog prefix (`/api/v3` or `/v0/projects/{id}`).
    fn scoped_url(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut all = self.prefix_segments();
        all.extend(segments.iter().map(|s| s.to_string()));
        self.build_url(&all)
    }

    fn authorize(&self, builder: RequestBuilder) -> Result<RequestBuilder, ApiError> {
        let pat = self
            .pat
            .as_deref()
            .ok_or_else(|| ApiError::Config("connection.pat is not set".to_string()))?;
        Ok(builder.bearer_auth(pat))
    }

    async fn send<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        url: &Url,
    ) -> Result<T, ApiError> {
        let response = self
            .authorize(builder)?
            .send()
            .await
            .map_err(|source| ApiError::Request {
                url: url.to_string(),
                source,
            })?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(|source| ApiError::Request {
            url: url.to_string(),
            source,
        })?;
        if !status.is_success() {
            let body = String::from_utf8_lossy(&bytes).chars().take(2048).collect();
            self.logger.warn(
                "request failed",
                Some(&serde_json::json!({ "url": url.path(), "status": status.as_u16() })),
            );
            return Err(ApiError::Http {
                status: status.as_u16(),
                url: url.to_string(),
                body,
            });
        }
        serde_json::from_slice(&bytes).map_err(|err| ApiError::Decode {
            url: url.to_string(),
            message: err.to_string(),
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        params: &[(&str, String)],
    ) -> Result<T, ApiError> {
        self.logger.debug("GET", Some(&serde_json::json!({ "path": url.path() })));
        let builder = self.http.get(url.clone()).query(params);
        self.send(builder, &url).await
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        url: Url,
        body: &B,
    ) -> Result<T, ApiError> {
        self.logger.debug("POST", Some(&serde_json::json!({ "path": url.path() })));
        let builder = self.http.post(url.clone()).json(body);
        self.send(builder, &url).await
    }

    pub async fn catalog_by_path(&self, path: &[String]) -> Result<Value, ApiError> {
        let mut segments = vec!["catalog", "by-path"];
        segments.extend(path.iter().map(String::as_str));
        let url = self.scoped_url(&segments)?;
        self.get_json(url, &[]).await
    }

    pub async fn catalog_by_id(&self, id: &str) -> Result<Value, ApiError> {
        let url = self.scoped_url(&["catalog", id])?;
        self.get_json(url, &[]).await
    }

    /// `kind` is `tag` or `wiki`.
    pub async fn collaboration(&self, id: &str, kind: &str) -> Result<Value, ApiError> {
        let url = self.scoped_url(&["catalog", id, "collaboration", kind])?;
        self.get_json(url, &[]).await
    }

    pub async fn lineage(&self, id: &str) -> Result<Value, ApiError> {
        let url = self.scoped_url(&["catalog", id, "graph"])?;
        self.get_json(url, &[]).await
    }

    pub async fn search(&self, body: &Value) -> Result<Value, ApiError> {
        let url = self.scoped_url(&["search"])?;
        self.post_json(url, body).await
    }

    pub async fn usage(&self, params: &[(&str, String)]) -> Result<Value, ApiError> {
        let url = self.build_url(&["v0".to_string(), "usage".to_string()])?;
        self.get_json(url, params).await
    }
}

#[async_trait]
impl JobApi for DremioClient {
    async fn submit_query(&self, query: &Query) -> Result<String, ApiError> {
        let url = self.scoped_url(&["sql"])?;
        let submission: QuerySubmission = self.post_json(url, query).await?;
        Ok(submission.id)
    }

    async fn get_job_status(&self, job_id: &str) -> Result<Job, ApiError> {
        let url = self.scoped_url(&["job", job_id])?;
        self.get_json(url, &[]).await
    }

    async fn get_job_result_page(
        &self,
        job_id: &str,
        offset: u64,
        limit: u64,
    ) -> Result<ResultPage, ApiError> {
        let url = self.scoped_url(&["job", job_id, "results"])?;
        self.get_json(
            url,
            &[("offset", offset.to_string()), ("limit", limit.to_string())],
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(raw: &str) -> DremioClient {
        let mut settings = Settings::from_json_str(raw).expect("settings");
        settings.normalize().expect("normalize");
        DremioClient::new(Client::new(), &settings, Logger::new("test"))
    }

    #[test]
    fn urls_follow_project_scoping() {
        let software = client(r#"{"connection": {"uri": "http://localhost:9047/"}}"#);
        assert_eq!(
            software.scoped_url(&["job", "abc", "results"]).expect("url").as_str(),
            "http://localhost:9047/api/v3/job/abc/results"
        );
        let cloud = client(r#"{"connection": {"uri": "prod", "project_id": "p-1"}}"#);
        assert_eq!(
            cloud.scoped_url(&["sql"]).expect("url").as_str(),
            "https://api.dremio.cloud/v0/projects/p-1/sql"
        );
        assert_eq!(
            cloud.build_url(&["v0".to_string(), "usage".to_string()]).expect("url").as_str(),
            "https://api.dremio.cloud/v0/usage"
        );
    }

    #[test]
    fn catalog_path_components_are_escaped() {
        let software = client(r#"{"connection": {"uri": "http://localhost:9047"}}"#);
        let url = software
            .scoped_url(&["catalog", "by-path", "my space", "a/b"])
            .expect("url");
        assert_eq!(url.path(), "/api/v3/catalog/by-path/my%20space/a%2Fb");
    }

    #[test]
    fn missing_uri_is_a_config_error() {
        let unconfigured = client("{}");
        assert!(matches!(unconfigured.scoped_url(&["sql"]), Err(ApiError::Config(_))));
    }
}
