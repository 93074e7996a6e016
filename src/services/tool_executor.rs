use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;

use crate::errors::ToolError;
use crate::services::dremio_client::DremioClient;
use crate::services::jobs::JobApi;
use crate::services::logger::Logger;
use crate::services::parallel::BoundedExecutor;
use crate::services::prometheus_client::PrometheusClient;
use crate::services::query_engine::QueryEngine;
use crate::services::registry::{RegisteredTool, ToolRegistry};
use crate::services::settings::{Settings, SharedSettings};

/// Everything one tool invocation may touch. Built from a single settings
/// snapshot that stays fixed for the whole call.
#[derive(Clone)]
pub struct ToolContext {
    pub settings: Arc<Settings>,
    pub logger: Logger,
    pub dremio: Arc<DremioClient>,
    pub prometheus: Arc<PrometheusClient>,
    pub engine: QueryEngine,
}

impl ToolContext {
    pub fn from_settings(settings: Arc<Settings>, http: Client, logger: Logger) -> Self {
        let dremio = Arc::new(DremioClient::new(http.clone(), &settings, logger.clone()));
        let prometheus = Arc::new(PrometheusClient::new(http, &settings, logger.clone()));
        let engine = QueryEngine::new(dremio.clone(), &settings.engine, logger.clone());
        Self {
            settings,
            logger,
            dremio,
            prometheus,
            engine,
        }
    }

    /// Routes query execution to another backend; catalog calls still use
    /// the HTTP client.
    pub fn with_job_api(mut self, api: Arc<dyn JobApi>) -> Self {
        self.engine = QueryEngine::new(api, &self.settings.engine, self.logger.clone());
        self
    }

    pub fn fan_out(&self) -> BoundedExecutor {
        BoundedExecutor::new(self.settings.engine.max_concurrency)
    }
}

#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn handle(&self, ctx: &ToolContext, args: Value) -> Result<Value, ToolError>;
}

#[derive(Clone)]
pub struct ToolExecutor {
    logger: Logger,
    registry: Arc<ToolRegistry>,
    settings: Arc<SharedSettings>,
    http: Client,
}

impl ToolExecutor {
    pub fn new(
        logger: Logger,
        registry: Arc<ToolRegistry>,
        settings: Arc<SharedSettings>,
        http: Client,
    ) -> Self {
        Self {
            logger: logger.child("executor"),
            registry,
            settings,
            http,
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn context(&self) -> ToolContext {
        ToolContext::from_settings(self.settings.snapshot(), self.http.clone(), self.logger.clone())
    }

    pub async fn execute(&self, tool: &str, args: Value) -> Result<Value, ToolError> {
        let ctx = self.context();
        self.execute_with(&ctx, tool, args).await
    }

    pub async fn execute_with(
        &self,
        ctx: &ToolContext,
        tool: &str,
        args: Value,
    ) -> Result<Value, ToolError> {
        let registered = self
            .registry
            .resolve(tool, &ctx.settings.tools.mode, &ctx.settings)?;
        let args = if args.is_null() {
            Value::Object(Default::default())
        } else {
            args
        };
        registered.validate_args(&args)?;
        self.invoke(ctx, registered, args).await
    }

    pub async fn read_resource(&self, uri: &str) -> Result<Value, ToolError> {
        let ctx = self.context();
        let registered = self
            .registry
            .resolve_resource(uri, &ctx.settings.tools.mode, &ctx.settings)?;
        self.invoke(&ctx, registered, Value::Object(Default::default()))
            .await
    }

    async fn invoke(
        &self,
        ctx: &ToolContext,
        registered: &RegisteredTool,
        args: Value,
    ) -> Result<Value, ToolError> {
        let name = registered.descriptor.name.as_str();
        let trace_id = uuid::Uuid::new_v4().to_string();
        let started_at = chrono::Utc::now();
        self.logger.debug(
            "tool call",
            Some(&serde_json::json!({ "tool": name, "trace_id": trace_id })),
        );

        let outcome = registered.handler.handle(ctx, args).await;
        let duration_ms = (chrono::Utc::now() - started_at).num_milliseconds();

        match outcome {
            Ok(result) => {
                self.logger.info(
                    "tool ok",
                    Some(&serde_json::json!({ "tool": name, "duration_ms": duration_ms })),
                );
                Ok(serde_json::json!({
                    "result": result,
                    "meta": {
                        "tool": name,
                        "trace_id": trace_id,
                        "started_at": started_at.to_rfc3339(),
                        "duration_ms": duration_ms,
                    }
                }))
            }
            Err(err) => {
                self.logger.warn(
                    "tool failed",
                    Some(&serde_json::json!({
                        "tool": name,
                        "duration_ms": duration_ms,
                        "code": err.code,
                        "message": err.message,
                    })),
                );
                Err(err)
            }
        }
    }
}
