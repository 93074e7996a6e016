use crate::constants::network::{TIMEOUT_API_REQUEST_MS, TIMEOUT_CONNECTION_MS};
use crate::errors::ToolError;
use crate::managers;
use crate::services::logger::{LogLevel, Logger};
use crate::services::registry::ToolRegistry;
use crate::services::settings::{Settings, SettingsOverrides, SharedSettings};
use crate::services::tool_executor::ToolExecutor;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub struct App {
    pub logger: Logger,
    pub settings: Arc<SharedSettings>,
    pub registry: Arc<ToolRegistry>,
    pub tool_executor: Arc<ToolExecutor>,
}

impl App {
    /// Every registered schema must compile and resource URIs must be unique.
    fn validate_tool_wiring(registry: &ToolRegistry) -> Result<(), ToolError> {
        let mut broken = Vec::new();
        let mut uris = HashSet::new();
        for tool in registry.tools() {
            let duplicate_uri = tool
                .descriptor
                .resource_uri()
                .map(|uri| !uris.insert(uri.to_string()))
                .unwrap_or(false);
            if !tool.schema_compiled() || duplicate_uri {
                broken.push(tool.descriptor.name.clone());
            }
        }
        if broken.is_empty() {
            return Ok(());
        }
        broken.sort();
        Err(ToolError::internal("Tool wiring is incomplete")
            .with_hint("Every tool needs a valid input schema and resources need distinct URIs")
            .with_details(serde_json::json!({ "broken_tools": broken })))
    }

    fn build_logger(settings: &Settings) -> Logger {
        let logger = Logger::new("dremioai");
        let logger = match settings.logging.level.as_deref().and_then(LogLevel::parse) {
            Some(level) => logger.with_level(level),
            None => logger,
        };
        if settings.logging.json {
            logger.with_json(true)
        } else {
            logger
        }
    }

    fn build_http(settings: &Settings) -> Result<reqwest::Client, ToolError> {
        let request_timeout = if settings.engine.request_timeout_ms == 0 {
            TIMEOUT_API_REQUEST_MS
        } else {
            settings.engine.request_timeout_ms
        };
        reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(TIMEOUT_CONNECTION_MS))
            .timeout(Duration::from_millis(request_timeout))
            .user_agent(format!("dremioai/{}", crate::constants::server::VERSION))
            .build()
            .map_err(|err| ToolError::internal(format!("Failed to build HTTP client: {}", err)))
    }

    pub fn load(path: Option<&Path>, overrides: &SettingsOverrides) -> Result<Self, ToolError> {
        Self::initialize(Settings::load(path, overrides)?)
    }

    pub fn initialize(settings: Settings) -> Result<Self, ToolError> {
        let mut registry = ToolRegistry::new();
        managers::register_builtin_tools(&mut registry);
        Self::with_registry(settings, registry)
    }

    pub fn with_registry(settings: Settings, registry: ToolRegistry) -> Result<Self, ToolError> {
        let logger = Self::build_logger(&settings);
        Self::validate_tool_wiring(&registry)?;
        let http = Self::build_http(&settings)?;

        logger.info(
            "settings loaded",
            Some(&serde_json::json!({
                "uri": settings.connection.uri,
                "prefix": settings.api_prefix(),
                "mode": settings.tools.mode.to_string(),
                "experimental": settings.experimental_enabled(),
                "allow_dml": settings.allow_mutations(),
            })),
        );

        let settings = Arc::new(SharedSettings::new(settings));
        let registry = Arc::new(registry);
        let tool_executor = Arc::new(ToolExecutor::new(
            logger.clone(),
            registry.clone(),
            settings.clone(),
            http,
        ));

        Ok(Self {
            logger,
            settings,
            registry,
            tool_executor,
        })
    }

    pub fn settings(&self) -> Arc<Settings> {
        self.settings.snapshot()
    }

    /// Swaps in a new snapshot. Calls already running keep the one they
    /// started with.
    pub fn reload_settings(&self, settings: Settings) -> Arc<Settings> {
        let next = self.settings.replace(settings);
        self.logger.info(
            "settings reloaded",
            Some(&serde_json::json!({ "mode": next.tools.mode.to_string() })),
        );
        next
    }

    /// Names of the tools (not resources) exposed under the current snapshot.
    pub fn exposed_tool_names(&self) -> Vec<String> {
        let settings = self.settings();
        self.registry
            .list_available(&settings.tools.mode, &settings)
            .into_iter()
            .map(|descriptor| descriptor.name.clone())
            .collect()
    }
}
