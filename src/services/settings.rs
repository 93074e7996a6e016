use crate::constants::{engine, network};
use crate::errors::ToolError;
use crate::services::registry::{ModeSet, ToolMode};
use crate::utils::feature_flags::env_flag;
use crate::utils::paths::{expand_home, resolve_config_path};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    pub uri: Option<String>,
    pub pat: Option<String>,
    pub project_id: Option<String>,
    pub allow_dml: bool,
    pub enable_experimental: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsSettings {
    #[serde(alias = "server_mode")]
    pub mode: ModeSet,
    pub enable_experimental: bool,
}

impl Default for ToolsSettings {
    fn default() -> Self {
        Self {
            mode: ModeSet::of(&[ToolMode::ForSelf]),
            enable_experimental: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PrometheusSettings {
    pub uri: Option<String>,
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub poll_interval_ms: u64,
    pub max_poll_attempts: Option<u64>,
    pub poll_timeout_ms: Option<u64>,
    pub page_size: u64,
    pub max_concurrency: usize,
    pub validate_page_schema: bool,
    pub request_timeout_ms: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: engine::POLL_INTERVAL_MS,
            max_poll_attempts: None,
            poll_timeout_ms: None,
            page_size: engine::PAGE_SIZE,
            max_concurrency: engine::MAX_CONCURRENCY,
            validate_page_schema: true,
            request_timeout_ms: network::TIMEOUT_API_REQUEST_MS,
        }
    }
}

impl EngineSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn poll_timeout(&self) -> Option<Duration> {
        self.poll_timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: Option<String>,
    pub json: bool,
}

/// Immutable configuration snapshot. Components receive an `Arc<Settings>`
/// and never mutate it; reloads build a new snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    #[serde(alias = "dremio")]
    pub connection: ConnectionSettings,
    pub tools: ToolsSettings,
    pub prometheus: Option<PrometheusSettings>,
    pub engine: EngineSettings,
    pub logging: LoggingSettings,
}

/// Values supplied on the command line; highest precedence.
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub uri: Option<String>,
    pub pat: Option<String>,
    pub project_id: Option<String>,
    pub mode: Option<ModeSet>,
    pub log_json: bool,
}

impl Settings {
    /// Reads the config file (missing file means defaults), then applies
    /// environment and explicit overrides, then normalizes.
    pub fn load(path: Option<&Path>, overrides: &SettingsOverrides) -> Result<Self, ToolError> {
        let path: PathBuf = path
            .map(Path::to_path_buf)
            .unwrap_or_else(resolve_config_path);
        let mut settings = Settings::from_file(&path)?;
        settings.apply_env()?;
        settings.apply_overrides(overrides);
        settings.normalize()?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self, ToolError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Settings::default())
            }
            Err(err) => {
                return Err(ToolError::internal(format!(
                    "Failed to read config {}: {}",
                    path.display(),
                    err
                )))
            }
        };
        Settings::from_json_str(&raw).map_err(|err| {
            err.with_details(serde_json::json!({ "path": path.display().to_string() }))
        })
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ToolError> {
        if raw.trim().is_empty() {
            return Ok(Settings::default());
        }
        let mut settings: Settings = serde_json::from_str(raw)
            .map_err(|err| ToolError::invalid_params(format!("Invalid config: {}", err)))?;
        settings.fold_legacy_flags();
        Ok(settings)
    }

    /// `connection.enable_experimental` is the legacy spelling. It is folded
    /// into `tools.enable_experimental` so later layers override one field.
    fn fold_legacy_flags(&mut self) {
        if self.connection.enable_experimental {
            self.tools.enable_experimental = true;
            self.connection.enable_experimental = false;
        }
    }

    pub fn apply_env(&mut self) -> Result<(), ToolError> {
        if let Ok(uri) = std::env::var("DREMIOAI_URI") {
            self.connection.uri = Some(uri);
        }
        if let Ok(pat) = std::env::var("DREMIOAI_PAT") {
            self.connection.pat = Some(pat);
        }
        if let Ok(project_id) = std::env::var("DREMIOAI_PROJECT_ID") {
            self.connection.project_id = Some(project_id);
        }
        if let Ok(mode) = std::env::var("DREMIOAI_MODE") {
            self.tools.mode = mode
                .parse()
                .map_err(|err: String| {
                    ToolError::invalid_params(format!("DREMIOAI_MODE: {}", err))
                })?;
        }
        if let Some(allow_dml) = env_flag("DREMIOAI_ALLOW_DML") {
            self.connection.allow_dml = allow_dml;
        }
        if let Some(enabled) = env_flag("DREMIOAI_ENABLE_EXPERIMENTAL") {
            self.tools.enable_experimental = enabled;
        }
        Ok(())
    }

    pub fn apply_overrides(&mut self, overrides: &SettingsOverrides) {
        if let Some(uri) = &overrides.uri {
            self.connection.uri = Some(uri.clone());
        }
        if let Some(pat) = &overrides.pat {
            self.connection.pat = Some(pat.clone());
        }
        if let Some(project_id) = &overrides.project_id {
            self.connection.project_id = Some(project_id.clone());
        }
        if let Some(mode) = &overrides.mode {
            self.tools.mode = mode.clone();
        }
        if overrides.log_json {
            self.logging.json = true;
        }
    }

    pub fn normalize(&mut self) -> Result<(), ToolError> {
        self.connection.uri = non_empty(self.connection.uri.take())
            .map(|uri| resolve_uri(&uri))
            .transpose()
            .map_err(ToolError::invalid_params)?;
        self.connection.pat = non_empty(self.connection.pat.take())
            .map(|pat| resolve_token(&pat))
            .transpose()?;
        self.connection.project_id = non_empty(self.connection.project_id.take());
        if let Some(prometheus) = self.prometheus.as_mut() {
            prometheus.uri = non_empty(prometheus.uri.take())
                .map(|uri| resolve_uri(&uri))
                .transpose()
                .map_err(ToolError::invalid_params)?;
            prometheus.token = non_empty(prometheus.token.take())
                .map(|token| resolve_token(&token))
                .transpose()?;
        }
        self.engine.page_size = self.engine.page_size.max(1);
        self.engine.max_concurrency = self.engine.max_concurrency.max(1);
        Ok(())
    }

    pub fn experimental_enabled(&self) -> bool {
        self.tools.enable_experimental
    }

    pub fn allow_mutations(&self) -> bool {
        self.connection.allow_dml
    }

    /// Path prefix of the job and catalog endpoints.
    pub fn api_prefix(&self) -> String {
        match &self.connection.project_id {
            Some(project_id) => format!("/v0/projects/{}", project_id),
            None => "/api/v3".to_string(),
        }
    }

    pub fn jobs_table(&self) -> &'static str {
        if self.connection.project_id.is_some() {
            "sys.project.jobs_recent"
        } else {
            "sys.jobs_recent"
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Expands the `prod`/`prodemea` shorthands and strips trailing slashes.
pub fn resolve_uri(raw: &str) -> Result<String, String> {
    let trimmed = raw.trim();
    match trimmed.to_lowercase().as_str() {
        "prod" => return Ok(network::DREMIO_CLOUD_URI.to_string()),
        "prodemea" => return Ok(network::DREMIO_CLOUD_EMEA_URI.to_string()),
        _ => {}
    }
    let parsed = url::Url::parse(trimmed)
        .map_err(|err| format!("Invalid uri '{}': {}", trimmed, err))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(format!("Invalid uri '{}': expected http or https", trimmed));
    }
    Ok(trimmed.trim_end_matches('/').to_string())
}

/// A token of the form `@path` is read from that file.
pub fn resolve_token(raw: &str) -> Result<String, ToolError> {
    let Some(path) = raw.strip_prefix('@') else {
        return Ok(raw.to_string());
    };
    let path = expand_home(path);
    let token = std::fs::read_to_string(&path).map_err(|err| {
        ToolError::invalid_params(format!("Failed to read token file {}: {}", path.display(), err))
    })?;
    let token = token.trim().to_string();
    if token.is_empty() {
        return Err(ToolError::invalid_params(format!(
            "Token file {} is empty",
            path.display()
        )));
    }
    Ok(token)
}

/// Holder of the current snapshot. Readers clone the `Arc` and keep it for
/// the whole operation; `replace` swaps atomically.
#[derive(Debug)]
pub struct SharedSettings {
    current: RwLock<Arc<Settings>>,
}

impl SharedSettings {
    pub fn new(settings: Settings) -> Self {
        Self {
            current: RwLock::new(Arc::new(settings)),
        }
    }

    pub fn snapshot(&self) -> Arc<Settings> {
        self.current
            .read()
            .unwrap_or_else(|err| err.into_inner())
            .clone()
    }

    pub fn replace(&self, settings: Settings) -> Arc<Settings> {
        let next = Arc::new(settings);
        let mut guard = self.current.write().unwrap_or_else(|err| err.into_inner());
        *guard = next.clone();
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_engine_constants() {
        let settings = Settings::default();
        assert_eq!(settings.engine.poll_interval_ms, 500);
        assert_eq!(settings.engine.page_size, 500);
        assert_eq!(settings.engine.max_concurrency, 10);
        assert!(settings.engine.max_poll_attempts.is_none());
        assert!(!settings.connection.allow_dml);
        assert_eq!(settings.tools.mode, ModeSet::of(&[ToolMode::ForSelf]));
        assert_eq!(settings.api_prefix(), "/api/v3");
    }

    #[test]
    fn parses_legacy_section_names() {
        let raw = r#"{
            "dremio": {"uri": "prod", "pat": "abc", "project_id": "p1", "enable_experimental": true},
            "tools": {"server_mode": "FOR_SELF,FOR_PROMETHEUS"}
        }"#;
        let mut settings = Settings::from_json_str(raw).expect("parse");
        settings.normalize().expect("normalize");
        assert_eq!(settings.connection.uri.as_deref(), Some("https://api.dremio.cloud"));
        assert_eq!(settings.api_prefix(), "/v0/projects/p1");
        assert_eq!(settings.jobs_table(), "sys.project.jobs_recent");
        assert!(settings.experimental_enabled());
        assert!(settings.tools.enable_experimental);
        assert!(!settings.connection.enable_experimental);
        assert!(settings.tools.mode.contains(ToolMode::ForPrometheus));
    }

    #[test]
    fn resolve_uri_handles_shorthands_and_trailing_slash() {
        assert_eq!(resolve_uri("PRODEMEA").as_deref(), Ok("https://api.eu.dremio.cloud"));
        assert_eq!(
            resolve_uri("http://localhost:9047/").as_deref(),
            Ok("http://localhost:9047")
        );
        assert!(resolve_uri("not a uri").is_err());
    }

    #[test]
    fn blank_project_id_counts_as_absent() {
        let mut settings =
            Settings::from_json_str(r#"{"connection": {"project_id": "  "}}"#).expect("parse");
        settings.normalize().expect("normalize");
        assert!(settings.connection.project_id.is_none());
    }

    #[test]
    fn token_file_is_read_and_trimmed() {
        let path = std::env::temp_dir().join(format!("dremioai-pat-{}", uuid::Uuid::new_v4()));
        std::fs::write(&path, "secret-token\n").expect("write");
        let token = resolve_token(&format!("@{}", path.display())).expect("token");
        assert_eq!(token, "secret-token");
        let _ = std::fs::remove_file(&path);
        assert_eq!(resolve_token("plain").expect("plain"), "plain");
    }

    #[test]
    fn replace_does_not_disturb_held_snapshots() {
        let shared = SharedSettings::new(Settings::default());
        let before = shared.snapshot();
        let mut next = Settings::default();
        next.connection.allow_dml = true;
        shared.replace(next);
        assert!(!before.allow_mutations());
        assert!(shared.snapshot().allow_mutations());
    }
}
