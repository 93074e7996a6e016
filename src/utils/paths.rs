use std::env;
use std::path::{Path, PathBuf};

fn normalize_env_path(value: Option<String>) -> Option<PathBuf> {
    let raw = value?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let lowered = trimmed.to_lowercase();
    if lowered == "undefined" || lowered == "null" {
        return None;
    }
    Some(PathBuf::from(trimmed))
}

fn resolve_home_dir() -> Option<PathBuf> {
    env::var("HOME").ok().map(PathBuf::from)
}

fn resolve_xdg_config_dir() -> Option<PathBuf> {
    if let Some(path) = normalize_env_path(env::var("XDG_CONFIG_HOME").ok()) {
        return Some(path);
    }
    resolve_home_dir().map(|home| home.join(".config"))
}

pub fn resolve_config_path() -> PathBuf {
    if let Some(path) = normalize_env_path(env::var("DREMIOAI_CONFIG").ok()) {
        return path;
    }
    resolve_xdg_config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("dremioai")
        .join("config.json")
}

/// Expands a leading `~/` against `$HOME`.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = resolve_home_dir() {
            return home.join(rest);
        }
    }
    Path::new(path).to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_home_leaves_absolute_paths_alone() {
        assert_eq!(expand_home("/etc/token"), PathBuf::from("/etc/token"));
    }

    #[test]
    fn blank_and_placeholder_env_values_are_ignored() {
        assert_eq!(normalize_env_path(Some("  ".to_string())), None);
        assert_eq!(normalize_env_path(Some("null".to_string())), None);
        assert_eq!(
            normalize_env_path(Some("/tmp/cfg.json".to_string())),
            Some(PathBuf::from("/tmp/cfg.json"))
        );
    }
}
