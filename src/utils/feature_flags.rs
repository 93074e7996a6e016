pub fn is_truthy(value: impl AsRef<str>) -> bool {
    matches!(
        value.as_ref().trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

pub fn is_falsy(value: impl AsRef<str>) -> bool {
    matches!(
        value.as_ref().trim().to_lowercase().as_str(),
        "0" | "false" | "no" | "off"
    )
}

pub fn is_truthy_any_env(keys: &[&str]) -> bool {
    keys.iter()
        .any(|key| std::env::var(key).ok().map(is_truthy).unwrap_or(false))
}

/// Reads a boolean override; `None` when unset or unrecognised.
pub fn env_flag(key: &str) -> Option<bool> {
    let raw = std::env::var(key).ok()?;
    if is_truthy(&raw) {
        Some(true)
    } else if is_falsy(&raw) {
        Some(false)
    } else {
        None
    }
}
