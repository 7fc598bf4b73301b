use std::{collections::HashMap, fs, path::Path, time::Duration};

use anyhow::Context;
use serde::Deserialize;

pub const DEFAULT_SETTINGS_FILE: &str = "chat.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChatSettings {
    pub server_url: String,
    /// Minimum interval between accepted discussion-list refreshes.
    pub refresh_cooldown_ms: u64,
    pub poll_interval_ms: u64,
    /// Zero a discussion's unread count locally once mark-seen succeeds.
    pub optimistic_seen: bool,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8080/api".into(),
            refresh_cooldown_ms: 1000,
            poll_interval_ms: 5000,
            optimistic_seen: true,
        }
    }
}

impl ChatSettings {
    pub fn refresh_cooldown(&self) -> Duration {
        Duration::from_millis(self.refresh_cooldown_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        // A zero period would make tokio's interval panic.
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

pub fn load_settings() -> ChatSettings {
    let mut settings = ChatSettings::default();

    match read_settings_file(Path::new(DEFAULT_SETTINGS_FILE)) {
        Ok(Some(file_cfg)) => apply_file_values(&mut settings, &file_cfg),
        Ok(None) => {}
        Err(err) => tracing::warn!("config: ignoring {DEFAULT_SETTINGS_FILE}: {err:#}"),
    }

    apply_env_overrides(&mut settings, |key| std::env::var(key).ok());
    settings
}

pub fn read_settings_file(path: &Path) -> anyhow::Result<Option<HashMap<String, String>>> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read '{}'", path.display()))
        }
    };
    let table = toml::from_str::<toml::Table>(&raw)
        .with_context(|| format!("failed to parse '{}'", path.display()))?;
    let values = table
        .into_iter()
        .map(|(key, value)| match value {
            toml::Value::String(text) => (key, text),
            other => (key, other.to_string()),
        })
        .collect();
    Ok(Some(values))
}

pub fn apply_file_values(settings: &mut ChatSettings, values: &HashMap<String, String>) {
    if let Some(v) = values.get("server_url") {
        settings.server_url = v.clone();
    }
    if let Some(v) = values.get("refresh_cooldown_ms").and_then(|v| v.parse().ok()) {
        settings.refresh_cooldown_ms = v;
    }
    if let Some(v) = values.get("poll_interval_ms").and_then(|v| v.parse().ok()) {
        settings.poll_interval_ms = v;
    }
    if let Some(v) = values.get("optimistic_seen").and_then(|v| parse_bool(v)) {
        settings.optimistic_seen = v;
    }
}

pub fn apply_env_overrides(
    settings: &mut ChatSettings,
    lookup: impl Fn(&str) -> Option<String>,
) {
    if let Some(v) = lookup("CHAT_SERVER_URL") {
        settings.server_url = v;
    }
    if let Some(v) = lookup("APP__SERVER_URL") {
        settings.server_url = v;
    }

    if let Some(v) = lookup("APP__REFRESH_COOLDOWN_MS").and_then(|v| v.parse().ok()) {
        settings.refresh_cooldown_ms = v;
    }
    if let Some(v) = lookup("APP__POLL_INTERVAL_MS").and_then(|v| v.parse().ok()) {
        settings.poll_interval_ms = v;
    }
    if let Some(v) = lookup("APP__OPTIMISTIC_SEEN").and_then(|v| parse_bool(&v)) {
        settings.optimistic_seen = v;
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
