use std::{collections::HashMap, fs, path::Path, time::Duration};

use tracing::warn;

use crate::controller::DEFAULT_GENERATE_TIMEOUT;

pub const DEFAULT_CLIENT_BACKEND_URL: &str = "http://127.0.0.1:3000/api";
pub const CLIENT_CONFIG_FILE: &str = "careplan.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub backend_url: String,
    pub generate_timeout: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_CLIENT_BACKEND_URL.into(),
            generate_timeout: DEFAULT_GENERATE_TIMEOUT,
        }
    }
}

/// Defaults, then `careplan.toml` in the working directory, then the
/// environment.
pub fn load_client_settings() -> ClientSettings {
    let file = fs::read_to_string(CLIENT_CONFIG_FILE).ok();
    resolve_client_settings(file.as_deref(), |key| std::env::var(key).ok())
}

pub fn load_client_settings_from(path: &Path) -> ClientSettings {
    let file = fs::read_to_string(path).ok();
    resolve_client_settings(file.as_deref(), |key| std::env::var(key).ok())
}

pub fn resolve_client_settings(
    file: Option<&str>,
    env: impl Fn(&str) -> Option<String>,
) -> ClientSettings {
    let mut settings = ClientSettings::default();

    if let Some(raw) = file {
        match toml::from_str::<HashMap<String, String>>(raw) {
            Ok(file_cfg) => {
                if let Some(v) = file_cfg.get("backend_url") {
                    settings.backend_url = v.clone();
                }
                if let Some(v) = file_cfg.get("generate_timeout_seconds") {
                    apply_timeout(&mut settings, v);
                }
            }
            Err(err) => warn!(error = %err, "ignoring unreadable client config file"),
        }
    }

    if let Some(v) = env("BACKEND_URL") {
        settings.backend_url = v;
    }
    if let Some(v) = env("APP__BACKEND_URL") {
        settings.backend_url = v;
    }

    if let Some(v) = env("APP__GENERATE_TIMEOUT_SECONDS") {
        apply_timeout(&mut settings, &v);
    }

    settings
}

/// Generation budget for a positive number of seconds; zero is rejected.
pub fn generate_timeout_from_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

fn apply_timeout(settings: &mut ClientSettings, raw: &str) {
    match raw.trim().parse::<u64>().ok().and_then(generate_timeout_from_secs) {
        Some(timeout) => settings.generate_timeout = timeout,
        None => warn!(value = raw, "ignoring invalid generate timeout"),
    }
}
