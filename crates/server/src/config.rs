use std::{collections::HashMap, fs, time::Duration};

use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub server_bind: String,
    pub backend_url: String,
    pub upstream_timeout: Option<Duration>,
    pub max_body_bytes: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: "127.0.0.1:3000".into(),
            backend_url: "http://127.0.0.1:8000/api".into(),
            upstream_timeout: None,
            max_body_bytes: 1024 * 1024,
        }
    }
}

pub fn load_settings() -> Settings {
    let file = fs::read_to_string("server.toml").ok();
    resolve_settings(file.as_deref(), |key| std::env::var(key).ok())
}

/// Layers `server.toml` contents and then environment values over the
/// defaults. Later sources win.
pub fn resolve_settings(file: Option<&str>, env: impl Fn(&str) -> Option<String>) -> Settings {
    let mut settings = Settings::default();

    if let Some(raw) = file {
        if let Ok(file_cfg) = toml::from_str::<HashMap<String, String>>(raw) {
            if let Some(v) = file_cfg.get("bind_addr") {
                settings.server_bind = v.clone();
            }
            if let Some(v) = file_cfg.get("backend_url") {
                settings.backend_url = v.clone();
            }
            if let Some(v) = file_cfg.get("upstream_timeout_seconds") {
                apply_upstream_timeout(&mut settings, v);
            }
            if let Some(v) = file_cfg.get("max_body_bytes") {
                apply_max_body_bytes(&mut settings, v);
            }
        } else {
            warn!("server.toml is not a flat string table; ignoring it");
        }
    }

    if let Some(v) = env("SERVER_BIND") {
        settings.server_bind = v;
    }
    if let Some(v) = env("APP__BIND_ADDR") {
        settings.server_bind = v;
    }

    if let Some(v) = env("BACKEND_URL") {
        settings.backend_url = v;
    }
    if let Some(v) = env("APP__BACKEND_URL") {
        settings.backend_url = v;
    }

    if let Some(v) = env("APP__UPSTREAM_TIMEOUT_SECONDS") {
        apply_upstream_timeout(&mut settings, &v);
    }
    if let Some(v) = env("APP__MAX_BODY_BYTES") {
        apply_max_body_bytes(&mut settings, &v);
    }

    settings
}

fn apply_upstream_timeout(settings: &mut Settings, raw: &str) {
    match raw.trim().parse::<u64>() {
        Ok(0) => settings.upstream_timeout = None,
        Ok(secs) => settings.upstream_timeout = Some(Duration::from_secs(secs)),
        Err(_) => warn!(value = raw, "ignoring invalid upstream timeout"),
    }
}

fn apply_max_body_bytes(settings: &mut Settings, raw: &str) {
    match raw.trim().parse::<usize>() {
        Ok(bytes) if bytes > 0 => settings.max_body_bytes = bytes,
        _ => warn!(value = raw, "ignoring invalid max body size"),
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
