use super::{resolve_settings, Settings};

use std::{collections::HashMap, time::Duration};

fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

#[test]
fn defaults_without_file_or_env() {
    let settings = resolve_settings(None, env_from(&[]));
    assert_eq!(settings, Settings::default());
    assert_eq!(settings.server_bind, "127.0.0.1:3000");
    assert_eq!(settings.backend_url, "http://127.0.0.1:8000/api");
    assert_eq!(settings.upstream_timeout, None);
    assert_eq!(settings.max_body_bytes, 1024 * 1024);
}

#[test]
fn file_values_apply() {
    let file = r#"
        bind_addr = "0.0.0.0:4000"
        backend_url = "http://backend:8000/api"
        upstream_timeout_seconds = "240"
        max_body_bytes = "2048"
    "#;
    let settings = resolve_settings(Some(file), env_from(&[]));
    assert_eq!(settings.server_bind, "0.0.0.0:4000");
    assert_eq!(settings.backend_url, "http://backend:8000/api");
    assert_eq!(settings.upstream_timeout, Some(Duration::from_secs(240)));
    assert_eq!(settings.max_body_bytes, 2048);
}

#[test]
fn prefixed_env_beats_plain_env_and_file() {
    let file = r#"backend_url = "http://from-file/api""#;
    let settings = resolve_settings(
        Some(file),
        env_from(&[
            ("BACKEND_URL", "http://plain/api"),
            ("APP__BACKEND_URL", "http://prefixed/api"),
            ("SERVER_BIND", "127.0.0.1:9000"),
        ]),
    );
    assert_eq!(settings.backend_url, "http://prefixed/api");
    assert_eq!(settings.server_bind, "127.0.0.1:9000");
}

#[test]
fn zero_timeout_disables_budget_and_junk_is_ignored() {
    let file = r#"upstream_timeout_seconds = "30""#;
    let settings = resolve_settings(
        Some(file),
        env_from(&[
            ("APP__UPSTREAM_TIMEOUT_SECONDS", "0"),
            ("APP__MAX_BODY_BYTES", "lots"),
        ]),
    );
    assert_eq!(settings.upstream_timeout, None);
    assert_eq!(settings.max_body_bytes, 1024 * 1024);
}

#[test]
fn non_string_file_is_ignored() {
    let settings = resolve_settings(Some("max_body_bytes = 10"), env_from(&[]));
    assert_eq!(settings, Settings::default());
}
