use std::{collections::HashMap, fs};

use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Settings {
    pub server_bind: String,
    pub token_secret: String,
    pub token_ttl_seconds: i64,
    pub max_body_bytes: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: "127.0.0.1:3001".into(),
            token_secret: "robbie-dev-secret".into(),
            token_ttl_seconds: 24 * 3600,
            max_body_bytes: 1024 * 1024,
        }
    }
}

pub fn load_settings() -> Settings {
    let file = fs::read_to_string("server.toml").ok();
    settings_from_sources(file.as_deref(), |key| std::env::var(key).ok())
}

/// Defaults, then `server.toml` (flat string keys), then environment.
pub fn settings_from_sources(
    file: Option<&str>,
    env: impl Fn(&str) -> Option<String>,
) -> Settings {
    let mut settings = Settings::default();

    if let Some(raw) = file {
        match toml::from_str::<HashMap<String, String>>(raw) {
            Ok(file_cfg) => {
                if let Some(v) = file_cfg.get("bind_addr") {
                    settings.server_bind = v.clone();
                }
                if let Some(v) = file_cfg.get("token_secret") {
                    settings.token_secret = v.clone();
                }
                if let Some(v) = file_cfg.get("token_ttl_seconds") {
                    apply_parsed(&mut settings.token_ttl_seconds, "token_ttl_seconds", v);
                }
                if let Some(v) = file_cfg.get("max_body_bytes") {
                    apply_parsed(&mut settings.max_body_bytes, "max_body_bytes", v);
                }
            }
            Err(error) => warn!(%error, "ignoring malformed server.toml"),
        }
    }

    if let Some(v) = env("SERVER_BIND") {
        settings.server_bind = v;
    }
    if let Some(v) = env("APP__BIND_ADDR") {
        settings.server_bind = v;
    }
    if let Some(v) = env("APP__TOKEN_SECRET") {
        settings.token_secret = v;
    }
    if let Some(v) = env("APP__TOKEN_TTL_SECONDS") {
        apply_parsed(&mut settings.token_ttl_seconds, "APP__TOKEN_TTL_SECONDS", &v);
    }
    if let Some(v) = env("APP__MAX_BODY_BYTES") {
        apply_parsed(&mut settings.max_body_bytes, "APP__MAX_BODY_BYTES", &v);
    }

    settings
}

fn apply_parsed<T: std::str::FromStr>(slot: &mut T, key: &str, raw: &str) {
    match raw.trim().parse::<T>() {
        Ok(parsed) => *slot = parsed,
        Err(_) => warn!(key, value = raw, "ignoring unparsable setting"),
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
