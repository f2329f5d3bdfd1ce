use std::{collections::HashMap, fs};

/// Connection settings for the façade: the backend-as-a-service project,
/// the secondary backend, and the local cache location.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub remote_url: String,
    pub anon_key: String,
    pub backend_url: String,
    pub cache_url: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            remote_url: "http://127.0.0.1:54321".into(),
            anon_key: "dev-anon-key".into(),
            backend_url: "http://localhost:5000".into(),
            cache_url: "sqlite://./data/track_v_cache.db".into(),
        }
    }
}

/// Loads `track_v.toml` from the working directory when present, then lets
/// environment variables override individual fields.
pub fn load_config() -> ClientConfig {
    let mut config = ClientConfig::default();

    if let Ok(raw) = fs::read_to_string("track_v.toml") {
        if let Ok(file_cfg) = toml::from_str::<HashMap<String, String>>(&raw) {
            if let Some(v) = file_cfg.get("remote_url") {
                config.remote_url = v.clone();
            }
            if let Some(v) = file_cfg.get("anon_key") {
                config.anon_key = v.clone();
            }
            if let Some(v) = file_cfg.get("backend_url") {
                config.backend_url = v.clone();
            }
            if let Some(v) = file_cfg.get("cache_url") {
                config.cache_url = v.clone();
            }
        }
    }

    if let Ok(v) = std::env::var("TRACK_V_REMOTE_URL") {
        config.remote_url = v;
    }
    if let Ok(v) = std::env::var("TRACK_V_ANON_KEY") {
        config.anon_key = v;
    }
    if let Ok(v) = std::env::var("TRACK_V_BACKEND_URL") {
        config.backend_url = v;
    }
    if let Ok(v) = std::env::var("TRACK_V_CACHE_URL") {
        config.cache_url = v;
    }

    config.cache_url = normalize_cache_url(&config.cache_url);
    config
}

/// Accepts plain file paths as well as sqlite URLs; everything funnels into
/// the `sqlite://` form the cache expects.
pub fn normalize_cache_url(raw: &str) -> String {
    let raw = raw.trim();

    if raw.is_empty() {
        return ClientConfig::default().cache_url;
    }

    if raw.starts_with("sqlite::memory:") || raw.starts_with("sqlite://") || raw.contains("://") {
        return raw.to_string();
    }

    if let Some(path) = raw.strip_prefix("sqlite:") {
        let path = path.replace('\\', "/");
        return format!("sqlite://{path}");
    }

    format!("sqlite://{}", raw.replace('\\', "/"))
}
