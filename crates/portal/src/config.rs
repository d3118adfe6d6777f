use shared_types::{PortalConfig, PortalError};
use std::sync::OnceLock;

static CONFIG: OnceLock<PortalConfig> = OnceLock::new();

/// Path to the config file, relative to the working directory.
const CONFIG_PATH: &str = "portal.toml";

/// Parse a config document. Missing sections and keys take their defaults.
pub fn config_from_str(contents: &str) -> Result<PortalConfig, PortalError> {
    toml::from_str(contents)
        .map_err(|e| PortalError::config(format!("Failed to parse {CONFIG_PATH}: {e}")))
}

/// Apply environment overrides on top of the file values.
///
///   - `PORTAL_API_URL`            -> `api.base_url`
///   - `PORTAL_POLL_INTERVAL_SECS` -> `sync.poll_interval_secs`
///   - `S3_BUCKET` / `BUCKET_NAME` -> `storage.bucket`
///   - `STORAGE_PUBLIC_URL`        -> `storage.public_base_url`
pub fn apply_env_overrides(config: &mut PortalConfig, env: impl Fn(&str) -> Option<String>) {
    if let Some(url) = env("PORTAL_API_URL") {
        config.api.base_url = url;
    }
    if let Some(raw) = env("PORTAL_POLL_INTERVAL_SECS") {
        match raw.parse() {
            Ok(secs) => config.sync.poll_interval_secs = secs,
            Err(_) => tracing::warn!(value = %raw, "Ignoring invalid PORTAL_POLL_INTERVAL_SECS"),
        }
    }
    if let Some(bucket) = env("S3_BUCKET").or_else(|| env("BUCKET_NAME")) {
        config.storage.bucket = bucket;
    }
    if let Some(url) = env("STORAGE_PUBLIC_URL") {
        config.storage.public_base_url = Some(url);
    }
}

/// Read `portal.toml` plus `.env`/environment overrides into the global
/// `OnceLock`. Safe to call multiple times; only the first call has effect.
///
/// A missing or unparseable file falls back to defaults.
pub fn load_config() -> &'static PortalConfig {
    CONFIG.get_or_init(|| {
        let _ = dotenvy::dotenv();

        let mut config = match std::fs::read_to_string(CONFIG_PATH) {
            Ok(contents) => config_from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Using default portal config");
                PortalConfig::default()
            }),
            Err(e) => {
                tracing::info!("{CONFIG_PATH} not found ({e}), using defaults");
                PortalConfig::default()
            }
        };
        apply_env_overrides(&mut config, |key| std::env::var(key).ok());
        tracing::debug!(api = %config.api.base_url, "Portal config loaded");
        config
    })
}
