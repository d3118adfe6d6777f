use serde::{Deserialize, Serialize};

/// Top-level config file structure matching `portal.toml`.
///
/// Every field has a default so that a missing or partial file still
/// yields a working configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct PortalConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub uploads: UploadConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub messaging: MessagingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ApiConfig {
    /// Request timeout, never below one second.
    pub fn effective_timeout_secs(&self) -> u64 {
        self.timeout_secs.max(1)
    }
}

fn default_base_url() -> String {
    "http://localhost:8080/api".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

pub const MIN_POLL_INTERVAL_SECS: u64 = 10;
pub const MAX_POLL_INTERVAL_SECS: u64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,
    #[serde(default = "default_claim_watch_interval_secs")]
    pub claim_watch_interval_secs: u64,
}

impl SyncConfig {
    /// Poll interval clamped to the supported 10–30 second window.
    pub fn effective_poll_interval_secs(&self) -> u64 {
        self.poll_interval_secs
            .clamp(MIN_POLL_INTERVAL_SECS, MAX_POLL_INTERVAL_SECS)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            max_backoff_secs: default_max_backoff_secs(),
            claim_watch_interval_secs: default_claim_watch_interval_secs(),
        }
    }
}

fn default_poll_interval_secs() -> u64 {
    15
}

fn default_max_backoff_secs() -> u64 {
    120
}

fn default_claim_watch_interval_secs() -> u64 {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UploadConfig {
    #[serde(default = "default_max_files")]
    pub max_files: usize,
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: usize,
    #[serde(default = "default_allowed_mime_types")]
    pub allowed_mime_types: Vec<String>,
    /// Upload route, relative to the API origin.
    #[serde(default = "default_upload_endpoint")]
    pub endpoint: String,
}

/// Attachments a single claim may carry.
pub const MAX_ATTACHMENTS: usize = 5;

impl UploadConfig {
    /// `max_files` capped at [`MAX_ATTACHMENTS`].
    pub fn effective_max_files(&self) -> usize {
        self.max_files.min(MAX_ATTACHMENTS)
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_files: default_max_files(),
            max_file_bytes: default_max_file_bytes(),
            allowed_mime_types: default_allowed_mime_types(),
            endpoint: default_upload_endpoint(),
        }
    }
}

fn default_max_files() -> usize {
    MAX_ATTACHMENTS
}

fn default_max_file_bytes() -> usize {
    5 * 1024 * 1024
}

fn default_allowed_mime_types() -> Vec<String> {
    ["image/jpeg", "image/jpg", "image/png", "image/gif", "image/webp"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_upload_endpoint() -> String {
    "/api/upload".to_string()
}

/// Object storage settings for the S3 uploader.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageConfig {
    #[serde(default = "default_bucket")]
    pub bucket: String,
    /// Public origin objects are served from, e.g. a CDN domain.
    #[serde(default)]
    pub public_base_url: Option<String>,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket: default_bucket(),
            public_base_url: None,
            key_prefix: default_key_prefix(),
        }
    }
}

fn default_bucket() -> String {
    "claims".to_string()
}

fn default_key_prefix() -> String {
    "claims".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct MessagingConfig {
    /// Show a sent message locally before the authoritative refresh lands.
    #[serde(default)]
    pub optimistic_echo: bool,
}
