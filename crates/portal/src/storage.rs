//! S3-compatible object storage for claim attachments.

use chrono::Utc;

/// Read an env var, trying the primary name first then a fallback.
pub fn env_or(primary: &str, fallback: &str) -> Option<String> {
    std::env::var(primary)
        .ok()
        .or_else(|| std::env::var(fallback).ok())
}

/// Make a file name safe for object keys and URLs.
///
/// Lowercases, turns whitespace runs into `-`, drops anything outside
/// `[a-z0-9_-]`, collapses repeated `-` and trims them from the ends.
/// The extension is kept, lowercased.
pub fn sanitize_file_name(file_name: &str) -> String {
    let (stem, extension) = match file_name.rfind('.') {
        Some(dot) if dot > 0 => (&file_name[..dot], &file_name[dot..]),
        _ => (file_name, ""),
    };

    let mut sanitized = String::with_capacity(stem.len());
    let mut last_dash = false;
    for ch in stem.to_lowercase().chars() {
        let mapped = if ch.is_whitespace() || ch == '-' {
            Some('-')
        } else if ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_' {
            Some(ch)
        } else {
            None
        };
        match mapped {
            Some('-') if last_dash => {}
            Some(c) => {
                last_dash = c == '-';
                sanitized.push(c);
            }
            None => {}
        }
    }

    format!("{}{}", sanitized.trim_matches('-'), extension.to_lowercase())
}

/// Object key: `<prefix>/<unix-millis>-<sanitized-name>`.
pub fn object_key(prefix: &str, file_name: &str) -> String {
    format!(
        "{}/{}-{}",
        prefix.trim_matches('/'),
        Utc::now().timestamp_millis(),
        sanitize_file_name(file_name)
    )
}

/// Public URL for a stored object, with each key segment percent-encoded.
pub fn public_url(base: &str, key: &str) -> String {
    let encoded: Vec<String> = key
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect();
    format!("{}/{}", base.trim_end_matches('/'), encoded.join("/"))
}

#[cfg(feature = "s3")]
pub use s3::S3Uploader;

#[cfg(feature = "s3")]
mod s3 {
    use async_trait::async_trait;
    use aws_sdk_s3::{
        config::{Credentials, Region},
        primitives::ByteStream,
        Client,
    };
    use shared_types::{AttachmentRef, PortalError, StorageConfig};

    use super::{env_or, object_key, public_url};
    use crate::upload::{ObjectUploader, StagedFile};

    /// Uploads attachments straight to an S3-compatible bucket (R2, MinIO, Tigris).
    pub struct S3Uploader {
        client: Client,
        bucket: String,
        key_prefix: String,
        public_base: String,
    }

    impl S3Uploader {
        /// Build from environment variables plus the `[storage]` config section.
        ///
        ///   - `AWS_ENDPOINT_URL_S3` / `S3_ENDPOINT`
        ///   - `AWS_ACCESS_KEY_ID`   / `S3_ACCESS_KEY`
        ///   - `AWS_SECRET_ACCESS_KEY` / `S3_SECRET_KEY`
        ///   - `AWS_REGION`          / `S3_REGION` (default `auto`)
        pub fn from_env(storage: &StorageConfig) -> Result<Self, PortalError> {
            let endpoint = env_or("AWS_ENDPOINT_URL_S3", "S3_ENDPOINT")
                .ok_or_else(|| PortalError::config("AWS_ENDPOINT_URL_S3 or S3_ENDPOINT must be set"))?;
            let access_key = env_or("AWS_ACCESS_KEY_ID", "S3_ACCESS_KEY")
                .ok_or_else(|| PortalError::config("AWS_ACCESS_KEY_ID or S3_ACCESS_KEY must be set"))?;
            let secret_key = env_or("AWS_SECRET_ACCESS_KEY", "S3_SECRET_KEY").ok_or_else(|| {
                PortalError::config("AWS_SECRET_ACCESS_KEY or S3_SECRET_KEY must be set")
            })?;
            let region = env_or("AWS_REGION", "S3_REGION").unwrap_or_else(|| "auto".to_string());

            let creds = Credentials::new(&access_key, &secret_key, None, None, "env");
            let config = aws_sdk_s3::Config::builder()
                .endpoint_url(&endpoint)
                .region(Region::new(region))
                .credentials_provider(creds)
                .force_path_style(true)
                .behavior_version_latest()
                .build();

            // Without a CDN origin, fall back to path-style URLs on the endpoint.
            let public_base = storage
                .public_base_url
                .clone()
                .unwrap_or_else(|| format!("{}/{}", endpoint.trim_end_matches('/'), storage.bucket));

            Ok(Self {
                client: Client::from_conf(config),
                bucket: storage.bucket.clone(),
                key_prefix: storage.key_prefix.clone(),
                public_base,
            })
        }
    }

    #[async_trait]
    impl ObjectUploader for S3Uploader {
        #[tracing::instrument(skip_all, fields(file = %file.file_name))]
        async fn upload(&self, file: &StagedFile) -> Result<AttachmentRef, PortalError> {
            let key = object_key(&self.key_prefix, &file.file_name);

            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(&key)
                .content_type(&file.mime_type)
                .body(ByteStream::from(file.bytes.clone()))
                .send()
                .await
                .map_err(|e| {
                    let svc = e.into_service_error();
                    tracing::error!("S3 PutObject failed for key '{}': {:?}", key, svc);
                    PortalError::upload(format!("S3 upload failed: {}", svc))
                })?;

            Ok(AttachmentRef {
                url: public_url(&self.public_base, &key),
                file_name: file.file_name.clone(),
                file_type: file.mime_type.clone(),
            })
        }
    }
}
