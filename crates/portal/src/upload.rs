//! Attachment upload pipeline.
//!
//! A batch is all-or-nothing: one failed file fails the whole batch. The
//! submission flow then falls back to local, non-persistent references so
//! the citizen is never blocked. That fallback is the portal's only
//! degraded mode and is logged as such.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use shared_types::{AttachmentRef, PortalError, UploadConfig};
use tokio::task::JoinSet;

/// A file picked by the citizen but not uploaded yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl StagedFile {
    pub fn new(file_name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// Object storage collaborator: stores one file and returns where it lives.
#[async_trait]
pub trait ObjectUploader: Send + Sync {
    async fn upload(&self, file: &StagedFile) -> Result<AttachmentRef, PortalError>;
}

/// Where a batch's attachment references came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentSource {
    Remote,
    /// Degraded mode: references only valid inside this session.
    LocalFallback,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UploadOutcome {
    pub attachments: Vec<AttachmentRef>,
    pub source: AttachmentSource,
    /// The batch failure that triggered the fallback, if any.
    pub failure: Option<PortalError>,
}

#[derive(Clone)]
pub struct UploadPipeline {
    uploader: Arc<dyn ObjectUploader>,
    limits: UploadConfig,
}

impl UploadPipeline {
    pub fn new(uploader: Arc<dyn ObjectUploader>, limits: UploadConfig) -> Self {
        Self { uploader, limits }
    }

    pub fn limits(&self) -> &UploadConfig {
        &self.limits
    }

    /// MIME allow-list and size cap, checked before the uploader is called.
    pub fn check(&self, file: &StagedFile) -> Result<(), PortalError> {
        let mime = file.mime_type.to_ascii_lowercase();
        if !self.limits.allowed_mime_types.iter().any(|t| *t == mime) {
            return Err(PortalError::upload(format!(
                "Invalid file type for {}. Only images are allowed.",
                file.file_name
            )));
        }
        if file.size() > self.limits.max_file_bytes {
            return Err(PortalError::upload(format!(
                "{} exceeds the {} MB limit",
                file.file_name,
                self.limits.max_file_bytes / (1024 * 1024)
            )));
        }
        Ok(())
    }

    /// Upload every file concurrently. Output order follows input order.
    #[tracing::instrument(skip_all, fields(files = files.len()))]
    pub async fn upload(&self, files: &[StagedFile]) -> Result<Vec<AttachmentRef>, PortalError> {
        for file in files {
            self.check(file)?;
        }

        let mut tasks = JoinSet::new();
        for (index, file) in files.iter().cloned().enumerate() {
            let uploader = Arc::clone(&self.uploader);
            tasks.spawn(async move { (index, uploader.upload(&file).await) });
        }

        let mut slots: Vec<Option<AttachmentRef>> = vec![None; files.len()];
        while let Some(joined) = tasks.join_next().await {
            let (index, result) = joined
                .map_err(|e| PortalError::upload(format!("Upload task failed: {e}")))?;
            // Returning early drops the JoinSet, which aborts the rest of the batch.
            slots[index] = Some(result?);
        }

        slots
            .into_iter()
            .map(|slot| slot.ok_or_else(|| PortalError::upload("Upload result missing")))
            .collect()
    }

    /// Upload, or fall back to local references if the batch fails.
    pub async fn upload_or_fallback(&self, files: &[StagedFile]) -> UploadOutcome {
        if files.is_empty() {
            return UploadOutcome {
                attachments: Vec::new(),
                source: AttachmentSource::Remote,
                failure: None,
            };
        }
        match self.upload(files).await {
            Ok(attachments) => {
                tracing::info!(count = attachments.len(), "Attachments uploaded");
                UploadOutcome {
                    attachments,
                    source: AttachmentSource::Remote,
                    failure: None,
                }
            }
            Err(e) => {
                tracing::warn!(
                    degraded = true,
                    error = %e,
                    count = files.len(),
                    "Attachment upload failed, using local references"
                );
                UploadOutcome {
                    attachments: local_references(files),
                    source: AttachmentSource::LocalFallback,
                    failure: Some(e),
                }
            }
        }
    }
}

/// Session-local stand-ins for files that could not be uploaded.
pub fn local_references(files: &[StagedFile]) -> Vec<AttachmentRef> {
    files
        .iter()
        .map(|file| AttachmentRef {
            url: format!(
                "local://{}/{}",
                uuid::Uuid::new_v4(),
                urlencoding::encode(&file.file_name)
            ),
            file_name: file.file_name.clone(),
            file_type: file.mime_type.clone(),
        })
        .collect()
}

pub fn is_local_reference(url: &str) -> bool {
    url.starts_with("local://")
}

// ── HTTP upload route ───────────────────────────────────────────────

/// Uploads through the portal's multipart upload route.
#[derive(Debug, Clone)]
pub struct HttpUploader {
    client: reqwest::Client,
    url: String,
}

impl HttpUploader {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    /// Resolve the upload endpoint against the API base URL.
    pub fn endpoint_url(api_base_url: &str, endpoint: &str) -> Result<String, PortalError> {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            return Ok(endpoint.to_string());
        }
        let base = reqwest::Url::parse(api_base_url)
            .map_err(|e| PortalError::config(format!("Invalid API base URL: {e}")))?;
        base.join(endpoint)
            .map(|u| u.to_string())
            .map_err(|e| PortalError::config(format!("Invalid upload endpoint: {e}")))
    }
}

#[async_trait]
impl ObjectUploader for HttpUploader {
    #[tracing::instrument(skip_all, fields(file = %file.file_name))]
    async fn upload(&self, file: &StagedFile) -> Result<AttachmentRef, PortalError> {
        let part = Part::bytes(file.bytes.clone())
            .file_name(file.file_name.clone())
            .mime_str(&file.mime_type)
            .map_err(|e| PortalError::upload(format!("Invalid MIME type: {e}")))?;
        let form = Form::new().part("file", part);

        let response = crate::api::send(self.client.post(&self.url).multipart(form))
            .await
            .map_err(|e| PortalError::upload(e.user_message()))?;

        response
            .json::<AttachmentRef>()
            .await
            .map_err(|e| PortalError::upload(format!("Invalid upload response: {e}")))
    }
}
