//! Claim submission: draft snapshot -> uploaded attachments -> `POST /claims`.

use std::sync::Arc;

use shared_types::{
    AttachmentRef, ClaimLocation, CreateClaimPayload, CreateClaimResponse, NewClaim, PortalError,
    UserProfile,
};
use validator::Validate;

use crate::api::ClaimsApi;
use crate::draft::DraftSnapshot;
use crate::registry::ServiceRegistry;
use crate::session::{require_token, SessionProvider};
use crate::upload::{AttachmentSource, UploadPipeline};

/// What the citizen sees after a successful submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionReceipt {
    pub claim_id: String,
    pub claim_number: Option<String>,
    /// `LocalFallback` means the attachments never reached storage.
    pub attachment_source: AttachmentSource,
}

/// Build the immutable creation payload. The service id is mapped to its
/// stable code; the internal id never goes over the wire.
pub fn build_payload(
    registry: &ServiceRegistry,
    user: &UserProfile,
    snapshot: &DraftSnapshot,
    attachments: Vec<AttachmentRef>,
) -> Result<CreateClaimPayload, PortalError> {
    let service_type = registry.code_for(&snapshot.service_id)?.to_string();

    let payload = CreateClaimPayload {
        user: user.clone(),
        claim: NewClaim {
            service_type,
            title: snapshot.title.clone(),
            description: snapshot.description.clone(),
            priority: snapshot.priority,
            location: ClaimLocation {
                address: snapshot.location.address.clone(),
                latitude: snapshot.location.latitude,
                longitude: snapshot.location.longitude,
            },
            attachments,
            extra_data: snapshot.extra_values.clone(),
        },
    };
    payload.validate()?;
    Ok(payload)
}

pub struct SubmissionTransaction {
    registry: Arc<ServiceRegistry>,
    session: Arc<dyn SessionProvider>,
    api: Arc<dyn ClaimsApi>,
    uploads: UploadPipeline,
}

impl SubmissionTransaction {
    pub fn new(
        registry: Arc<ServiceRegistry>,
        session: Arc<dyn SessionProvider>,
        api: Arc<dyn ClaimsApi>,
        uploads: UploadPipeline,
    ) -> Self {
        Self {
            registry,
            session,
            api,
            uploads,
        }
    }

    /// Run one submission. The session is checked before anything is
    /// uploaded so a signed-out citizen never leaves orphaned objects.
    #[tracing::instrument(skip_all, fields(service = %snapshot.service_id))]
    pub async fn run(&self, snapshot: &DraftSnapshot) -> Result<SubmissionReceipt, PortalError> {
        let token = require_token(self.session.as_ref()).await?;
        let user = self
            .session
            .current_user()
            .ok_or_else(|| PortalError::auth("No signed-in user"))?;

        // Fail on an unknown service before spending time on uploads.
        self.registry.code_for(&snapshot.service_id)?;

        let outcome = self.uploads.upload_or_fallback(&snapshot.staged_files).await;
        let payload = build_payload(&self.registry, &user, snapshot, outcome.attachments)?;

        let CreateClaimResponse {
            claim_id,
            claim_number,
            ..
        } = self.api.create_claim(&token, &payload).await.map_err(|e| {
            tracing::error!(error = %e, "Claim creation failed");
            e
        })?;

        tracing::info!(
            claim_id = %claim_id,
            service_type = %payload.claim.service_type,
            attachments = payload.claim.attachments.len(),
            "Claim submitted"
        );

        Ok(SubmissionReceipt {
            claim_id,
            claim_number,
            attachment_source: outcome.source,
        })
    }
}
