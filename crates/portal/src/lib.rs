//! Citizen claims portal core.
//!
//! [`Portal`] wires the service registry, claim drafts, attachment uploads,
//! the synchronized claims store and messaging to a backend and a session.

pub mod api;
pub mod config;
pub mod draft;
pub mod evaluator;
pub mod history;
pub mod messaging;
pub mod poller;
pub mod registry;
pub mod session;
pub mod storage;
pub mod store;
pub mod submission;
pub mod telemetry;
pub mod upload;

use std::sync::Arc;

use shared_types::{AttachmentRef, PortalConfig, PortalError};

use api::{ClaimsApi, HttpClaimsApi};
use draft::{Advance, ClaimDraft, DraftStep};
use history::{ClaimFilter, ClaimStats};
use messaging::{Messenger, SentMessage};
use poller::{PollerHandle, SyncPoller};
use registry::ServiceRegistry;
use session::SessionProvider;
use store::ClaimsStore;
use submission::SubmissionTransaction;
use upload::{HttpUploader, ObjectUploader, UploadPipeline};

pub struct Portal {
    config: PortalConfig,
    registry: Arc<ServiceRegistry>,
    store: Arc<ClaimsStore>,
    submission: SubmissionTransaction,
    messenger: Messenger,
    poller: SyncPoller,
}

impl Portal {
    pub fn new(
        config: PortalConfig,
        session: Arc<dyn SessionProvider>,
        api: Arc<dyn ClaimsApi>,
        uploader: Arc<dyn ObjectUploader>,
    ) -> Result<Self, PortalError> {
        let registry = Arc::new(ServiceRegistry::builtin()?.clone());
        let store = Arc::new(ClaimsStore::new(Arc::clone(&api), Arc::clone(&session)));
        let uploads = UploadPipeline::new(uploader, config.uploads.clone());
        let submission = SubmissionTransaction::new(
            Arc::clone(&registry),
            Arc::clone(&session),
            Arc::clone(&api),
            uploads,
        );
        let messenger = Messenger::new(api, session, Arc::clone(&store))
            .with_optimistic_echo(config.messaging.optimistic_echo);
        let poller = SyncPoller::new(Arc::clone(&store), &config.sync);

        Ok(Self {
            config,
            registry,
            store,
            submission,
            messenger,
            poller,
        })
    }

    /// HTTP backend plus the multipart upload route.
    pub fn connect(config: PortalConfig, session: Arc<dyn SessionProvider>) -> Result<Self, PortalError> {
        // One client, so uploads share the API request timeout.
        let client = api::build_client(&config.api)?;
        let api = HttpClaimsApi::with_client(client.clone(), &config.api.base_url);
        let upload_url = HttpUploader::endpoint_url(api.base_url(), &config.uploads.endpoint)?;
        let uploader = HttpUploader::new(client, upload_url);
        Self::new(config, session, Arc::new(api), Arc::new(uploader))
    }

    pub fn config(&self) -> &PortalConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<ClaimsStore> {
        &self.store
    }

    pub fn new_draft(&self) -> ClaimDraft {
        ClaimDraft::new(Arc::clone(&self.registry))
            .with_max_files(self.config.uploads.effective_max_files())
    }

    /// Press "continue" on a draft, running the submission when it is due.
    ///
    /// On failure the draft is back on its last editable step and the error
    /// is returned as well as kept on the draft.
    pub async fn advance_draft(&self, draft: &mut ClaimDraft) -> Result<DraftStep, PortalError> {
        let snapshot = match draft.advance()? {
            Advance::ServiceFields => return Ok(draft.step().clone()),
            Advance::Submit(snapshot) => snapshot,
        };

        let result = self.submission.run(&snapshot).await;
        if let Ok(receipt) = &result {
            // The submission already succeeded; a failed reconcile only delays the list.
            if let Err(e) = self.store.refresh_claim_by_id(&receipt.claim_id).await {
                tracing::warn!(claim_id = %receipt.claim_id, error = %e, "Could not load new claim");
            }
        }
        let returned = result.clone();
        draft.complete_submission(result);
        returned.map(|_| draft.step().clone())
    }

    /// Run every remaining step of a draft: base info, service fields, then
    /// submission. Stops at the first failing guard.
    pub async fn submit_draft(&self, draft: &mut ClaimDraft) -> Result<DraftStep, PortalError> {
        let mut step = self.advance_draft(draft).await?;
        if step == DraftStep::ServiceFields {
            step = self.advance_draft(draft).await?;
        }
        Ok(step)
    }

    pub async fn send_message(
        &self,
        claim_id: &str,
        content: &str,
        attachments: Vec<AttachmentRef>,
    ) -> Result<SentMessage, PortalError> {
        self.messenger.send_message(claim_id, content, attachments).await
    }

    pub fn spawn_poller(&self) -> PollerHandle {
        self.poller.spawn()
    }

    pub fn watch_claim(&self, claim_id: &str) -> PollerHandle {
        self.poller.watch_claim(claim_id)
    }

    pub fn history(&self, filter: &ClaimFilter) -> Vec<shared_types::Claim> {
        let claims = self.store.claims();
        filter.apply(&claims).into_iter().cloned().collect()
    }

    pub fn stats(&self) -> ClaimStats {
        ClaimStats::from_claims(&self.store.claims())
    }
}
