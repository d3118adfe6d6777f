//! Local mirror of the citizen's claims and notifications.
//!
//! Writes land in completion order: whichever fetch finishes last wins.
//! A failed fetch never clears what is already cached.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use shared_types::{Claim, ClaimMessage, ClaimStatus, Notification, PortalError};
use tokio::sync::broadcast;

use crate::api::ClaimsApi;
use crate::session::{require_token, SessionProvider};

/// Change events for observers of the store.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    ClaimsReplaced { count: usize },
    ClaimUpdated { claim_id: String, status: ClaimStatus },
    NotificationsChanged { unread: usize },
    RefreshFailed { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Completed,
    /// Another refresh was already in flight; this request joined it.
    Coalesced,
}

#[derive(Debug, Default)]
struct StoreState {
    claims: Vec<Claim>,
    notifications: Vec<Notification>,
    last_error: Option<PortalError>,
    last_synced_at: Option<DateTime<Utc>>,
}

/// Clears the in-flight flag when the refresh ends, however it ends.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct ClaimsStore {
    api: Arc<dyn ClaimsApi>,
    session: Arc<dyn SessionProvider>,
    state: RwLock<StoreState>,
    refreshing: AtomicBool,
    events: broadcast::Sender<StoreEvent>,
}

impl ClaimsStore {
    pub fn new(api: Arc<dyn ClaimsApi>, session: Arc<dyn SessionProvider>) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            api,
            session,
            state: RwLock::new(StoreState::default()),
            refreshing: AtomicBool::new(false),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: StoreEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    // ── Reads ───────────────────────────────────────────────────────

    pub fn claims(&self) -> Vec<Claim> {
        self.read().claims.clone()
    }

    pub fn claim(&self, claim_id: &str) -> Option<Claim> {
        self.read().claims.iter().find(|c| c.id == claim_id).cloned()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.read().notifications.clone()
    }

    pub fn unread_count(&self) -> usize {
        self.read().notifications.iter().filter(|n| !n.read).count()
    }

    pub fn notifications_for_claim(&self, claim_id: &str) -> Vec<Notification> {
        self.read()
            .notifications
            .iter()
            .filter(|n| n.claim_id == claim_id)
            .cloned()
            .collect()
    }

    /// Error from the most recent failed fetch; cleared by the next success.
    pub fn last_error(&self) -> Option<PortalError> {
        self.read().last_error.clone()
    }

    pub fn last_synced_at(&self) -> Option<DateTime<Utc>> {
        self.read().last_synced_at
    }

    pub fn is_refreshing(&self) -> bool {
        self.refreshing.load(Ordering::Acquire)
    }

    // ── Fetches ─────────────────────────────────────────────────────

    /// Refresh claims and notifications together.
    ///
    /// Calls made while a refresh is running return `Coalesced` without
    /// issuing requests of their own.
    #[tracing::instrument(skip_all)]
    pub async fn refresh(&self) -> Result<RefreshOutcome, PortalError> {
        let Some(_in_flight) = InFlight::acquire(&self.refreshing) else {
            tracing::debug!("Refresh already in flight, coalescing");
            return Ok(RefreshOutcome::Coalesced);
        };

        match self.fetch_all().await {
            Ok((claims, notifications)) => {
                let count = claims.len();
                let unread = notifications.iter().filter(|n| !n.read).count();
                {
                    let mut state = self.write();
                    state.claims = claims;
                    state.notifications = notifications;
                    state.last_error = None;
                    state.last_synced_at = Some(Utc::now());
                }
                tracing::debug!(claims = count, unread, "Store refreshed");
                self.emit(StoreEvent::ClaimsReplaced { count });
                self.emit(StoreEvent::NotificationsChanged { unread });
                Ok(RefreshOutcome::Completed)
            }
            Err(e) => {
                self.record_failure(&e);
                Err(e)
            }
        }
    }

    async fn fetch_all(&self) -> Result<(Vec<Claim>, Vec<Notification>), PortalError> {
        let token = require_token(self.session.as_ref()).await?;
        let (claims, notifications) = tokio::join!(
            self.api.list_claims(&token),
            self.api.list_notifications(&token)
        );
        let claims = claims?;
        let notifications = match notifications {
            Ok(list) => list,
            // Older backends have no notifications endpoint.
            Err(e) if e.is_not_found_status() => {
                tracing::debug!("Notifications endpoint returned 404, treating as empty");
                Vec::new()
            }
            Err(e) => return Err(e),
        };
        Ok((claims, notifications))
    }

    /// Fetch one claim and upsert it into the cache.
    #[tracing::instrument(skip(self))]
    pub async fn refresh_claim_by_id(&self, claim_id: &str) -> Result<Claim, PortalError> {
        let result = async {
            let token = require_token(self.session.as_ref()).await?;
            self.api.get_claim(&token, claim_id).await.map_err(|e| {
                if e.is_not_found_status() {
                    PortalError::not_found(format!("Claim {claim_id} not found"))
                } else {
                    e
                }
            })
        }
        .await;

        match result {
            Ok(claim) => {
                self.upsert_claim(claim.clone());
                Ok(claim)
            }
            Err(e) => {
                self.record_failure(&e);
                Err(e)
            }
        }
    }

    fn record_failure(&self, error: &PortalError) {
        tracing::warn!(error = %error, "Sync failed, keeping cached data");
        self.write().last_error = Some(error.clone());
        self.emit(StoreEvent::RefreshFailed {
            message: error.user_message(),
        });
    }

    /// Replace the cached claim with the same id, or add it at the top.
    pub(crate) fn upsert_claim(&self, claim: Claim) {
        let event = StoreEvent::ClaimUpdated {
            claim_id: claim.id.clone(),
            status: claim.status,
        };
        {
            let mut state = self.write();
            match state.claims.iter_mut().find(|c| c.id == claim.id) {
                Some(existing) => *existing = claim,
                None => state.claims.insert(0, claim),
            }
        }
        self.emit(event);
    }

    /// Show a just-sent message before the authoritative refresh lands.
    pub(crate) fn append_optimistic_message(&self, message: ClaimMessage) {
        let claim_id = message.claim_id.clone();
        let status = {
            let mut state = self.write();
            let Some(claim) = state.claims.iter_mut().find(|c| c.id == claim_id) else {
                return;
            };
            claim.messages.push(message);
            claim.status
        };
        self.emit(StoreEvent::ClaimUpdated { claim_id, status });
    }

    // ── Notifications ───────────────────────────────────────────────

    pub async fn mark_notification_read(&self, notification_id: &str) -> Result<(), PortalError> {
        let token = require_token(self.session.as_ref()).await?;
        self.api.mark_notification_read(&token, notification_id).await?;
        self.flip_read(|n| n.id == notification_id);
        Ok(())
    }

    pub async fn mark_all_notifications_read(&self) -> Result<(), PortalError> {
        let token = require_token(self.session.as_ref()).await?;
        self.api.mark_all_notifications_read(&token).await?;
        self.flip_read(|_| true);
        Ok(())
    }

    fn flip_read(&self, matches: impl Fn(&Notification) -> bool) {
        let unread = {
            let mut state = self.write();
            for n in state.notifications.iter_mut().filter(|n| matches(n)) {
                n.read = true;
            }
            state.notifications.iter().filter(|n| !n.read).count()
        };
        self.emit(StoreEvent::NotificationsChanged { unread });
    }

    /// Unread counts per claim, for list badges.
    pub fn unread_by_claim(&self) -> HashMap<String, usize> {
        let mut counts = HashMap::new();
        for n in self.read().notifications.iter().filter(|n| !n.read) {
            *counts.entry(n.claim_id.clone()).or_insert(0) += 1;
        }
        counts
    }
}
