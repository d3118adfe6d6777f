//! Citizen <-> service conversation on a claim.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};
use shared_types::{AttachmentRef, ClaimMessage, PortalError, SendMessagePayload, SenderRole};

use crate::api::ClaimsApi;
use crate::session::{require_token, SessionProvider};
use crate::store::ClaimsStore;

/// Id prefix of locally echoed messages not yet confirmed by a refresh.
pub const PENDING_PREFIX: &str = "pending-";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub message_id: String,
    pub timestamp: DateTime<Utc>,
    /// Whether the follow-up claim refresh succeeded.
    pub refreshed: bool,
}

pub struct Messenger {
    api: Arc<dyn ClaimsApi>,
    session: Arc<dyn SessionProvider>,
    store: Arc<ClaimsStore>,
    optimistic_echo: bool,
}

impl Messenger {
    pub fn new(
        api: Arc<dyn ClaimsApi>,
        session: Arc<dyn SessionProvider>,
        store: Arc<ClaimsStore>,
    ) -> Self {
        Self {
            api,
            session,
            store,
            optimistic_echo: false,
        }
    }

    /// Append the sent message locally before the refresh lands.
    pub fn with_optimistic_echo(mut self, enabled: bool) -> Self {
        self.optimistic_echo = enabled;
        self
    }

    /// Send a message on a claim, then re-fetch the claim.
    ///
    /// Closed claims are rejected before any request is made. A failed
    /// refresh after a successful send is not an error: the message was
    /// delivered and the next poll will pick it up.
    #[tracing::instrument(skip(self, content, attachments))]
    pub async fn send_message(
        &self,
        claim_id: &str,
        content: &str,
        attachments: Vec<AttachmentRef>,
    ) -> Result<SentMessage, PortalError> {
        let content = content.trim();
        if content.is_empty() && attachments.is_empty() {
            return Err(PortalError::validation(
                "Message cannot be empty",
                HashMap::from([("message".to_string(), "Message cannot be empty".to_string())]),
            ));
        }

        let claim = match self.store.claim(claim_id) {
            Some(claim) => claim,
            None => self.store.refresh_claim_by_id(claim_id).await?,
        };
        if !claim.accepts_messages() {
            tracing::info!(claim_id, status = %claim.status, "Message blocked on closed claim");
            return Err(PortalError::closed_claim(claim.reference()));
        }

        let token = require_token(self.session.as_ref()).await?;
        let payload = SendMessagePayload {
            claim_id: claim_id.to_string(),
            message: content.to_string(),
            attachments,
        };
        let response = self.api.send_message(&token, claim_id, &payload).await?;

        if self.optimistic_echo {
            let user = self.session.current_user();
            self.store.append_optimistic_message(ClaimMessage {
                id: format!("{PENDING_PREFIX}{}", response.message_id),
                claim_id: claim_id.to_string(),
                sender_id: user.as_ref().map(|u| u.id.clone()).unwrap_or_default(),
                sender_name: user.map(|u| u.name).unwrap_or_default(),
                sender_role: SenderRole::Citizen,
                content: payload.message,
                timestamp: response.timestamp,
                attachments: (!payload.attachments.is_empty()).then_some(payload.attachments),
            });
        }

        let refreshed = match self.store.refresh_claim_by_id(claim_id).await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(claim_id, error = %e, "Message sent but claim refresh failed");
                false
            }
        };

        Ok(SentMessage {
            message_id: response.message_id,
            timestamp: response.timestamp,
            refreshed,
        })
    }
}

/// Messages that share a calendar day in the viewer's time zone.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageGroup {
    pub date: NaiveDate,
    /// e.g. "June 9, 2025"
    pub label: String,
    pub messages: Vec<ClaimMessage>,
}

pub fn day_label(date: NaiveDate) -> String {
    date.format("%B %-d, %Y").to_string()
}

/// Group messages by local calendar day, oldest first.
///
/// Messages are ordered by timestamp; ties keep their input order.
pub fn group_messages_by_day<Tz: TimeZone>(messages: &[ClaimMessage], tz: &Tz) -> Vec<MessageGroup> {
    let mut sorted = messages.to_vec();
    sorted.sort_by_key(|m| m.timestamp);

    let mut groups: Vec<MessageGroup> = Vec::new();
    for message in sorted {
        let date = message.timestamp.with_timezone(tz).date_naive();
        match groups.last_mut() {
            Some(group) if group.date == date => group.messages.push(message),
            _ => groups.push(MessageGroup {
                date,
                label: day_label(date),
                messages: vec![message],
            }),
        }
    }
    groups
}

/// [`group_messages_by_day`] in the machine's local time zone.
pub fn group_messages_by_local_day(messages: &[ClaimMessage]) -> Vec<MessageGroup> {
    group_messages_by_day(messages, &Local)
}
