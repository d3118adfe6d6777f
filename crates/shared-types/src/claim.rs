use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

// ── Status & priority ───────────────────────────────────────────────

/// Lifecycle status of a claim, as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    Submitted,
    Received,
    Assigned,
    InProgress,
    PendingInfo,
    Resolved,
    Rejected,
}

impl ClaimStatus {
    pub const ALL: [ClaimStatus; 7] = [
        ClaimStatus::Submitted,
        ClaimStatus::Received,
        ClaimStatus::Assigned,
        ClaimStatus::InProgress,
        ClaimStatus::PendingInfo,
        ClaimStatus::Resolved,
        ClaimStatus::Rejected,
    ];

    /// Terminal claims accept no further messages.
    pub fn is_terminal(self) -> bool {
        matches!(self, ClaimStatus::Resolved | ClaimStatus::Rejected)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ClaimStatus::Submitted => "submitted",
            ClaimStatus::Received => "received",
            ClaimStatus::Assigned => "assigned",
            ClaimStatus::InProgress => "in_progress",
            ClaimStatus::PendingInfo => "pending_info",
            ClaimStatus::Resolved => "resolved",
            ClaimStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

// ── Attachments ─────────────────────────────────────────────────────

/// A file reference attached to a claim or message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentRef {
    pub url: String,
    pub file_name: String,
    pub file_type: String,
}

// ── Messages ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SenderRole {
    Citizen,
    Service,
}

/// One entry of a claim's conversation. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimMessage {
    pub id: String,
    pub claim_id: String,
    pub sender_id: String,
    pub sender_name: String,
    #[serde(alias = "senderType")]
    pub sender_role: SenderRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<AttachmentRef>>,
}

// ── Claims ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub operator_id: String,
    pub operator_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    pub summary: String,
    #[serde(default)]
    pub actions_taken: Vec<String>,
    #[serde(default)]
    pub closing_message: String,
}

/// Local cache copy of a backend-owned claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claim {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claim_number: Option<String>,
    pub user_id: String,
    pub service_type: String,
    #[serde(default)]
    pub service_name: String,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, alias = "images")]
    pub attachment_urls: Vec<String>,
    #[serde(default)]
    pub extra_data: HashMap<String, String>,
    pub status: ClaimStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<Assignment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<Resolution>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub messages: Vec<ClaimMessage>,
}

impl Claim {
    pub fn accepts_messages(&self) -> bool {
        !self.status.is_terminal()
    }

    /// Display reference: the backend claim number when assigned, else the id.
    pub fn reference(&self) -> &str {
        self.claim_number.as_deref().unwrap_or(&self.id)
    }
}

// ── Notifications ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    StatusChange,
    NewMessage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub claim_id: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}
