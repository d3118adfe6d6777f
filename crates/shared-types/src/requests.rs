use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[cfg(feature = "validation")]
use validator::Validate;

use crate::claim::{AttachmentRef, Priority};

/// The signed-in citizen as supplied by the identity provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "validation", derive(Validate))]
pub struct UserProfile {
    #[cfg_attr(
        feature = "validation",
        validate(length(min = 1, message = "User id is required"))
    )]
    pub id: String,
    pub email: String,
    pub name: String,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimLocation {
    pub address: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Claim section of the creation payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "validation", derive(Validate))]
pub struct NewClaim {
    /// Stable service code, never the internal service id.
    #[cfg_attr(
        feature = "validation",
        validate(length(min = 1, message = "Service code is required"))
    )]
    pub service_type: String,
    #[cfg_attr(
        feature = "validation",
        validate(length(min = 1, message = "Title is required"))
    )]
    pub title: String,
    #[cfg_attr(
        feature = "validation",
        validate(length(min = 1, message = "Description is required"))
    )]
    pub description: String,
    pub priority: Priority,
    pub location: ClaimLocation,
    #[cfg_attr(
        feature = "validation",
        validate(length(max = 5, message = "At most 5 attachments are allowed"))
    )]
    pub attachments: Vec<AttachmentRef>,
    pub extra_data: HashMap<String, String>,
}

/// Request body for `POST /claims`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "validation", derive(Validate))]
pub struct CreateClaimPayload {
    #[cfg_attr(feature = "validation", validate(nested))]
    pub user: UserProfile,
    #[cfg_attr(feature = "validation", validate(nested))]
    pub claim: NewClaim,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateClaimResponse {
    pub claim_id: String,
    #[serde(default)]
    pub claim_number: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Request body for `POST /claims/{id}/messages`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessagePayload {
    pub claim_id: String,
    pub message: String,
    pub attachments: Vec<AttachmentRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageResponse {
    pub message_id: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Error body returned by the backend on non-2xx responses.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RemoteErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    /// The upload endpoint reports failures under `error`.
    #[serde(default)]
    pub error: Option<String>,
}

impl RemoteErrorBody {
    pub fn into_message(self) -> Option<String> {
        self.message.or(self.error).filter(|m| !m.trim().is_empty())
    }
}
