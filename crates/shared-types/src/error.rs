use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Fallback shown when the backend gives no usable message.
pub const GENERIC_ERROR_MESSAGE: &str = "Something went wrong. Please try again.";

/// Categorization of portal errors.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PortalErrorKind {
    /// Registry/schema mismatch. Not user-recoverable.
    Config,
    Validation,
    Auth,
    Upload,
    Remote,
    ClosedClaim,
    NotFound,
}

impl fmt::Display for PortalErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortalErrorKind::Config => write!(f, "ConfigError"),
            PortalErrorKind::Validation => write!(f, "ValidationError"),
            PortalErrorKind::Auth => write!(f, "AuthError"),
            PortalErrorKind::Upload => write!(f, "UploadError"),
            PortalErrorKind::Remote => write!(f, "RemoteError"),
            PortalErrorKind::ClosedClaim => write!(f, "ClosedClaimError"),
            PortalErrorKind::NotFound => write!(f, "NotFound"),
        }
    }
}

/// Structured error used across the portal core.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PortalError {
    pub kind: PortalErrorKind,
    pub message: String,
    /// HTTP status for `Remote` errors. `None` when the request never got a response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub field_errors: HashMap<String, String>,
}

impl PortalError {
    fn new(kind: PortalErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            field_errors: HashMap::new(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(PortalErrorKind::Config, message)
    }

    pub fn validation(message: impl Into<String>, field_errors: HashMap<String, String>) -> Self {
        Self {
            field_errors,
            ..Self::new(PortalErrorKind::Validation, message)
        }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(PortalErrorKind::Auth, message)
    }

    pub fn upload(message: impl Into<String>) -> Self {
        Self::new(PortalErrorKind::Upload, message)
    }

    /// A backend rejection carrying the HTTP status.
    pub fn remote(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            ..Self::new(PortalErrorKind::Remote, message)
        }
    }

    /// A request that failed before any response arrived (DNS, connect, timeout).
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(PortalErrorKind::Remote, message)
    }

    pub fn closed_claim(claim_id: &str) -> Self {
        Self::new(
            PortalErrorKind::ClosedClaim,
            format!("Claim {claim_id} is closed and no longer accepts messages"),
        )
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(PortalErrorKind::NotFound, message)
    }

    pub fn is_not_found_status(&self) -> bool {
        self.kind == PortalErrorKind::Remote && self.status == Some(404)
    }

    /// Message suitable for showing to the citizen.
    ///
    /// Remote errors surface the server-provided text when there is one;
    /// everything without a message falls back to a generic sentence.
    pub fn user_message(&self) -> String {
        if self.message.trim().is_empty() {
            GENERIC_ERROR_MESSAGE.to_string()
        } else {
            self.message.clone()
        }
    }
}

impl fmt::Display for PortalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} ({}): {}", self.kind, status, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for PortalError {}

#[cfg(feature = "validation")]
impl From<validator::ValidationErrors> for PortalError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut field_errors = HashMap::new();
        collect_field_errors(&errors, &mut field_errors);
        PortalError::validation("Validation failed", field_errors)
    }
}

/// Flatten nested validation errors, keyed by leaf field name.
#[cfg(feature = "validation")]
fn collect_field_errors(errors: &validator::ValidationErrors, out: &mut HashMap<String, String>) {
    use validator::ValidationErrorsKind;

    for (field, kind) in errors.errors() {
        match kind {
            ValidationErrorsKind::Field(errs) => {
                if let Some(first) = errs.first() {
                    let msg = first
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("Invalid value for {}", field));
                    out.entry(field.to_string()).or_insert(msg);
                }
            }
            ValidationErrorsKind::Struct(nested) => collect_field_errors(nested, out),
            ValidationErrorsKind::List(items) => {
                for nested in items.values() {
                    collect_field_errors(nested, out);
                }
            }
        }
    }
}
