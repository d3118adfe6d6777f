use async_trait::async_trait;
use shared_types::{PortalError, UserProfile};

/// Identity/session collaborator.
///
/// A missing token is a normal state (signed out), not a failure of the
/// provider; callers turn it into an `Auth` error when they need one.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn token(&self) -> Option<String>;

    fn current_user(&self) -> Option<UserProfile>;
}

/// Bearer token for an authenticated call, or an `Auth` error.
pub async fn require_token(session: &dyn SessionProvider) -> Result<String, PortalError> {
    match session.token().await {
        Some(token) if !token.is_empty() => Ok(token),
        _ => Err(PortalError::auth("Not authenticated")),
    }
}

/// A fixed session, for hosts that manage tokens themselves and for tests.
#[derive(Debug, Clone, Default)]
pub struct StaticSession {
    token: Option<String>,
    user: Option<UserProfile>,
}

impl StaticSession {
    pub fn signed_in(token: impl Into<String>, user: UserProfile) -> Self {
        Self {
            token: Some(token.into()),
            user: Some(user),
        }
    }

    pub fn signed_out() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionProvider for StaticSession {
    async fn token(&self) -> Option<String> {
        self.token.clone()
    }

    fn current_user(&self) -> Option<UserProfile> {
        self.user.clone()
    }
}
