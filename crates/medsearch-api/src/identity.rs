//! Identity of the signed-in user.
//!
//! The auth flow itself is external; the client only needs the user's
//! subject id for user-scoped routes and, when present, an ID token to send
//! as a bearer credential.

use async_trait::async_trait;
use secrecy::SecretString;

use crate::error::ApiError;

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Subject id of the signed-in user. Empty when signed out.
    async fn user_uid(&self) -> Result<String, ApiError>;

    async fn bearer_token(&self) -> Option<SecretString>;
}

/// Identity taken from configuration (or a previously exported session).
#[derive(Debug)]
pub struct StaticIdentity {
    user_uid: String,
    id_token: Option<String>,
}

impl StaticIdentity {
    pub fn new(user_uid: impl Into<String>, id_token: Option<String>) -> Self {
        Self { user_uid: user_uid.into(), id_token }
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentity {
    async fn user_uid(&self) -> Result<String, ApiError> {
        Ok(self.user_uid.clone())
    }

    async fn bearer_token(&self) -> Option<SecretString> {
        self.id_token.clone().map(SecretString::from)
    }
}

/// Resolve the user id, failing when the session is signed out.
pub async fn require_user(identity: &dyn IdentityProvider) -> Result<String, ApiError> {
    let uid = identity.user_uid().await?;
    if uid.trim().is_empty() {
        return Err(ApiError::Unauthenticated);
    }
    Ok(uid)
}
