/// Access token claims
///
/// Payload of the signed access token: registered JWT claims (RFC 7519)
/// plus the user's role.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::identity::{Identity, Role};
use crate::error::{AppError, AuthError};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (user ID as UUID string)
    pub sub: String,
    /// Role used for gating; tokens without one are plain users
    #[serde(default)]
    pub role: Role,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issuer
    pub iss: String,
}

impl Claims {
    /// Build claims for `user_id` valid for `expiry_seconds` from now
    pub fn new(user_id: Uuid, role: Role, expiry_seconds: i64, issuer: String) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            sub: user_id.to_string(),
            role,
            iat: now,
            exp: now + expiry_seconds,
            iss: issuer,
        }
    }

    /// Extract user ID from claims
    ///
    /// # Errors
    /// A subject that is not a UUID makes the whole token unusable.
    pub fn user_id(&self) -> Result<Uuid, AppError> {
        Uuid::parse_str(&self.sub).map_err(|_| AppError::Auth(AuthError::TokenInvalid))
    }

    pub fn identity(&self) -> Result<Identity, AppError> {
        Ok(Identity {
            user_id: self.user_id()?,
            role: self.role,
        })
    }
}
