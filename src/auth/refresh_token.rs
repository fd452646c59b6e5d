/// Refresh Token Management
///
/// Refresh tokens are:
/// - Cryptographically secure random 64-character alphanumeric strings
/// - Hashed with SHA-256 before storage (never store plaintext)
/// - Single-use: a refresh consumes the presented token and issues a new one
/// - Revocable through the `SessionStore`

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use sha2::{Digest, Sha256};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::configuration::SessionSettings;
use crate::error::{AppError, AuthError, DatabaseError};
use crate::store::{NewSession, SessionState, SessionStore};

/// Length of a refresh token in base62 characters (~380 bits of entropy)
pub const REFRESH_TOKEN_LENGTH: usize = 64;

/// Generate a new cryptographically secure refresh token
///
/// `thread_rng` is a CSPRNG seeded from the OS. The token is returned in
/// plaintext (this is what the client stores).
pub fn generate_refresh_token() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(REFRESH_TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

/// Hash a refresh token using SHA-256
///
/// The store is keyed by this digest, never by the token itself.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// A refresh token freshly persisted for a user
#[derive(Debug, Clone)]
pub struct IssuedRefreshToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Owns the refresh token lifecycle: issue, rotate, revoke, expire.
#[derive(Clone)]
pub struct RefreshTokenManager {
    store: Arc<dyn SessionStore>,
    ttl: Duration,
}

impl RefreshTokenManager {
    pub fn new(store: Arc<dyn SessionStore>, settings: &SessionSettings) -> Self {
        Self {
            store,
            ttl: Duration::days(settings.refresh_token_days),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Persist `token` for `user_id` until `expires_at`
    ///
    /// Other sessions of the same user are left alone (multi-device login).
    pub async fn save(
        &self,
        user_id: Uuid,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        self.store
            .insert(NewSession {
                token_hash: hash_token(token),
                user_id,
                expires_at,
            })
            .await
    }

    /// Generate and persist a new refresh token for `user_id`
    pub async fn issue(&self, user_id: Uuid) -> Result<IssuedRefreshToken, AppError> {
        let token = generate_refresh_token();
        let expires_at = Utc::now() + self.ttl;
        self.save(user_id, &token, expires_at).await?;

        Ok(IssuedRefreshToken { token, expires_at })
    }

    /// Exchange a presented token for a new one bound to the same user
    ///
    /// The presented token is consumed atomically; replaying it afterwards,
    /// or racing another rotation of it, fails with `TokenInvalid`.
    ///
    /// # Errors
    /// - `AuthError::TokenInvalid`: unknown or already revoked
    /// - `AuthError::TokenExpired`: past its expiry, even if not yet reaped
    pub async fn rotate(&self, presented: &str) -> Result<(Uuid, IssuedRefreshToken), AppError> {
        let presented_hash = hash_token(presented);
        let replacement = generate_refresh_token();
        let now = Utc::now();
        let expires_at = now + self.ttl;

        match self
            .store
            .rotate(&presented_hash, &hash_token(&replacement), expires_at, now)
            .await?
        {
            SessionState::Consumed(user_id) => Ok((
                user_id,
                IssuedRefreshToken {
                    token: replacement,
                    expires_at,
                },
            )),
            SessionState::Expired => {
                tracing::info!("Refresh token expired");
                Err(AppError::Auth(AuthError::TokenExpired))
            }
            SessionState::Revoked => {
                tracing::warn!("Revoked refresh token presented, possible reuse");
                Err(AppError::Auth(AuthError::TokenInvalid))
            }
            SessionState::Unknown => {
                tracing::warn!("Refresh token not found");
                Err(AppError::Auth(AuthError::TokenInvalid))
            }
        }
    }

    /// Make a token unusable. Revoking an already revoked token succeeds.
    ///
    /// # Errors
    /// `DatabaseError::NotFound` if the token was never issued (or reaped)
    pub async fn revoke(&self, presented: &str) -> Result<(), AppError> {
        if self.store.revoke(&hash_token(presented), Utc::now()).await? {
            Ok(())
        } else {
            Err(AppError::Database(DatabaseError::NotFound(
                "refresh token".to_string(),
            )))
        }
    }

    /// Revoke every active refresh token of a user
    pub async fn revoke_all(&self, user_id: Uuid) -> Result<u64, AppError> {
        let revoked = self.store.revoke_all(user_id, Utc::now()).await?;
        tracing::info!(user_id = %user_id, revoked = revoked, "All refresh tokens revoked for user");
        Ok(revoked)
    }

    pub async fn purge_expired(&self) -> Result<u64, AppError> {
        self.store.purge_expired(Utc::now()).await
    }
}

/// Periodically delete expired refresh tokens.
///
/// Lookups check expiry on their own, so a lagging sweep only costs space.
pub fn spawn_expiry_sweep(manager: RefreshTokenManager, every: std::time::Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            match manager.purge_expired().await {
                Ok(0) => {}
                Ok(purged) => tracing::info!(purged = purged, "Expired refresh tokens purged"),
                Err(e) => tracing::error!(error = %e, "Refresh token sweep failed"),
            }
        }
    })
}
