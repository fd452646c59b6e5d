/// Persistence collaborators
///
/// The auth core talks to storage only through `CredentialStore` and
/// `SessionStore`. `postgres` is the production backend; `memory` keeps the
/// same guarantees in-process.

mod memory;
mod postgres;

pub use memory::{InMemoryCredentialStore, InMemorySessionStore};
pub use postgres::{PgCredentialStore, PgSessionStore};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use uuid::Uuid;

use crate::auth::Role;
use crate::error::AppError;

/// A registered account
#[derive(Clone)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password_hash", &"[redacted]")
            .field("role", &self.role)
            .field("created_at", &self.created_at)
            .field("last_login", &self.last_login)
            .finish()
    }
}

/// Input for `CredentialStore::create_user`; the password is already hashed.
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
}

/// Persisted refresh token. Only the SHA-256 of the token value is kept.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub token_hash: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub revoked: bool,
}

impl SessionRecord {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && self.expires_at > now
    }
}

#[derive(Debug, Clone)]
pub struct NewSession {
    pub token_hash: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

/// What a conditional consume of a presented token found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Was active and has now been consumed on behalf of this user
    Consumed(Uuid),
    Expired,
    Revoked,
    Unknown,
}

/// User records (`users` table).
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// # Errors
    /// `DatabaseError::UniqueConstraintViolation` if the email or username
    /// is taken (case-insensitively)
    async fn create_user(&self, user: NewUser) -> Result<User, AppError>;

    /// Case-insensitive lookup
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError>;

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, AppError>;

    async fn update_last_login(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), AppError>;
}

/// Refresh token records (`refresh_tokens` table).
///
/// Every mutation is atomic: it either fully happens or leaves no trace.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert a new record. Never replaces an existing one.
    async fn insert(&self, session: NewSession) -> Result<(), AppError>;

    async fn find(&self, token_hash: &str) -> Result<Option<SessionRecord>, AppError>;

    /// Consume `presented_hash` if it is active at `now` and, in the same
    /// atomic step, insert `replacement_hash` for the same user.
    ///
    /// Of any number of concurrent calls for one token at most one returns
    /// `SessionState::Consumed`.
    async fn rotate(
        &self,
        presented_hash: &str,
        replacement_hash: &str,
        replacement_expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<SessionState, AppError>;

    /// Mark a record revoked. Returns `false` if no such record exists;
    /// revoking twice is not an error.
    async fn revoke(&self, token_hash: &str, now: DateTime<Utc>) -> Result<bool, AppError>;

    /// Revoke every still-active record of a user, returning how many.
    async fn revoke_all(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<u64, AppError>;

    /// Delete records that expired before `now`, returning how many.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, AppError>;
}
