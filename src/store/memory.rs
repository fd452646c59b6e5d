/// In-process stores
///
/// Each store keeps its records behind a single tokio lock, which gives every
/// operation the same all-or-nothing behaviour the Postgres backend gets from
/// transactions and row locks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use super::{
    CredentialStore, NewSession, NewUser, SessionRecord, SessionState, SessionStore, User,
};
use crate::error::{AppError, DatabaseError};

#[derive(Default)]
pub struct InMemoryCredentialStore {
    users: RwLock<HashMap<Uuid, User>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn create_user(&self, user: NewUser) -> Result<User, AppError> {
        let mut users = self.users.write().await;

        let taken = users.values().any(|existing| {
            existing.email.eq_ignore_ascii_case(&user.email)
                || existing.username.eq_ignore_ascii_case(&user.username)
        });
        if taken {
            return Err(AppError::Database(DatabaseError::UniqueConstraintViolation(
                "users_email_or_username".to_string(),
            )));
        }

        let created = User {
            id: Uuid::new_v4(),
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            role: user.role,
            created_at: Utc::now(),
            last_login: None,
        };
        users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .find(|user| user.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn update_last_login(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), AppError> {
        match self.users.write().await.get_mut(&id) {
            Some(user) => {
                user.last_login = Some(at);
                Ok(())
            }
            None => Err(AppError::Database(DatabaseError::NotFound(format!(
                "user {}",
                id
            )))),
        }
    }
}

#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<String, SessionRecord>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records currently held, revoked ones included
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn duplicate_token() -> AppError {
    AppError::Database(DatabaseError::UniqueConstraintViolation(
        "refresh_tokens_token_hash_key".to_string(),
    ))
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn insert(&self, session: NewSession) -> Result<(), AppError> {
        let mut sessions = self.sessions.lock().await;
        if sessions.contains_key(&session.token_hash) {
            return Err(duplicate_token());
        }

        sessions.insert(
            session.token_hash.clone(),
            SessionRecord {
                token_hash: session.token_hash,
                user_id: session.user_id,
                expires_at: session.expires_at,
                created_at: Utc::now(),
                revoked: false,
            },
        );
        Ok(())
    }

    async fn find(&self, token_hash: &str) -> Result<Option<SessionRecord>, AppError> {
        Ok(self.sessions.lock().await.get(token_hash).cloned())
    }

    async fn rotate(
        &self,
        presented_hash: &str,
        replacement_hash: &str,
        replacement_expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<SessionState, AppError> {
        let mut sessions = self.sessions.lock().await;

        let user_id = match sessions.get(presented_hash) {
            None => return Ok(SessionState::Unknown),
            Some(record) if record.revoked => return Ok(SessionState::Revoked),
            Some(record) if record.expires_at <= now => return Ok(SessionState::Expired),
            Some(record) => record.user_id,
        };
        if sessions.contains_key(replacement_hash) {
            return Err(duplicate_token());
        }

        if let Some(record) = sessions.get_mut(presented_hash) {
            record.revoked = true;
        }
        sessions.insert(
            replacement_hash.to_string(),
            SessionRecord {
                token_hash: replacement_hash.to_string(),
                user_id,
                expires_at: replacement_expires_at,
                created_at: now,
                revoked: false,
            },
        );

        Ok(SessionState::Consumed(user_id))
    }

    async fn revoke(&self, token_hash: &str, _now: DateTime<Utc>) -> Result<bool, AppError> {
        match self.sessions.lock().await.get_mut(token_hash) {
            Some(record) => {
                record.revoked = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn revoke_all(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<u64, AppError> {
        let mut sessions = self.sessions.lock().await;
        let mut revoked = 0;
        for record in sessions.values_mut() {
            if record.user_id == user_id && record.is_active(now) {
                record.revoked = true;
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|_, record| record.expires_at > now);
        Ok((before - sessions.len()) as u64)
    }
}
