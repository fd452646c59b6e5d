/// Postgres-backed stores
///
/// Schema lives in `migrations/`. Refresh token rotation relies on a
/// conditional `UPDATE ... WHERE revoked = false` inside a transaction: the
/// row lock taken by the first writer makes every concurrent rotation of the
/// same token re-check the condition and miss.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{
    CredentialStore, NewSession, NewUser, SessionRecord, SessionState, SessionStore, User,
};
use crate::auth::Role;
use crate::error::AppError;

type UserRow = (
    Uuid,
    String,
    String,
    String,
    String,
    DateTime<Utc>,
    Option<DateTime<Utc>>,
);

fn user_from_row(row: UserRow) -> Result<User, AppError> {
    let (id, username, email, password_hash, role, created_at, last_login) = row;
    let role = role
        .parse::<Role>()
        .map_err(|e| AppError::Internal(format!("user {} has {}", id, e)))?;

    Ok(User {
        id,
        username,
        email,
        password_hash,
        role,
        created_at,
        last_login,
    })
}

#[derive(Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn create_user(&self, user: NewUser) -> Result<User, AppError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            INSERT INTO users (id, username, email, password_hash, role, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, username, email, password_hash, role, created_at, last_login
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        user_from_row(row)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, username, email, password_hash, role, created_at, last_login
            FROM users
            WHERE lower(email) = lower($1)
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?
        .map(user_from_row)
        .transpose()
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, username, email, password_hash, role, created_at, last_login
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(user_from_row)
        .transpose()
    }

    async fn update_last_login(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET last_login = $1 WHERE id = $2")
            .bind(at)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn insert(&self, session: NewSession) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (id, user_id, token_hash, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(session.user_id)
        .bind(&session.token_hash)
        .bind(session.expires_at)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find(&self, token_hash: &str) -> Result<Option<SessionRecord>, AppError> {
        let row = sqlx::query_as::<_, (Uuid, DateTime<Utc>, DateTime<Utc>, bool)>(
            r#"
            SELECT user_id, expires_at, created_at, revoked
            FROM refresh_tokens
            WHERE token_hash = $1
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(user_id, expires_at, created_at, revoked)| SessionRecord {
            token_hash: token_hash.to_string(),
            user_id,
            expires_at,
            created_at,
            revoked,
        }))
    }

    async fn rotate(
        &self,
        presented_hash: &str,
        replacement_hash: &str,
        replacement_expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<SessionState, AppError> {
        let mut tx = self.pool.begin().await?;

        let consumed = sqlx::query_scalar::<_, Uuid>(
            r#"
            UPDATE refresh_tokens
            SET revoked = true, revoked_at = $2
            WHERE token_hash = $1 AND revoked = false AND expires_at > $2
            RETURNING user_id
            "#,
        )
        .bind(presented_hash)
        .bind(now)
        .fetch_optional(&mut tx)
        .await?;

        let user_id = match consumed {
            Some(user_id) => user_id,
            None => {
                tx.rollback().await?;
                return Ok(match self.find(presented_hash).await? {
                    None => SessionState::Unknown,
                    Some(record) if record.revoked => SessionState::Revoked,
                    Some(_) => SessionState::Expired,
                });
            }
        };

        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (id, user_id, token_hash, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(replacement_hash)
        .bind(replacement_expires_at)
        .bind(now)
        .execute(&mut tx)
        .await?;

        tx.commit().await?;
        Ok(SessionState::Consumed(user_id))
    }

    async fn revoke(&self, token_hash: &str, now: DateTime<Utc>) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked = true, revoked_at = COALESCE(revoked_at, $1)
            WHERE token_hash = $2
            "#,
        )
        .bind(now)
        .bind(token_hash)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn revoke_all(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked = true, revoked_at = $1
            WHERE user_id = $2 AND revoked = false AND expires_at > $1
            "#,
        )
        .bind(now)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
