/// Authentication service
///
/// Orchestrates the credential store, password hasher, access token issuer
/// and refresh token manager for the four session operations: register,
/// login, refresh and logout. Handlers stay thin on top of it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::auth::identity::Role;
use crate::auth::jwt::AccessTokenIssuer;
use crate::auth::password::PasswordHasher;
use crate::auth::refresh_token::{IssuedRefreshToken, RefreshTokenManager};
use crate::configuration::{JwtSettings, PasswordPolicy, SessionSettings};
use crate::error::{best_effort, AppError, AuthError, ValidationError};
use crate::store::{CredentialStore, NewUser, SessionStore, User};
use crate::validators::{is_valid_email, is_valid_username};

/// Tokens handed out by a successful login or refresh
#[derive(Debug, Clone)]
pub struct AuthenticatedSession {
    pub user_id: Uuid,
    pub access_token: String,
    pub refresh_token: IssuedRefreshToken,
}

impl AuthenticatedSession {
    pub fn refresh_expires_at(&self) -> DateTime<Utc> {
        self.refresh_token.expires_at
    }
}

pub struct AuthService {
    credentials: Arc<dyn CredentialStore>,
    hasher: PasswordHasher,
    issuer: AccessTokenIssuer,
    sessions: RefreshTokenManager,
}

impl AuthService {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        sessions: Arc<dyn SessionStore>,
        jwt: &JwtSettings,
        session: &SessionSettings,
        password: &PasswordPolicy,
    ) -> Result<Self, AppError> {
        Ok(Self {
            credentials,
            hasher: PasswordHasher::new(password.clone())?,
            issuer: AccessTokenIssuer::new(jwt),
            sessions: RefreshTokenManager::new(sessions, session),
        })
    }

    pub fn issuer(&self) -> &AccessTokenIssuer {
        &self.issuer
    }

    pub fn sessions(&self) -> &RefreshTokenManager {
        &self.sessions
    }

    /// Create an account with the default role
    ///
    /// # Errors
    /// - `ValidationError` for bad username/email or a policy-violating password
    /// - `DatabaseError::UniqueConstraintViolation` if email or username is taken
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<User, AppError> {
        let username = is_valid_username(username)?;
        let email = is_valid_email(email)?;
        self.hasher.validate(password)?;

        let password_hash = self.hasher.hash(password).await?;
        let user = self
            .credentials
            .create_user(NewUser {
                username,
                email,
                password_hash,
                role: Role::User,
            })
            .await?;

        tracing::info!(user_id = %user.id, "User registered");
        Ok(user)
    }

    /// Verify credentials and open a new session
    ///
    /// Unknown email and wrong password fail identically, after the same
    /// amount of hashing work.
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthenticatedSession, AppError> {
        let email = email.trim().to_lowercase();
        if email.is_empty() {
            return Err(ValidationError::EmptyField("email".to_string()).into());
        }
        if password.is_empty() {
            return Err(ValidationError::EmptyField("password".to_string()).into());
        }

        let user = match self.credentials.find_user_by_email(&email).await? {
            Some(user) => user,
            None => {
                self.hasher.verify_decoy(password).await?;
                tracing::warn!("Login failed");
                return Err(AppError::Auth(AuthError::InvalidCredentials));
            }
        };

        if !self.hasher.verify(password, &user.password_hash).await? {
            tracing::warn!(user_id = %user.id, "Login failed");
            return Err(AppError::Auth(AuthError::InvalidCredentials));
        }

        best_effort(
            "update_last_login",
            self.credentials.update_last_login(user.id, Utc::now()).await,
        );

        let access_token = self.issuer.issue(user.id, user.role)?;
        let refresh_token = self.sessions.issue(user.id).await?;

        tracing::info!(user_id = %user.id, "User logged in");
        Ok(AuthenticatedSession {
            user_id: user.id,
            access_token,
            refresh_token,
        })
    }

    /// Rotate a refresh token and mint a fresh access token
    pub async fn refresh(&self, presented: &str) -> Result<AuthenticatedSession, AppError> {
        let (user_id, refresh_token) = self.sessions.rotate(presented).await?;

        let access_token = match self.access_token_for(user_id).await {
            Ok(access_token) => access_token,
            Err(e) => {
                // Nobody will ever receive the replacement
                best_effort(
                    "revoke_undelivered_refresh_token",
                    self.sessions.revoke(&refresh_token.token).await,
                );
                return Err(e);
            }
        };

        tracing::info!(user_id = %user_id, "Token refreshed");
        Ok(AuthenticatedSession {
            user_id,
            access_token,
            refresh_token,
        })
    }

    async fn access_token_for(&self, user_id: Uuid) -> Result<String, AppError> {
        let user = self.credentials.find_user_by_id(user_id).await?.ok_or_else(|| {
            tracing::warn!(user_id = %user_id, "Refresh token belongs to a missing user");
            AppError::Auth(AuthError::TokenInvalid)
        })?;

        Ok(self.issuer.issue(user.id, user.role)?)
    }

    pub async fn logout(&self, presented: &str) -> Result<(), AppError> {
        self.sessions.revoke(presented).await?;
        tracing::info!("Refresh token revoked");
        Ok(())
    }

    /// Revoke every session of `user_id`
    pub async fn logout_everywhere(&self, user_id: Uuid) -> Result<u64, AppError> {
        self.sessions.revoke_all(user_id).await
    }

    pub async fn find_user(&self, user_id: Uuid) -> Result<Option<User>, AppError> {
        self.credentials.find_user_by_id(user_id).await
    }
}
