/// Authentication Routes
///
/// Thin handlers over `AuthService`: registration, login, refresh token
/// rotation and logout. The refresh token only ever travels in the
/// `refresh_token` cookie; the access token is returned in the body.

use actix_web::cookie::{time::OffsetDateTime, Cookie, SameSite};
use actix_web::{web, HttpRequest, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::{AuthService, AuthenticatedSession, Identity};
use crate::error::{AppError, AuthError, DatabaseError};
use crate::security::LoginThrottle;
use crate::store::User;

pub const REFRESH_COOKIE: &str = "refresh_token";

/// User registration request
#[derive(Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// User login request
#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Access token response; the refresh token is set as a cookie alongside it
#[derive(Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

/// User information response
#[derive(Serialize)]
pub struct UserResponse {
    pub id: String,
    pub username: String,
    pub email: String,
    pub role: String,
    pub created_at: String,
    pub last_login: Option<String>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id.to_string(),
            username: user.username,
            email: user.email,
            role: user.role.to_string(),
            created_at: user.created_at.to_rfc3339(),
            last_login: user.last_login.map(|at| at.to_rfc3339()),
        }
    }
}

/// The refresh cookie carrying `token` until `expires_at`
fn refresh_cookie(token: String, expires_at: DateTime<Utc>) -> Cookie<'static> {
    Cookie::build(REFRESH_COOKIE, token)
        .path("/")
        .http_only(true)
        .secure(true)
        .same_site(SameSite::Strict)
        .expires(OffsetDateTime::from_unix_timestamp(expires_at.timestamp()).ok())
        .finish()
}

fn removal_cookie() -> Cookie<'static> {
    let mut cookie = Cookie::build(REFRESH_COOKIE, "")
        .path("/")
        .http_only(true)
        .secure(true)
        .same_site(SameSite::Strict)
        .finish();
    cookie.make_removal();
    cookie
}

fn session_response(auth: &AuthService, session: AuthenticatedSession) -> HttpResponse {
    let cookie = refresh_cookie(session.refresh_token.token, session.refresh_token.expires_at);

    HttpResponse::Ok().cookie(cookie).json(TokenResponse {
        access_token: session.access_token,
        token_type: "Bearer".to_string(),
        expires_in: auth.issuer().ttl_seconds(),
    })
}

fn presented_refresh_token(req: &HttpRequest) -> Result<String, AppError> {
    req.cookie(REFRESH_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .filter(|value| !value.is_empty())
        .ok_or(AppError::Auth(AuthError::MissingToken))
}

/// POST /register
///
/// # Errors
/// - 400: Validation errors (username, email, password policy, missing fields)
/// - 409: Email or username already registered
pub async fn register(
    form: web::Json<RegisterRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let user = auth
        .register(&form.username, &form.email, &form.password)
        .await?;

    Ok(HttpResponse::Created().json(UserResponse::from(user)))
}

/// POST /login
///
/// Returns the access token in the body and sets the refresh cookie.
///
/// # Errors
/// - 400: Missing fields
/// - 401: Invalid credentials (same response for unknown email and wrong password)
/// - 429: Too many attempts from this client
pub async fn login(
    req: HttpRequest,
    form: web::Json<LoginRequest>,
    auth: web::Data<AuthService>,
    throttle: web::Data<LoginThrottle>,
) -> Result<HttpResponse, AppError> {
    let client = req
        .peer_addr()
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());
    throttle.check(&client)?;

    let session = auth.login(&form.email, &form.password).await?;
    Ok(session_response(&auth, session))
}

/// POST /auth/refresh
///
/// Consumes the refresh cookie and replaces it with a new one.
///
/// # Errors
/// - 401: Missing, unknown, revoked or expired refresh token
pub async fn refresh(
    req: HttpRequest,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let presented = presented_refresh_token(&req)?;
    let session = auth.refresh(&presented).await?;
    Ok(session_response(&auth, session))
}

/// POST /auth/logout
///
/// Revokes the refresh cookie's token and clears the cookie. A token the
/// server no longer knows still logs the client out.
pub async fn logout(
    req: HttpRequest,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let presented = presented_refresh_token(&req)?;

    match auth.logout(&presented).await {
        Ok(()) => {}
        Err(AppError::Database(DatabaseError::NotFound(_))) => {
            tracing::info!("Logout with an unknown refresh token");
        }
        Err(e) => return Err(e),
    }

    Ok(HttpResponse::Ok()
        .cookie(removal_cookie())
        .json(serde_json::json!({ "message": "Logged out" })))
}

/// POST /auth/logout-all
///
/// **Requires valid JWT access token.** Revokes every refresh token of the caller.
pub async fn logout_all(
    identity: web::ReqData<Identity>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let revoked = auth.logout_everywhere(identity.user_id).await?;

    Ok(HttpResponse::Ok()
        .cookie(removal_cookie())
        .json(serde_json::json!({
            "message": "Logged out from all sessions",
            "revoked": revoked
        })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_refresh_cookie_attributes() {
        let expires_at = Utc::now() + Duration::days(7);
        let cookie = refresh_cookie("abc".to_string(), expires_at);

        assert_eq!(cookie.name(), REFRESH_COOKIE);
        assert_eq!(cookie.value(), "abc");
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(
            cookie.expires_datetime().map(|at| at.unix_timestamp()),
            Some(expires_at.timestamp())
        );
    }

    #[test]
    fn test_removal_cookie_clears_value() {
        let cookie = removal_cookie();

        assert_eq!(cookie.value(), "");
        assert_eq!(cookie.path(), Some("/"));
        assert!(cookie.expires_datetime().is_some());
    }
}
