/// Authorization gate
///
/// Framework-independent checks behind `JwtMiddleware` and `RequireRole`.

use crate::auth::identity::{Identity, Role};
use crate::auth::jwt::AccessTokenIssuer;
use crate::error::{AppError, AuthError};

/// Pull the token out of an `Authorization: Bearer <token>` header value
pub fn bearer_token(header_value: &str) -> Option<&str> {
    let token = header_value.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

/// Establish who is calling from the raw `Authorization` header
///
/// # Errors
/// - `AuthError::MissingToken` when there is no usable bearer token
/// - `AuthError::TokenInvalid` / `AuthError::TokenExpired` when verification fails
pub fn authenticate(
    issuer: &AccessTokenIssuer,
    authorization: Option<&str>,
) -> Result<Identity, AppError> {
    let token = authorization
        .and_then(bearer_token)
        .ok_or(AppError::Auth(AuthError::MissingToken))?;

    let claims = issuer.verify(token).map_err(|e| {
        tracing::warn!(reason = %e, "Access token rejected");
        AppError::from(e)
    })?;

    claims.identity()
}

/// Exact-match role check
pub fn authorize(identity: &Identity, required: Role) -> Result<(), AppError> {
    if identity.role == required {
        Ok(())
    } else {
        tracing::warn!(
            user_id = %identity.user_id,
            role = %identity.role,
            required = %required,
            "Role check failed"
        );
        Err(AppError::Auth(AuthError::Forbidden))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::JwtSettings;
    use uuid::Uuid;

    fn issuer() -> AccessTokenIssuer {
        AccessTokenIssuer::new(&JwtSettings {
            secret: "test-secret-key-at-least-32-characters-long".to_string(),
            access_token_expiry: 60,
            issuer: "test".to_string(),
        })
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token("Bearer abc.def.ghi"), Some("abc.def.ghi"));
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token("Bearer"), None);
        assert_eq!(bearer_token("Basic dXNlcjpwYXNz"), None);
        assert_eq!(bearer_token("BearerToken"), None);
        assert_eq!(bearer_token(""), None);
    }

    #[test]
    fn test_authenticate_valid_token() {
        let issuer = issuer();
        let user_id = Uuid::new_v4();
        let header = format!("Bearer {}", issuer.issue(user_id, Role::User).unwrap());

        let identity = authenticate(&issuer, Some(&header)).unwrap();
        assert_eq!(identity, Identity { user_id, role: Role::User });
    }

    #[test]
    fn test_authenticate_rejects_missing_and_bad_tokens() {
        let issuer = issuer();

        assert!(matches!(
            authenticate(&issuer, None),
            Err(AppError::Auth(AuthError::MissingToken))
        ));
        assert!(matches!(
            authenticate(&issuer, Some("Bearer not.a.token")),
            Err(AppError::Auth(AuthError::TokenInvalid))
        ));
    }

    #[test]
    fn test_authorize_is_exact_match() {
        let admin = Identity {
            user_id: Uuid::new_v4(),
            role: Role::Admin,
        };
        let user = Identity {
            user_id: Uuid::new_v4(),
            role: Role::User,
        };

        assert!(authorize(&admin, Role::Admin).is_ok());
        assert!(authorize(&user, Role::User).is_ok());
        assert!(matches!(
            authorize(&user, Role::Admin),
            Err(AppError::Auth(AuthError::Forbidden))
        ));
        assert!(authorize(&admin, Role::User).is_err());
    }
}
