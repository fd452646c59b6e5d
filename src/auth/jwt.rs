/// Access token issuing and verification
///
/// Access tokens are short-lived HS256 JWTs. They are never persisted:
/// signature and expiry alone decide whether one is valid.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use uuid::Uuid;

use crate::auth::claims::Claims;
use crate::auth::identity::Role;
use crate::configuration::JwtSettings;
use crate::error::TokenError;

/// Signs and verifies access tokens with the process-wide secret.
///
/// Built once at startup from `JwtSettings`; cloning shares the same keys.
#[derive(Clone)]
pub struct AccessTokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl_seconds: i64,
    issuer: String,
}

impl AccessTokenIssuer {
    pub fn new(config: &JwtSettings) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&config.issuer]);
        validation.set_required_spec_claims(&["exp", "sub", "iss"]);
        validation.leeway = 0;

        Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
            ttl_seconds: config.access_token_expiry,
            issuer: config.issuer.clone(),
        }
    }

    /// Lifetime of every issued token, in seconds
    pub fn ttl_seconds(&self) -> i64 {
        self.ttl_seconds
    }

    /// Issue a signed access token for `user_id`
    ///
    /// # Errors
    /// `TokenError::SigningFailed` if the claims cannot be encoded
    pub fn issue(&self, user_id: Uuid, role: Role) -> Result<String, TokenError> {
        let claims = Claims::new(user_id, role, self.ttl_seconds, self.issuer.clone());

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| TokenError::SigningFailed(e.to_string()))
    }

    /// Verify a token and return its claims
    ///
    /// The signature is checked before expiry, so a forged token reports
    /// `BadSignature` even when its `exp` is in the past.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                ErrorKind::InvalidSignature => TokenError::BadSignature,
                _ => TokenError::Malformed(e.to_string()),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get_test_config() -> JwtSettings {
        JwtSettings {
            secret: "test-secret-key-at-least-32-characters-long".to_string(),
            access_token_expiry: 3600,
            issuer: "test".to_string(),
        }
    }

    #[test]
    fn test_issue_and_verify_token() {
        let issuer = AccessTokenIssuer::new(&get_test_config());
        let user_id = Uuid::new_v4();

        let token = issuer.issue(user_id, Role::Admin).expect("Failed to issue token");
        let claims = issuer.verify(&token).expect("Failed to verify token");

        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.role, Role::Admin);
        assert_eq!(claims.iss, "test");
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn test_garbage_is_malformed() {
        let issuer = AccessTokenIssuer::new(&get_test_config());

        assert!(matches!(
            issuer.verify("invalid.token.here"),
            Err(TokenError::Malformed(_))
        ));
        assert!(matches!(issuer.verify(""), Err(TokenError::Malformed(_))));
    }

    #[test]
    fn test_tampered_token() {
        let issuer = AccessTokenIssuer::new(&get_test_config());
        let token = issuer
            .issue(Uuid::new_v4(), Role::User)
            .expect("Failed to issue token");

        let tampered = format!("{}X", token);
        assert!(issuer.verify(&tampered).is_err());
    }

    #[test]
    fn test_foreign_secret_is_bad_signature() {
        let issuer = AccessTokenIssuer::new(&get_test_config());
        let mut other_config = get_test_config();
        other_config.secret = "another-secret-key-that-is-32-bytes-long".to_string();
        let forger = AccessTokenIssuer::new(&other_config);

        let forged = forger
            .issue(Uuid::new_v4(), Role::Admin)
            .expect("Failed to issue token");

        assert_eq!(issuer.verify(&forged).unwrap_err(), TokenError::BadSignature);
    }

    #[test]
    fn test_expired_token() {
        let mut config = get_test_config();
        config.access_token_expiry = -120;
        let issuer = AccessTokenIssuer::new(&config);

        let token = issuer
            .issue(Uuid::new_v4(), Role::User)
            .expect("Failed to issue token");

        assert_eq!(issuer.verify(&token).unwrap_err(), TokenError::Expired);
    }

    #[test]
    fn test_wrong_issuer() {
        let issuer = AccessTokenIssuer::new(&get_test_config());
        let token = issuer
            .issue(Uuid::new_v4(), Role::User)
            .expect("Failed to issue token");

        let mut config = get_test_config();
        config.issuer = "wrong-issuer".to_string();
        let verifier = AccessTokenIssuer::new(&config);

        assert!(matches!(
            verifier.verify(&token),
            Err(TokenError::Malformed(_))
        ));
    }
}
