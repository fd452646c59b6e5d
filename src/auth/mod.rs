/// Authentication module
///
/// Password hashing, access token issuing/verification, refresh token
/// lifecycle, role gating, and the `AuthService` tying them together.

mod claims;
mod gate;
mod identity;
mod jwt;
mod password;
mod refresh_token;
mod service;

pub use claims::Claims;
pub use gate::{authenticate, authorize, bearer_token};
pub use identity::{Identity, Role};
pub use jwt::AccessTokenIssuer;
pub use password::{hash_password, validate_password, verify_password, PasswordHasher};
pub use refresh_token::{
    generate_refresh_token, hash_token, spawn_expiry_sweep, IssuedRefreshToken,
    RefreshTokenManager, REFRESH_TOKEN_LENGTH,
};
pub use service::{AuthService, AuthenticatedSession};
