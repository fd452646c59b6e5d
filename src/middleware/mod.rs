/// Middleware module
///
/// Authentication and role gating for protected routes.

mod jwt_middleware;
mod role_guard;

pub use jwt_middleware::JwtMiddleware;
pub use role_guard::RequireRole;
