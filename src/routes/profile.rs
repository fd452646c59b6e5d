use actix_web::{web, HttpResponse};

use crate::auth::{AuthService, Identity};
use crate::error::{AppError, DatabaseError};
use crate::routes::auth::UserResponse;

/// GET /profile
///
/// **Requires valid JWT access token** in Authorization header.
///
/// # Errors
/// - 401: Missing or invalid token (handled by middleware)
/// - 404: User no longer exists
pub async fn get_profile(
    identity: web::ReqData<Identity>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let user = auth
        .find_user(identity.user_id)
        .await?
        .ok_or_else(|| AppError::Database(DatabaseError::NotFound("user".to_string())))?;

    Ok(HttpResponse::Ok().json(UserResponse::from(user)))
}
