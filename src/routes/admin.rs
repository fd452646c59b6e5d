use actix_web::{web, HttpResponse};

use crate::auth::Identity;

/// GET /admin, GET /admin/dashboard
///
/// Reachable only through `JwtMiddleware` + `RequireRole(Admin)`.
pub async fn admin_dashboard(identity: web::ReqData<Identity>) -> HttpResponse {
    tracing::info!(user_id = %identity.user_id, "Admin area accessed");

    HttpResponse::Ok().json(serde_json::json!({
        "message": "Welcome to the admin area",
        "user_id": identity.user_id.to_string(),
        "role": identity.role.as_str()
    }))
}
