use actix_web::dev::Server;
use actix_web::{web, App, HttpServer};
use std::net::TcpListener;

use crate::auth::{AuthService, Role};
use crate::error::{AppError, ValidationError};
use crate::logger::RequestTracing;
use crate::middleware::{JwtMiddleware, RequireRole};
use crate::routes::{
    admin_dashboard, get_profile, health_check, login, logout, logout_all, refresh, register,
};
use crate::security::{security_headers, LoginThrottle};

/// Malformed or incomplete JSON bodies become 400 `VALIDATION_ERROR`
fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, _req| {
        tracing::warn!(error = %err, "Rejected request body");
        AppError::Validation(ValidationError::InvalidFormat("request body".to_string())).into()
    })
}

pub fn run(
    listener: TcpListener,
    auth: web::Data<AuthService>,
    throttle: web::Data<LoginThrottle>,
) -> Result<Server, std::io::Error> {
    let issuer = auth.issuer().clone();

    let server = HttpServer::new(move || {
        App::new()
            // Global middleware
            .wrap(security_headers())
            .wrap(RequestTracing)

            // Shared state
            .app_data(json_config())
            .app_data(auth.clone())
            .app_data(throttle.clone())

            // Public routes (no authentication required)
            .route("/health_check", web::get().to(health_check))
            .route("/register", web::post().to(register))
            .route("/login", web::post().to(login))
            .service(
                web::scope("/auth")
                    .route("/refresh", web::post().to(refresh))
                    .route("/logout", web::post().to(logout))
                    .service(
                        web::resource("/logout-all")
                            .wrap(JwtMiddleware::new(issuer.clone()))
                            .route(web::post().to(logout_all)),
                    ),
            )

            // Protected routes (require JWT authentication)
            .service(
                web::resource("/profile")
                    .wrap(JwtMiddleware::new(issuer.clone()))
                    .route(web::get().to(get_profile)),
            )
            .service(
                web::scope("/admin")
                    .wrap(RequireRole::new(Role::Admin))
                    .wrap(JwtMiddleware::new(issuer.clone()))
                    .route("", web::get().to(admin_dashboard))
                    .route("/dashboard", web::get().to(admin_dashboard)),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}
