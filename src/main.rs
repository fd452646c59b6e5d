use actix_web::web;
use sqlx::postgres::PgPoolOptions;
use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use authgate::auth::{spawn_expiry_sweep, AuthService};
use authgate::configuration::get_configuration;
use authgate::security::LoginThrottle;
use authgate::startup::run;
use authgate::store::{PgCredentialStore, PgSessionStore};
use authgate::telemetry::init_telemetry;

fn startup_error(kind: std::io::ErrorKind, message: &str) -> std::io::Error {
    std::io::Error::new(kind, message.to_string())
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // 구조화된 로깅 초기화
    init_telemetry();

    tracing::info!("Starting application");

    // 설정 로드 및 검증
    let configuration = get_configuration().map_err(|e| {
        tracing::error!("Failed to read configuration: {}", e);
        startup_error(std::io::ErrorKind::InvalidInput, "Configuration error")
    })?;
    configuration.validate().map_err(|e| {
        tracing::error!("Invalid configuration: {}", e);
        startup_error(std::io::ErrorKind::InvalidInput, "Configuration error")
    })?;
    tracing::info!("Configuration loaded successfully");

    // 데이터베이스 연결 풀 생성
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&configuration.database.connection_string())
        .await
        .map_err(|e| {
            tracing::error!("Failed to create connection pool: {}", e);
            startup_error(std::io::ErrorKind::ConnectionRefused, "Database connection error")
        })?;

    sqlx::migrate!("./migrations").run(&pool).await.map_err(|e| {
        tracing::error!("Failed to run migrations: {}", e);
        startup_error(std::io::ErrorKind::Other, "Migration error")
    })?;
    tracing::info!("Database ready");

    let auth = AuthService::new(
        Arc::new(PgCredentialStore::new(pool.clone())),
        Arc::new(PgSessionStore::new(pool)),
        &configuration.jwt,
        &configuration.session,
        &configuration.password,
    )
    .map_err(|e| {
        tracing::error!("Failed to build auth service: {}", e);
        startup_error(std::io::ErrorKind::Other, "Auth service error")
    })?;

    // 만료된 refresh token 정리 작업
    spawn_expiry_sweep(
        auth.sessions().clone(),
        Duration::from_secs(configuration.session.cleanup_interval_seconds),
    );

    let throttle = LoginThrottle::new(configuration.security.login_attempts_per_minute);

    // 서버 주소 설정
    let address = format!("127.0.0.1:{}", configuration.application.port);
    let listener = TcpListener::bind(&address)?;
    tracing::info!("Server listening on: {}", address);

    let server = run(listener, web::Data::new(auth), web::Data::new(throttle))?;
    server.await
}
