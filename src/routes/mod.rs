mod admin;
mod auth;
mod health_check;
mod profile;

pub use admin::admin_dashboard;
pub use auth::{
    login, logout, logout_all, refresh, register, LoginRequest, RegisterRequest, TokenResponse,
    UserResponse, REFRESH_COOKIE,
};
pub use health_check::health_check;
pub use profile::get_profile;
