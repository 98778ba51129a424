use axum::{
    Router,
    routing::{get, post},
};

use crate::handlers;
use crate::state::AppState;

/// Router の構築
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(handlers::health_check))
        .route("/api/register", post(handlers::register))
        .route("/api/login", post(handlers::login))
        .route(
            "/api/password/reset-request",
            post(handlers::request_password_reset),
        )
        .route(
            "/api/password/reset/verify",
            get(handlers::verify_reset_token),
        )
        .route("/api/password/reset", post(handlers::reset_password))
        .with_state(state)
}
