use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Public Router Module
///
/// Pages reachable without a session. The auth pages are public in the sense
/// that no session is required; the guard still moves verified users off them.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // Load balancer health check.
        .route("/health", get(|| async { "ok" }))
        .route("/", get(handlers::home_page))
        .route("/about", get(handlers::about_page))
        // --- Auth pages ---
        .route("/login", get(handlers::login_page))
        .route("/register", get(handlers::register_page))
        .route("/forgot-password", get(handlers::forgot_password_page))
        .route("/reset-password", get(handlers::reset_password_page))
        .route("/verify-email", get(handlers::verify_email_page))
        // The only page a banned user can reach.
        .route("/banned", get(handlers::banned_page))
}
