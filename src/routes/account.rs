use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Account Router Module
///
/// Nested under `/account`. By the time a handler runs the guard has already
/// required a session that is not banned and has a verified email.
pub fn account_routes() -> Router<AppState> {
    Router::new()
        // GET /account, DELETE /account
        .route(
            "/",
            get(handlers::account_overview).delete(handlers::delete_account),
        )
        // GET /account/profile
        .route("/profile", get(handlers::get_profile))
        // POST /account/profile/avatar
        // Presigned upload URL for a new profile image.
        .route("/profile/avatar", post(handlers::request_avatar_upload))
}
