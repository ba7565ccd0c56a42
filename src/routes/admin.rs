use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post, put},
};

/// Admin Router Module
///
/// Nested under `/admin`. Non-admin sessions are redirected to `/account`
/// by the guard before reaching these handlers.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // GET /admin
        // Dashboard counters and the newest accounts.
        .route("/", get(handlers::admin_dashboard))
        // GET /admin/users?search=&page=, POST /admin/users
        .route(
            "/users",
            get(handlers::list_users).post(handlers::create_user),
        )
        // PUT /admin/users/{id}/role
        .route("/users/{id}/role", put(handlers::set_user_role))
        // POST /admin/users/{id}/ban
        .route("/users/{id}/ban", post(handlers::ban_user))
        // POST /admin/users/{id}/unban
        .route("/users/{id}/unban", post(handlers::unban_user))
        // --- Messages ---
        // GET /admin/messages?search=&status=&priority=&type=&page=
        .route(
            "/messages",
            get(handlers::list_messages).post(handlers::create_message),
        )
        .route("/messages/bulk", post(handlers::bulk_update_messages))
        .route(
            "/messages/{id}",
            get(handlers::get_message).delete(handlers::delete_message),
        )
        .route("/messages/{id}/read", post(handlers::mark_message_read))
        .route("/messages/{id}/unread", post(handlers::mark_message_unread))
        .route("/messages/{id}/archive", post(handlers::archive_message))
}
