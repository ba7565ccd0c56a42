use std::sync::Arc;

use axum::{
    Router,
    extract::{FromRef, Request, State},
    http::HeaderName,
    middleware::{self, Next},
    response::{IntoResponse, Redirect, Response},
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Access decisions and the session they are made on.
pub mod auth;
pub mod guard;

// Application services.
pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod repository;
pub mod storage;

// Routers grouped by page class (Public, Account, Admin).
pub mod routes;
use routes::{account, admin, public};

// --- Public Re-exports ---

pub use auth::{JwtSessionProvider, RequestSession, SessionState, resolve_session};
pub use config::AppConfig;
pub use guard::{AccessGuard, Decision};
pub use repository::{PostgresRepository, RepositoryState};
pub use storage::{MockStorageService, S3StorageClient, StorageState};

/// ApiDoc
///
/// OpenAPI document for every page and endpoint, served at
/// `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::home_page, handlers::about_page, handlers::login_page,
        handlers::register_page, handlers::forgot_password_page, handlers::reset_password_page,
        handlers::verify_email_page, handlers::banned_page, handlers::account_overview,
        handlers::get_profile, handlers::request_avatar_upload, handlers::admin_dashboard,
        handlers::list_users, handlers::set_user_role, handlers::ban_user, handlers::unban_user,
        handlers::delete_account, handlers::create_user, handlers::list_messages,
        handlers::get_message, handlers::create_message, handlers::mark_message_read,
        handlers::mark_message_unread, handlers::archive_message, handlers::delete_message,
        handlers::bulk_update_messages
    ),
    components(
        schemas(
            auth::Role, models::UserProfile, models::UserSummary, models::Pagination,
            models::UserPage, models::AdminDashboardStats, models::BanDetails, models::PageView,
            models::SetRoleRequest, models::BanUserRequest, models::PresignedUrlRequest,
            models::PresignedUrlResponse, handlers::AccountOverview, models::CreateUserRequest,
            models::Message, models::MessageStatus, models::MessagePriority, models::MessageType,
            models::MessageStats, models::MessageInbox, models::MessageAction,
            models::CreateMessageRequest, models::BulkMessageRequest, models::BulkUpdateResponse,
        )
    ),
    tags(
        (name = "account-portal", description = "Account portal with role and ban aware access control")
    )
)]
struct ApiDoc;

/// AppState
///
/// Shared, immutable container for the services every request needs.
#[derive(Clone)]
pub struct AppState {
    pub repo: RepositoryState,
    pub storage: StorageState,
    /// Resolves the caller's session from request headers.
    pub sessions: SessionState,
    pub guard: Arc<AccessGuard>,
    pub config: AppConfig,
}

impl AppState {
    /// Wires the session provider and the guard from `config` on top of the
    /// given persistence and storage backends.
    pub fn new(repo: RepositoryState, storage: StorageState, config: AppConfig) -> Self {
        let sessions = Arc::new(JwtSessionProvider::new(repo.clone(), &config)) as SessionState;
        let guard = Arc::new(AccessGuard::new(config.route_table.clone()));

        Self {
            repo,
            storage,
            sessions,
            guard,
            config,
        }
    }
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for StorageState {
    fn from_ref(app_state: &AppState) -> StorageState {
        app_state.storage.clone()
    }
}

impl FromRef<AppState> for SessionState {
    fn from_ref(app_state: &AppState) -> SessionState {
        app_state.sessions.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// guard_middleware
///
/// Runs in front of every route. The session is resolved exactly once; a
/// failed lookup counts as no session. A redirect decision short-circuits
/// with 303 See Other, otherwise the session is handed to the handlers
/// through `RequestSession`.
async fn guard_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let session = resolve_session(state.sessions.as_ref(), request.headers()).await;

    match state.guard.decide(session.as_ref(), request.uri().path()) {
        Decision::Redirect(target) => {
            tracing::debug!(
                path = %request.uri().path(),
                to = target.path(),
                user = ?session.as_ref().map(|s| s.user.id),
                "access guard redirect"
            );
            Redirect::to(target.path()).into_response()
        }
        Decision::Proceed => {
            request.extensions_mut().insert(RequestSession(session));
            next.run(request).await
        }
    }
}

/// create_router
///
/// Assembles every route group behind the access guard, then adds the
/// observability and CORS layers.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .nest("/account", account::account_routes())
        .nest("/admin", admin::admin_routes())
        // `layer` rather than `route_layer`: unmatched dashboard paths are
        // still redirected instead of answering 404.
        .layer(middleware::from_fn_with_state(
            state.clone(),
            guard_middleware,
        ))
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Span for `TraceLayer` carrying the request id so every log line of one
/// request can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
