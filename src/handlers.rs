use axum::{
    Json,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Redirect, Response},
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    AppState,
    auth::{AdminUser, CurrentUser, Role, SESSION_COOKIE, hash_password},
    errors::ApiError,
    guard::is_admin,
    models::{
        AdminDashboardStats, BanDetails, BanUserRequest, BulkMessageRequest, BulkUpdateResponse,
        CreateMessageRequest, CreateUserRequest, Message, MessageAction, MessageFilter,
        MessageInbox, MessagePriority, MessageStatus, MessageType, NewMessage, NewUser, PageView,
        Pagination, PresignedUrlRequest, PresignedUrlResponse, SetRoleRequest, UserPage,
        UserProfile, UserSummary,
    },
    storage::sanitize_key,
};

/// Users per page in the admin listing.
pub const USERS_PER_PAGE: i64 = 10;

/// Messages per page in the admin inbox.
pub const MESSAGES_PER_PAGE: i64 = 20;

/// Longest ban an admin can hand out: 100 years.
pub const MAX_BAN_SECONDS: i64 = 100 * 365 * 24 * 60 * 60;

pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_PASSWORD_LEN: usize = 128;

const DEFAULT_BAN_REASON_SHOWN: &str = "Violation of terms of service";

/// UserListQuery
///
/// Query parameters for GET /admin/users.
#[derive(Debug, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UserListQuery {
    /// Matched case-insensitively against name and email.
    pub search: Option<String>,
    /// 1-based page number.
    pub page: Option<i64>,
}

/// MessageListQuery
///
/// Query parameters for GET /admin/messages. Each filter also accepts `all`.
#[derive(Debug, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct MessageListQuery {
    pub search: Option<String>,
    /// `unread`, `read`, `archived` or `all`.
    pub status: Option<String>,
    /// `low`, `normal`, `high` or `all`.
    pub priority: Option<String>,
    /// `system`, `admin`, `user` or `all`.
    #[serde(rename = "type")]
    pub message_type: Option<String>,
    pub page: Option<i64>,
}

/// AccountOverview
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct AccountOverview {
    pub profile: UserProfile,
    #[ts(type = "string")]
    pub session_expires_at: DateTime<Utc>,
}

// --- Public & Auth Pages ---

#[utoipa::path(get, path = "/", responses((status = 200, description = "Success", body = PageView)))]
pub async fn home_page() -> Json<PageView> {
    Json(PageView::new("home", "My App"))
}

#[utoipa::path(get, path = "/about", responses((status = 200, description = "Success", body = PageView)))]
pub async fn about_page() -> Json<PageView> {
    Json(PageView::new("about", "About"))
}

/// login_page
///
/// [Auth Page] Reached only by visitors without a verified session; the guard
/// sends signed-in users to their dashboard. Credential handling belongs to
/// the auth provider.
#[utoipa::path(get, path = "/login", responses((status = 200, description = "Success", body = PageView), (status = 303, description = "Redirected by the access guard")))]
pub async fn login_page() -> Json<PageView> {
    Json(PageView::new("login", "Sign in"))
}

#[utoipa::path(get, path = "/register", responses((status = 200, description = "Success", body = PageView), (status = 303, description = "Redirected by the access guard")))]
pub async fn register_page() -> Json<PageView> {
    Json(PageView::new("register", "Create an account"))
}

#[utoipa::path(get, path = "/forgot-password", responses((status = 200, description = "Success", body = PageView), (status = 303, description = "Redirected by the access guard")))]
pub async fn forgot_password_page() -> Json<PageView> {
    Json(PageView::new("forgot-password", "Forgot password"))
}

#[utoipa::path(get, path = "/reset-password", responses((status = 200, description = "Success", body = PageView), (status = 303, description = "Redirected by the access guard")))]
pub async fn reset_password_page() -> Json<PageView> {
    Json(PageView::new("reset-password", "Reset password"))
}

/// verify_email_page
///
/// [Auth Page] Where unverified users are parked until they confirm their
/// address. Verified users never reach it.
#[utoipa::path(get, path = "/verify-email", responses((status = 200, description = "Success", body = PageView), (status = 303, description = "Redirected by the access guard")))]
pub async fn verify_email_page() -> Json<PageView> {
    Json(PageView::new("verify-email", "Verify your email"))
}

/// banned_page
///
/// [Banned Page] Explains the ban to a banned user. Anyone else is sent to
/// the login page.
#[utoipa::path(
    get,
    path = "/banned",
    responses((status = 200, description = "Success", body = BanDetails), (status = 303, description = "Caller is not banned"))
)]
pub async fn banned_page(session: Option<CurrentUser>, State(state): State<AppState>) -> Response {
    let Some(CurrentUser(session)) = session.filter(|CurrentUser(s)| s.user.banned) else {
        return Redirect::to("/login").into_response();
    };

    let user = session.user;
    let is_temporary = user.ban_expires.is_some_and(|expires| expires > Utc::now());

    Json(BanDetails {
        reason: user
            .ban_reason
            .unwrap_or_else(|| DEFAULT_BAN_REASON_SHOWN.to_string()),
        expires_at: user.ban_expires,
        is_temporary,
        message: state.config.ban.banned_user_message.clone(),
    })
    .into_response()
}

/// Offset of a 1-based `page`, or 400 when it does not fit the offset type.
fn page_offset(page: i64, per_page: i64) -> Result<i64, ApiError> {
    (page - 1)
        .checked_mul(per_page)
        .ok_or_else(|| ApiError::BadRequest(format!("page {page} is out of range")))
}

/// Expiry of a ban lasting `secs` from now. Durations outside
/// `1..=MAX_BAN_SECONDS` are rejected.
fn ban_expiry(secs: i64) -> Result<DateTime<Utc>, ApiError> {
    let out_of_range = || {
        ApiError::BadRequest(format!(
            "expires_in_seconds must be between 1 and {MAX_BAN_SECONDS}"
        ))
    };

    if !(1..=MAX_BAN_SECONDS).contains(&secs) {
        return Err(out_of_range());
    }

    Duration::try_seconds(secs)
        .and_then(|duration| Utc::now().checked_add_signed(duration))
        .ok_or_else(out_of_range)
}

// --- Account Area ---

/// account_overview
///
/// [Account Route] Dashboard root for regular users.
#[utoipa::path(get, path = "/account", responses((status = 200, description = "Success", body = AccountOverview), (status = 303, description = "Redirected by the access guard")))]
pub async fn account_overview(CurrentUser(session): CurrentUser) -> Json<AccountOverview> {
    Json(AccountOverview {
        session_expires_at: session.expires_at,
        profile: UserProfile::from(session.user),
    })
}

#[utoipa::path(get, path = "/account/profile", responses((status = 200, description = "Success", body = UserProfile), (status = 303, description = "Redirected by the access guard")))]
pub async fn get_profile(CurrentUser(session): CurrentUser) -> Json<UserProfile> {
    Json(UserProfile::from(session.user))
}

/// request_avatar_upload
///
/// [Account Route] Hands out a presigned URL so the browser uploads the
/// avatar straight to object storage. Only image content types are accepted
/// and the key is confined to the caller's own prefix.
#[utoipa::path(
    post,
    path = "/account/profile/avatar",
    request_body = PresignedUrlRequest,
    responses(
        (status = 200, description = "Success", body = PresignedUrlResponse),
        (status = 400, description = "Not an image content type")
    )
)]
pub async fn request_avatar_upload(
    CurrentUser(session): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<PresignedUrlRequest>,
) -> Result<Json<PresignedUrlResponse>, ApiError> {
    if !payload.file_type.starts_with("image/") {
        return Err(ApiError::BadRequest(format!(
            "unsupported avatar type '{}'",
            payload.file_type
        )));
    }

    let extension = std::path::Path::new(&payload.filename)
        .extension()
        .and_then(std::ffi::OsStr::to_str)
        .unwrap_or("bin");
    let object_key = sanitize_key(&format!(
        "avatars/{}/{}.{}",
        session.user.id,
        Uuid::new_v4(),
        extension
    ));

    let upload_url = state
        .storage
        .presign_upload(&object_key, &payload.file_type)
        .await?;

    Ok(Json(PresignedUrlResponse {
        upload_url,
        resource_key: object_key,
    }))
}

/// delete_account
///
/// [Account Route] Deletes the caller's own account, clears the session
/// cookie and sends them to the login page. Admin accounts cannot be deleted
/// this way.
#[utoipa::path(
    delete,
    path = "/account",
    responses((status = 303, description = "Account deleted, redirected to /login"), (status = 403, description = "Caller is an admin"))
)]
pub async fn delete_account(
    CurrentUser(session): CurrentUser,
    State(state): State<AppState>,
) -> Result<Response, ApiError> {
    let user = session.user;
    if user.is_admin() {
        return Err(ApiError::Forbidden("Admin accounts can't be deleted".to_string()));
    }

    if !state.repo.delete_user(user.id).await? {
        return Err(ApiError::NotFound("user"));
    }

    tracing::info!(user = %user.id, "account deleted");
    let clear_cookie = format!("{SESSION_COOKIE}=; Path=/; Max-Age=0; HttpOnly; SameSite=Lax");
    Ok((
        [(header::SET_COOKIE, clear_cookie)],
        Redirect::to("/login"),
    )
        .into_response())
}

// --- Admin Area ---

/// admin_dashboard
///
/// [Admin Route] User counters and the five newest accounts.
#[utoipa::path(get, path = "/admin", responses((status = 200, description = "Success", body = AdminDashboardStats), (status = 303, description = "Redirected by the access guard")))]
pub async fn admin_dashboard(
    AdminUser(_admin): AdminUser,
    State(state): State<AppState>,
) -> Result<Json<AdminDashboardStats>, ApiError> {
    Ok(Json(state.repo.get_stats().await?))
}

/// list_users
///
/// [Admin Route] Paginated, searchable user listing. Pages below 1 are
/// treated as page 1.
#[utoipa::path(
    get,
    path = "/admin/users",
    params(UserListQuery),
    responses((status = 200, description = "Success", body = UserPage), (status = 303, description = "Redirected by the access guard"))
)]
pub async fn list_users(
    AdminUser(_admin): AdminUser,
    State(state): State<AppState>,
    Query(query): Query<UserListQuery>,
) -> Result<Json<UserPage>, ApiError> {
    let page = query.page.unwrap_or(1).max(1);
    let offset = page_offset(page, USERS_PER_PAGE)?;

    let (users, total) = state
        .repo
        .list_users(query.search, USERS_PER_PAGE, offset)
        .await?;

    Ok(Json(UserPage {
        users: users.into_iter().map(UserSummary::from).collect(),
        pagination: Pagination::new(page, USERS_PER_PAGE, total),
    }))
}

/// set_user_role
///
/// [Admin Route] Replaces a user's role. Both `"admin"` and `["user","admin"]`
/// are accepted and stored as given.
#[utoipa::path(
    put,
    path = "/admin/users/{id}/role",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = SetRoleRequest,
    responses((status = 200, description = "Success", body = UserSummary), (status = 400, description = "Invalid role"), (status = 404, description = "Unknown user"))
)]
pub async fn set_user_role(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SetRoleRequest>,
) -> Result<Json<UserSummary>, ApiError> {
    if payload.role.to_stored().trim().is_empty() {
        return Err(ApiError::BadRequest("role must not be empty".to_string()));
    }

    let user = state
        .repo
        .set_role(id, &payload.role)
        .await?
        .ok_or(ApiError::NotFound("user"))?;

    tracing::info!(admin = %admin.id, user = %id, role = %payload.role.to_stored(), "role updated");
    Ok(Json(UserSummary::from(user)))
}

/// ban_user
///
/// [Admin Route] Bans a user. Reason and duration default to the configured
/// ban policy; admin accounts cannot be banned.
#[utoipa::path(
    post,
    path = "/admin/users/{id}/ban",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = BanUserRequest,
    responses((status = 200, description = "Success", body = UserSummary), (status = 400, description = "Invalid duration"), (status = 403, description = "Target is an admin"), (status = 404, description = "Unknown user"))
)]
pub async fn ban_user(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<BanUserRequest>,
) -> Result<Json<UserSummary>, ApiError> {
    let target = state
        .repo
        .get_user(id)
        .await?
        .ok_or(ApiError::NotFound("user"))?;

    if is_admin(target.role.as_deref().map(Role::from_stored).as_ref()) {
        return Err(ApiError::Forbidden("Admin accounts can't be banned".to_string()));
    }

    let policy = &state.config.ban;
    let reason = payload
        .reason
        .filter(|reason| !reason.trim().is_empty())
        .unwrap_or_else(|| policy.default_reason.clone());

    let expires = match payload.expires_in_seconds.or(policy.default_duration_secs) {
        Some(secs) => Some(ban_expiry(secs)?),
        None => None,
    };

    let user = state
        .repo
        .ban_user(id, &reason, expires)
        .await?
        .ok_or(ApiError::NotFound("user"))?;

    tracing::info!(admin = %admin.id, user = %id, %reason, ?expires, "user banned");
    Ok(Json(UserSummary::from(user)))
}

#[utoipa::path(
    post,
    path = "/admin/users/{id}/unban",
    params(("id" = Uuid, Path, description = "User ID")),
    responses((status = 200, description = "Success", body = UserSummary), (status = 404, description = "Unknown user"))
)]
pub async fn unban_user(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<UserSummary>, ApiError> {
    let user = state
        .repo
        .unban_user(id)
        .await?
        .ok_or(ApiError::NotFound("user"))?;

    tracing::info!(admin = %admin.id, user = %id, "user unbanned");
    Ok(Json(UserSummary::from(user)))
}

/// create_user
///
/// [Admin Route] Creates an account with a password. The role defaults to
/// `"user"`; the email is stored trimmed and lowercased.
#[utoipa::path(
    post,
    path = "/admin/users",
    request_body = CreateUserRequest,
    responses((status = 201, description = "Created", body = UserSummary), (status = 400, description = "Invalid input"), (status = 409, description = "Email already registered"))
)]
pub async fn create_user(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserSummary>), ApiError> {
    let name = payload.name.trim().to_string();
    let email = payload.email.trim().to_lowercase();

    if name.is_empty() {
        return Err(ApiError::BadRequest("name must not be empty".to_string()));
    }
    if !is_plausible_email(&email) {
        return Err(ApiError::BadRequest(format!("invalid email '{email}'")));
    }
    let password_len = payload.password.chars().count();
    if !(MIN_PASSWORD_LEN..=MAX_PASSWORD_LEN).contains(&password_len) {
        return Err(ApiError::BadRequest(format!(
            "password must be {MIN_PASSWORD_LEN} to {MAX_PASSWORD_LEN} characters"
        )));
    }

    let role = payload
        .role
        .unwrap_or_else(|| Role::Single("user".to_string()));
    if role.to_stored().trim().is_empty() {
        return Err(ApiError::BadRequest("role must not be empty".to_string()));
    }

    let password_hash =
        hash_password(&payload.password).map_err(|e| ApiError::PasswordHash(e.to_string()))?;

    let user = state
        .repo
        .create_user(&NewUser {
            name,
            email,
            password_hash,
            role,
        })
        .await?;

    tracing::info!(admin = %admin.id, user = %user.id, "user created");
    Ok((StatusCode::CREATED, Json(UserSummary::from(user))))
}

/// One `@` with text on both sides and a dot in the domain.
fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    }
}

// --- Admin Messages ---

/// Parses an optional listing filter; empty and `all` mean no filter.
fn parse_filter<T: DeserializeOwned>(field: &str, raw: Option<String>) -> Result<Option<T>, ApiError> {
    match raw.as_deref().map(str::trim) {
        None | Some("") | Some("all") => Ok(None),
        Some(value) => serde_json::from_value(serde_json::Value::String(value.to_string()))
            .map(Some)
            .map_err(|_| ApiError::BadRequest(format!("unknown {field} '{value}'"))),
    }
}

/// list_messages
///
/// [Admin Route] Paginated inbox with search and filters, plus the inbox
/// counters.
#[utoipa::path(
    get,
    path = "/admin/messages",
    params(MessageListQuery),
    responses((status = 200, description = "Success", body = MessageInbox), (status = 400, description = "Unknown filter value"))
)]
pub async fn list_messages(
    AdminUser(_admin): AdminUser,
    State(state): State<AppState>,
    Query(query): Query<MessageListQuery>,
) -> Result<Json<MessageInbox>, ApiError> {
    let filter = MessageFilter {
        search: query.search,
        status: parse_filter::<MessageStatus>("status", query.status)?,
        priority: parse_filter::<MessagePriority>("priority", query.priority)?,
        message_type: parse_filter::<MessageType>("type", query.message_type)?,
    };

    let page = query.page.unwrap_or(1).max(1);
    let offset = page_offset(page, MESSAGES_PER_PAGE)?;

    let (messages, total) = state
        .repo
        .list_messages(&filter, MESSAGES_PER_PAGE, offset)
        .await?;
    let stats = state.repo.get_message_stats().await?;

    Ok(Json(MessageInbox {
        messages,
        pagination: Pagination::new(page, MESSAGES_PER_PAGE, total),
        stats,
    }))
}

#[utoipa::path(
    get,
    path = "/admin/messages/{id}",
    params(("id" = Uuid, Path, description = "Message ID")),
    responses((status = 200, description = "Success", body = Message), (status = 404, description = "Unknown message"))
)]
pub async fn get_message(
    AdminUser(_admin): AdminUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Message>, ApiError> {
    let message = state
        .repo
        .get_message(id)
        .await?
        .ok_or(ApiError::NotFound("message"))?;
    Ok(Json(message))
}

/// create_message
///
/// [Admin Route] Sends a message as the calling admin. A blank admin name is
/// shown as "Admin".
#[utoipa::path(
    post,
    path = "/admin/messages",
    request_body = CreateMessageRequest,
    responses((status = 201, description = "Created", body = Message), (status = 400, description = "Invalid input"))
)]
pub async fn create_message(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateMessageRequest>,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    let subject = payload.subject.trim().to_string();
    let content = payload.content.trim().to_string();
    if subject.is_empty() || content.is_empty() {
        return Err(ApiError::BadRequest(
            "subject and content must not be empty".to_string(),
        ));
    }

    if let Some(recipient) = payload.recipient_id {
        if state.repo.get_user(recipient).await?.is_none() {
            return Err(ApiError::BadRequest(format!("unknown recipient {recipient}")));
        }
    }

    let sender = match admin.name.trim() {
        "" => "Admin".to_string(),
        name => name.to_string(),
    };

    let message = state
        .repo
        .create_message(&NewMessage {
            subject,
            content,
            sender,
            sender_avatar: admin.image.clone(),
            recipient_id: payload.recipient_id,
            priority: payload.priority,
            message_type: payload.message_type,
        })
        .await?;

    tracing::info!(admin = %admin.id, message = %message.id, "message created");
    Ok((StatusCode::CREATED, Json(message)))
}

/// Applies `action` to one message: 204 on success, 404 when it does not exist.
async fn update_one_message(
    state: &AppState,
    id: Uuid,
    action: MessageAction,
) -> Result<StatusCode, ApiError> {
    match state.repo.update_messages(&[id], action).await? {
        0 => Err(ApiError::NotFound("message")),
        _ => Ok(StatusCode::NO_CONTENT),
    }
}

#[utoipa::path(
    post,
    path = "/admin/messages/{id}/read",
    params(("id" = Uuid, Path, description = "Message ID")),
    responses((status = 204, description = "Marked as read"), (status = 404, description = "Unknown message"))
)]
pub async fn mark_message_read(
    AdminUser(_admin): AdminUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    update_one_message(&state, id, MessageAction::Read).await
}

#[utoipa::path(
    post,
    path = "/admin/messages/{id}/unread",
    params(("id" = Uuid, Path, description = "Message ID")),
    responses((status = 204, description = "Marked as unread"), (status = 404, description = "Unknown message"))
)]
pub async fn mark_message_unread(
    AdminUser(_admin): AdminUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    update_one_message(&state, id, MessageAction::Unread).await
}

#[utoipa::path(
    post,
    path = "/admin/messages/{id}/archive",
    params(("id" = Uuid, Path, description = "Message ID")),
    responses((status = 204, description = "Archived"), (status = 404, description = "Unknown message"))
)]
pub async fn archive_message(
    AdminUser(_admin): AdminUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    update_one_message(&state, id, MessageAction::Archive).await
}

/// delete_message
///
/// [Admin Route] Soft delete: the row stays but disappears from every listing.
#[utoipa::path(
    delete,
    path = "/admin/messages/{id}",
    params(("id" = Uuid, Path, description = "Message ID")),
    responses((status = 204, description = "Deleted"), (status = 404, description = "Unknown message"))
)]
pub async fn delete_message(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let status = update_one_message(&state, id, MessageAction::Delete).await?;
    tracing::info!(admin = %admin.id, message = %id, "message deleted");
    Ok(status)
}

/// bulk_update_messages
///
/// [Admin Route] Applies one action to several messages. Unknown ids are
/// skipped; the response reports how many messages changed.
#[utoipa::path(
    post,
    path = "/admin/messages/bulk",
    request_body = BulkMessageRequest,
    responses((status = 200, description = "Success", body = BulkUpdateResponse), (status = 400, description = "No ids given"))
)]
pub async fn bulk_update_messages(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Json(payload): Json<BulkMessageRequest>,
) -> Result<Json<BulkUpdateResponse>, ApiError> {
    if payload.ids.is_empty() {
        return Err(ApiError::BadRequest("ids must not be empty".to_string()));
    }

    let updated = state
        .repo
        .update_messages(&payload.ids, payload.action)
        .await?;

    tracing::info!(admin = %admin.id, action = ?payload.action, updated, "bulk message update");
    Ok(Json(BulkUpdateResponse { updated }))
}
