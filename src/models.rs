use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::{Role, SessionUser};

// --- Core Application Schemas (Mapped to Database) ---

/// User
///
/// A row of the `users` table owned by the auth collaborator. `role` keeps
/// the stored form, where several roles are joined with commas.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, Default)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub email_verified: bool,
    pub role: Option<String>,
    pub banned: bool,
    pub ban_reason: Option<String>,
    pub ban_expires: Option<DateTime<Utc>>,
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
}

// --- Response Schemas ---

/// UserProfile
///
/// The signed-in user's own view of their account (GET /account, /account/profile).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub email_verified: bool,
    pub role: Option<Role>,
    pub is_admin: bool,
    pub image: Option<String>,
}

impl From<SessionUser> for UserProfile {
    fn from(user: SessionUser) -> Self {
        let is_admin = user.is_admin();
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            email_verified: user.email_verified,
            role: user.role,
            is_admin,
            image: user.image,
        }
    }
}

/// UserSummary
///
/// One row of the admin user listing.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UserSummary {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub email_verified: bool,
    pub role: Option<Role>,
    pub banned: bool,
    pub ban_reason: Option<String>,
    #[ts(type = "string | null")]
    pub ban_expires: Option<DateTime<Utc>>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserSummary {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            email_verified: user.email_verified,
            role: user.role.as_deref().map(Role::from_stored),
            banned: user.banned,
            ban_reason: user.ban_reason,
            ban_expires: user.ban_expires,
            created_at: user.created_at,
        }
    }
}

/// Pagination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub total_pages: i64,
}

impl Pagination {
    pub fn new(page: i64, limit: i64, total: i64) -> Self {
        Self {
            page,
            limit,
            total,
            total_pages: (total + limit - 1) / limit,
        }
    }
}

/// UserPage
///
/// Output of GET /admin/users.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UserPage {
    pub users: Vec<UserSummary>,
    pub pagination: Pagination,
}

/// AdminDashboardStats
///
/// Output schema for the admin dashboard (GET /admin).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct AdminDashboardStats {
    pub total_users: i64,
    pub verified_users: i64,
    pub banned_users: i64,
    /// Users created in the last 7 days.
    pub recent_users: i64,
    pub latest_users: Vec<UserSummary>,
}

/// BanDetails
///
/// What the banned page tells a banned user (GET /banned).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct BanDetails {
    pub reason: String,
    #[ts(type = "string | null")]
    pub expires_at: Option<DateTime<Utc>>,
    pub is_temporary: bool,
    pub message: String,
}

/// PageView
///
/// Descriptor returned by the auth and public pages. Rendering is the
/// frontend's concern; the backend only confirms the page is reachable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct PageView {
    pub page: String,
    pub title: String,
}

impl PageView {
    pub fn new(page: &str, title: &str) -> Self {
        Self {
            page: page.to_string(),
            title: title.to_string(),
        }
    }
}

// --- Request Payloads (Input Schemas) ---

/// SetRoleRequest
///
/// Input for PUT /admin/users/{id}/role. Accepts `"admin"` or `["user","admin"]`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct SetRoleRequest {
    pub role: Role,
}

/// BanUserRequest
///
/// Input for POST /admin/users/{id}/ban. Missing fields fall back to the
/// configured ban policy.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct BanUserRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in_seconds: Option<i64>,
}

/// PresignedUrlRequest
///
/// Input for requesting a short-lived avatar upload URL (POST /account/profile/avatar).
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema, TS, Default)]
#[ts(export)]
pub struct PresignedUrlRequest {
    /// The original filename, used to derive the file extension.
    #[schema(example = "me.png")]
    pub filename: String,
    /// The MIME type the upload is constrained to. Must be an image type.
    #[schema(example = "image/png")]
    pub file_type: String,
}

/// PresignedUrlResponse
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, TS, Default)]
#[ts(export)]
pub struct PresignedUrlResponse {
    /// The time-limited URL for the PUT request.
    pub upload_url: String,
    /// The object key the file will be stored under.
    pub resource_key: String,
}

// --- Admin Messages ---

/// MessageStatus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum MessageStatus {
    Unread,
    Read,
    Archived,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Unread => "unread",
            MessageStatus::Read => "read",
            MessageStatus::Archived => "archived",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum MessagePriority {
    Low,
    #[default]
    Normal,
    High,
}

impl MessagePriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessagePriority::Low => "low",
            MessagePriority::Normal => "normal",
            MessagePriority::High => "high",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum MessageType {
    System,
    #[default]
    Admin,
    User,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::System => "system",
            MessageType::Admin => "admin",
            MessageType::User => "user",
        }
    }
}

/// Message
///
/// A row of `messages` joined with its (optional) recipient. Status, priority
/// and type keep their stored text form.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, TS, ToSchema, Default)]
#[ts(export)]
pub struct Message {
    pub id: Uuid,
    pub subject: String,
    pub content: String,
    pub sender: String,
    pub sender_avatar: Option<String>,
    pub status: String,
    pub priority: String,
    #[serde(rename = "type")]
    pub message_type: String,
    pub recipient_id: Option<Uuid>,
    pub recipient_name: Option<String>,
    pub recipient_email: Option<String>,
    pub recipient_image: Option<String>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

/// MessageFilter
///
/// Listing filters for GET /admin/messages. `None` means "all".
#[derive(Debug, Clone, Default)]
pub struct MessageFilter {
    /// Matched case-insensitively against subject, content and sender.
    pub search: Option<String>,
    pub status: Option<MessageStatus>,
    pub priority: Option<MessagePriority>,
    pub message_type: Option<MessageType>,
}

/// MessageStats
///
/// Inbox counters. Soft-deleted messages are never counted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct MessageStats {
    pub total: i64,
    pub unread: i64,
    pub high_priority: i64,
    pub system: i64,
}

/// MessageInbox
///
/// Output of GET /admin/messages.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct MessageInbox {
    pub messages: Vec<Message>,
    pub pagination: Pagination,
    pub stats: MessageStats,
}

/// MessageAction
///
/// What a single or bulk update does to the selected messages. `Delete` is a
/// soft delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum MessageAction {
    Read,
    Unread,
    Archive,
    Delete,
}

/// NewMessage
///
/// Insert payload assembled by the handler from the request and the sending admin.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub subject: String,
    pub content: String,
    pub sender: String,
    pub sender_avatar: Option<String>,
    pub recipient_id: Option<Uuid>,
    pub priority: MessagePriority,
    pub message_type: MessageType,
}

/// CreateMessageRequest
///
/// Input for POST /admin/messages.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateMessageRequest {
    pub subject: String,
    pub content: String,
    #[serde(default)]
    pub recipient_id: Option<Uuid>,
    #[serde(default)]
    pub priority: MessagePriority,
    #[serde(default, rename = "type")]
    pub message_type: MessageType,
}

/// BulkMessageRequest
///
/// Input for POST /admin/messages/bulk.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct BulkMessageRequest {
    pub ids: Vec<Uuid>,
    pub action: MessageAction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct BulkUpdateResponse {
    pub updated: u64,
}

// --- User Management ---

/// CreateUserRequest
///
/// Input for POST /admin/users. The role defaults to `"user"`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CreateUserRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub role: Option<Role>,
}

/// NewUser
///
/// Insert payload for an admin-created account. The account starts with an
/// unverified email like any other sign-up.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
}
