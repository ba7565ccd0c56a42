use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{PgPool, QueryBuilder};
use thiserror::Error;
use uuid::Uuid;

use crate::{
    auth::Role,
    models::{
        AdminDashboardStats, Message, MessageAction, MessageFilter, MessageStats, NewMessage,
        NewUser, User, UserSummary,
    },
};

const USER_COLUMNS: &str =
    "id, name, email, email_verified, role, banned, ban_reason, ban_expires, image, created_at";

const MESSAGE_SELECT: &str = "SELECT m.id, m.subject, m.content, m.sender, m.sender_avatar, \
     m.status, m.priority, m.message_type, m.recipient_id, u.name AS recipient_name, \
     u.email AS recipient_email, u.image AS recipient_image, m.created_at, m.updated_at \
     FROM messages m LEFT JOIN users u ON u.id = m.recipient_id";

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A unique constraint rejected the write.
    #[error("{0} already exists")]
    Conflict(&'static str),
}

/// Repository Trait
///
/// Persistence contract for the user records the portal reads and the admin
/// actions it performs. Handlers and the session provider only see this
/// trait, so tests swap in in-memory implementations.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, RepositoryError>;

    /// Case-insensitive search over name and email, newest first. Returns the
    /// requested page and the total number of matches.
    async fn list_users(
        &self,
        search: Option<String>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<User>, i64), RepositoryError>;

    async fn get_stats(&self) -> Result<AdminDashboardStats, RepositoryError>;

    // --- Admin Actions ---
    // Each returns `None` when the user does not exist.
    async fn set_role(&self, id: Uuid, role: &Role) -> Result<Option<User>, RepositoryError>;
    async fn ban_user(
        &self,
        id: Uuid,
        reason: &str,
        expires: Option<DateTime<Utc>>,
    ) -> Result<Option<User>, RepositoryError>;
    async fn unban_user(&self, id: Uuid) -> Result<Option<User>, RepositoryError>;

    /// Fails with `Conflict("email")` when the address is taken.
    async fn create_user(&self, user: &NewUser) -> Result<User, RepositoryError>;

    /// Returns `false` when there was no such user.
    async fn delete_user(&self, id: Uuid) -> Result<bool, RepositoryError>;

    // --- Admin Messages ---
    // Soft-deleted messages are excluded from every read.
    async fn list_messages(
        &self,
        filter: &MessageFilter,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Message>, i64), RepositoryError>;
    async fn get_message_stats(&self) -> Result<MessageStats, RepositoryError>;
    async fn get_message(&self, id: Uuid) -> Result<Option<Message>, RepositoryError>;
    async fn create_message(&self, message: &NewMessage) -> Result<Message, RepositoryError>;

    /// Applies `action` to every listed message and returns how many rows changed.
    async fn update_messages(
        &self,
        ids: &[Uuid],
        action: MessageAction,
    ) -> Result<u64, RepositoryError>;
}

/// RepositoryState
pub type RepositoryState = Arc<dyn Repository>;

/// PostgresRepository
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Wraps a user-supplied term in `%..%` with the ILIKE wildcards escaped, so
/// `50%` matches literally. Pair with `ESCAPE '\'`.
pub fn like_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn search_term(search: Option<&str>) -> Option<String> {
    search
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .map(like_pattern)
}

/// Appends the optional search condition shared by the listing and its count.
fn push_search(builder: &mut QueryBuilder<'_, sqlx::Postgres>, search: Option<&str>) {
    if let Some(pattern) = search_term(search) {
        builder.push(" WHERE (name ILIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" ESCAPE '\\' OR email ILIKE ");
        builder.push_bind(pattern);
        builder.push(" ESCAPE '\\')");
    }
}

/// Appends the message listing filters; the soft-delete condition is always present.
fn push_message_filters(builder: &mut QueryBuilder<'_, sqlx::Postgres>, filter: &MessageFilter) {
    builder.push(" WHERE m.is_deleted = false");

    if let Some(pattern) = search_term(filter.search.as_deref()) {
        builder.push(" AND (m.subject ILIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" ESCAPE '\\' OR m.content ILIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" ESCAPE '\\' OR m.sender ILIKE ");
        builder.push_bind(pattern);
        builder.push(" ESCAPE '\\')");
    }
    if let Some(status) = filter.status {
        builder.push(" AND m.status = ");
        builder.push_bind(status.as_str());
    }
    if let Some(priority) = filter.priority {
        builder.push(" AND m.priority = ");
        builder.push_bind(priority.as_str());
    }
    if let Some(message_type) = filter.message_type {
        builder.push(" AND m.message_type = ");
        builder.push_bind(message_type.as_str());
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, RepositoryError> {
        let user =
            sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(user)
    }

    /// list_users
    ///
    /// Built with `QueryBuilder` so the search term is always a bound
    /// parameter.
    async fn list_users(
        &self,
        search: Option<String>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<User>, i64), RepositoryError> {
        let mut builder = QueryBuilder::new(format!("SELECT {USER_COLUMNS} FROM users"));
        push_search(&mut builder, search.as_deref());
        builder.push(" ORDER BY created_at DESC LIMIT ");
        builder.push_bind(limit);
        builder.push(" OFFSET ");
        builder.push_bind(offset);
        let users = builder
            .build_query_as::<User>()
            .fetch_all(&self.pool)
            .await?;

        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM users");
        push_search(&mut count, search.as_deref());
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        Ok((users, total))
    }

    /// get_stats
    ///
    /// All dashboard counters come from one aggregate query; the latest users
    /// are a second query.
    async fn get_stats(&self) -> Result<AdminDashboardStats, RepositoryError> {
        let since = Utc::now() - Duration::days(7);
        let (total_users, verified_users, banned_users, recent_users): (i64, i64, i64, i64) =
            sqlx::query_as(
                r#"
                SELECT
                    COUNT(*),
                    COUNT(*) FILTER (WHERE email_verified),
                    COUNT(*) FILTER (WHERE banned),
                    COUNT(*) FILTER (WHERE created_at >= $1)
                FROM users
                "#,
            )
            .bind(since)
            .fetch_one(&self.pool)
            .await?;

        let latest = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC LIMIT 5"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(AdminDashboardStats {
            total_users,
            verified_users,
            banned_users,
            recent_users,
            latest_users: latest.into_iter().map(UserSummary::from).collect(),
        })
    }

    async fn set_role(&self, id: Uuid, role: &Role) -> Result<Option<User>, RepositoryError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET role = $2, updated_at = NOW() WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(role.to_stored())
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn ban_user(
        &self,
        id: Uuid,
        reason: &str,
        expires: Option<DateTime<Utc>>,
    ) -> Result<Option<User>, RepositoryError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET banned = true, ban_reason = $2, ban_expires = $3, updated_at = NOW() \
             WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(reason)
        .bind(expires)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn unban_user(&self, id: Uuid) -> Result<Option<User>, RepositoryError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET banned = false, ban_reason = NULL, ban_expires = NULL, updated_at = NOW() \
             WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn create_user(&self, user: &NewUser) -> Result<User, RepositoryError> {
        sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (id, name, email, email_verified, role, password_hash) \
             VALUES ($1, $2, $3, false, $4, $5) RETURNING {USER_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&user.name)
        .bind(&user.email)
        .bind(user.role.to_stored())
        .bind(&user.password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                RepositoryError::Conflict("email")
            } else {
                e.into()
            }
        })
    }

    async fn delete_user(&self, id: Uuid) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_messages(
        &self,
        filter: &MessageFilter,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Message>, i64), RepositoryError> {
        let mut builder = QueryBuilder::new(MESSAGE_SELECT);
        push_message_filters(&mut builder, filter);
        builder.push(" ORDER BY m.created_at DESC LIMIT ");
        builder.push_bind(limit);
        builder.push(" OFFSET ");
        builder.push_bind(offset);
        let messages = builder
            .build_query_as::<Message>()
            .fetch_all(&self.pool)
            .await?;

        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM messages m");
        push_message_filters(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        Ok((messages, total))
    }

    async fn get_message_stats(&self) -> Result<MessageStats, RepositoryError> {
        let (total, unread, high_priority, system): (i64, i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COUNT(*) FILTER (WHERE status = 'unread'),
                COUNT(*) FILTER (WHERE priority = 'high'),
                COUNT(*) FILTER (WHERE message_type = 'system')
            FROM messages
            WHERE is_deleted = false
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(MessageStats {
            total,
            unread,
            high_priority,
            system,
        })
    }

    async fn get_message(&self, id: Uuid) -> Result<Option<Message>, RepositoryError> {
        let message = sqlx::query_as::<_, Message>(&format!(
            "{MESSAGE_SELECT} WHERE m.id = $1 AND m.is_deleted = false"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(message)
    }

    async fn create_message(&self, message: &NewMessage) -> Result<Message, RepositoryError> {
        let id: Uuid = sqlx::query_scalar(
            "INSERT INTO messages \
             (id, subject, content, sender, sender_avatar, recipient_id, status, priority, message_type, is_deleted) \
             VALUES ($1, $2, $3, $4, $5, $6, 'unread', $7, $8, false) RETURNING id",
        )
        .bind(Uuid::new_v4())
        .bind(&message.subject)
        .bind(&message.content)
        .bind(&message.sender)
        .bind(&message.sender_avatar)
        .bind(message.recipient_id)
        .bind(message.priority.as_str())
        .bind(message.message_type.as_str())
        .fetch_one(&self.pool)
        .await?;

        let created = sqlx::query_as::<_, Message>(&format!("{MESSAGE_SELECT} WHERE m.id = $1"))
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(created)
    }

    async fn update_messages(
        &self,
        ids: &[Uuid],
        action: MessageAction,
    ) -> Result<u64, RepositoryError> {
        let mut builder = QueryBuilder::new("UPDATE messages SET updated_at = NOW(), ");
        match action {
            MessageAction::Read => builder.push("status = 'read'"),
            MessageAction::Unread => builder.push("status = 'unread'"),
            MessageAction::Archive => builder.push("status = 'archived'"),
            MessageAction::Delete => builder.push("is_deleted = true"),
        };
        builder.push(" WHERE is_deleted = false AND id = ANY(");
        builder.push_bind(ids.to_vec());
        builder.push(")");

        let result = builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}
