#![allow(dead_code)]

use std::{collections::HashMap, sync::Arc, sync::Mutex};

use account_portal::{
    AppState, MockStorageService,
    auth::{Role, Session, SessionUser},
    config::AppConfig,
    models::{
        AdminDashboardStats, Message, MessageAction, MessageFilter, MessageStats, NewMessage,
        NewUser, User, UserSummary,
    },
    repository::{Repository, RepositoryError, RepositoryState},
    storage::StorageState,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

// --- In-memory repository ---

/// Keeps users in a map so admin actions can be observed afterwards.
#[derive(Default)]
pub struct InMemoryRepo {
    pub users: Mutex<HashMap<Uuid, User>>,
    pub passwords: Mutex<HashMap<Uuid, String>>,
    /// Messages with their soft-delete flag.
    pub messages: Mutex<Vec<(Message, bool)>>,
    /// When set, every call fails like a lost database connection.
    pub fail: bool,
}

impl InMemoryRepo {
    pub fn with_users(users: Vec<User>) -> Self {
        Self {
            users: Mutex::new(users.into_iter().map(|u| (u.id, u)).collect()),
            ..Default::default()
        }
    }

    pub fn with_messages(self, messages: Vec<Message>) -> Self {
        *self.messages.lock().unwrap() = messages.into_iter().map(|m| (m, false)).collect();
        self
    }

    /// The stored message, including soft-deleted ones, with its delete flag.
    pub fn stored_message(&self, id: Uuid) -> Option<(Message, bool)> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .find(|(m, _)| m.id == id)
            .cloned()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn user(&self, id: Uuid) -> Option<User> {
        self.users.lock().unwrap().get(&id).cloned()
    }

    fn check(&self) -> Result<(), RepositoryError> {
        if self.fail {
            return Err(RepositoryError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }

    fn update<F: FnOnce(&mut User)>(&self, id: Uuid, f: F) -> Option<User> {
        let mut users = self.users.lock().unwrap();
        let user = users.get_mut(&id)?;
        f(user);
        Some(user.clone())
    }
}

#[async_trait]
impl Repository for InMemoryRepo {
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, RepositoryError> {
        self.check()?;
        Ok(self.user(id))
    }

    async fn list_users(
        &self,
        search: Option<String>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<User>, i64), RepositoryError> {
        self.check()?;
        let term = search.map(|s| s.to_lowercase());
        let mut matches: Vec<User> = self
            .users
            .lock()
            .unwrap()
            .values()
            .filter(|u| {
                term.as_ref().is_none_or(|t| {
                    u.name.to_lowercase().contains(t) || u.email.to_lowercase().contains(t)
                })
            })
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matches.len() as i64;
        let page = matches
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
        Ok((page, total))
    }

    async fn get_stats(&self) -> Result<AdminDashboardStats, RepositoryError> {
        self.check()?;
        let users = self.users.lock().unwrap();
        let mut latest: Vec<User> = users.values().cloned().collect();
        latest.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        latest.truncate(5);

        Ok(AdminDashboardStats {
            total_users: users.len() as i64,
            verified_users: users.values().filter(|u| u.email_verified).count() as i64,
            banned_users: users.values().filter(|u| u.banned).count() as i64,
            recent_users: users
                .values()
                .filter(|u| u.created_at >= Utc::now() - Duration::days(7))
                .count() as i64,
            latest_users: latest.into_iter().map(UserSummary::from).collect(),
        })
    }

    async fn set_role(&self, id: Uuid, role: &Role) -> Result<Option<User>, RepositoryError> {
        self.check()?;
        Ok(self.update(id, |u| u.role = Some(role.to_stored())))
    }

    async fn ban_user(
        &self,
        id: Uuid,
        reason: &str,
        expires: Option<DateTime<Utc>>,
    ) -> Result<Option<User>, RepositoryError> {
        self.check()?;
        Ok(self.update(id, |u| {
            u.banned = true;
            u.ban_reason = Some(reason.to_string());
            u.ban_expires = expires;
        }))
    }

    async fn unban_user(&self, id: Uuid) -> Result<Option<User>, RepositoryError> {
        self.check()?;
        Ok(self.update(id, |u| {
            u.banned = false;
            u.ban_reason = None;
            u.ban_expires = None;
        }))
    }

    async fn create_user(&self, user: &NewUser) -> Result<User, RepositoryError> {
        self.check()?;
        let mut users = self.users.lock().unwrap();
        if users.values().any(|u| u.email == user.email) {
            return Err(RepositoryError::Conflict("email"));
        }

        let created = User {
            id: Uuid::new_v4(),
            name: user.name.clone(),
            email: user.email.clone(),
            role: Some(user.role.to_stored()),
            created_at: Utc::now(),
            ..Default::default()
        };
        users.insert(created.id, created.clone());
        self.passwords
            .lock()
            .unwrap()
            .insert(created.id, user.password_hash.clone());
        Ok(created)
    }

    async fn delete_user(&self, id: Uuid) -> Result<bool, RepositoryError> {
        self.check()?;
        Ok(self.users.lock().unwrap().remove(&id).is_some())
    }

    async fn list_messages(
        &self,
        filter: &MessageFilter,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Message>, i64), RepositoryError> {
        self.check()?;
        let term = filter.search.as_ref().map(|s| s.to_lowercase());
        let mut matches: Vec<Message> = self
            .messages
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, deleted)| !deleted)
            .map(|(m, _)| m)
            .filter(|m| {
                term.as_ref().is_none_or(|t| {
                    m.subject.to_lowercase().contains(t)
                        || m.content.to_lowercase().contains(t)
                        || m.sender.to_lowercase().contains(t)
                })
            })
            .filter(|m| filter.status.is_none_or(|s| m.status == s.as_str()))
            .filter(|m| filter.priority.is_none_or(|p| m.priority == p.as_str()))
            .filter(|m| filter.message_type.is_none_or(|t| m.message_type == t.as_str()))
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matches.len() as i64;
        let page = matches
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
        Ok((page, total))
    }

    async fn get_message_stats(&self) -> Result<MessageStats, RepositoryError> {
        self.check()?;
        let messages = self.messages.lock().unwrap();
        let live: Vec<&Message> = messages.iter().filter(|(_, d)| !d).map(|(m, _)| m).collect();
        Ok(MessageStats {
            total: live.len() as i64,
            unread: live.iter().filter(|m| m.status == "unread").count() as i64,
            high_priority: live.iter().filter(|m| m.priority == "high").count() as i64,
            system: live.iter().filter(|m| m.message_type == "system").count() as i64,
        })
    }

    async fn get_message(&self, id: Uuid) -> Result<Option<Message>, RepositoryError> {
        self.check()?;
        Ok(self
            .stored_message(id)
            .filter(|(_, deleted)| !deleted)
            .map(|(m, _)| m))
    }

    async fn create_message(&self, message: &NewMessage) -> Result<Message, RepositoryError> {
        self.check()?;
        let recipient = message.recipient_id.and_then(|id| self.user(id));
        let created = Message {
            id: Uuid::new_v4(),
            subject: message.subject.clone(),
            content: message.content.clone(),
            sender: message.sender.clone(),
            sender_avatar: message.sender_avatar.clone(),
            status: "unread".to_string(),
            priority: message.priority.as_str().to_string(),
            message_type: message.message_type.as_str().to_string(),
            recipient_id: message.recipient_id,
            recipient_name: recipient.as_ref().map(|u| u.name.clone()),
            recipient_email: recipient.as_ref().map(|u| u.email.clone()),
            recipient_image: recipient.and_then(|u| u.image),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        self.messages.lock().unwrap().push((created.clone(), false));
        Ok(created)
    }

    async fn update_messages(
        &self,
        ids: &[Uuid],
        action: MessageAction,
    ) -> Result<u64, RepositoryError> {
        self.check()?;
        let mut updated = 0;
        for (message, deleted) in self.messages.lock().unwrap().iter_mut() {
            if *deleted || !ids.contains(&message.id) {
                continue;
            }
            match action {
                MessageAction::Read => message.status = "read".to_string(),
                MessageAction::Unread => message.status = "unread".to_string(),
                MessageAction::Archive => message.status = "archived".to_string(),
                MessageAction::Delete => *deleted = true,
            }
            message.updated_at = Utc::now();
            updated += 1;
        }
        Ok(updated)
    }
}

// --- Fixtures ---

pub fn user(role: Option<&str>, verified: bool) -> User {
    let id = Uuid::new_v4();
    User {
        id,
        name: format!("user-{}", &id.to_string()[..8]),
        email: format!("{}@example.com", &id.to_string()[..8]),
        email_verified: verified,
        role: role.map(str::to_string),
        created_at: Utc::now(),
        ..Default::default()
    }
}

pub fn banned(mut user: User, expires: Option<DateTime<Utc>>) -> User {
    user.banned = true;
    user.ban_reason = Some("Spamming".to_string());
    user.ban_expires = expires;
    user
}

pub fn session_for(user: User) -> Session {
    Session {
        user: SessionUser::from_record(user, Utc::now()),
        expires_at: Utc::now() + Duration::hours(1),
    }
}

pub fn state_with(repo: Arc<InMemoryRepo>, storage: MockStorageService) -> AppState {
    AppState::new(
        repo as RepositoryState,
        Arc::new(storage) as StorageState,
        AppConfig::default(),
    )
}

pub fn message(subject: &str, status: &str, priority: &str, message_type: &str) -> Message {
    Message {
        id: Uuid::new_v4(),
        subject: subject.to_string(),
        content: format!("{subject} body"),
        sender: "Admin".to_string(),
        status: status.to_string(),
        priority: priority.to_string(),
        message_type: message_type.to_string(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
        ..Default::default()
    }
}
