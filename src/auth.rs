use std::{convert::Infallible, sync::Arc, time::Duration};

use argon2::{Argon2, PasswordHasher, password_hash::SaltString};
use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, OptionalFromRequestParts},
    http::{HeaderMap, StatusCode, header, request::Parts},
};
use chrono::{DateTime, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    config::{AppConfig, Env},
    guard::is_admin,
    models::User,
    repository::{RepositoryError, RepositoryState},
};

/// Name of the cookie carrying the signed session token.
pub const SESSION_COOKIE: &str = "session_token";

// --- Session Model ---

/// Role
///
/// A user's authorization label. Stored records and upstream sessions carry
/// either a single role or a list of roles, so both shapes are kept as-is
/// rather than normalised. Serialized untagged: `"admin"` or `["user","admin"]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[serde(untagged)]
#[ts(export)]
pub enum Role {
    Single(String),
    Many(Vec<String>),
}

impl Role {
    pub fn contains(&self, name: &str) -> bool {
        match self {
            Role::Single(role) => role == name,
            Role::Many(roles) => roles.iter().any(|role| role == name),
        }
    }

    /// Parses the persisted column form, where several roles are joined by commas.
    pub fn from_stored(raw: &str) -> Self {
        if raw.contains(',') {
            Role::Many(
                raw.split(',')
                    .map(str::trim)
                    .filter(|role| !role.is_empty())
                    .map(str::to_string)
                    .collect(),
            )
        } else {
            Role::Single(raw.trim().to_string())
        }
    }

    pub fn to_stored(&self) -> String {
        match self {
            Role::Single(role) => role.clone(),
            Role::Many(roles) => roles.join(","),
        }
    }
}

/// SessionUser
///
/// The slice of the user record the access guard and the handlers need.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub email_verified: bool,
    pub role: Option<Role>,
    pub banned: bool,
    pub ban_reason: Option<String>,
    pub ban_expires: Option<DateTime<Utc>>,
    pub image: Option<String>,
}

impl SessionUser {
    /// Builds the session view of a stored user. A temporary ban whose expiry
    /// is at or before `now` is reported as lifted.
    pub fn from_record(user: User, now: DateTime<Utc>) -> Self {
        let ban_active = user.banned && user.ban_expires.is_none_or(|expires| expires > now);

        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            email_verified: user.email_verified,
            role: user.role.as_deref().map(Role::from_stored),
            banned: ban_active,
            ban_reason: if ban_active { user.ban_reason } else { None },
            ban_expires: if ban_active { user.ban_expires } else { None },
            image: user.image,
        }
    }

    pub fn is_admin(&self) -> bool {
        is_admin(self.role.as_ref())
    }
}

/// Session
///
/// Proof of authentication for one request. Present only when the caller
/// holds a valid credential.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub user: SessionUser,
    pub expires_at: DateTime<Utc>,
}

/// Claims
///
/// Payload of the signed session token.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user id.
    pub sub: Uuid,
    pub exp: usize,
    pub iat: usize,
}

// --- Session Provider ---

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid session token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),
    #[error("session refers to unknown user {0}")]
    UnknownUser(Uuid),
    #[error("session lookup failed: {0}")]
    Repository(#[from] RepositoryError),
}

/// SessionProvider
///
/// The "get current session" collaborator. `Ok(None)` means the caller is
/// unauthenticated; `Err` means the lookup itself failed.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn get_session(&self, headers: &HeaderMap) -> Result<Option<Session>, SessionError>;
}

pub type SessionState = Arc<dyn SessionProvider>;

/// JwtSessionProvider
///
/// Resolves sessions from an HS256 token found in the `session_token` cookie
/// or an `Authorization: Bearer` header, then loads the user record so that
/// role, verification and ban state are always current.
///
/// In `Env::Local` an `x-user-id` header naming an existing user is accepted
/// without a token.
pub struct JwtSessionProvider {
    repo: RepositoryState,
    secret: String,
    env: Env,
}

impl JwtSessionProvider {
    pub fn new(repo: RepositoryState, config: &AppConfig) -> Self {
        Self {
            repo,
            secret: config.session_secret.clone(),
            env: config.env.clone(),
        }
    }

    async fn local_bypass(&self, headers: &HeaderMap) -> Result<Option<Session>, SessionError> {
        let Some(user_id) = headers
            .get("x-user-id")
            .and_then(|value| value.to_str().ok())
            .and_then(|raw| Uuid::parse_str(raw).ok())
        else {
            return Ok(None);
        };

        let now = Utc::now();
        Ok(self.repo.get_user(user_id).await?.map(|user| Session {
            user: SessionUser::from_record(user, now),
            expires_at: now + chrono::Duration::days(1),
        }))
    }
}

#[async_trait]
impl SessionProvider for JwtSessionProvider {
    async fn get_session(&self, headers: &HeaderMap) -> Result<Option<Session>, SessionError> {
        if self.env == Env::Local {
            if let Some(session) = self.local_bypass(headers).await? {
                return Ok(Some(session));
            }
        }

        let Some(token) = session_token(headers) else {
            return Ok(None);
        };

        let decoding_key = DecodingKey::from_secret(self.secret.as_bytes());
        let mut validation = Validation::default();
        validation.validate_exp = true;

        let claims = match decode::<Claims>(token.as_str(), &decoding_key, &validation) {
            Ok(data) => data.claims,
            // An expired token is simply no credential.
            Err(e) if matches!(e.kind(), ErrorKind::ExpiredSignature) => {
                tracing::debug!("session token expired");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let user = self
            .repo
            .get_user(claims.sub)
            .await?
            .ok_or(SessionError::UnknownUser(claims.sub))?;

        let now = Utc::now();
        let expires_at = i64::try_from(claims.exp)
            .ok()
            .and_then(|exp| DateTime::from_timestamp(exp, 0))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        Ok(Some(Session {
            user: SessionUser::from_record(user, now),
            expires_at,
        }))
    }
}

/// Reads the session token, preferring the cookie over a bearer header.
fn session_token(headers: &HeaderMap) -> Option<String> {
    let from_cookie = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string());

    from_cookie.or_else(|| {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::to_string)
    })
}

/// resolve_session
///
/// Fail-safe wrapper around the provider: a failed lookup is logged and the
/// caller is treated as unauthenticated, never as signed in.
pub async fn resolve_session(provider: &dyn SessionProvider, headers: &HeaderMap) -> Option<Session> {
    match provider.get_session(headers).await {
        Ok(session) => session,
        Err(e) => {
            tracing::warn!(error = %e, "session lookup failed, continuing unauthenticated");
            None
        }
    }
}

/// Signs a session token for `user_id` valid for `ttl`. Oversized TTLs
/// saturate at the largest representable expiry.
pub fn issue_session_token(
    user_id: Uuid,
    secret: &str,
    ttl: Duration,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now().timestamp().max(0) as usize;
    let ttl_secs = usize::try_from(ttl.as_secs()).unwrap_or(usize::MAX);
    let claims = Claims {
        sub: user_id,
        iat: now,
        exp: now.saturating_add(ttl_secs),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

/// hash_password
///
/// Argon2id PHC string for a password set by an admin. The salt comes from
/// a v4 UUID's random bytes.
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::encode_b64(Uuid::new_v4().as_bytes())?;
    Ok(Argon2::default()
        .hash_password(password.as_bytes(), &salt)?
        .to_string())
}

// --- Request Extractors ---

/// RequestSession
///
/// The session resolved once by the guard middleware, stored in the request
/// extensions for handlers.
#[derive(Debug, Clone)]
pub struct RequestSession(pub Option<Session>);

/// CurrentUser
///
/// The session of a signed-in caller. Rejects with 401 when the request
/// carries no session; use `Option<CurrentUser>` on pages open to everyone.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Session);

fn request_session(parts: &Parts) -> Option<Session> {
    parts
        .extensions
        .get::<RequestSession>()
        .and_then(|RequestSession(session)| session.clone())
}

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        request_session(parts)
            .map(CurrentUser)
            .ok_or(StatusCode::UNAUTHORIZED)
    }
}

impl<S> OptionalFromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(request_session(parts).map(CurrentUser))
    }
}

/// AdminUser
///
/// A signed-in user holding the 'admin' role. Admin mutations require this
/// extractor so they stay closed even if the route table is reconfigured.
#[derive(Debug, Clone)]
pub struct AdminUser(pub SessionUser);

impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let session = request_session(parts).ok_or(StatusCode::UNAUTHORIZED)?;
        if !session.user.is_admin() {
            return Err(StatusCode::FORBIDDEN);
        }
        Ok(AdminUser(session.user))
    }
}
