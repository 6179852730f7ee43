//! Profile fetching for the admin guard.

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use super::{GuardConfig, session::SessionToken};
use crate::models::Role;

/// SessionProfile
///
/// Client-side view of `GET /me`. The role is parsed on arrival; an unknown
/// or absent role is `None` and never grants anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionProfile {
    pub id: Uuid,
    pub role: Option<Role>,
    pub email: Option<String>,
    pub full_name: Option<String>,
}

impl SessionProfile {
    pub fn is_admin(&self) -> bool {
        self.role.is_some_and(|r| r.is_admin())
    }
}

/// Lenient wire shape. Every field may be missing or null.
#[derive(Debug, Default, Deserialize)]
struct ProfilePayload {
    #[serde(default)]
    id: Option<Uuid>,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    full_name: Option<String>,
}

impl ProfilePayload {
    /// A payload without an id is not a profile.
    fn into_profile(self) -> Option<SessionProfile> {
        let id = self.id?;
        let role = Role::from_raw(self.role.as_deref());
        if role.is_none() {
            tracing::debug!(user_id = %id, raw_role = ?self.role, "profile role not recognised");
        }
        Some(SessionProfile {
            id,
            role,
            email: self.email,
            full_name: self.full_name,
        })
    }
}

/// Parses a `GET /me` body. `null`, `{}` and id-less objects yield `Ok(None)`.
pub fn parse_profile(body: &[u8]) -> Result<Option<SessionProfile>, FetchError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    let payload: Option<ProfilePayload> =
        serde_json::from_slice(body).map_err(|e| FetchError::Decode(e.to_string()))?;
    Ok(payload.and_then(ProfilePayload::into_profile))
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),
    #[error("profile endpoint returned status {0}")]
    Status(u16),
    #[error("malformed profile body: {0}")]
    Decode(String),
    #[error("profile fetch timed out")]
    Timeout,
}

/// FetchState
///
/// Observable state of one profile fetch.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FetchState {
    #[default]
    Pending,
    Error(String),
    /// `None` when the endpoint answered without a usable profile.
    Success(Option<SessionProfile>),
}

impl FetchState {
    pub fn from_result(result: &Result<Option<SessionProfile>, FetchError>) -> Self {
        match result {
            Ok(profile) => FetchState::Success(profile.clone()),
            Err(e) => FetchState::Error(e.to_string()),
        }
    }
}

/// Retrieves the profile of the session's user.
#[async_trait]
pub trait ProfileFetcher: Send + Sync {
    async fn fetch_profile(
        &self,
        token: &SessionToken,
    ) -> Result<Option<SessionProfile>, FetchError>;
}

/// HttpProfileFetcher
///
/// `GET {api_base_url}/me` with the token as a bearer credential.
#[derive(Clone)]
pub struct HttpProfileFetcher {
    client: reqwest::Client,
    profile_url: String,
}

impl HttpProfileFetcher {
    pub fn new(config: &GuardConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    pub fn with_client(client: reqwest::Client, config: &GuardConfig) -> Self {
        Self {
            client,
            profile_url: format!("{}/me", config.api_base_url.trim_end_matches('/')),
        }
    }

    pub fn profile_url(&self) -> &str {
        &self.profile_url
    }
}

#[async_trait]
impl ProfileFetcher for HttpProfileFetcher {
    async fn fetch_profile(
        &self,
        token: &SessionToken,
    ) -> Result<Option<SessionProfile>, FetchError> {
        let response = self
            .client
            .get(&self.profile_url)
            .bearer_auth(token.as_str())
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NO_CONTENT || status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;
        parse_profile(&body)
    }
}

/// ProfileCache
///
/// In-memory profile shared by the guards of one running frontend. The entry
/// is bound to the token that fetched it: a lookup with any other token is a
/// miss, so a new sign-in never sees the previous user's profile. Nothing is
/// persisted.
#[derive(Clone, Default)]
pub struct ProfileCache {
    inner: Arc<RwLock<Option<CachedProfile>>>,
}

#[derive(Clone)]
struct CachedProfile {
    token: SessionToken,
    profile: SessionProfile,
}

impl ProfileCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profile(token: SessionToken, profile: SessionProfile) -> Self {
        let cache = Self::new();
        cache.set(token, profile);
        cache
    }

    /// The cached profile, if it was fetched with `token`.
    pub fn get(&self, token: &SessionToken) -> Option<SessionProfile> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .filter(|cached| &cached.token == token)
            .map(|cached| cached.profile.clone())
    }

    pub fn set(&self, token: SessionToken, profile: SessionProfile) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) =
            Some(CachedProfile { token, profile });
    }

    pub fn clear(&self) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn is_empty(&self) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}
