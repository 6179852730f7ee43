use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use jsonwebtoken::{DecodingKey, Validation, decode, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    config::{AppConfig, Env},
    error::ApiError,
    models::Role,
    repository::RepositoryState,
};

/// Header accepted in `Env::Local` in place of a bearer token.
pub const DEV_USER_HEADER: &str = "x-user-id";

/// Claims
///
/// Payload of a Supabase-issued JWT.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// The user's id, primary key of `profiles`.
    pub sub: Uuid,
    pub exp: usize,
    pub iat: usize,
}

/// AuthUser
///
/// Resolved identity of an authenticated request. The role comes from the
/// database on every request, never from the token, so a demotion takes
/// effect immediately.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthUser {
    pub id: Uuid,
    pub role: Role,
}

impl AuthUser {
    /// Fails with 403 unless the user is an admin.
    pub fn require_admin(&self) -> Result<(), ApiError> {
        if self.role.is_admin() {
            Ok(())
        } else {
            Err(ApiError::Forbidden("admin role required".to_string()))
        }
    }
}

/// AuthUser extractor
///
/// Resolution order:
/// 1. An `AuthUser` already placed in the request extensions by the auth middleware.
/// 2. In `Env::Local`, the `x-user-id` header naming an existing profile.
/// 3. A `Bearer` JWT validated against the configured secret, then a profile lookup.
///
/// Rejects with 401 on any failure.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthUser>() {
            return Ok(user.clone());
        }

        let repo = RepositoryState::from_ref(state);
        let config = AppConfig::from_ref(state);

        if config.env == Env::Local {
            if let Some(user_id) = parts
                .headers
                .get(DEV_USER_HEADER)
                .and_then(|value| value.to_str().ok())
                .and_then(|id| Uuid::parse_str(id).ok())
            {
                if let Some(user) = repo.get_user(user_id).await? {
                    tracing::debug!(user_id = %user.id, "authenticated via local bypass header");
                    return Ok(AuthUser {
                        id: user.id,
                        role: user.role,
                    });
                }
            }
        }

        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or(ApiError::Unauthorized)?;

        let user_id = decode_token(token, &config.jwt_secret)?;

        // A valid token for a deleted profile is still rejected.
        let user = repo.get_user(user_id).await?.ok_or(ApiError::Unauthorized)?;

        Ok(AuthUser {
            id: user.id,
            role: user.role,
        })
    }
}

/// Validates signature and expiry, returning the subject.
pub fn decode_token(token: &str, secret: &str) -> Result<Uuid, ApiError> {
    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    let mut validation = Validation::default();
    validation.validate_exp = true;
    // Supabase sets `aud: "authenticated"`; only signature and expiry matter here.
    validation.validate_aud = false;

    match decode::<Claims>(token, &decoding_key, &validation) {
        Ok(data) => Ok(data.claims.sub),
        Err(e) => {
            match e.kind() {
                ErrorKind::ExpiredSignature => tracing::debug!("rejected expired token"),
                other => tracing::debug!(kind = ?other, "rejected invalid token"),
            }
            Err(ApiError::Unauthorized)
        }
    }
}
