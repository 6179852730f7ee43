//! Session gating for the dashboard.
//!
//! The guards decide, for one route subtree, whether to render it, show a
//! loading indicator, or redirect. They never read ambient state: every check
//! takes an explicit [`SessionContext`].
//!
//! - [`PrivateGuard`]: token required, else `/auth/signin`.
//! - [`PublicGuard`]: no token allowed, else `/dashboard`.
//! - [`AdminGuard`]: token plus a fetched profile whose role is `Admin`, else
//!   `/dashboard/home`. Fetches at most once per mount and can be cancelled.

use std::{io, time::Duration};

use thiserror::Error;

pub mod admin;
pub mod fetcher;
pub mod route;
pub mod session;

pub use admin::{AdminGuard, AdminState, MountHandle};
pub use fetcher::{
    FetchError, FetchState, HttpProfileFetcher, ProfileCache, ProfileFetcher, SessionProfile,
};
pub use route::{PrivateGuard, PublicGuard};
pub use session::{FileTokenStore, MemoryTokenStore, SessionContext, SessionToken, TokenStore};

pub const SIGN_IN_PATH: &str = "/auth/signin";
pub const DASHBOARD_PATH: &str = "/dashboard";
pub const DASHBOARD_HOME_PATH: &str = "/dashboard/home";

/// Ends the session on this frontend: forgets the cached profile and removes
/// the stored token.
pub fn sign_out(store: &dyn TokenStore, cache: &ProfileCache) -> io::Result<()> {
    cache.clear();
    store.clear()
}

/// What the router should do with the guarded subtree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Render,
    Loading,
    Redirect(&'static str),
    /// The guard was unmounted before it settled; nothing is applied.
    Detached,
}

/// Why a guard denied access. Every variant ends in a silent redirect.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GuardError {
    #[error("no session token")]
    NoToken,
    #[error("profile fetch failed: {0}")]
    ProfileFetch(String),
    #[error("role does not grant access")]
    RoleMismatch,
    #[error("profile endpoint returned no usable profile")]
    ProfileMissing,
}

/// GuardConfig
///
/// Settings for the client side of the session flow.
#[derive(Debug, Clone)]
pub struct GuardConfig {
    /// Base URL of the API serving `GET /me`.
    pub api_base_url: String,
    /// Upper bound on a single profile fetch. Expiry counts as a fetch error.
    pub fetch_timeout: Duration,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:3000".to_string(),
            fetch_timeout: Duration::from_secs(10),
        }
    }
}

impl GuardConfig {
    /// Reads `SPORTIVEX_API_URL` and `SPORTIVEX_FETCH_TIMEOUT_SECS`, falling back
    /// to the defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_base_url: std::env::var("SPORTIVEX_API_URL").unwrap_or(defaults.api_base_url),
            fetch_timeout: std::env::var("SPORTIVEX_FETCH_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.fetch_timeout),
        }
    }
}
