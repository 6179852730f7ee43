//! Session token storage.

use std::{
    fmt, fs, io,
    path::PathBuf,
    sync::{PoisonError, RwLock},
};

/// SessionToken
///
/// Opaque credential. Only its presence matters on the client; the API
/// validates it.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    /// Blank strings are not tokens.
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Keeps tokens out of logs.
impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionToken(***)")
    }
}

/// Where the session credential is persisted between runs.
pub trait TokenStore: Send + Sync {
    fn load(&self) -> Option<SessionToken>;
    fn store(&self, token: SessionToken) -> io::Result<()>;
    fn clear(&self) -> io::Result<()>;
}

/// MemoryTokenStore
#[derive(Default)]
pub struct MemoryTokenStore {
    token: RwLock<Option<SessionToken>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: SessionToken) -> Self {
        Self {
            token: RwLock::new(Some(token)),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Option<SessionToken> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn store(&self, token: SessionToken) -> io::Result<()> {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = Some(token);
        Ok(())
    }

    fn clear(&self) -> io::Result<()> {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

/// FileTokenStore
///
/// Keeps the token in a single file. A missing or blank file means "no token".
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Option<SessionToken> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => SessionToken::new(contents),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "token file unreadable");
                None
            }
        }
    }

    fn store(&self, token: SessionToken) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, token.as_str())
    }

    fn clear(&self) -> io::Result<()> {
        match fs::remove_file(&self.path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

/// SessionContext
///
/// Snapshot of the session handed to guards. Built once per navigation from a
/// `TokenStore`, or directly in tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionContext {
    token: Option<SessionToken>,
}

impl SessionContext {
    pub fn anonymous() -> Self {
        Self { token: None }
    }

    pub fn with_token(token: SessionToken) -> Self {
        Self { token: Some(token) }
    }

    pub fn from_store(store: &dyn TokenStore) -> Self {
        Self {
            token: store.load(),
        }
    }

    pub fn token(&self) -> Option<&SessionToken> {
        self.token.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }
}
