//! Role-gated guard for the admin panel.

use std::{sync::Arc, time::Duration};

use tokio::sync::watch;

use super::{
    DASHBOARD_HOME_PATH, GuardConfig, GuardError, Outcome,
    fetcher::{FetchError, FetchState, ProfileCache, ProfileFetcher, SessionProfile},
    session::SessionContext,
};

/// Lifecycle of one admin guard mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminState {
    Init,
    Fetching,
    Granted,
    Denied(GuardError),
    /// Unmounted while fetching. The fetch result was discarded.
    Cancelled,
}

impl AdminState {
    pub fn outcome(&self) -> Outcome {
        match self {
            AdminState::Init | AdminState::Fetching => Outcome::Loading,
            AdminState::Granted => Outcome::Render,
            AdminState::Denied(_) => Outcome::Redirect(DASHBOARD_HOME_PATH),
            AdminState::Cancelled => Outcome::Detached,
        }
    }

    pub fn is_settled(&self) -> bool {
        !matches!(self, AdminState::Init | AdminState::Fetching)
    }
}

/// MountHandle
///
/// Owned by whoever mounted the guard. Dropping it, or calling `unmount`,
/// cancels a fetch in flight.
pub struct MountHandle {
    cancel: watch::Sender<bool>,
}

impl MountHandle {
    pub fn unmount(self) {
        // Drop does the signalling.
    }
}

impl Drop for MountHandle {
    fn drop(&mut self) {
        self.cancel.send_replace(true);
    }
}

/// AdminGuard
///
/// `Init → Fetching → {Granted, Denied}`. A profile cached for the same session
/// token skips `Fetching`.
/// A fetch is attempted at most once per mount; its failure is terminal.
pub struct AdminGuard {
    fetcher: Arc<dyn ProfileFetcher>,
    cache: ProfileCache,
    session: SessionContext,
    fetch_timeout: Duration,
    has_fetched: bool,
    // `None` until this mount issues its fetch.
    fetch: Option<FetchState>,
    state: watch::Sender<AdminState>,
    cancel: watch::Receiver<bool>,
}

impl AdminGuard {
    pub fn mount(
        fetcher: Arc<dyn ProfileFetcher>,
        cache: ProfileCache,
        session: SessionContext,
        config: &GuardConfig,
    ) -> (Self, MountHandle) {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (state, _) = watch::channel(AdminState::Init);
        let guard = Self {
            fetcher,
            cache,
            session,
            fetch_timeout: config.fetch_timeout,
            has_fetched: false,
            fetch: None,
            state,
            cancel: cancel_rx,
        };
        (guard, MountHandle { cancel: cancel_tx })
    }

    pub fn state(&self) -> AdminState {
        self.state.borrow().clone()
    }

    /// Follows state transitions, e.g. to render the loading indicator while
    /// `resolve` is suspended.
    pub fn subscribe(&self) -> watch::Receiver<AdminState> {
        self.state.subscribe()
    }

    pub fn has_fetched(&self) -> bool {
        self.has_fetched
    }

    /// State of this mount's profile fetch, if one was issued.
    pub fn fetch_state(&self) -> Option<&FetchState> {
        self.fetch.as_ref()
    }

    /// Drops the cached profile and re-arms the guard for one more fetch.
    pub fn clear_cached_profile(&mut self) {
        self.cache.clear();
        self.has_fetched = false;
        self.fetch = None;
        self.transition(AdminState::Init);
    }

    /// Drives the guard to a settled state and returns what to render.
    /// Calling it again after settling returns the same outcome without any I/O.
    pub async fn resolve(&mut self) -> Outcome {
        let current = self.state();
        if current.is_settled() {
            return current.outcome();
        }
        if self.is_cancelled() {
            return self.settle(AdminState::Cancelled);
        }

        let Some(token) = self.session.token().cloned() else {
            return self.deny(GuardError::NoToken);
        };

        if let Some(profile) = self.cache.get(&token) {
            return self.evaluate(&profile);
        }

        self.has_fetched = true;
        self.fetch = Some(FetchState::Pending);
        self.transition(AdminState::Fetching);

        let fetcher = Arc::clone(&self.fetcher);
        let fetch_token = token.clone();
        let fetch = tokio::time::timeout(self.fetch_timeout, async move {
            fetcher.fetch_profile(&fetch_token).await
        });
        let mut cancel = self.cancel.clone();

        let result = tokio::select! {
            biased;
            () = wait_cancelled(&mut cancel) => None,
            result = fetch => Some(result.unwrap_or(Err(FetchError::Timeout))),
        };

        // The mount may have gone away between completion and this point.
        let Some(result) = result.filter(|_| !self.is_cancelled()) else {
            tracing::debug!("admin guard unmounted during profile fetch");
            return self.settle(AdminState::Cancelled);
        };

        self.fetch = Some(FetchState::from_result(&result));
        match result {
            Ok(Some(profile)) => {
                self.cache.set(token, profile.clone());
                self.evaluate(&profile)
            }
            Ok(None) => self.deny(GuardError::ProfileMissing),
            Err(e) => {
                tracing::error!(error = %e, "admin guard profile fetch failed");
                self.deny(GuardError::ProfileFetch(e.to_string()))
            }
        }
    }

    fn evaluate(&mut self, profile: &SessionProfile) -> Outcome {
        if profile.is_admin() {
            self.settle(AdminState::Granted)
        } else {
            self.deny(GuardError::RoleMismatch)
        }
    }

    fn deny(&mut self, reason: GuardError) -> Outcome {
        tracing::debug!(%reason, "admin guard denied access");
        self.settle(AdminState::Denied(reason))
    }

    fn settle(&mut self, state: AdminState) -> Outcome {
        let outcome = state.outcome();
        self.transition(state);
        outcome
    }

    fn transition(&mut self, next: AdminState) {
        self.state.send_replace(next);
    }

    fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }
}

/// Resolves once the mount handle signals or is dropped.
async fn wait_cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            return;
        }
    }
}
