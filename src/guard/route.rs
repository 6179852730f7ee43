//! Token-only guards. Synchronous and side-effect free.

use super::{DASHBOARD_PATH, GuardError, Outcome, SIGN_IN_PATH, session::SessionContext};

/// PrivateGuard
///
/// Lets the subtree render only for sessions holding a token.
pub struct PrivateGuard;

impl PrivateGuard {
    pub fn check(session: &SessionContext) -> Result<(), GuardError> {
        if session.is_authenticated() {
            Ok(())
        } else {
            Err(GuardError::NoToken)
        }
    }

    pub fn evaluate(session: &SessionContext) -> Outcome {
        match Self::check(session) {
            Ok(()) => Outcome::Render,
            Err(_) => Outcome::Redirect(SIGN_IN_PATH),
        }
    }
}

/// PublicGuard
///
/// Sign-in and sign-up pages: signed-in sessions are sent to the dashboard.
pub struct PublicGuard;

impl PublicGuard {
    pub fn evaluate(session: &SessionContext) -> Outcome {
        if session.is_authenticated() {
            Outcome::Redirect(DASHBOARD_PATH)
        } else {
            Outcome::Render
        }
    }
}
