use std::sync::Arc;

use tracing::{debug, warn};

use super::monitor::TimerSlot;
use super::session::SessionState;
use super::token::Credential;

/// Sends the user back to the unauthenticated entry point.
pub trait Navigator: Send + Sync {
    fn redirect_to_login(&self);
}

/// For headless use, where there is nowhere to redirect to.
pub struct NoopNavigator;

impl Navigator for NoopNavigator {
    fn redirect_to_login(&self) {}
}

/// The forced-teardown path: clear the session, stop the expiry monitor and
/// redirect.
#[derive(Clone)]
pub(crate) struct Teardown {
    session: SessionState,
    monitor: TimerSlot,
    navigator: Arc<dyn Navigator>,
}

impl Teardown {
    pub(crate) fn new(
        session: SessionState,
        monitor: TimerSlot,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self {
            session,
            monitor,
            navigator,
        }
    }

    pub(crate) fn force(&self, reason: &str) {
        warn!(reason, "Forcing session teardown");
        self.session.clear();
        self.finish();
    }

    /// Tear down only if `credential` is still the session's credential.
    /// A session that has since been replaced is left alone.
    pub(crate) fn force_if_current(&self, credential: &Credential, reason: &str) -> bool {
        if !self.session.clear_if_current(credential) {
            debug!(reason, "Session changed since the failure, skipping teardown");
            return false;
        }
        warn!(reason, "Forcing session teardown");
        self.finish();
        true
    }

    fn finish(&self) {
        self.monitor.stop();
        self.navigator.redirect_to_login();
    }
}
