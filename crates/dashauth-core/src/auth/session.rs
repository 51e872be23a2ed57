use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::credentials::{PersistenceAdapter, CREDENTIAL_KEY, PRINCIPAL_KEY};
use super::principal::Principal;
use super::token::Credential;

/// A logged-in session: the credential and who it belongs to.
///
/// Both halves always travel together, so "credential without principal"
/// cannot be represented.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub credential: Credential,
    pub principal: Principal,
}

/// Shared handle to the current session.
///
/// Clones share state. Reads are public; the mutating methods are crate-only
/// so that login, logout, the refresh coordinator and forced teardown are the
/// only writers.
#[derive(Clone)]
pub struct SessionState {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    store: Arc<dyn PersistenceAdapter>,
    tx: watch::Sender<Option<Session>>,
}

impl SessionState {
    pub fn new(store: Arc<dyn PersistenceAdapter>) -> Self {
        let (tx, _) = watch::channel(None);
        Self {
            inner: Arc::new(SessionInner { store, tx }),
        }
    }

    pub fn current(&self) -> Option<Session> {
        self.inner.tx.borrow().clone()
    }

    pub fn credential(&self) -> Option<Credential> {
        self.inner.tx.borrow().as_ref().map(|s| s.credential.clone())
    }

    pub fn principal(&self) -> Option<Principal> {
        self.inner.tx.borrow().as_ref().map(|s| s.principal.clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.tx.borrow().is_some()
    }

    /// Receive every session change. The receiver starts with the current
    /// value marked as seen.
    pub fn subscribe(&self) -> watch::Receiver<Option<Session>> {
        self.inner.tx.subscribe()
    }

    /// Replace the session, persist it, and notify subscribers.
    pub(crate) fn set_session(&self, credential: Credential, principal: Principal) {
        self.persist(&credential, &principal);
        debug!(username = %principal.username, "Session updated");
        self.inner.tx.send_replace(Some(Session {
            credential,
            principal,
        }));
    }

    /// Drop the session, remove it from storage, and notify subscribers.
    pub(crate) fn clear(&self) {
        self.remove_persisted();
        let previous = self.inner.tx.send_replace(None);
        if previous.is_some() {
            debug!("Session cleared");
        }
    }

    /// Install a renewed credential, but only while `expected` is still the
    /// current one. A missing `principal` keeps the current principal.
    ///
    /// Returns the principal now in the session, or `None` if the session
    /// changed and nothing was written.
    pub(crate) fn renew_if_current(
        &self,
        expected: &Credential,
        credential: Credential,
        principal: Option<Principal>,
    ) -> Option<Principal> {
        let mut applied = None;
        self.inner.tx.send_if_modified(|slot| match slot {
            Some(session) if session.credential == *expected => {
                let principal = principal.unwrap_or_else(|| session.principal.clone());
                self.persist(&credential, &principal);
                *session = Session {
                    credential,
                    principal: principal.clone(),
                };
                applied = Some(principal);
                true
            }
            _ => false,
        });
        applied
    }

    /// Clear the session only while `expected` is still the current
    /// credential. Returns whether it was cleared.
    pub(crate) fn clear_if_current(&self, expected: &Credential) -> bool {
        self.inner.tx.send_if_modified(|slot| {
            if slot.as_ref().map(|s| &s.credential) != Some(expected) {
                return false;
            }
            self.remove_persisted();
            *slot = None;
            true
        })
    }

    fn remove_persisted(&self) {
        for key in [CREDENTIAL_KEY, PRINCIPAL_KEY] {
            if let Err(e) = self.inner.store.remove(key) {
                warn!(key, error = %e, "Failed to remove persisted session value");
            }
        }
    }

    /// Load a persisted session at startup.
    ///
    /// A stored credential that is already expired, or one without a readable
    /// principal, is cleared rather than restored. Returns whether a session
    /// is now active.
    pub fn restore(&self) -> bool {
        let credential = match self.inner.store.get(CREDENTIAL_KEY) {
            Ok(Some(token)) => Credential::new(token),
            Ok(None) => {
                debug!("No persisted session");
                return false;
            }
            Err(e) => {
                warn!(error = %e, "Failed to read persisted credential");
                self.clear();
                return false;
            }
        };

        if credential.is_expired(Utc::now()) {
            info!("Persisted credential has expired, discarding session");
            self.clear();
            return false;
        }

        let principal = match self.inner.store.get(PRINCIPAL_KEY) {
            Ok(Some(raw)) => match serde_json::from_str::<Principal>(&raw) {
                Ok(principal) => principal,
                Err(e) => {
                    warn!(error = %e, "Persisted principal is unreadable, discarding session");
                    self.clear();
                    return false;
                }
            },
            Ok(None) => {
                warn!("Persisted credential has no principal, discarding session");
                self.clear();
                return false;
            }
            Err(e) => {
                warn!(error = %e, "Failed to read persisted principal");
                self.clear();
                return false;
            }
        };

        info!(username = %principal.username, "Restored persisted session");
        self.inner.tx.send_replace(Some(Session {
            credential,
            principal,
        }));
        true
    }

    fn persist(&self, credential: &Credential, principal: &Principal) {
        if let Err(e) = self.inner.store.set(CREDENTIAL_KEY, credential.as_str()) {
            warn!(error = %e, "Failed to persist credential");
        }
        match serde_json::to_string(principal) {
            Ok(raw) => {
                if let Err(e) = self.inner.store.set(PRINCIPAL_KEY, &raw) {
                    warn!(error = %e, "Failed to persist principal");
                }
            }
            Err(e) => warn!(error = %e, "Failed to serialize principal"),
        }
    }
}

impl fmt::Debug for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionState")
            .field("current", &*self.inner.tx.borrow())
            .finish()
    }
}
