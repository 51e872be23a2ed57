//! Single-flight credential renewal.
//!
//! The first `refresh()` call opens a ticket and spawns one renewal request;
//! every caller that arrives while the ticket is open awaits the same shared
//! outcome. The ticket slot is freed only after the session has been updated
//! (or torn down) and the outcome delivered, so anyone who sees a successful
//! outcome also sees the new credential in [`SessionState`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, info, warn};

use crate::api::auth::AuthApi;
use crate::api::error::RenewalError;

use super::principal::Principal;
use super::session::SessionState;
use super::teardown::Teardown;
use super::token::Credential;

/// Result of one renewal, shared by every waiter on the ticket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshOutcome {
    success: bool,
    credential: Option<Credential>,
    principal: Option<Principal>,
}

impl RefreshOutcome {
    fn failed() -> Self {
        Self {
            success: false,
            credential: None,
            principal: None,
        }
    }

    fn renewed(credential: Credential, principal: Principal) -> Self {
        Self {
            success: true,
            credential: Some(credential),
            principal: Some(principal),
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    pub fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }
}

type PendingOutcome = Shared<BoxFuture<'static, RefreshOutcome>>;

/// An open ticket: the one renewal currently in flight.
struct RefreshTicket {
    id: u64,
    outcome: PendingOutcome,
}

#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<CoordinatorInner>,
}

struct CoordinatorInner {
    api: AuthApi,
    session: SessionState,
    teardown: Teardown,
    /// `None` is idle, `Some` is in flight.
    slot: Mutex<Option<RefreshTicket>>,
    next_ticket: AtomicU64,
}

impl RefreshCoordinator {
    pub(crate) fn new(api: AuthApi, session: SessionState, teardown: Teardown) -> Self {
        Self {
            inner: Arc::new(CoordinatorInner {
                api,
                session,
                teardown,
                slot: Mutex::new(None),
                next_ticket: AtomicU64::new(1),
            }),
        }
    }

    /// Renew the current credential, joining an in-flight renewal if one is
    /// already open.
    ///
    /// The renewal itself runs in a spawned task, so dropping this future does
    /// not cancel it.
    pub async fn refresh(&self) -> RefreshOutcome {
        let pending = {
            let mut slot = self.inner.slot.lock().await;
            match slot.as_ref() {
                Some(ticket) => {
                    debug!(ticket = ticket.id, "Joining in-flight refresh");
                    ticket.outcome.clone()
                }
                None => {
                    let id = self.inner.next_ticket.fetch_add(1, Ordering::Relaxed);
                    let (tx, rx) = oneshot::channel();
                    let outcome = rx
                        .map(|result| result.unwrap_or_else(|_| RefreshOutcome::failed()))
                        .boxed()
                        .shared();
                    *slot = Some(RefreshTicket {
                        id,
                        outcome: outcome.clone(),
                    });
                    debug!(ticket = id, "Opened refresh ticket");

                    let inner = Arc::clone(&self.inner);
                    tokio::spawn(async move { inner.run_ticket(id, tx).await });
                    outcome
                }
            }
        };
        pending.await
    }

    /// Whether a renewal is currently in flight.
    pub async fn is_refreshing(&self) -> bool {
        self.inner.slot.lock().await.is_some()
    }
}

impl CoordinatorInner {
    async fn run_ticket(&self, id: u64, tx: oneshot::Sender<RefreshOutcome>) {
        let outcome = self.renew().await;
        let _ = tx.send(outcome);

        let mut slot = self.slot.lock().await;
        if slot.as_ref().is_some_and(|ticket| ticket.id == id) {
            *slot = None;
            debug!(ticket = id, "Closed refresh ticket");
        }
    }

    /// One renewal round trip, including the session update it implies.
    async fn renew(&self) -> RefreshOutcome {
        let Some(current) = self.session.current() else {
            debug!("No session to refresh");
            return RefreshOutcome::failed();
        };

        match self.api.renew(&current.credential).await {
            Ok(grant) => {
                let credential = grant.credential.clone();
                // Logout, teardown or a new login happened while we waited.
                let renewed = self.session.renew_if_current(
                    &current.credential,
                    grant.credential,
                    grant.principal,
                );
                let Some(principal) = renewed else {
                    info!("Session changed during refresh, discarding renewed credential");
                    return RefreshOutcome::failed();
                };
                info!(username = %principal.username, "Credential refreshed");
                RefreshOutcome::renewed(credential, principal)
            }
            Err(RenewalError::Rejected(reason)) => {
                warn!(%reason, "Renewal endpoint rejected the credential");
                self.teardown.force_if_current(
                    &current.credential,
                    "credential rejected by renewal endpoint",
                );
                RefreshOutcome::failed()
            }
            Err(e) => {
                warn!(error = %e, "Credential refresh failed, keeping current session");
                RefreshOutcome::failed()
            }
        }
    }
}
