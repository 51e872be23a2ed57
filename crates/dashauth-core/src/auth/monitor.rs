//! Periodic proactive refresh.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;

use super::refresh::RefreshCoordinator;
use super::session::SessionState;

/// Fires a background refresh whenever the credential gets within the lead
/// time of its expiry.
///
/// The timer task watches [`SessionState`] and stops itself the moment the
/// session becomes absent. Forced teardown also stops it directly through a
/// shared [`TimerSlot`].
#[derive(Clone)]
pub struct ExpiryMonitor {
    inner: Arc<MonitorInner>,
}

struct MonitorInner {
    session: SessionState,
    coordinator: RefreshCoordinator,
    interval: Duration,
    lead: chrono::Duration,
    timer: TimerSlot,
}

struct RunningTimer {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl RunningTimer {
    fn is_live(&self) -> bool {
        !self.cancel.is_cancelled() && !self.handle.is_finished()
    }
}

/// Handle to the running timer, if any. Clones share the same timer.
#[derive(Clone, Default)]
pub(crate) struct TimerSlot(Arc<Mutex<Option<RunningTimer>>>);

impl TimerSlot {
    fn lock(&self) -> MutexGuard<'_, Option<RunningTimer>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cancel the timer. Idempotent.
    pub(crate) fn stop(&self) {
        if let Some(running) = self.lock().take() {
            running.cancel.cancel();
            debug!("Expiry monitor stopped");
        }
    }

    fn is_live(&self) -> bool {
        self.lock().as_ref().is_some_and(RunningTimer::is_live)
    }
}

impl ExpiryMonitor {
    /// A zero `interval` falls back to the default period.
    pub(crate) fn new(
        session: SessionState,
        coordinator: RefreshCoordinator,
        interval: Duration,
        lead: chrono::Duration,
        timer: TimerSlot,
    ) -> Self {
        let interval = if interval.is_zero() {
            let fallback = SessionConfig::default().monitor_interval;
            warn!(
                fallback_secs = fallback.as_secs(),
                "Monitor interval of zero, using default"
            );
            fallback
        } else {
            interval
        };
        Self {
            inner: Arc::new(MonitorInner {
                session,
                coordinator,
                interval,
                lead,
                timer,
            }),
        }
    }

    /// Start the repeating timer. Does nothing if it is already running or
    /// if there is no session to watch. Must be called inside a tokio runtime.
    pub fn start(&self) {
        let mut timer = self.inner.timer.lock();
        if timer.as_ref().is_some_and(RunningTimer::is_live) {
            debug!("Expiry monitor already running");
            return;
        }
        if !self.inner.session.is_authenticated() {
            debug!("No session, not starting expiry monitor");
            return;
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_timer(
            self.inner.session.clone(),
            self.inner.coordinator.clone(),
            self.inner.interval,
            self.inner.lead,
            cancel.clone(),
        ));
        info!(interval_secs = self.inner.interval.as_secs(), "Expiry monitor started");
        *timer = Some(RunningTimer { cancel, handle });
    }

    /// Cancel the timer. Idempotent.
    pub fn stop(&self) {
        self.inner.timer.stop();
    }

    pub fn is_running(&self) -> bool {
        self.inner.timer.is_live()
    }

    pub fn interval(&self) -> Duration {
        self.inner.interval
    }
}

impl Drop for MonitorInner {
    fn drop(&mut self) {
        self.timer.stop();
    }
}

async fn run_timer(
    session: SessionState,
    coordinator: RefreshCoordinator,
    period: Duration,
    lead: chrono::Duration,
    cancel: CancellationToken,
) {
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut changes = session.subscribe();
    if changes.borrow_and_update().is_none() {
        debug!("Session ended before expiry monitor started");
        return;
    }

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            changed = changes.changed() => {
                if changed.is_err() || changes.borrow_and_update().is_none() {
                    debug!("Session ended, expiry monitor exiting");
                    break;
                }
            }
            _ = ticker.tick() => {
                check_expiry(&session, &coordinator, lead);
            }
        }
    }
}

/// One tick: spawn a refresh if the current credential is near expiry.
/// Returns whether a refresh was triggered.
pub(crate) fn check_expiry(
    session: &SessionState,
    coordinator: &RefreshCoordinator,
    lead: chrono::Duration,
) -> bool {
    let Some(credential) = session.credential() else {
        return false;
    };
    if !credential.is_near_expiry(Utc::now(), lead) {
        return false;
    }

    debug!(
        seconds_left = credential.seconds_until_expiry(Utc::now()),
        "Credential near expiry, refreshing in background"
    );
    let coordinator = coordinator.clone();
    tokio::spawn(async move {
        coordinator.refresh().await;
    });
    true
}
