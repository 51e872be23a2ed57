//! Constructor-time wiring of the session components.
//!
//! A [`SessionManager`] owns one [`SessionState`] and hands the same handle to
//! the refresh coordinator, the expiry monitor and the request pipeline, so
//! nothing reaches for global state.

use std::sync::Arc;

use anyhow::{Context, Result};
use reqwest::Client;
use tokio::sync::watch;
use tracing::info;

use crate::api::auth::AuthApi;
use crate::api::{ApiError, DashboardApi, RequestPipeline};
use crate::auth::monitor::TimerSlot;
use crate::auth::teardown::Teardown;
use crate::auth::{
    ExpiryMonitor, MemoryStore, Navigator, NoopNavigator, PersistenceAdapter, Principal,
    RefreshCoordinator, Session, SessionState,
};
use crate::config::SessionConfig;

pub struct SessionManagerBuilder {
    config: SessionConfig,
    store: Option<Arc<dyn PersistenceAdapter>>,
    navigator: Option<Arc<dyn Navigator>>,
    client: Option<Client>,
}

impl SessionManagerBuilder {
    fn new() -> Self {
        Self {
            config: SessionConfig::default(),
            store: None,
            navigator: None,
            client: None,
        }
    }

    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.config.base_url = base_url.into();
        self
    }

    /// Where the session is persisted. Defaults to memory only.
    pub fn store(mut self, store: Arc<dyn PersistenceAdapter>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = Some(navigator);
        self
    }

    /// Share an existing connection pool. The configured request timeout is
    /// not applied to a client supplied here.
    pub fn client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    pub fn build(self) -> Result<SessionManager> {
        let client = match self.client {
            Some(client) => client,
            None => Client::builder()
                .timeout(self.config.request_timeout)
                .build()
                .context("Failed to build HTTP client")?,
        };
        let base_url = self.config.normalized_base_url();
        let lead = self.config.lead_time();

        let store = self.store.unwrap_or_else(|| Arc::new(MemoryStore::new()));
        let navigator = self.navigator.unwrap_or_else(|| Arc::new(NoopNavigator));

        let session = SessionState::new(store);
        let timer = TimerSlot::default();
        let teardown = Teardown::new(session.clone(), timer.clone(), navigator);
        let auth = AuthApi::new(client.clone(), base_url.clone());
        let coordinator = RefreshCoordinator::new(auth.clone(), session.clone(), teardown.clone());
        let monitor = ExpiryMonitor::new(
            session.clone(),
            coordinator.clone(),
            self.config.monitor_interval,
            lead,
            timer,
        );
        let pipeline = RequestPipeline::new(
            client,
            base_url,
            session.clone(),
            coordinator.clone(),
            teardown,
            lead,
        );
        let dashboard = DashboardApi::new(pipeline.clone());

        Ok(SessionManager {
            config: self.config,
            session,
            auth,
            coordinator,
            monitor,
            pipeline,
            dashboard,
        })
    }
}

pub struct SessionManager {
    config: SessionConfig,
    session: SessionState,
    auth: AuthApi,
    coordinator: RefreshCoordinator,
    monitor: ExpiryMonitor,
    pipeline: RequestPipeline,
    dashboard: DashboardApi,
}

impl SessionManager {
    pub fn builder() -> SessionManagerBuilder {
        SessionManagerBuilder::new()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Restore a persisted session and start monitoring it.
    pub fn restore(&self) -> bool {
        let restored = self.session.restore();
        if restored {
            self.monitor.start();
        }
        restored
    }

    /// Log in and start the expiry monitor.
    pub async fn login(&self, username: &str, password: &str) -> Result<Principal, ApiError> {
        let grant = self.auth.login(username, password).await?;
        let principal = grant
            .principal
            .unwrap_or_else(|| Principal::new(username, Default::default()));

        self.session.set_session(grant.credential, principal.clone());
        self.monitor.start();
        info!(username = %principal.username, role = ?principal.role, "Logged in");
        Ok(principal)
    }

    /// End the session locally. The expiry monitor stops on its own.
    pub fn logout(&self) {
        self.session.clear();
        self.monitor.stop();
        info!("Logged out");
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn current(&self) -> Option<Session> {
        self.session.current()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Session>> {
        self.session.subscribe()
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_authenticated()
    }

    pub fn principal(&self) -> Option<Principal> {
        self.session.principal()
    }

    pub fn is_admin(&self) -> bool {
        self.principal().is_some_and(|p| p.is_admin())
    }

    pub fn is_operator(&self) -> bool {
        self.principal().is_some_and(|p| p.is_operator())
    }

    pub fn is_executive(&self) -> bool {
        self.principal().is_some_and(|p| p.is_executive())
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    pub fn monitor(&self) -> &ExpiryMonitor {
        &self.monitor
    }

    pub fn pipeline(&self) -> &RequestPipeline {
        &self.pipeline
    }

    pub fn dashboard(&self) -> &DashboardApi {
        &self.dashboard
    }
}
