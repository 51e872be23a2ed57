//! dashauth - client-side session management for the operations dashboard.
//!
//! Holds the bearer credential, refreshes it before it expires without ever
//! issuing two renewals at once, and routes outbound calls through a pipeline
//! that never sends a stale or missing credential.

pub mod api;
pub mod auth;
pub mod config;
pub mod manager;

#[cfg(test)]
pub(crate) mod test_support;

pub use api::{ApiError, ApiResponse, DashboardApi, RequestPipeline, RequestSpec};
pub use auth::{
    Credential, ExpiryMonitor, FileStore, KeyringStore, MemoryStore, Navigator, NoopNavigator,
    PersistenceAdapter, Principal, RefreshCoordinator, RefreshOutcome, Role, Session,
    SessionState,
};
pub use config::{Config, SessionConfig, StorageBackend};
pub use manager::{SessionManager, SessionManagerBuilder};
