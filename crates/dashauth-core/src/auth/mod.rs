//! Authentication session management.
//!
//! This module provides:
//! - `Credential` and the claim decoding helpers in `token`
//! - `SessionState`: the single source of truth for the logged-in session
//! - `PersistenceAdapter` with keyring, file and in-memory backends
//! - `RefreshCoordinator`: single-flight credential renewal
//! - `ExpiryMonitor`: periodic proactive refresh
//!
//! Credentials are refreshed ten minutes before they expire by default.

pub mod credentials;
pub mod monitor;
pub mod principal;
pub mod refresh;
pub mod session;
pub(crate) mod teardown;
pub mod token;

pub use credentials::{
    FileStore, KeyringStore, MemoryStore, PersistenceAdapter, CREDENTIAL_KEY, PRINCIPAL_KEY,
};
pub use monitor::ExpiryMonitor;
pub use principal::{Principal, Role};
pub use refresh::{RefreshCoordinator, RefreshOutcome};
pub use session::{Session, SessionState};
pub use teardown::{Navigator, NoopNavigator};
pub use token::{Credential, DecodeError};
