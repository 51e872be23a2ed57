//! Shared fixtures for unit tests.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use wiremock::MockServer;

use crate::auth::{Credential, MemoryStore, Navigator, Principal, Role};
use crate::config::SessionConfig;
use crate::manager::SessionManager;

static NEXT_TOKEN_ID: AtomicU64 = AtomicU64::new(1);

/// A well-formed credential expiring `offset_secs` after `now`.
///
/// Each call produces a distinct token, even for the same expiry.
pub(crate) fn mint_credential_at(now: DateTime<Utc>, offset_secs: i64) -> Credential {
    let jti = NEXT_TOKEN_ID.fetch_add(1, Ordering::Relaxed);
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let claims = json!({
        "sub": "ana",
        "role": "admin",
        "exp": now.timestamp() + offset_secs,
        "jti": jti,
    });
    let claims = URL_SAFE_NO_PAD.encode(claims.to_string().as_bytes());
    Credential::new(format!("{}.{}.c2lnbmF0dXJl", header, claims))
}

pub(crate) fn mint_credential(offset_secs: i64) -> Credential {
    mint_credential_at(Utc::now(), offset_secs)
}

pub(crate) fn bearer(credential: &Credential) -> String {
    format!("Bearer {}", credential.as_str())
}

/// A successful renewal response in the backend's shape.
pub(crate) fn renewal_body(credential: &Credential, username: &str, role: &str) -> Value {
    json!({
        "success": true,
        "message": "Token refreshed",
        "token": credential.as_str(),
        "user": {"username": username, "role": role},
    })
}

#[derive(Default)]
pub(crate) struct RecordingNavigator {
    redirects: AtomicUsize,
}

impl RecordingNavigator {
    pub(crate) fn redirects(&self) -> usize {
        self.redirects.load(Ordering::SeqCst)
    }
}

impl Navigator for RecordingNavigator {
    fn redirect_to_login(&self) {
        self.redirects.fetch_add(1, Ordering::SeqCst);
    }
}

/// A manager wired to in-memory storage and a recording navigator.
pub(crate) struct Harness {
    pub(crate) manager: SessionManager,
    pub(crate) store: Arc<MemoryStore>,
    pub(crate) navigator: Arc<RecordingNavigator>,
}

impl Harness {
    pub(crate) fn with_config(config: SessionConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let navigator = Arc::new(RecordingNavigator::default());
        let manager = SessionManager::builder()
            .config(config)
            .store(store.clone())
            .navigator(navigator.clone())
            .build()
            .expect("manager builds");
        Self {
            manager,
            store,
            navigator,
        }
    }

    pub(crate) fn logged_out(server: &MockServer) -> Self {
        Self::at(&server.uri())
    }

    pub(crate) fn logged_in(server: &MockServer, credential: Credential) -> Self {
        Self::logged_in_at(&server.uri(), credential)
    }

    pub(crate) fn logged_in_at(base_url: &str, credential: Credential) -> Self {
        let harness = Self::at(base_url);
        harness.log_in(credential);
        harness
    }

    /// Install a session for `ana` (admin) without going through login.
    pub(crate) fn log_in(&self, credential: Credential) {
        self.manager
            .session()
            .set_session(credential, Principal::new("ana", Role::Admin));
    }

    fn at(base_url: &str) -> Self {
        Self::with_config(SessionConfig {
            base_url: base_url.to_string(),
            ..SessionConfig::default()
        })
    }
}
