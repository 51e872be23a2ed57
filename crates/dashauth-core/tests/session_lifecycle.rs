//! End-to-end session scenarios through the public API.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use dashauth_core::auth::{CREDENTIAL_KEY, PRINCIPAL_KEY};
use dashauth_core::{
    ApiError, MemoryStore, Navigator, PersistenceAdapter, RequestSpec, Role, SessionConfig,
    SessionManager,
};
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

static NEXT_ID: AtomicUsize = AtomicUsize::new(1);

fn token_expiring_in(secs: i64) -> String {
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    let claims = json!({"sub": "rina", "exp": Utc::now().timestamp() + secs, "jti": id});
    format!(
        "{}.{}.sig",
        URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256"}"#),
        URL_SAFE_NO_PAD.encode(claims.to_string())
    )
}

#[derive(Default)]
struct CountingNavigator(AtomicUsize);

impl Navigator for CountingNavigator {
    fn redirect_to_login(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

fn manager(
    server: &MockServer,
    store: Arc<MemoryStore>,
    navigator: Arc<CountingNavigator>,
) -> SessionManager {
    SessionManager::builder()
        .config(SessionConfig {
            base_url: server.uri(),
            monitor_interval: Duration::from_millis(50),
            ..SessionConfig::default()
        })
        .store(store)
        .navigator(navigator)
        .build()
        .expect("manager builds")
}

#[tokio::test]
async fn test_monitor_refreshes_before_expiry_and_new_credential_is_used() {
    let server = MockServer::start().await;
    // 500s left with a 600s lead time: the first tick must refresh.
    let initial = token_expiring_in(500);
    let renewed = token_expiring_in(3600);

    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "token": initial,
            "user": {"username": "rina", "role": "operator"}
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .and(header("authorization", format!("Bearer {}", initial).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "token": renewed,
            "user": {"username": "rina", "role": "operator"}
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/dashboard/stockpiles"))
        .and(header("authorization", format!("Bearer {}", renewed).as_str()))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"success": true, "data": []})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/dashboard/stockpiles"))
        .and(header("authorization", format!("Bearer {}", initial).as_str()))
        .respond_with(ResponseTemplate::new(401))
        .expect(0)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let navigator = Arc::new(CountingNavigator::default());
    let manager = manager(&server, store.clone(), navigator.clone());

    let principal = manager.login("rina", "secret").await.expect("login");
    assert_eq!(principal.role, Role::Operator);
    assert!(manager.monitor().is_running());

    tokio::time::sleep(Duration::from_millis(300)).await;
    let session = manager.current().expect("still logged in");
    assert_eq!(session.credential.as_str(), renewed);
    assert_eq!(
        store.get(CREDENTIAL_KEY).ok().flatten().as_deref(),
        Some(renewed.as_str())
    );

    let data = manager.dashboard().stockpiles().await.expect("fetched");
    assert_eq!(data["success"], true);
    assert_eq!(navigator.0.load(Ordering::SeqCst), 0);
    server.verify().await;
}

#[tokio::test]
async fn test_restore_discards_expired_session() {
    let server = MockServer::start().await;
    let store = Arc::new(MemoryStore::new());
    store.set(CREDENTIAL_KEY, &token_expiring_in(-120)).expect("seed");
    store
        .set(PRINCIPAL_KEY, r#"{"username":"rina","role":"operator"}"#)
        .expect("seed");

    let manager = manager(&server, store.clone(), Arc::new(CountingNavigator::default()));
    assert!(!manager.restore());
    assert!(manager.current().is_none());
    assert!(!manager.monitor().is_running());
    assert_eq!(store.get(CREDENTIAL_KEY).ok().flatten(), None);
    assert_eq!(store.get(PRINCIPAL_KEY).ok().flatten(), None);

    let err = manager
        .pipeline()
        .send(RequestSpec::get("/api/dashboard/all"))
        .await
        .expect_err("no session");
    assert!(matches!(err, ApiError::SessionMissing));
}

#[tokio::test]
async fn test_rejected_credential_tears_down_everything() {
    let server = MockServer::start().await;
    let token = token_expiring_in(3600);
    Mock::given(method("GET"))
        .and(path("/api/dashboard/all"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"detail": "Token has been revoked"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    store.set(CREDENTIAL_KEY, &token).expect("seed");
    store
        .set(PRINCIPAL_KEY, r#"{"username":"rina","role":"admin"}"#)
        .expect("seed");
    let navigator = Arc::new(CountingNavigator::default());
    let manager = manager(&server, store.clone(), navigator.clone());
    assert!(manager.restore());
    assert!(manager.monitor().is_running());

    let err = manager.dashboard().all().await.expect_err("rejected");
    assert!(matches!(err, ApiError::Unauthorized));
    assert!(manager.current().is_none());
    assert_eq!(navigator.0.load(Ordering::SeqCst), 1);
    assert!(!manager.monitor().is_running());
    server.verify().await;
}
