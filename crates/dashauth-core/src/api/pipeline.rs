//! Authenticated request dispatch.
//!
//! Every protected call goes through [`RequestPipeline::send`], which checks
//! the credential before dispatch, attaches it as a bearer token, and retries
//! once after a refresh when the server answers 401.

use chrono::Utc;
use reqwest::{Client, Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::auth::teardown::Teardown;
use crate::auth::{Credential, RefreshCoordinator, SessionState};

use super::ApiError;

/// How many times one call may be resubmitted after a 401.
const MAX_AUTH_RETRIES: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Access {
    #[default]
    Protected,
    /// Sent without a credential and without any session checks.
    Public,
}

/// Description of one outbound call.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    method: Method,
    path: String,
    /// Appended to `path` percent-encoded, one segment each.
    segments: Vec<String>,
    query: Vec<(String, String)>,
    body: Option<serde_json::Value>,
    access: Access,
}

impl RequestSpec {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            segments: Vec::new(),
            query: Vec::new(),
            body: None,
            access: Access::Protected,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// A POST with a JSON body.
    pub fn post<B: Serialize>(path: impl Into<String>, body: &B) -> Result<Self, ApiError> {
        Self::new(Method::POST, path).json(body)
    }

    pub fn json<B: Serialize>(mut self, body: &B) -> Result<Self, ApiError> {
        let body = serde_json::to_value(body).map_err(|e| {
            ApiError::InvalidRequest(format!("Request body failed to serialize: {}", e))
        })?;
        self.body = Some(body);
        Ok(self)
    }

    /// Append one path segment, escaping `/`, `?` and the like.
    pub fn segment(mut self, segment: impl Into<String>) -> Self {
        self.segments.push(segment.into());
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn public(mut self) -> Self {
        self.access = Access::Public;
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_protected(&self) -> bool {
        self.access == Access::Protected
    }
}

/// A response that made it back from the server, whatever its status.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    status: StatusCode,
    body: String,
}

impl ApiResponse {
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn text(&self) -> &str {
        &self.body
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_str(&self.body)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse JSON response: {}", e)))
    }

    /// Turn non-success statuses into errors.
    pub fn error_for_status(self) -> Result<Self, ApiError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(ApiError::from_status(self.status, &self.body))
        }
    }
}

/// Retry budget for a single originating call. Never shared between calls.
#[derive(Debug, Clone, Copy)]
struct CallContext {
    auth_retries_left: u8,
}

impl CallContext {
    fn new() -> Self {
        Self {
            auth_retries_left: MAX_AUTH_RETRIES,
        }
    }

    fn take_retry(&mut self) -> bool {
        if self.auth_retries_left == 0 {
            return false;
        }
        self.auth_retries_left -= 1;
        true
    }
}

/// Clone is cheap; every field is reference counted.
#[derive(Clone)]
pub struct RequestPipeline {
    client: Client,
    base_url: String,
    session: SessionState,
    coordinator: RefreshCoordinator,
    teardown: Teardown,
    lead: chrono::Duration,
}

impl RequestPipeline {
    pub(crate) fn new(
        client: Client,
        base_url: impl Into<String>,
        session: SessionState,
        coordinator: RefreshCoordinator,
        teardown: Teardown,
        lead: chrono::Duration,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            session,
            coordinator,
            teardown,
            lead,
        }
    }

    /// Send a request. Any response the server returns is passed through,
    /// except a 401 on a protected call, which is retried once after a
    /// refresh and otherwise reported as [`ApiError::Unauthorized`].
    pub async fn send(&self, spec: RequestSpec) -> Result<ApiResponse, ApiError> {
        if !spec.is_protected() {
            return self.dispatch(&spec, None).await;
        }

        let mut ctx = CallContext::new();
        let mut credential = self.credential_for_dispatch().await?;

        loop {
            let response = self.dispatch(&spec, Some(&credential)).await?;
            if response.status() != StatusCode::UNAUTHORIZED {
                return Ok(response);
            }

            if !ctx.take_retry() {
                warn!(path = %spec.path, "Refreshed credential was rejected");
                self.teardown.force("credential rejected after refresh");
                return Err(ApiError::Unauthorized);
            }

            debug!(path = %spec.path, "Got 401, refreshing before retry");
            if !self.coordinator.refresh().await.is_success() {
                return Err(ApiError::Unauthorized);
            }
            credential = self.session.credential().ok_or(ApiError::SessionMissing)?;
        }
    }

    /// Send and decode a JSON body, mapping error statuses to [`ApiError`].
    pub async fn send_json<T: DeserializeOwned>(&self, spec: RequestSpec) -> Result<T, ApiError> {
        self.send(spec).await?.error_for_status()?.json()
    }

    /// The credential a protected call should carry, refreshing first if the
    /// current one has expired.
    async fn credential_for_dispatch(&self) -> Result<Credential, ApiError> {
        let credential = self.session.credential().ok_or(ApiError::SessionMissing)?;
        let now = Utc::now();

        if credential.is_expired(now) {
            debug!("Credential expired, waiting for refresh");
            let outcome = self.coordinator.refresh().await;
            if !outcome.is_success() {
                return Err(ApiError::SessionExpired);
            }
            return self.session.credential().ok_or(ApiError::SessionExpired);
        }

        if credential.is_near_expiry(now, self.lead) {
            debug!("Credential near expiry, refreshing in background");
            let coordinator = self.coordinator.clone();
            tokio::spawn(async move {
                coordinator.refresh().await;
            });
        }

        Ok(credential)
    }

    async fn dispatch(
        &self,
        spec: &RequestSpec,
        credential: Option<&Credential>,
    ) -> Result<ApiResponse, ApiError> {
        let url = self.url_for(spec)?;
        let mut request = self.client.request(spec.method.clone(), url);
        if !spec.query.is_empty() {
            request = request.query(&spec.query);
        }
        if let Some(ref body) = spec.body {
            request = request.json(body);
        }
        if let Some(credential) = credential {
            request = request.bearer_auth(credential.as_str());
        }

        debug!(method = %spec.method, path = %spec.path, "Dispatching request");
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        debug!(path = %spec.path, status = status.as_u16(), "Response received");

        Ok(ApiResponse { status, body })
    }

    fn url_for(&self, spec: &RequestSpec) -> Result<Url, ApiError> {
        let raw = format!("{}{}", self.base_url, spec.path);
        let mut url = Url::parse(&raw)
            .map_err(|e| ApiError::InvalidRequest(format!("Bad URL {}: {}", raw, e)))?;
        if !spec.segments.is_empty() {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| ApiError::InvalidRequest(format!("URL has no path: {}", raw)))?;
            segments.extend(&spec.segments);
        }
        Ok(url)
    }
}
