//! Wire calls for the login and session-renewal endpoints.

use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::auth::{Credential, Principal};

use super::error::RenewalError;
use super::ApiError;

pub(crate) const LOGIN_PATH: &str = "/api/auth/login";
pub(crate) const REFRESH_PATH: &str = "/api/auth/refresh";

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

/// Response body shared by login and renewal.
///
/// The backend calls the credential `token` and the principal `user`.
#[derive(Debug, Deserialize)]
struct AuthPayload {
    #[serde(default)]
    success: bool,
    #[serde(default, alias = "token")]
    credential: Option<String>,
    #[serde(default, alias = "user")]
    principal: Option<Principal>,
    #[serde(default)]
    message: Option<String>,
    /// FastAPI puts error text here.
    #[serde(default)]
    detail: Option<String>,
}

impl AuthPayload {
    fn reason(&self) -> Option<String> {
        self.message.clone().or_else(|| self.detail.clone())
    }
}

/// A freshly issued credential.
#[derive(Debug, Clone)]
pub(crate) struct AuthGrant {
    pub(crate) credential: Credential,
    /// Renewal responses may omit the principal.
    pub(crate) principal: Option<Principal>,
}

/// Client for the authentication endpoints.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub(crate) struct AuthApi {
    client: Client,
    base_url: String,
}

impl AuthApi {
    pub(crate) fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    pub(crate) async fn login(
        &self,
        username: &str,
        password: &str,
    ) -> Result<AuthGrant, ApiError> {
        let url = format!("{}{}", self.base_url, LOGIN_PATH);
        debug!(username, "Sending login request");

        let response = self
            .client
            .post(&url)
            .header(header::ACCEPT, "application/json")
            .json(&LoginRequest { username, password })
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        let payload = serde_json::from_str::<AuthPayload>(&body).ok();

        let denied = status.is_success() && payload.as_ref().is_some_and(|p| !p.success);
        if status == StatusCode::UNAUTHORIZED || denied {
            let reason = payload
                .and_then(|p| p.reason())
                .unwrap_or_else(|| "Login failed".to_string());
            return Err(ApiError::LoginFailed(reason));
        }
        if !status.is_success() {
            return Err(ApiError::from_status(status, &body));
        }

        let payload = payload
            .ok_or_else(|| ApiError::InvalidResponse("Unparseable login response".to_string()))?;
        let credential = payload
            .credential
            .ok_or_else(|| ApiError::InvalidResponse("Login response has no token".to_string()))?;
        let principal = payload
            .principal
            .unwrap_or_else(|| Principal::new(username, Default::default()));

        Ok(AuthGrant {
            credential: Credential::new(credential),
            principal: Some(principal),
        })
    }

    /// Exchange the current credential for a new one.
    pub(crate) async fn renew(&self, credential: &Credential) -> Result<AuthGrant, RenewalError> {
        let url = format!("{}{}", self.base_url, REFRESH_PATH);

        let response = self
            .client
            .post(&url)
            .header(header::ACCEPT, "application/json")
            .bearer_auth(credential.as_str())
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let detail = serde_json::from_str::<AuthPayload>(&body)
                .ok()
                .and_then(|p| p.reason())
                .unwrap_or_else(|| format!("status {}", status));
            return Err(RenewalError::Rejected(detail));
        }
        if !status.is_success() {
            return Err(RenewalError::Ambiguous(format!(
                "status {}: {}",
                status,
                ApiError::truncate_body(&body)
            )));
        }

        let payload: AuthPayload = serde_json::from_str(&body)
            .map_err(|e| RenewalError::Ambiguous(format!("unparseable renewal response: {}", e)))?;
        if !payload.success {
            return Err(RenewalError::Rejected(
                payload.reason().unwrap_or_else(|| "renewal denied".to_string()),
            ));
        }
        let credential = payload
            .credential
            .ok_or_else(|| RenewalError::Ambiguous("renewal response has no token".to_string()))?;

        Ok(AuthGrant {
            credential: Credential::new(credential),
            principal: payload.principal,
        })
    }
}
