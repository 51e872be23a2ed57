//! Dashboard data endpoints.
//!
//! These are plain pass-through calls; payloads are returned as raw JSON.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::pipeline::{RequestPipeline, RequestSpec};
use super::ApiError;

const HEALTH_PATH: &str = "/api/health";
const DASHBOARD_PATH: &str = "/api/dashboard";
const CHANGE_PASSWORD_PATH: &str = "/api/auth/change-password";

#[derive(Debug, Serialize)]
struct ChangePasswordRequest<'a> {
    current_password: &'a str,
    new_password: &'a str,
}

/// `{success, message}` acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MessageResponse {
    pub success: bool,
    #[serde(default)]
    pub message: String,
}

#[derive(Clone)]
pub struct DashboardApi {
    pipeline: RequestPipeline,
}

impl DashboardApi {
    pub fn new(pipeline: RequestPipeline) -> Self {
        Self { pipeline }
    }

    pub async fn health_check(&self) -> Result<Value, ApiError> {
        self.pipeline.send_json(RequestSpec::get(HEALTH_PATH).public()).await
    }

    pub async fn forwarding_orders(&self) -> Result<Value, ApiError> {
        self.fetch("forwarding-orders").await
    }

    pub async fn first_mile_truck(&self) -> Result<Value, ApiError> {
        self.fetch("first-mile-truck").await
    }

    /// `terminal` is sent as a single escaped path segment.
    pub async fn last_mile_truck(&self, terminal: &str) -> Result<Value, ApiError> {
        if terminal.is_empty() || terminal == "." || terminal == ".." {
            return Err(ApiError::InvalidRequest(format!(
                "Invalid terminal name: {:?}",
                terminal
            )));
        }
        let spec =
            RequestSpec::get(format!("{}/last-mile-truck", DASHBOARD_PATH)).segment(terminal);
        self.pipeline.send_json(spec).await
    }

    pub async fn stockpiles(&self) -> Result<Value, ApiError> {
        self.fetch("stockpiles").await
    }

    pub async fn all(&self) -> Result<Value, ApiError> {
        self.fetch("all").await
    }

    pub async fn change_password(
        &self,
        current_password: &str,
        new_password: &str,
    ) -> Result<MessageResponse, ApiError> {
        let body = ChangePasswordRequest {
            current_password,
            new_password,
        };
        self.pipeline
            .send_json(RequestSpec::post(CHANGE_PASSWORD_PATH, &body)?)
            .await
    }

    async fn fetch(&self, view: &str) -> Result<Value, ApiError> {
        self.pipeline
            .send_json(RequestSpec::get(format!("{}/{}", DASHBOARD_PATH, view)))
            .await
    }
}
