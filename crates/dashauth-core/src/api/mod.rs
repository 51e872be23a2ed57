//! REST client module for the dashboard backend.
//!
//! This module provides the `RequestPipeline` that every authenticated call
//! goes through, the `DashboardApi` endpoint wrappers built on it, and the
//! login/renewal wire calls used by the session layer.
//!
//! The backend uses JWT bearer authentication obtained from
//! `/api/auth/login` and renewed at `/api/auth/refresh`.

pub(crate) mod auth;
pub mod dashboard;
pub mod error;
pub mod pipeline;

pub use dashboard::{DashboardApi, MessageResponse};
pub use error::ApiError;
pub use pipeline::{Access, ApiResponse, RequestPipeline, RequestSpec};
