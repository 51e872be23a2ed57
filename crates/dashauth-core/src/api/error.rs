use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Not logged in")]
    SessionMissing,

    #[error("Session expired - please log in again")]
    SessionExpired,

    #[error("Unauthorized - credential was rejected")]
    Unauthorized,

    #[error("Login failed: {0}")]
    LoginFailed(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Why a session renewal did not produce a new credential.
#[derive(Error, Debug)]
pub(crate) enum RenewalError {
    /// No response reached us.
    #[error("renewal request failed: {0}")]
    Network(#[from] reqwest::Error),

    /// The renewal endpoint explicitly refused the credential.
    #[error("renewal rejected: {0}")]
    Rejected(String),

    /// Some other failure that says nothing about the credential itself.
    #[error("renewal failed: {0}")]
    Ambiguous(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    pub(crate) fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let truncated = Self::truncate_body(body);
        match status.as_u16() {
            401 => ApiError::Unauthorized,
            403 => ApiError::AccessDenied(truncated),
            404 => ApiError::NotFound(truncated),
            429 => ApiError::RateLimited,
            500..=599 => ApiError::ServerError(truncated),
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, truncated)),
        }
    }
}
