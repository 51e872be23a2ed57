//! Bearer credential inspection.
//!
//! Credentials are compact three-segment tokens (`header.claims.signature`).
//! The client only ever reads the `exp` claim; the signature is the server's
//! business. Anything that fails to decode is treated as already expired.

use std::fmt;

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// base64url decoder that accepts both padded and unpadded segments.
const CLAIMS_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Number of dot-separated segments in a well-formed credential.
const SEGMENT_COUNT: usize = 3;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("expected 3 segments, found {0}")]
    SegmentCount(usize),

    #[error("claims segment is not valid base64url: {0}")]
    Encoding(#[from] base64::DecodeError),

    #[error("claims segment is not a JSON object: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("claims are missing an integer `exp`")]
    MissingExpiry,

    #[error("`exp` {0} is outside the representable range")]
    ExpiryOutOfRange(i64),
}

/// The subset of claims the client cares about.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Claims {
    /// Expiry, seconds since the Unix epoch.
    pub exp: i64,
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

/// Decode the claims segment of a credential.
pub fn decode_claims(credential: &str) -> Result<Claims, DecodeError> {
    let segments: Vec<&str> = credential.split('.').collect();
    if segments.len() != SEGMENT_COUNT {
        return Err(DecodeError::SegmentCount(segments.len()));
    }

    let raw = CLAIMS_ENGINE.decode(segments[1])?;
    let value: serde_json::Value = serde_json::from_slice(&raw)?;
    if !value.is_object() {
        return Err(DecodeError::MissingExpiry);
    }
    if !value.get("exp").is_some_and(|exp| exp.is_i64()) {
        return Err(DecodeError::MissingExpiry);
    }
    Ok(serde_json::from_value(value)?)
}

/// Absolute expiry instant taken from the `exp` claim.
pub fn expires_at(credential: &str) -> Result<DateTime<Utc>, DecodeError> {
    let claims = decode_claims(credential)?;
    DateTime::from_timestamp(claims.exp, 0).ok_or(DecodeError::ExpiryOutOfRange(claims.exp))
}

/// `now >= expires_at`. Malformed credentials count as expired.
pub fn is_expired(credential: &str, now: DateTime<Utc>) -> bool {
    is_near_expiry(credential, now, Duration::zero())
}

/// `now >= expires_at - lead`. Malformed credentials count as expired.
pub fn is_near_expiry(credential: &str, now: DateTime<Utc>, lead: Duration) -> bool {
    match expires_at(credential) {
        // An unrepresentable `expiry - lead` lies before any real `now`.
        Ok(expiry) => expiry.checked_sub_signed(lead).map_or(true, |t| now >= t),
        Err(e) => {
            debug!(error = %e, "Undecodable credential, treating as expired");
            true
        }
    }
}

/// An opaque bearer credential.
///
/// `Debug` never prints the token itself.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn expires_at(&self) -> Result<DateTime<Utc>, DecodeError> {
        expires_at(&self.0)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        is_expired(&self.0, now)
    }

    pub fn is_near_expiry(&self, now: DateTime<Utc>, lead: Duration) -> bool {
        is_near_expiry(&self.0, now, lead)
    }

    /// Whole seconds until expiry, clamped at zero (for display).
    pub fn seconds_until_expiry(&self, now: DateTime<Utc>) -> i64 {
        self.expires_at()
            .map(|expiry| (expiry - now).num_seconds().max(0))
            .unwrap_or(0)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}
