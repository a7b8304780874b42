//! Bearer token structure and payload parsing.
//!
//! Tokens are opaque dot-separated three-segment strings whose middle
//! segment is base64-encoded JSON. Only structure, expiry and scope are
//! interpreted here; issuance and signature checking belong to the
//! authorization server and are out of scope.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Scope a token must carry to enter the registration wizard.
pub const REQUIRED_SCOPE: &str = "auth";

/// Decoded token payload. Unknown claims are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TokenPayload {
    /// Expiration as unix seconds. Absent means the issuer set no expiry.
    pub exp: Option<i64>,
    pub scope: Option<String>,
    pub redirect_url: Option<String>,
}

/// Why a payload segment could not be decoded.
///
/// Callers that care about the permissive-vs-fail-closed expiry rule need
/// to distinguish a decode *error* from a payload that merely lacks `exp`.
#[derive(Debug, Error)]
pub enum PayloadParseError {
    #[error("token has no payload segment")]
    MissingSegment,
    #[error("payload segment is not valid base64: {0}")]
    Base64(base64::DecodeError),
    #[error("payload segment is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Token lifecycle failures, ordered the way `validate` reports them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("缺少驗證 token")]
    Missing,
    #[error("Token 格式不正確")]
    MalformedFormat,
    #[error("Token 已過期，請重新授權")]
    Expired,
    #[error("Token 權限不足")]
    InsufficientScope,
}

/// Exactly three dot-separated segments, each non-empty.
pub fn is_valid_format(token: &str) -> bool {
    let parts: Vec<&str> = token.split('.').collect();
    parts.len() == 3 && parts.iter().all(|part| !part.is_empty())
}

/// Decode the middle segment as base64 JSON.
///
/// Both standard and url-safe-unpadded alphabets are accepted; issuers in
/// the wild use either.
pub fn decode_payload(token: &str) -> Result<TokenPayload, PayloadParseError> {
    let segment = token
        .split('.')
        .nth(1)
        .filter(|segment| !segment.is_empty())
        .ok_or(PayloadParseError::MissingSegment)?;

    let bytes = STANDARD
        .decode(segment)
        .or_else(|_| URL_SAFE_NO_PAD.decode(segment))
        .map_err(PayloadParseError::Base64)?;

    Ok(serde_json::from_slice(&bytes)?)
}

/// Decode the payload, collapsing every failure to absent.
pub fn parse_payload(token: &str) -> Option<TokenPayload> {
    decode_payload(token).ok()
}

/// Expiry check against a clock reading in unix seconds.
///
/// A payload that decodes but carries no `exp` is treated as not expired
/// so that issuers omitting expiry do not lock users out; a payload that
/// fails to decode at all is treated as expired.
pub fn is_expired_at(token: &str, now_secs: i64) -> bool {
    match decode_payload(token) {
        Ok(payload) => match payload.exp {
            Some(exp) => now_secs >= exp,
            None => {
                tracing::warn!("token does not contain expiration time");
                false
            }
        },
        Err(err) => {
            tracing::warn!(error = %err, "token payload unreadable, treating as expired");
            true
        }
    }
}

/// Remaining validity in seconds, floored at zero.
pub fn remaining_secs_at(token: &str, now_secs: i64) -> i64 {
    match parse_payload(token).and_then(|payload| payload.exp) {
        Some(exp) => (exp - now_secs).max(0),
        None => 0,
    }
}

/// Expiration instant, if the payload carries one.
pub fn expiration_date(token: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    let exp = parse_payload(token)?.exp?;
    chrono::DateTime::from_timestamp(exp, 0)
}
