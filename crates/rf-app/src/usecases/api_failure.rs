//! Authorization failure handling around outbound calls
//!
//! Two layers: a preflight check run before any authorized call, and a
//! response handler mapping server-side authorization failures onto the
//! access-denied redirect contract. Both mirror the route guards but use
//! the HTTP-flavoured deny codes so the error page can tell the layers
//! apart.

use tracing::{error, warn};

use rf_core::guard::{AccessDenied, DenyCode};
use rf_core::ports::{ApiError, ClockPort};
use rf_core::token::TokenError;

use crate::token::TokenManager;

/// Check the stored token before an authorized call goes out.
///
/// 過期或無效的 token 在這裡就攔下來，不送請求。
pub async fn preflight_token_check(
    tokens: &TokenManager,
    clock: &dyn ClockPort,
) -> Result<(), AccessDenied> {
    if tokens.cleanup_expired().await {
        warn!("expired token cleaned before outbound call");
        return Err(AccessDenied::new(
            DenyCode::TokenExpiredHttp,
            TokenError::Expired.to_string(),
            clock.now_ms(),
        ));
    }

    match tokens.validate().await {
        Ok(()) => Ok(()),
        Err(TokenError::Expired) => {
            error!("token expired before outbound call");
            tokens.clear_token().await;
            Err(AccessDenied::new(
                DenyCode::TokenExpiredHttp,
                TokenError::Expired.to_string(),
                clock.now_ms(),
            ))
        }
        Err(err) => {
            error!(error = %err, "token invalid before outbound call");
            tokens.clear_token().await;
            Err(AccessDenied::new(
                DenyCode::TokenInvalidHttp,
                err.to_string(),
                clock.now_ms(),
            ))
        }
    }
}

/// Map a server-side failure onto the access-denied contract.
///
/// Returns `None` for failures that are not authorization problems; the
/// caller surfaces those as ordinary state errors instead of redirecting.
pub async fn handle_api_error(
    tokens: &TokenManager,
    clock: &dyn ClockPort,
    err: &ApiError,
) -> Option<AccessDenied> {
    match err {
        ApiError::Unauthorized => {
            warn!("server rejected token (401)");
            tokens.clear_token().await;
            Some(AccessDenied::new(
                DenyCode::ServerUnauthorized,
                err.to_string(),
                clock.now_ms(),
            ))
        }
        ApiError::Forbidden => {
            warn!("insufficient permissions (403)");
            Some(AccessDenied::new(
                DenyCode::InsufficientPermissions,
                err.to_string(),
                clock.now_ms(),
            ))
        }
        ApiError::TokenRejected => {
            warn!("server flagged token format (422)");
            tokens.clear_token().await;
            Some(AccessDenied::new(
                DenyCode::TokenFormatErrorServer,
                err.to_string(),
                clock.now_ms(),
            ))
        }
        ApiError::Status { .. } | ApiError::Transport(_) => None,
    }
}
