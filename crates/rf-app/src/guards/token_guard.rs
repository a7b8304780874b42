//! Token 驗證守衛
//!
//! Blocks navigation into the wizard unless a valid, unexpired bearer
//! token with the right scope is present. Also extracts a one-shot
//! token carried on the inbound navigation, in case the application
//! bootstrap missed it.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use rf_core::config::RegistrationConfig;
use rf_core::guard::{AccessDenied, DenyCode, Guard, GuardContext, GuardOutcome, NavTarget};
use rf_core::ports::ClockPort;
use rf_core::token::TokenError;

use crate::token::TokenManager;

pub struct TokenGuard {
    tokens: Arc<TokenManager>,
    clock: Arc<dyn ClockPort>,
    /// Remaining lifetime below which an expiry warning is logged.
    expiry_warning_secs: i64,
}

impl TokenGuard {
    pub fn new(
        tokens: Arc<TokenManager>,
        clock: Arc<dyn ClockPort>,
        config: &RegistrationConfig,
    ) -> Self {
        Self {
            tokens,
            clock,
            expiry_warning_secs: config.expiry_warning_secs,
        }
    }

    /// Deny target carrying the `access_denied` query contract. Tokens
    /// known to be unusable are removed on the way out.
    async fn deny(&self, code: DenyCode, message: &str) -> GuardOutcome {
        if matches!(code, DenyCode::TokenExpired | DenyCode::TokenFormatError) {
            self.tokens.clear_token().await;
        }
        let denied = AccessDenied::new(code, message, self.clock.now_ms());
        GuardOutcome::Deny(denied.to_nav_target())
    }

    /// Absorb a token carried on the navigation itself: store it and
    /// rewrite the URL so the token never stays visible.
    async fn absorb_inbound_token(&self, ctx: &GuardContext, token: &str) -> GuardOutcome {
        if self.tokens.is_token_expired(Some(token)).await {
            warn!("token carried on navigation is already expired");
            return self
                .deny(DenyCode::TokenExpired, &TokenError::Expired.to_string())
                .await;
        }

        self.tokens.set_token(token).await;
        debug!(path = %ctx.target_path, "token extracted from navigation");
        GuardOutcome::AllowRedirect(NavTarget::replace(ctx.target_path.clone()))
    }
}

#[async_trait]
impl Guard for TokenGuard {
    async fn check(&self, ctx: &GuardContext) -> GuardOutcome {
        debug!(path = %ctx.target_path, "token guard checking access");

        if let Some(token) = ctx.inbound_token.as_deref() {
            return self.absorb_inbound_token(ctx, token).await;
        }

        if self.tokens.cleanup_expired().await {
            debug!("expired token cleaned up before validation");
        }

        if let Err(err) = self.tokens.validate().await {
            warn!(error = %err, "token validation failed");
            let code = match err {
                TokenError::Missing => DenyCode::NoToken,
                TokenError::MalformedFormat => DenyCode::TokenFormatError,
                TokenError::Expired => DenyCode::TokenExpired,
                TokenError::InsufficientScope => DenyCode::InsufficientScope,
            };
            return self.deny(code, &err.to_string()).await;
        }

        let remaining = self.tokens.remaining_time().await;
        if remaining > 0 && remaining < self.expiry_warning_secs {
            let expires_at = self.tokens.expiration_date().await;
            warn!(
                remaining_secs = remaining,
                expires_at = ?expires_at,
                "token will expire soon"
            );
        }

        debug!(path = %ctx.target_path, "token validation passed");
        GuardOutcome::Allow
    }
}
