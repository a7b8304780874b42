//! Token 生命週期管理
//!
//! The bearer token lives in a single persisted slot, independent of the
//! wizard state. This manager owns presence, structural validation,
//! expiry and scope checks; it never issues or signs anything.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use rf_core::ports::{ClockPort, KeyValueStorePort, AUTH_TOKEN_KEY};
use rf_core::token::{self, TokenError, TokenPayload, REQUIRED_SCOPE};

pub struct TokenManager {
    storage: Arc<dyn KeyValueStorePort>,
    clock: Arc<dyn ClockPort>,
}

impl TokenManager {
    pub fn new(storage: Arc<dyn KeyValueStorePort>, clock: Arc<dyn ClockPort>) -> Self {
        Self { storage, clock }
    }

    /// Stored token, if any. Read failures are treated as absent.
    pub async fn token(&self) -> Option<String> {
        match self.storage.get(AUTH_TOKEN_KEY).await {
            Ok(token) => token,
            Err(err) => {
                warn!(error = %err, "failed to read token slot");
                None
            }
        }
    }

    pub async fn has_token(&self) -> bool {
        self.token().await.is_some()
    }

    pub async fn set_token(&self, token: &str) {
        if let Err(err) = self.storage.set(AUTH_TOKEN_KEY, token).await {
            warn!(error = %err, "failed to store token");
        } else {
            debug!("token stored");
        }
    }

    pub async fn clear_token(&self) {
        if let Err(err) = self.storage.remove(AUTH_TOKEN_KEY).await {
            warn!(error = %err, "failed to clear token");
        } else {
            debug!("token cleared");
        }
    }

    /// Expiry check for the given token, or the stored one when absent.
    ///
    /// 沒有 token 視為過期；payload 解不開視為過期（安全優先）；
    /// 解得開但沒有 `exp` 暫時視為未過期。
    pub async fn is_token_expired(&self, token: Option<&str>) -> bool {
        let token = match token {
            Some(token) => token.to_string(),
            None => match self.token().await {
                Some(token) => token,
                None => return true,
            },
        };
        token::is_expired_at(&token, self.clock.now_secs())
    }

    /// Remaining validity of the stored token in seconds (0 when absent,
    /// expired, or without expiry).
    pub async fn remaining_time(&self) -> i64 {
        match self.token().await {
            Some(token) => token::remaining_secs_at(&token, self.clock.now_secs()),
            None => 0,
        }
    }

    /// Expiration instant of the stored token.
    pub async fn expiration_date(&self) -> Option<DateTime<Utc>> {
        token::expiration_date(&self.token().await?)
    }

    pub async fn payload(&self) -> Option<TokenPayload> {
        token::parse_payload(&self.token().await?)
    }

    pub async fn scope(&self) -> Option<String> {
        self.payload().await?.scope
    }

    pub async fn redirect_url(&self) -> Option<String> {
        self.payload().await?.redirect_url
    }

    /// 完整驗證：存在 → 格式 → 過期 → scope，回傳第一個失敗原因。
    pub async fn validate(&self) -> Result<(), TokenError> {
        let token = self.token().await.ok_or(TokenError::Missing)?;

        if !token::is_valid_format(&token) {
            return Err(TokenError::MalformedFormat);
        }

        if token::is_expired_at(&token, self.clock.now_secs()) {
            return Err(TokenError::Expired);
        }

        let scope = token::parse_payload(&token).and_then(|payload| payload.scope);
        if scope.as_deref() != Some(REQUIRED_SCOPE) {
            return Err(TokenError::InsufficientScope);
        }

        Ok(())
    }

    /// Drop the stored token if its payload carries a lapsed `exp`.
    /// Returns whether a cleanup happened.
    ///
    /// 只清除「確定已過期」的 token；payload 解不開的留給格式／完整驗證
    /// 去回報，不在這裡默默吞掉。
    pub async fn cleanup_expired(&self) -> bool {
        let Some(token) = self.token().await else {
            return false;
        };
        let lapsed = token::parse_payload(&token)
            .and_then(|payload| payload.exp)
            .is_some_and(|exp| self.clock.now_secs() >= exp);
        if lapsed {
            debug!("cleaning up expired token");
            self.clear_token().await;
            return true;
        }
        false
    }
}
