//! Guard decision types and the predicate-chain evaluator.
//!
//! A guard inspects a navigation attempt and either lets it through,
//! rewrites it (for example to strip a one-shot token from the visible
//! URL), or denies it with a redirect target. Guards run in order and the
//! first non-allow outcome wins.

use async_trait::async_trait;
use std::sync::Arc;

/// 錯誤頁路由
pub const ERROR_PATH: &str = "/error";
/// 步驟 1（基本資料）路由
pub const REGISTER_INFO_PATH: &str = "/register/info";
/// 步驟 2（OTP 驗證）路由
pub const REGISTER_VERIFY_PATH: &str = "/register/verify";

/// A navigation attempt as seen by the guard chain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GuardContext {
    /// Path being navigated to, without query parameters.
    pub target_path: String,
    /// Step index the route requires, if it is step-scoped. Kept as a raw
    /// integer so unknown indices can fall back to step 1.
    pub required_step: Option<i64>,
    /// One-shot token carried on the inbound navigation (e.g. a `token`
    /// URL parameter the bootstrap missed).
    pub inbound_token: Option<String>,
}

impl GuardContext {
    pub fn for_path(path: impl Into<String>) -> Self {
        Self {
            target_path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_step(mut self, step: i64) -> Self {
        self.required_step = Some(step);
        self
    }

    pub fn with_inbound_token(mut self, token: impl Into<String>) -> Self {
        self.inbound_token = Some(token.into());
        self
    }
}

/// Where to send the user instead of (or in addition to) the requested
/// route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavTarget {
    pub path: String,
    pub query: Vec<(String, String)>,
    /// Replace the current history entry instead of pushing a new one.
    pub replace: bool,
}

impl NavTarget {
    pub fn push(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            query: Vec::new(),
            replace: false,
        }
    }

    pub fn replace(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            query: Vec::new(),
            replace: true,
        }
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Look up a query parameter, mostly for assertions and logging.
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Machine-readable deny codes surfaced on the error route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyCode {
    TokenExpired,
    NoToken,
    TokenFormatError,
    InsufficientScope,
    TokenInvalid,
    AccessDenied,
    /// 伺服器回應 401
    ServerUnauthorized,
    /// 伺服器回應 403
    InsufficientPermissions,
    /// 伺服器回應 422 且訊息指向 token
    TokenFormatErrorServer,
    /// 發送請求前發現 token 過期
    TokenExpiredHttp,
    /// 發送請求前發現 token 無效
    TokenInvalidHttp,
}

impl DenyCode {
    pub fn as_str(self) -> &'static str {
        match self {
            DenyCode::TokenExpired => "TOKEN_EXPIRED",
            DenyCode::NoToken => "NO_TOKEN",
            DenyCode::TokenFormatError => "TOKEN_FORMAT_ERROR",
            DenyCode::InsufficientScope => "INSUFFICIENT_SCOPE",
            DenyCode::TokenInvalid => "TOKEN_INVALID",
            DenyCode::AccessDenied => "ACCESS_DENIED",
            DenyCode::ServerUnauthorized => "SERVER_UNAUTHORIZED",
            DenyCode::InsufficientPermissions => "INSUFFICIENT_PERMISSIONS",
            DenyCode::TokenFormatErrorServer => "TOKEN_FORMAT_ERROR_SERVER",
            DenyCode::TokenExpiredHttp => "TOKEN_EXPIRED_HTTP",
            DenyCode::TokenInvalidHttp => "TOKEN_INVALID_HTTP",
        }
    }
}

impl std::fmt::Display for DenyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured access-denied payload rendered onto the error route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessDenied {
    pub code: DenyCode,
    pub message: String,
    /// Epoch milliseconds, attached for cache busting.
    pub timestamp_ms: i64,
}

impl AccessDenied {
    pub fn new(code: DenyCode, message: impl Into<String>, timestamp_ms: i64) -> Self {
        Self {
            code,
            message: message.into(),
            timestamp_ms,
        }
    }

    /// Redirect target carrying the `access_denied` query contract.
    pub fn to_nav_target(&self) -> NavTarget {
        NavTarget::push(ERROR_PATH)
            .with_query("type", "access_denied")
            .with_query("message", self.message.clone())
            .with_query("code", self.code.as_str())
            .with_query("timestamp", self.timestamp_ms.to_string())
    }
}

/// Outcome of a single guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardOutcome {
    Allow,
    /// Allow, but navigate to a rewritten target first.
    AllowRedirect(NavTarget),
    Deny(NavTarget),
}

impl GuardOutcome {
    pub fn is_allow(&self) -> bool {
        !matches!(self, GuardOutcome::Deny(_))
    }
}

#[async_trait]
pub trait Guard: Send + Sync {
    async fn check(&self, ctx: &GuardContext) -> GuardOutcome;
}

/// Evaluate guards in order until the first non-allow outcome.
pub async fn run_guards(guards: &[Arc<dyn Guard>], ctx: &GuardContext) -> GuardOutcome {
    for guard in guards {
        match guard.check(ctx).await {
            GuardOutcome::Allow => continue,
            other => {
                tracing::debug!(target_path = %ctx.target_path, "guard chain short-circuited");
                return other;
            }
        }
    }
    GuardOutcome::Allow
}
