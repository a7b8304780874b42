//! Outbound registration/OTP collaborator contract
//!
//! The core never implements these calls; it consumes them through this
//! port and only interprets the success flag, the data payloads and the
//! authorization-relevant failures (401/403/422-with-token-hint).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::registration::FormData;

/// 後端共用回應格式
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

/// 發送 / 重送 OTP 的回應
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SendOtpData {
    pub otp_sent: bool,
    /// 重送倒數秒數
    pub countdown: u32,
}

/// OTP 驗證回應
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VerifyOtpData {
    pub verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
}

/// Collaborator call failures the core reacts to.
///
/// The display texts for the authorization variants are the user-facing
/// messages rendered on the error route.
#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP 401 - the server rejected the token
    #[error("伺服器拒絕了您的驗證，請重新授權")]
    Unauthorized,

    /// HTTP 403
    #[error("權限不足，無法執行此操作")]
    Forbidden,

    /// HTTP 422 whose message points at the token
    #[error("Token 格式錯誤，請重新授權")]
    TokenRejected,

    /// Any other non-success status
    #[error("伺服器回應異常 ({status}): {message}")]
    Status { status: u16, message: String },

    /// Connection-level failure
    #[error("連線失敗: {0}")]
    Transport(String),
}

#[async_trait]
pub trait RegistrationApiPort: Send + Sync {
    /// Submit step-1 data; on success the server sends an OTP.
    async fn submit_registration(
        &self,
        form: &FormData,
    ) -> Result<ApiResponse<SendOtpData>, ApiError>;

    /// Verify the OTP and finish the registration.
    async fn verify_otp(
        &self,
        otp_code: &str,
        form: &FormData,
    ) -> Result<ApiResponse<VerifyOtpData>, ApiError>;

    /// Resend the OTP to the given phone number.
    async fn resend_otp(&self, phone_number: &str) -> Result<ApiResponse<SendOtpData>, ApiError>;

    /// 縣市清單
    async fn lookup_cities(&self) -> Result<Vec<String>, ApiError>;

    /// 指定縣市的鄉鎮區清單
    async fn lookup_districts(&self, city: &str) -> Result<Vec<String>, ApiError>;
}
