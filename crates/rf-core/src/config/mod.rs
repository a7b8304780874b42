//! Registration configuration domain model

use serde::{Deserialize, Serialize};

use crate::validators::{MINIMUM_AGE, OTP_CODE_LENGTH};

/// Application configuration for the registration core.
///
/// Loaded by the infrastructure layer (file + environment); defaults
/// match the original deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationConfig {
    /// Base URL of the registration/OTP collaborator API
    pub api_base_url: String,

    /// OTP settings
    pub otp: OtpConfig,

    /// Persistence settings
    pub storage: StorageConfig,

    /// Minimum age required to register
    pub minimum_age: u32,

    /// Warn when a token expires within this many seconds
    pub expiry_warning_secs: i64,
}

/// OTP configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OtpConfig {
    /// Resend cooldown started when an OTP is sent, in seconds
    pub countdown_secs: u32,

    /// Expected OTP code length
    pub code_length: usize,
}

/// Persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Polling interval for detecting external slot writes, in milliseconds
    pub poll_interval_ms: u64,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8080/b2c-auth-api/api".to_string(),
            otp: OtpConfig::default(),
            storage: StorageConfig::default(),
            minimum_age: MINIMUM_AGE,
            expiry_warning_secs: 300,
        }
    }
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self {
            countdown_secs: 300,
            code_length: OTP_CODE_LENGTH,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
        }
    }
}
