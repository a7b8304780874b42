//! 驗證 OTP 並完成註冊

use std::sync::Arc;

use tracing::{debug, info, warn};

use rf_core::config::RegistrationConfig;
use rf_core::guard::AccessDenied;
use rf_core::ports::{ClockPort, RegistrationApiPort};
use rf_core::registration::StateError;
use rf_core::validators::is_valid_otp_code;

use crate::store::RegistrationStore;
use crate::token::TokenManager;

use super::api_failure::{handle_api_error, preflight_token_check};

#[derive(Debug, PartialEq)]
pub enum VerifyOutcome {
    /// Registration finished; wizard state and token have been cleared.
    Verified {
        user_id: Option<String>,
        redirect_url: Option<String>,
    },
    /// OTP 格式不對（長度或非數字），不送出。
    InvalidCode,
    /// The server declined the code (wrong or expired OTP, etc.).
    Rejected(String),
    /// Authorization failed; redirect to the error route.
    Denied(AccessDenied),
}

pub struct VerifyOtp {
    store: Arc<RegistrationStore>,
    api: Arc<dyn RegistrationApiPort>,
    tokens: Arc<TokenManager>,
    clock: Arc<dyn ClockPort>,
    otp_code_length: usize,
}

impl VerifyOtp {
    pub fn new(
        store: Arc<RegistrationStore>,
        api: Arc<dyn RegistrationApiPort>,
        tokens: Arc<TokenManager>,
        clock: Arc<dyn ClockPort>,
        config: &RegistrationConfig,
    ) -> Self {
        Self {
            store,
            api,
            tokens,
            clock,
            otp_code_length: config.otp.code_length,
        }
    }

    pub async fn execute(&self, otp_code: &str) -> VerifyOutcome {
        self.store.clear_errors();

        if !is_valid_otp_code(otp_code, self.otp_code_length) {
            debug!("otp code format invalid");
            return VerifyOutcome::InvalidCode;
        }

        let Some(form) = self.store.snapshot().form_data else {
            warn!("verification attempted without step-1 data");
            let message = StateError::IncompleteStepData.to_string();
            self.store.add_error(message.clone());
            return VerifyOutcome::Rejected(message);
        };

        if let Err(denied) = preflight_token_check(self.tokens.as_ref(), self.clock.as_ref()).await
        {
            return VerifyOutcome::Denied(denied);
        }

        self.store.set_loading(true);
        let result = self.api.verify_otp(otp_code, &form).await;
        self.store.set_loading(false);

        match result {
            Ok(response) => {
                let data = response.data.unwrap_or_default();
                if response.success && data.verified {
                    info!(user_id = ?data.user_id, "registration completed");
                    self.store.complete_step2(otp_code).await;
                    // 終態：整個流程（含 token）一次清乾淨
                    self.store.clear_all().await;
                    VerifyOutcome::Verified {
                        user_id: data.user_id,
                        redirect_url: data.redirect_url,
                    }
                } else {
                    warn!(message = %response.message, "otp verification declined");
                    self.store.add_error(response.message.clone());
                    VerifyOutcome::Rejected(response.message)
                }
            }
            Err(err) => {
                if let Some(denied) =
                    handle_api_error(self.tokens.as_ref(), self.clock.as_ref(), &err).await
                {
                    return VerifyOutcome::Denied(denied);
                }
                warn!(error = %err, "otp verification call failed");
                let message = err.to_string();
                self.store.add_error(message.clone());
                VerifyOutcome::Rejected(message)
            }
        }
    }
}
