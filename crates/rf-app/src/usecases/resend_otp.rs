//! 重新發送 OTP

use std::sync::Arc;

use tracing::{debug, info, warn};

use rf_core::guard::AccessDenied;
use rf_core::ports::{ClockPort, RegistrationApiPort};
use rf_core::registration::StateError;

use crate::store::RegistrationStore;
use crate::token::TokenManager;

use super::api_failure::{handle_api_error, preflight_token_check};

#[derive(Debug, PartialEq)]
pub enum ResendOtpOutcome {
    /// 已重新發送，倒數重新開始。
    OtpSent { countdown: u32 },
    /// The cooldown is still running (or no OTP was ever sent).
    CooldownActive,
    /// The server declined the resend.
    Rejected(String),
    /// Authorization failed; redirect to the error route.
    Denied(AccessDenied),
}

pub struct ResendOtp {
    store: Arc<RegistrationStore>,
    api: Arc<dyn RegistrationApiPort>,
    tokens: Arc<TokenManager>,
    clock: Arc<dyn ClockPort>,
}

impl ResendOtp {
    pub fn new(
        store: Arc<RegistrationStore>,
        api: Arc<dyn RegistrationApiPort>,
        tokens: Arc<TokenManager>,
        clock: Arc<dyn ClockPort>,
    ) -> Self {
        Self {
            store,
            api,
            tokens,
            clock,
        }
    }

    pub async fn execute(&self) -> ResendOtpOutcome {
        if !self.store.can_resend_otp() {
            debug!("resend blocked by cooldown");
            return ResendOtpOutcome::CooldownActive;
        }

        let phone_number = match self.store.snapshot().form_data {
            Some(form) if !form.phone_number.is_empty() => form.phone_number,
            _ => {
                warn!("resend attempted without a phone number on file");
                let message = StateError::IncompleteStepData.to_string();
                self.store.add_error(message.clone());
                return ResendOtpOutcome::Rejected(message);
            }
        };

        if let Err(denied) = preflight_token_check(self.tokens.as_ref(), self.clock.as_ref()).await
        {
            return ResendOtpOutcome::Denied(denied);
        }

        self.store.set_loading(true);
        let result = self.api.resend_otp(&phone_number).await;
        self.store.set_loading(false);

        match result {
            Ok(response) => {
                let otp = response.data.unwrap_or_default();
                if response.success && otp.otp_sent {
                    info!(countdown = otp.countdown, "otp resent");
                    self.store.clear_errors();
                    self.store.set_otp_sent(true, otp.countdown);
                    ResendOtpOutcome::OtpSent {
                        countdown: otp.countdown,
                    }
                } else {
                    warn!(message = %response.message, "otp resend declined");
                    self.store.add_error(response.message.clone());
                    ResendOtpOutcome::Rejected(response.message)
                }
            }
            Err(err) => {
                if let Some(denied) =
                    handle_api_error(self.tokens.as_ref(), self.clock.as_ref(), &err).await
                {
                    return ResendOtpOutcome::Denied(denied);
                }
                warn!(error = %err, "otp resend call failed");
                let message = err.to_string();
                self.store.add_error(message.clone());
                ResendOtpOutcome::Rejected(message)
            }
        }
    }
}
