use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::form::FormData;

/// Wizard step. The persisted slot stores the decimal number; anything
/// outside {1, 2} clamps on load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Step {
    /// 步驟 1：基本資料
    Info,
    /// 步驟 2：OTP 驗證
    Verify,
}

impl Step {
    pub fn number(self) -> u8 {
        match self {
            Step::Info => 1,
            Step::Verify => 2,
        }
    }

    /// Clamp an arbitrary persisted value into the valid step domain.
    pub fn clamp_from(raw: i64) -> Step {
        if raw >= 2 {
            Step::Verify
        } else {
            Step::Info
        }
    }
}

impl Default for Step {
    fn default() -> Self {
        Step::Info
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.number())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    /// Step 2 reached without complete step-1 data.
    #[error("註冊資料不完整，請回到步驟 1")]
    IncompleteStepData,
    /// Route asked for a step outside the wizard.
    #[error("未知的註冊步驟: {0}")]
    InvalidStepIndex(i64),
}

/// In-memory wizard state published by the registration store.
///
/// Invariant: `current_step == Verify` implies `form_data` is present and
/// complete. The store enforces this on load (downgrade) and the step
/// guard re-checks it on every navigation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegistrationState {
    pub form_data: Option<FormData>,
    pub current_step: Step,
    pub otp_sent: bool,
    /// Resend cooldown in seconds, counted down to zero.
    pub otp_countdown: u32,
    pub errors: Vec<String>,
    pub loading: bool,
}

impl RegistrationState {
    /// Step 1 is valid once every required field (nested groups included)
    /// is non-empty.
    pub fn is_step1_valid(&self) -> bool {
        self.form_data.as_ref().is_some_and(FormData::is_complete)
    }

    /// For step 1 the state is always valid; for step 2 the form data
    /// must be present and complete.
    pub fn is_state_valid(&self) -> bool {
        match self.current_step {
            Step::Info => true,
            Step::Verify => self.is_step1_valid(),
        }
    }

    pub fn is_step2_ready(&self) -> bool {
        self.is_step1_valid() && self.otp_sent
    }

    pub fn can_proceed_to_verify(&self) -> bool {
        self.is_step1_valid() && self.current_step == Step::Info
    }

    pub fn is_registration_complete(&self) -> bool {
        self.form_data
            .as_ref()
            .is_some_and(|form| form.step2_completed)
    }

    /// Resend is allowed once the cooldown has run out and an OTP was sent.
    pub fn can_resend_otp(&self) -> bool {
        self.otp_countdown == 0 && self.otp_sent
    }
}
