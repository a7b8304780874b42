//! 步驟守衛
//!
//! Keeps the user on the wizard rails: the verification page is only
//! reachable once the profile step has produced complete, valid data.
//! Before deciding, the guard resyncs the store from persistence so a
//! decision is never made against a stale snapshot.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use rf_core::config::RegistrationConfig;
use rf_core::guard::{Guard, GuardContext, GuardOutcome, NavTarget, REGISTER_INFO_PATH};
use rf_core::registration::Step;

use crate::store::RegistrationStore;

pub struct StepGuard {
    store: Arc<RegistrationStore>,
    /// Countdown restarted when the otp-sent flag is self-healed.
    otp_countdown_secs: u32,
}

impl StepGuard {
    pub fn new(store: Arc<RegistrationStore>, config: &RegistrationConfig) -> Self {
        Self {
            store,
            otp_countdown_secs: config.otp.countdown_secs,
        }
    }

    async fn validate_verify_access(&self) -> GuardOutcome {
        let state = self.store.snapshot();

        if !state.is_state_valid() {
            warn!("state incomplete for verification step, redirecting to info");
            return GuardOutcome::Deny(NavTarget::push(REGISTER_INFO_PATH));
        }

        if !state.is_step1_valid() {
            warn!("profile step not completed, redirecting to info");
            return GuardOutcome::Deny(NavTarget::push(REGISTER_INFO_PATH));
        }

        // 自我修復：資料完整但步驟欄位落後時補正
        if state.current_step != Step::Verify {
            debug!("correcting current step to verification");
            self.store.set_current_step(Step::Verify).await;
        }

        if !state.otp_sent {
            debug!("restoring otp-sent flag for verification step");
            self.store.set_otp_sent(true, self.otp_countdown_secs);
        }

        debug!("verification step access granted");
        GuardOutcome::Allow
    }
}

#[async_trait]
impl Guard for StepGuard {
    async fn check(&self, ctx: &GuardContext) -> GuardOutcome {
        debug!(required_step = ?ctx.required_step, path = %ctx.target_path, "step guard checking");

        // Another tab may have advanced or reset the wizard.
        self.store.sync_from_persistence().await;

        match ctx.required_step {
            Some(2) => self.validate_verify_access().await,
            Some(1) | None => GuardOutcome::Allow,
            Some(step) => {
                warn!(step, "unknown step requirement, redirecting to info");
                GuardOutcome::Deny(NavTarget::push(REGISTER_INFO_PATH))
            }
        }
    }
}
