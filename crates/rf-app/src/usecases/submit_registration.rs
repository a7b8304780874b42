//! 提交步驟 1 資料並觸發 OTP 發送

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use rf_core::config::RegistrationConfig;
use rf_core::guard::AccessDenied;
use rf_core::ports::{ClockPort, RegistrationApiPort};
use rf_core::registration::FormData;
use rf_core::validators::{validate_form, FieldError};

use crate::store::RegistrationStore;
use crate::token::TokenManager;

use super::api_failure::{handle_api_error, preflight_token_check};

#[derive(Debug, PartialEq)]
pub enum SubmitOutcome {
    /// OTP 已發送，進入步驟 2。
    OtpSent { countdown: u32 },
    /// Field-level validation failed; nothing left the process.
    Invalid(Vec<FieldError>),
    /// The server declined the submission.
    Rejected(String),
    /// Authorization failed; redirect to the error route.
    Denied(AccessDenied),
}

pub struct SubmitRegistration {
    store: Arc<RegistrationStore>,
    api: Arc<dyn RegistrationApiPort>,
    tokens: Arc<TokenManager>,
    clock: Arc<dyn ClockPort>,
    minimum_age: u32,
}

impl SubmitRegistration {
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
            minimum_age: config.minimum_age,
        }
    }

    pub async fn execute(&self, form: FormData) -> SubmitOutcome {
        self.store.clear_errors();

        let errors = validate_form(&form, self.today(), self.minimum_age);
        if !errors.is_empty() {
            debug!(count = errors.len(), "form validation failed");
            return SubmitOutcome::Invalid(errors);
        }

        if let Err(denied) = preflight_token_check(self.tokens.as_ref(), self.clock.as_ref()).await
        {
            return SubmitOutcome::Denied(denied);
        }

        self.store.set_loading(true);
        let result = self.api.submit_registration(&form).await;
        self.store.set_loading(false);

        match result {
            Ok(response) => {
                let otp = response.data.unwrap_or_default();
                if response.success && otp.otp_sent {
                    info!(countdown = otp.countdown, "otp sent, advancing to step 2");
                    self.store.complete_step1(form).await;
                    self.store.set_otp_sent(true, otp.countdown);
                    SubmitOutcome::OtpSent {
                        countdown: otp.countdown,
                    }
                } else {
                    warn!(message = %response.message, "registration declined");
                    self.store.add_error(response.message.clone());
                    SubmitOutcome::Rejected(response.message)
                }
            }
            Err(err) => {
                if let Some(denied) =
                    handle_api_error(self.tokens.as_ref(), self.clock.as_ref(), &err).await
                {
                    return SubmitOutcome::Denied(denied);
                }
                warn!(error = %err, "registration call failed");
                let message = err.to_string();
                self.store.add_error(message.clone());
                SubmitOutcome::Rejected(message)
            }
        }
    }

    fn today(&self) -> NaiveDate {
        chrono::DateTime::from_timestamp_millis(self.clock.now_ms())
            .unwrap_or_default()
            .date_naive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use rf_core::guard::DenyCode;
    use rf_core::ports::{ApiError, ApiResponse, SendOtpData, VerifyOtpData};
    use rf_core::registration::{Address, BirthDate, Step};
    use rf_core::validators::ValidationCode;
    use rf_infra::storage::MemoryKeyValueStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const NOW_MS: i64 = 1_700_000_000_000;
    const NOW_SECS: i64 = NOW_MS / 1000;

    struct FixedClock(i64);

    impl ClockPort for FixedClock {
        fn now_ms(&self) -> i64 {
            self.0
        }
    }

    struct MockApi {
        submit_result: Box<dyn Fn() -> Result<ApiResponse<SendOtpData>, ApiError> + Send + Sync>,
        calls: AtomicUsize,
    }

    impl MockApi {
        fn new(
            submit_result: impl Fn() -> Result<ApiResponse<SendOtpData>, ApiError>
                + Send
                + Sync
                + 'static,
        ) -> Self {
            Self {
                submit_result: Box::new(submit_result),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl RegistrationApiPort for MockApi {
        async fn submit_registration(
            &self,
            _form: &FormData,
        ) -> Result<ApiResponse<SendOtpData>, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.submit_result)()
        }

        async fn verify_otp(
            &self,
            _otp_code: &str,
            _form: &FormData,
        ) -> Result<ApiResponse<VerifyOtpData>, ApiError> {
            unimplemented!("not used by this use case")
        }

        async fn resend_otp(
            &self,
            _phone_number: &str,
        ) -> Result<ApiResponse<SendOtpData>, ApiError> {
            unimplemented!("not used by this use case")
        }

        async fn lookup_cities(&self) -> Result<Vec<String>, ApiError> {
            unimplemented!("not used by this use case")
        }

        async fn lookup_districts(&self, _city: &str) -> Result<Vec<String>, ApiError> {
            unimplemented!("not used by this use case")
        }
    }

    fn complete_form() -> FormData {
        FormData {
            id_number: "A123456789".into(),
            name: "王小明".into(),
            birth_date: BirthDate {
                year: "1990".into(),
                month: "5".into(),
                day: "17".into(),
            },
            address: Address {
                city: "臺北市".into(),
                district: "大安區".into(),
                detail: "信義路三段 1 號".into(),
            },
            phone_number: "0912345678".into(),
            email: "ming@example.com".into(),
            ..Default::default()
        }
    }

    fn make_token(payload: serde_json::Value) -> String {
        format!("header.{}.signature", STANDARD.encode(payload.to_string()))
    }

    async fn fixture(api: MockApi) -> (SubmitRegistration, Arc<RegistrationStore>, Arc<MockApi>) {
        let storage = Arc::new(MemoryKeyValueStore::new());
        let clock: Arc<dyn ClockPort> = Arc::new(FixedClock(NOW_MS));
        let store = RegistrationStore::new(storage.clone(), clock.clone());
        store.initialize_from_persistence().await;
        let tokens = Arc::new(TokenManager::new(storage, clock.clone()));
        tokens
            .set_token(&make_token(
                serde_json::json!({ "exp": NOW_SECS + 3600, "scope": "auth" }),
            ))
            .await;
        let api = Arc::new(api);
        let usecase = SubmitRegistration::new(
            store.clone(),
            api.clone(),
            tokens,
            clock,
            &RegistrationConfig::default(),
        );
        (usecase, store, api)
    }

    fn ok_response() -> Result<ApiResponse<SendOtpData>, ApiError> {
        Ok(ApiResponse {
            success: true,
            message: "驗證碼已發送至您的手機".into(),
            data: Some(SendOtpData {
                otp_sent: true,
                countdown: 300,
            }),
            error_code: None,
        })
    }

    #[tokio::test]
    async fn successful_submission_advances_to_step2() {
        let (usecase, store, _api) = fixture(MockApi::new(ok_response)).await;

        let outcome = usecase.execute(complete_form()).await;
        assert_eq!(outcome, SubmitOutcome::OtpSent { countdown: 300 });

        let state = store.snapshot();
        assert_eq!(state.current_step, Step::Verify);
        assert!(state.otp_sent);
        assert_eq!(state.otp_countdown, 300);
        assert!(!state.loading);
        assert!(state.form_data.unwrap().step1_completed);
    }

    #[tokio::test]
    async fn invalid_form_never_reaches_the_server() {
        let (usecase, store, api) = fixture(MockApi::new(ok_response)).await;
        let mut form = complete_form();
        form.id_number = "A123456788".into();
        form.phone_number = "12345".into();

        let outcome = usecase.execute(form).await;
        let SubmitOutcome::Invalid(errors) = outcome else {
            panic!("expected field errors");
        };
        assert!(errors
            .iter()
            .any(|e| e.path == "idNumber" && e.code == ValidationCode::TaiwanId));
        assert!(errors
            .iter()
            .any(|e| e.path == "phoneNumber" && e.code == ValidationCode::TaiwanPhone));
        assert_eq!(api.calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.snapshot().current_step, Step::Info);
    }

    #[tokio::test]
    async fn underage_applicant_is_rejected_locally() {
        let (usecase, _store, api) = fixture(MockApi::new(ok_response)).await;
        let mut form = complete_form();
        form.birth_date.year = "2015".into();

        let SubmitOutcome::Invalid(errors) = usecase.execute(form).await else {
            panic!("expected field errors");
        };
        assert!(errors
            .iter()
            .any(|e| e.path == "birthDate" && e.code == ValidationCode::MinimumAge));
        assert_eq!(api.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn minimum_age_follows_configuration() {
        let storage = Arc::new(MemoryKeyValueStore::new());
        let clock: Arc<dyn ClockPort> = Arc::new(FixedClock(NOW_MS));
        let store = RegistrationStore::new(storage.clone(), clock.clone());
        store.initialize_from_persistence().await;
        let tokens = Arc::new(TokenManager::new(storage, clock.clone()));
        tokens
            .set_token(&make_token(
                serde_json::json!({ "exp": NOW_SECS + 3600, "scope": "auth" }),
            ))
            .await;
        let api = Arc::new(MockApi::new(ok_response));

        let mut config = RegistrationConfig::default();
        config.minimum_age = 40;
        let usecase = SubmitRegistration::new(store, api.clone(), tokens, clock, &config);

        // 1990 年出生，在預設 18 歲門檻下會通過，40 歲門檻下不會
        let SubmitOutcome::Invalid(errors) = usecase.execute(complete_form()).await else {
            panic!("expected field errors");
        };
        assert!(errors
            .iter()
            .any(|e| e.path == "birthDate" && e.code == ValidationCode::MinimumAge));
        assert_eq!(api.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn declined_submission_surfaces_message() {
        let (usecase, store, _api) = fixture(MockApi::new(|| {
            Ok(ApiResponse {
                success: false,
                message: "手機號碼已註冊".into(),
                data: None,
                error_code: Some("PHONE_TAKEN".into()),
            })
        }))
        .await;

        let outcome = usecase.execute(complete_form()).await;
        assert_eq!(outcome, SubmitOutcome::Rejected("手機號碼已註冊".into()));
        assert_eq!(store.snapshot().errors, vec!["手機號碼已註冊"]);
        assert_eq!(store.snapshot().current_step, Step::Info);
    }

    #[tokio::test]
    async fn unauthorized_response_becomes_denial() {
        let (usecase, _store, _api) = fixture(MockApi::new(|| Err(ApiError::Unauthorized))).await;

        let SubmitOutcome::Denied(denied) = usecase.execute(complete_form()).await else {
            panic!("expected denial");
        };
        assert_eq!(denied.code, DenyCode::ServerUnauthorized);
    }

    #[tokio::test]
    async fn transport_failure_is_an_ordinary_error() {
        let (usecase, store, _api) =
            fixture(MockApi::new(|| Err(ApiError::Transport("連線逾時".into())))).await;

        let SubmitOutcome::Rejected(message) = usecase.execute(complete_form()).await else {
            panic!("expected rejection");
        };
        assert!(message.contains("連線逾時"));
        assert_eq!(store.snapshot().errors.len(), 1);
        assert!(!store.snapshot().loading);
    }

    #[tokio::test]
    async fn expired_token_blocks_before_the_call() {
        let storage = Arc::new(MemoryKeyValueStore::new());
        let clock: Arc<dyn ClockPort> = Arc::new(FixedClock(NOW_MS));
        let store = RegistrationStore::new(storage.clone(), clock.clone());
        store.initialize_from_persistence().await;
        let tokens = Arc::new(TokenManager::new(storage, clock.clone()));
        tokens
            .set_token(&make_token(
                serde_json::json!({ "exp": NOW_SECS - 60, "scope": "auth" }),
            ))
            .await;
        let api = Arc::new(MockApi::new(ok_response));
        let usecase = SubmitRegistration::new(
            store,
            api.clone(),
            tokens.clone(),
            clock,
            &RegistrationConfig::default(),
        );

        let SubmitOutcome::Denied(denied) = usecase.execute(complete_form()).await else {
            panic!("expected denial");
        };
        assert_eq!(denied.code, DenyCode::TokenExpiredHttp);
        assert_eq!(api.calls.load(Ordering::SeqCst), 0);
        assert!(!tokens.has_token().await);
    }
}
