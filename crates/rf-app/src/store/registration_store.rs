//! 註冊流程狀態存儲
//!
//! State lives in one watch channel; every mutation goes through the
//! store's operations, which also keep the persisted snapshot slots in
//! sync. A single reentrancy flag spans both the write path and the
//! resync path so that a storage notification triggered by our own write
//! can never re-enter the write cycle (F5 刷新與多分頁同步的修復點).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::SecondsFormat;
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use rf_core::ports::{
    ClockPort, KeyValueStorePort, AUTH_TOKEN_KEY, FORM_DATA_KEY, INIT_FLAG_KEY, STEP_KEY,
};
use rf_core::registration::{FormData, FormDataPatch, RegistrationState, Step};

pub struct RegistrationStore {
    storage: Arc<dyn KeyValueStorePort>,
    clock: Arc<dyn ClockPort>,
    state: Arc<watch::Sender<RegistrationState>>,
    /// One flag for the whole read-modify-write cycle, update and resync
    /// alike. Execution is cooperative, so a bool is enough.
    syncing: AtomicBool,
    initialized: AtomicBool,
    countdown_task: Mutex<Option<AbortHandle>>,
}

impl RegistrationStore {
    pub fn new(storage: Arc<dyn KeyValueStorePort>, clock: Arc<dyn ClockPort>) -> Arc<Self> {
        let (tx, _rx) = watch::channel(RegistrationState::default());
        Arc::new(Self {
            storage,
            clock,
            state: Arc::new(tx),
            syncing: AtomicBool::new(false),
            initialized: AtomicBool::new(false),
            countdown_task: Mutex::new(None),
        })
    }

    /// Subscribe to state changes.
    pub fn subscribe(&self) -> watch::Receiver<RegistrationState> {
        self.state.subscribe()
    }

    /// Current state, cloned.
    pub fn snapshot(&self) -> RegistrationState {
        self.state.borrow().clone()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    // === 初始化 / 同步 ===

    /// Load the persisted snapshot into memory.
    ///
    /// Idempotent: with an unchanged snapshot, repeated calls produce an
    /// identical state. A persisted step of 2 without complete form data
    /// downgrades to step 1 and immediately corrects the persisted slot;
    /// a persisted step of 2 *with* complete data restores the OTP-sent
    /// flag lost on reload. Read failures fail open to defaults.
    pub async fn initialize_from_persistence(&self) {
        if self
            .syncing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("initialization skipped, another sync cycle in flight");
            return;
        }
        self.initialize_locked().await;
        self.syncing.store(false, Ordering::SeqCst);
    }

    async fn initialize_locked(&self) {
        let stored_form = match self.storage.get(FORM_DATA_KEY).await {
            Ok(Some(raw)) => match serde_json::from_str::<FormData>(&raw) {
                Ok(form) => Some(form),
                Err(err) => {
                    warn!(error = %err, "persisted form data unreadable, treating as absent");
                    None
                }
            },
            Ok(None) => None,
            Err(err) => {
                warn!(error = %err, "failed to read persisted form data, resetting to defaults");
                self.reset_to_defaults().await;
                return;
            }
        };

        let stored_step = match self.storage.get(STEP_KEY).await {
            Ok(Some(raw)) => Step::clamp_from(raw.trim().parse::<i64>().unwrap_or(1)),
            Ok(None) => Step::Info,
            Err(err) => {
                warn!(error = %err, "failed to read persisted step, resetting to defaults");
                self.reset_to_defaults().await;
                return;
            }
        };

        // 基於資料存在性驗證步驟
        let mut step = stored_step;
        let mut restore_otp_sent = false;
        if stored_step == Step::Verify {
            let complete = stored_form.as_ref().is_some_and(FormData::is_complete);
            if complete {
                restore_otp_sent = true;
            } else {
                warn!("step 2 persisted but form data incomplete, downgrading to step 1");
                step = Step::Info;
                self.save_step(Step::Info).await;
            }
        }

        self.state.send_if_modified(|state| {
            let changed = state.form_data != stored_form
                || state.current_step != step
                || (restore_otp_sent && !state.otp_sent);
            state.form_data = stored_form.clone();
            state.current_step = step;
            if restore_otp_sent {
                state.otp_sent = true;
            }
            changed
        });

        self.initialized.store(true, Ordering::SeqCst);
        if let Err(err) = self.storage.set(INIT_FLAG_KEY, "true").await {
            warn!(error = %err, "failed to persist init flag");
        }

        info!(
            has_form_data = self.state.borrow().form_data.is_some(),
            current_step = %step,
            otp_sent = self.state.borrow().otp_sent,
            "registration store initialized"
        );
    }

    async fn reset_to_defaults(&self) {
        self.cancel_countdown();
        self.state.send_modify(|state| *state = RegistrationState::default());
        self.initialized.store(true, Ordering::SeqCst);
        for key in [FORM_DATA_KEY, STEP_KEY, INIT_FLAG_KEY] {
            if let Err(err) = self.storage.remove(key).await {
                warn!(key, error = %err, "failed to clear persisted slot");
            }
        }
    }

    /// Re-read the persisted snapshot (guards and the cross-tab listener
    /// call this). No-op while a write is in flight.
    pub async fn sync_from_persistence(&self) {
        if self.syncing.load(Ordering::SeqCst) {
            debug!("resync skipped, write in flight");
            return;
        }
        self.initialize_from_persistence().await;
    }

    // === 數據操作 ===

    /// Merge a partial update into the form data and persist the result.
    pub async fn update_form_data(&self, patch: FormDataPatch) {
        if self
            .syncing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("form update skipped, sync cycle in flight");
            return;
        }

        let mut form = self.state.borrow().form_data.clone().unwrap_or_default();
        patch.apply(&mut form);

        self.state
            .send_modify(|state| state.form_data = Some(form.clone()));

        match serde_json::to_string(&form) {
            Ok(json) => {
                if let Err(err) = self.storage.set(FORM_DATA_KEY, &json).await {
                    warn!(error = %err, "failed to persist form data");
                    self.add_error("數據更新失敗");
                }
            }
            Err(err) => {
                warn!(error = %err, "failed to serialize form data");
                self.add_error("數據更新失敗");
            }
        }

        self.syncing.store(false, Ordering::SeqCst);
    }

    /// 完成步驟 1（基本資料），前進到步驟 2。
    pub async fn complete_step1(&self, form: FormData) {
        let mut patch = FormDataPatch::from(form);
        patch.step1_completed = Some(true);
        patch.step1_completed_at = Some(self.now_iso());
        self.update_form_data(patch).await;
        self.set_current_step(Step::Verify).await;
    }

    /// 完成步驟 2（OTP 驗證）。呼叫方在終態成功後負責 `clear_all`。
    pub async fn complete_step2(&self, otp_code: &str) {
        let patch = FormDataPatch {
            otp_code: Some(otp_code.to_string()),
            step2_completed: Some(true),
            step2_completed_at: Some(self.now_iso()),
            ..Default::default()
        };
        self.update_form_data(patch).await;
    }

    /// Persist and publish the step, only when it actually changes.
    pub async fn set_current_step(&self, step: Step) {
        let changed = self.state.send_if_modified(|state| {
            if state.current_step == step {
                return false;
            }
            state.current_step = step;
            true
        });
        if changed {
            self.save_step(step).await;
            debug!(step = %step, "step updated");
        }
    }

    /// Flag the OTP as sent and start (or stop) the resend countdown.
    pub fn set_otp_sent(&self, sent: bool, countdown_secs: u32) {
        self.state.send_modify(|state| {
            state.otp_sent = sent;
            state.otp_countdown = countdown_secs;
        });
        if sent {
            self.start_countdown(countdown_secs);
        } else {
            self.cancel_countdown();
        }
    }

    pub fn set_loading(&self, loading: bool) {
        self.state.send_modify(|state| state.loading = loading);
    }

    pub fn add_error(&self, message: impl Into<String>) {
        let message = message.into();
        self.state.send_modify(|state| state.errors.push(message));
    }

    pub fn clear_errors(&self) {
        self.state.send_modify(|state| state.errors.clear());
    }

    /// Reset every field to defaults and clear all four persisted slots.
    pub async fn clear_all(&self) {
        self.cancel_countdown();
        self.state
            .send_modify(|state| *state = RegistrationState::default());
        for key in [FORM_DATA_KEY, STEP_KEY, INIT_FLAG_KEY, AUTH_TOKEN_KEY] {
            if let Err(err) = self.storage.remove(key).await {
                warn!(key, error = %err, "failed to clear persisted slot");
            }
        }
        info!("registration state cleared");
    }

    /// Back to step 1, dropping OTP progress and errors but keeping the
    /// entered form data.
    pub async fn reset_to_step1(&self) {
        self.cancel_countdown();
        self.state.send_modify(|state| {
            state.current_step = Step::Info;
            state.otp_sent = false;
            state.otp_countdown = 0;
            state.errors.clear();
        });
        self.save_step(Step::Info).await;
    }

    // === 計算屬性 ===

    pub fn is_step1_valid(&self) -> bool {
        self.state.borrow().is_step1_valid()
    }

    pub fn is_state_valid(&self) -> bool {
        self.state.borrow().is_state_valid()
    }

    pub fn can_resend_otp(&self) -> bool {
        self.state.borrow().can_resend_otp()
    }

    pub fn is_step2_ready(&self) -> bool {
        self.state.borrow().is_step2_ready()
    }

    pub fn can_proceed_to_verify(&self) -> bool {
        self.state.borrow().can_proceed_to_verify()
    }

    pub fn is_registration_complete(&self) -> bool {
        self.state.borrow().is_registration_complete()
    }

    // === 倒數計時 ===

    fn start_countdown(&self, seconds: u32) {
        self.cancel_countdown();
        if seconds == 0 {
            return;
        }

        let state = Arc::clone(&self.state);
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                let mut finished = false;
                state.send_modify(|state| {
                    if state.otp_countdown > 0 {
                        state.otp_countdown -= 1;
                    }
                    finished = state.otp_countdown == 0;
                });
                if finished {
                    break;
                }
            }
        })
        .abort_handle();

        *self.countdown_task.lock().expect("countdown lock poisoned") = Some(handle);
        debug!(seconds, "otp countdown started");
    }

    /// Idempotent; releases the tick task if one is running.
    fn cancel_countdown(&self) {
        if let Some(handle) = self
            .countdown_task
            .lock()
            .expect("countdown lock poisoned")
            .take()
        {
            handle.abort();
            debug!("otp countdown cancelled");
        }
    }

    // === 內部 ===

    async fn save_step(&self, step: Step) {
        if let Err(err) = self.storage.set(STEP_KEY, &step.number().to_string()).await {
            warn!(error = %err, "failed to persist step");
        }
    }

    fn now_iso(&self) -> String {
        chrono::DateTime::from_timestamp_millis(self.clock.now_ms())
            .unwrap_or_default()
            .to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

impl Drop for RegistrationStore {
    fn drop(&mut self) {
        self.cancel_countdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rf_core::registration::{Address, BirthDate};
    use rf_infra::storage::MemoryKeyValueStore;
    use rf_infra::time::SystemClock;

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

    fn new_store() -> (Arc<RegistrationStore>, Arc<MemoryKeyValueStore>) {
        let storage = Arc::new(MemoryKeyValueStore::new());
        let store = RegistrationStore::new(storage.clone(), Arc::new(SystemClock));
        (store, storage)
    }

    #[tokio::test]
    async fn initialize_with_empty_storage_yields_defaults() {
        let (store, _storage) = new_store();
        store.initialize_from_persistence().await;

        let state = store.snapshot();
        assert_eq!(state, RegistrationState::default());
        assert!(store.is_initialized());
    }

    #[tokio::test]
    async fn initialize_is_idempotent() {
        let (store, storage) = new_store();
        storage
            .set(
                FORM_DATA_KEY,
                &serde_json::to_string(&complete_form()).unwrap(),
            )
            .await
            .unwrap();
        storage.set(STEP_KEY, "2").await.unwrap();

        store.initialize_from_persistence().await;
        let first = store.snapshot();
        store.initialize_from_persistence().await;
        let second = store.snapshot();

        assert_eq!(first, second);
        assert_eq!(first.current_step, Step::Verify);
        assert!(first.otp_sent);
    }

    #[tokio::test]
    async fn step2_with_incomplete_data_downgrades_and_corrects_slot() {
        let (store, storage) = new_store();
        let mut form = complete_form();
        form.email.clear();
        storage
            .set(FORM_DATA_KEY, &serde_json::to_string(&form).unwrap())
            .await
            .unwrap();
        storage.set(STEP_KEY, "2").await.unwrap();

        store.initialize_from_persistence().await;

        assert_eq!(store.snapshot().current_step, Step::Info);
        assert!(!store.snapshot().otp_sent);
        assert_eq!(
            storage.get(STEP_KEY).await.unwrap().as_deref(),
            Some("1"),
            "persisted step slot must be corrected"
        );
    }

    #[tokio::test]
    async fn step2_with_missing_data_downgrades() {
        let (store, storage) = new_store();
        storage.set(STEP_KEY, "2").await.unwrap();

        store.initialize_from_persistence().await;

        assert_eq!(store.snapshot().current_step, Step::Info);
        assert_eq!(storage.get(STEP_KEY).await.unwrap().as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn corrupt_form_json_treated_as_absent() {
        let (store, storage) = new_store();
        storage.set(FORM_DATA_KEY, "{not json").await.unwrap();
        storage.set(STEP_KEY, "2").await.unwrap();

        store.initialize_from_persistence().await;

        let state = store.snapshot();
        assert!(state.form_data.is_none());
        assert_eq!(state.current_step, Step::Info);
    }

    #[tokio::test]
    async fn out_of_range_step_clamps() {
        let (store, storage) = new_store();
        storage.set(STEP_KEY, "7").await.unwrap();
        store.initialize_from_persistence().await;
        // clamped to 2, then downgraded for lack of data
        assert_eq!(store.snapshot().current_step, Step::Info);

        storage.set(STEP_KEY, "0").await.unwrap();
        store.sync_from_persistence().await;
        assert_eq!(store.snapshot().current_step, Step::Info);
    }

    #[tokio::test]
    async fn update_form_data_merges_and_persists() {
        let (store, storage) = new_store();
        store.initialize_from_persistence().await;

        store
            .update_form_data(FormDataPatch {
                id_number: Some("A123456789".into()),
                name: Some("王小明".into()),
                ..Default::default()
            })
            .await;
        store
            .update_form_data(FormDataPatch {
                email: Some("ming@example.com".into()),
                ..Default::default()
            })
            .await;

        let form = store.snapshot().form_data.unwrap();
        assert_eq!(form.id_number, "A123456789");
        assert_eq!(form.email, "ming@example.com");

        let persisted: FormData =
            serde_json::from_str(&storage.get(FORM_DATA_KEY).await.unwrap().unwrap()).unwrap();
        assert_eq!(persisted, form);
    }

    #[tokio::test]
    async fn complete_step1_advances_and_stamps() {
        let (store, storage) = new_store();
        store.initialize_from_persistence().await;

        store.complete_step1(complete_form()).await;

        let state = store.snapshot();
        assert_eq!(state.current_step, Step::Verify);
        let form = state.form_data.unwrap();
        assert!(form.step1_completed);
        assert!(form.step1_completed_at.is_some());
        assert_eq!(storage.get(STEP_KEY).await.unwrap().as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn complete_step2_records_otp_without_advancing() {
        let (store, _storage) = new_store();
        store.initialize_from_persistence().await;
        store.complete_step1(complete_form()).await;

        store.complete_step2("123456").await;

        let state = store.snapshot();
        assert_eq!(state.current_step, Step::Verify);
        let form = state.form_data.unwrap();
        assert_eq!(form.otp_code.as_deref(), Some("123456"));
        assert!(form.step2_completed);
        assert!(form.step2_completed_at.is_some());
    }

    #[tokio::test]
    async fn set_current_step_skips_redundant_writes() {
        let (store, storage) = new_store();
        store.initialize_from_persistence().await;
        store.set_current_step(Step::Info).await;
        // never went to step 2, and step 1 was already current: no write
        assert_eq!(storage.get(STEP_KEY).await.unwrap(), None);

        store.set_current_step(Step::Verify).await;
        assert_eq!(storage.get(STEP_KEY).await.unwrap().as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn clear_all_removes_all_four_slots() {
        let (store, storage) = new_store();
        store.initialize_from_persistence().await;
        store.complete_step1(complete_form()).await;
        store.set_otp_sent(true, 60);
        storage.set(AUTH_TOKEN_KEY, "h.p.s").await.unwrap();

        store.clear_all().await;

        let state = store.snapshot();
        assert_eq!(state.current_step, Step::Info);
        assert!(state.form_data.is_none());
        assert!(!state.otp_sent);
        assert_eq!(state.otp_countdown, 0);
        for key in [FORM_DATA_KEY, STEP_KEY, INIT_FLAG_KEY, AUTH_TOKEN_KEY] {
            assert_eq!(storage.get(key).await.unwrap(), None, "slot {key} remains");
        }
    }

    #[tokio::test]
    async fn reset_to_step1_keeps_form_data() {
        let (store, storage) = new_store();
        store.initialize_from_persistence().await;
        store.complete_step1(complete_form()).await;
        store.set_otp_sent(true, 60);
        store.add_error("驗證碼錯誤，請重新輸入");

        store.reset_to_step1().await;

        let state = store.snapshot();
        assert_eq!(state.current_step, Step::Info);
        assert!(!state.otp_sent);
        assert_eq!(state.otp_countdown, 0);
        assert!(state.errors.is_empty());
        assert!(state.form_data.is_some());
        assert_eq!(storage.get(STEP_KEY).await.unwrap().as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn errors_append_and_clear() {
        let (store, _storage) = new_store();
        store.add_error("first");
        store.add_error("second");
        assert_eq!(store.snapshot().errors, vec!["first", "second"]);
        store.clear_errors();
        assert!(store.snapshot().errors.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_ticks_down_each_second() {
        let (store, _storage) = new_store();
        store.set_otp_sent(true, 60);
        assert_eq!(store.snapshot().otp_countdown, 60);
        // let the tick task register its first sleep before advancing
        tokio::task::yield_now().await;

        for _ in 0..3 {
            tokio::time::advance(std::time::Duration::from_secs(1)).await;
            tokio::task::yield_now().await;
        }

        assert_eq!(store.snapshot().otp_countdown, 57);
        assert!(!store.can_resend_otp());
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_reaches_zero_and_allows_resend() {
        let (store, _storage) = new_store();
        store.set_otp_sent(true, 2);
        assert!(!store.can_resend_otp());
        tokio::task::yield_now().await;

        for _ in 0..2 {
            tokio::time::advance(std::time::Duration::from_secs(1)).await;
            tokio::task::yield_now().await;
        }

        assert_eq!(store.snapshot().otp_countdown, 0);
        assert!(store.can_resend_otp());

        // the tick task is done: nothing keeps decrementing
        tokio::time::advance(std::time::Duration::from_secs(5)).await;
        tokio::task::yield_now().await;
        assert_eq!(store.snapshot().otp_countdown, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn restarting_countdown_replaces_timer() {
        let (store, _storage) = new_store();
        store.set_otp_sent(true, 10);
        tokio::task::yield_now().await;
        tokio::time::advance(std::time::Duration::from_secs(1)).await;
        tokio::task::yield_now().await;
        assert_eq!(store.snapshot().otp_countdown, 9);

        store.set_otp_sent(true, 60);
        tokio::task::yield_now().await;
        for _ in 0..2 {
            tokio::time::advance(std::time::Duration::from_secs(1)).await;
            tokio::task::yield_now().await;
        }
        assert_eq!(store.snapshot().otp_countdown, 58);
    }

    #[tokio::test(start_paused = true)]
    async fn clear_all_cancels_countdown() {
        let (store, _storage) = new_store();
        store.set_otp_sent(true, 60);
        store.clear_all().await;

        tokio::time::advance(std::time::Duration::from_secs(3)).await;
        tokio::task::yield_now().await;
        assert_eq!(store.snapshot().otp_countdown, 0);
    }

    #[tokio::test]
    async fn resync_picks_up_external_write() {
        let (store, storage) = new_store();
        store.initialize_from_persistence().await;
        assert!(store.snapshot().form_data.is_none());

        // 另一個分頁寫入
        let other_tab = storage.open_tab();
        other_tab
            .set(
                FORM_DATA_KEY,
                &serde_json::to_string(&complete_form()).unwrap(),
            )
            .await
            .unwrap();
        other_tab.set(STEP_KEY, "2").await.unwrap();

        store.sync_from_persistence().await;

        let state = store.snapshot();
        assert_eq!(state.current_step, Step::Verify);
        assert!(state.otp_sent);
        assert!(state.form_data.is_some());
    }
}
