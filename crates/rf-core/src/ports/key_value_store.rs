//! Key/value persistence port - abstracts the shared snapshot slots
//!
//! The persisted snapshot is a set of independent string-valued slots
//! shared by every instance (tab/window) of the wizard. Writes in one
//! instance surface in the others through the change stream; there is no
//! cross-instance lock, consistency is eventual and notification-driven.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;

/// 表單資料（JSON）
pub const FORM_DATA_KEY: &str = "registrationData";
/// 目前步驟（十進位字串，限 1..=2）
pub const STEP_KEY: &str = "registrationStep";
/// 初始化旗標
pub const INIT_FLAG_KEY: &str = "registrationStateInitialized";
/// Bearer token
pub const AUTH_TOKEN_KEY: &str = "authToken";

/// A slot written by a *different* handle of the same shared snapshot.
///
/// Implementations must not echo a handle's own writes back to it; this
/// mirrors the browser storage event, which only fires in other tabs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageChange {
    pub key: String,
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("storage read failed: {0}")]
    ReadFailure(String),

    #[error("storage write failed: {0}")]
    WriteFailure(String),
}

/// Key/value persistence port.
///
/// Consumers fail open on errors: a slot that cannot be read is treated
/// as absent, a failed write is logged and surfaced as a state error
/// message, never as a crash of the guard chain.
#[async_trait]
pub trait KeyValueStorePort: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, PersistenceError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), PersistenceError>;

    async fn remove(&self, key: &str) -> Result<(), PersistenceError>;

    /// Subscribe to writes made by other handles of the same snapshot.
    fn watch_changes(&self) -> broadcast::Receiver<StorageChange>;
}
