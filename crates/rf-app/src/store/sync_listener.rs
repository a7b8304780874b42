//! Cross-tab persistence synchronization
//!
//! Other instances of the wizard write the same persisted slots; their
//! writes arrive here as `StorageChange` events and trigger a full
//! resync of the store. The store's own reentrancy flag keeps a resync
//! triggered by our own write from re-entering the write path.

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::AbortHandle;
use tracing::{debug, warn};

use rf_core::ports::{KeyValueStorePort, FORM_DATA_KEY, STEP_KEY};

use super::RegistrationStore;

/// Background task resyncing the store whenever another tab writes a
/// registration slot. Dropping the listener stops the task.
pub struct SyncListener {
    handle: AbortHandle,
}

impl SyncListener {
    pub fn spawn(store: Arc<RegistrationStore>, storage: &dyn KeyValueStorePort) -> Self {
        let mut changes = storage.watch_changes();
        let handle = tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(change) if change.key == FORM_DATA_KEY || change.key == STEP_KEY => {
                        debug!(key = %change.key, "storage changed in another tab, resyncing");
                        store.sync_from_persistence().await;
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(missed)) => {
                        // Missed notifications collapse into one resync.
                        warn!(missed, "storage change stream lagged, resyncing");
                        store.sync_from_persistence().await;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
        .abort_handle();

        Self { handle }
    }
}

impl Drop for SyncListener {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
