//! In-memory snapshot store with tab semantics
//!
//! One slot table shared by any number of handles. A write made through
//! one handle notifies every *other* handle, never the writer itself,
//! matching the way browser storage events only fire in other tabs.
//! `open_tab` creates a sibling handle over the same table.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::trace;
use uuid::Uuid;

use rf_core::ports::{KeyValueStorePort, PersistenceError, StorageChange};

const CHANGE_CHANNEL_CAPACITY: usize = 64;

#[derive(Default)]
struct SlotTable {
    slots: HashMap<String, String>,
    listeners: HashMap<Uuid, broadcast::Sender<StorageChange>>,
}

impl SlotTable {
    /// Notify every handle except the writer.
    fn notify_others(&self, writer: Uuid, key: &str) {
        for (id, sender) in &self.listeners {
            if *id == writer {
                continue;
            }
            // A handle with no live receivers just drops the event.
            let _ = sender.send(StorageChange {
                key: key.to_string(),
            });
        }
    }
}

pub struct MemoryKeyValueStore {
    id: Uuid,
    table: Arc<Mutex<SlotTable>>,
    changes: broadcast::Sender<StorageChange>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::attach(Arc::new(Mutex::new(SlotTable::default())))
    }

    /// Another handle over the same slot table, like a second browser tab.
    pub fn open_tab(&self) -> Self {
        Self::attach(Arc::clone(&self.table))
    }

    fn attach(table: Arc<Mutex<SlotTable>>) -> Self {
        let id = Uuid::new_v4();
        let (changes, _rx) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        table
            .lock()
            .expect("slot table lock poisoned")
            .listeners
            .insert(id, changes.clone());
        Self { id, table, changes }
    }
}

impl Default for MemoryKeyValueStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MemoryKeyValueStore {
    fn drop(&mut self) {
        if let Ok(mut table) = self.table.lock() {
            table.listeners.remove(&self.id);
        }
    }
}

#[async_trait]
impl KeyValueStorePort for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        let table = self.table.lock().expect("slot table lock poisoned");
        Ok(table.slots.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        let mut table = self.table.lock().expect("slot table lock poisoned");
        let previous = table.slots.insert(key.to_string(), value.to_string());
        // 值沒變就不廣播（與 storage event 行為一致）
        if previous.as_deref() != Some(value) {
            trace!(key, "slot written");
            table.notify_others(self.id, key);
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), PersistenceError> {
        let mut table = self.table.lock().expect("slot table lock poisoned");
        if table.slots.remove(key).is_some() {
            trace!(key, "slot removed");
            table.notify_others(self.id, key);
        }
        Ok(())
    }

    fn watch_changes(&self) -> broadcast::Receiver<StorageChange> {
        self.changes.subscribe()
    }
}
