//! File-backed snapshot store
//!
//! Each slot is one `<key>.slot` file under the store directory. Writes
//! go through a temp file plus rename so a reader never sees a half
//! written slot. External writes (another process over the same
//! directory) are picked up by a polling task that diffs the directory
//! against the last observed content; the store's own writes update that
//! snapshot first, so they are never echoed back as changes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::fs;
use tokio::sync::broadcast;
use tokio::task::AbortHandle;
use tracing::{debug, trace, warn};

use rf_core::ports::{KeyValueStorePort, PersistenceError, StorageChange};

const CHANGE_CHANNEL_CAPACITY: usize = 64;
const SLOT_EXTENSION: &str = "slot";

struct Shared {
    dir: PathBuf,
    /// Last content observed per key, by this handle or its poller.
    known: Mutex<HashMap<String, String>>,
    changes: broadcast::Sender<StorageChange>,
}

impl Shared {
    fn slot_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.{SLOT_EXTENSION}"))
    }

    async fn read_dir_snapshot(&self) -> Result<HashMap<String, String>> {
        let mut snapshot = HashMap::new();
        let mut entries = fs::read_dir(&self.dir)
            .await
            .with_context(|| format!("read slot dir failed: {}", self.dir.display()))?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(SLOT_EXTENSION) {
                continue;
            }
            let Some(key) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match fs::read_to_string(&path).await {
                Ok(content) => {
                    snapshot.insert(key.to_string(), content);
                }
                // The writer may have renamed the file away between the
                // directory listing and the read.
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => {
                    warn!(key, error = %err, "failed to read slot file");
                }
            }
        }
        Ok(snapshot)
    }

    /// Diff the directory against the known snapshot and broadcast every
    /// externally changed key.
    async fn poll_once(&self) {
        let on_disk = match self.read_dir_snapshot().await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(error = %err, "slot directory poll failed");
                return;
            }
        };

        let mut changed = Vec::new();
        {
            let mut known = self.known.lock().expect("known snapshot lock poisoned");
            for (key, value) in &on_disk {
                if known.get(key) != Some(value) {
                    changed.push(key.clone());
                }
            }
            for key in known.keys() {
                if !on_disk.contains_key(key) {
                    changed.push(key.clone());
                }
            }
            *known = on_disk;
        }

        for key in changed {
            trace!(key, "external slot change detected");
            let _ = self.changes.send(StorageChange { key });
        }
    }
}

pub struct FileKeyValueStore {
    shared: Arc<Shared>,
    poller: AbortHandle,
}

impl FileKeyValueStore {
    /// Open (or create) a slot directory and start the change poller.
    pub async fn open(dir: impl Into<PathBuf>, poll_interval: Duration) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("create slot dir failed: {}", dir.display()))?;

        let (changes, _rx) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        let shared = Arc::new(Shared {
            dir,
            known: Mutex::new(HashMap::new()),
            changes,
        });

        // Baseline the snapshot so pre-existing slots do not fire as
        // changes on the first tick. Nobody is subscribed yet, so the
        // diff events of this first pass go nowhere.
        shared.poll_once().await;

        let poll_shared = Arc::clone(&shared);
        let poller = tokio::spawn(async move {
            loop {
                tokio::time::sleep(poll_interval).await;
                poll_shared.poll_once().await;
            }
        })
        .abort_handle();

        debug!(dir = %shared.dir.display(), "file key/value store opened");
        Ok(Self { shared, poller })
    }

    async fn atomic_write(&self, path: &Path, content: &str) -> Result<()> {
        let tmp_path = path.with_extension("slot.tmp");
        fs::write(&tmp_path, content)
            .await
            .with_context(|| format!("write temp slot failed: {}", tmp_path.display()))?;
        fs::rename(&tmp_path, path).await.with_context(|| {
            format!(
                "rename temp slot failed: {} -> {}",
                tmp_path.display(),
                path.display()
            )
        })?;
        Ok(())
    }
}

impl Drop for FileKeyValueStore {
    fn drop(&mut self) {
        self.poller.abort();
    }
}

#[async_trait]
impl KeyValueStorePort for FileKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        match fs::read_to_string(self.shared.slot_path(key)).await {
            Ok(content) => Ok(Some(content)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(PersistenceError::ReadFailure(err.to_string())),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        // Record our own write first so the poller does not echo it.
        self.shared
            .known
            .lock()
            .expect("known snapshot lock poisoned")
            .insert(key.to_string(), value.to_string());

        self.atomic_write(&self.shared.slot_path(key), value)
            .await
            .map_err(|err| PersistenceError::WriteFailure(err.to_string()))
    }

    async fn remove(&self, key: &str) -> Result<(), PersistenceError> {
        self.shared
            .known
            .lock()
            .expect("known snapshot lock poisoned")
            .remove(key);

        match fs::remove_file(self.shared.slot_path(key)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(PersistenceError::WriteFailure(err.to_string())),
        }
    }

    fn watch_changes(&self) -> broadcast::Receiver<StorageChange> {
        self.shared.changes.subscribe()
    }
}
