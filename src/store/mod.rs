/// Real-time document store
///
/// This module defines the boundary with the gallery document store:
/// - `DocumentStore`: subscribe / merge-write / replace-write on JSON documents
/// - `Subscription`: a change stream that unregisters itself on drop
/// - `Subscribers`: fan-out registry shared by store implementations
/// - `merge_json`: the deep-merge rule used by merge writes
///
/// The concrete backend lives in `sqlite.rs`.

pub mod sqlite;

use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::state::data::UserId;

pub use sqlite::SqliteDocumentStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Document writes must be JSON objects")]
    NotAnObject,
    #[error("Store connection lock was poisoned")]
    Poisoned,
    #[error("Background task failed: {0}")]
    Task(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A snapshot is the whole document, or `None` when it does not exist
pub type Snapshot = Option<Value>;

/// Path of a document in the store's namespace
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentKey(String);

impl DocumentKey {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// Key of a user's gallery document: `artifacts/{app_id}/users/{user_id}/gallery`
    pub fn gallery(app_id: &str, user: &UserId) -> Self {
        Self(format!("artifacts/{}/users/{}/gallery", app_id, user))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Read/write/subscribe primitives of a document database
pub trait DocumentStore: Send + Sync + 'static {
    /// Listen to a document. The current snapshot is delivered first,
    /// then one snapshot per committed write to `key`.
    fn subscribe(&self, key: &DocumentKey) -> StoreResult<Subscription>;

    /// Deep-merge `partial` into the document, creating it if absent
    fn write_merge(
        &self,
        key: &DocumentKey,
        partial: Value,
    ) -> impl Future<Output = StoreResult<()>> + Send;

    /// Overwrite the whole document
    fn write_replace(
        &self,
        key: &DocumentKey,
        document: Value,
    ) -> impl Future<Output = StoreResult<()>> + Send;
}

/// Live change stream for one document
///
/// Dropping it removes the listener from the store.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    receiver: mpsc::UnboundedReceiver<Snapshot>,
    registry: Arc<Subscribers>,
}

impl Subscription {
    /// Wait for the next snapshot. `None` once the store has gone away.
    pub async fn next(&mut self) -> Option<Snapshot> {
        self.receiver.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.registry.remove(self.id);
    }
}

/// Registry of live listeners, keyed by subscription id
#[derive(Debug, Default)]
pub struct Subscribers {
    next_id: AtomicU64,
    listeners: Mutex<HashMap<u64, (DocumentKey, mpsc::UnboundedSender<Snapshot>)>>,
}

impl Subscribers {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a listener and hand it its first snapshot
    pub fn register(self: &Arc<Self>, key: &DocumentKey, initial: Snapshot) -> StoreResult<Subscription> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::unbounded_channel();
        // Receiver is alive, so this cannot fail
        let _ = sender.send(initial);

        self.listeners
            .lock()
            .map_err(|_| StoreError::Poisoned)?
            .insert(id, (key.clone(), sender));

        Ok(Subscription {
            id,
            receiver,
            registry: Arc::clone(self),
        })
    }

    /// Deliver a snapshot to every listener on `key`
    pub fn notify(&self, key: &DocumentKey, snapshot: &Snapshot) {
        let Ok(mut listeners) = self.listeners.lock() else {
            return;
        };
        listeners.retain(|_, (listener_key, sender)| {
            if listener_key != key {
                return true;
            }
            sender.send(snapshot.clone()).is_ok()
        });
    }

    /// Number of live listeners on `key`
    pub fn count(&self, key: &DocumentKey) -> usize {
        self.listeners
            .lock()
            .map(|listeners| listeners.values().filter(|(k, _)| k == key).count())
            .unwrap_or(0)
    }

    fn remove(&self, id: u64) {
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.remove(&id);
        }
    }
}

/// Deep-merge `patch` into `target`.
///
/// Objects merge key by key (new keys append at the end); any other value,
/// arrays included, replaces what was there.
pub fn merge_json(target: &mut Value, patch: Value) {
    match (target, patch) {
        (Value::Object(target_map), Value::Object(patch_map)) => {
            for (key, patch_value) in patch_map {
                match target_map.get_mut(&key) {
                    Some(existing) => merge_json(existing, patch_value),
                    None => {
                        target_map.insert(key, patch_value);
                    }
                }
            }
        }
        (target, patch) => *target = patch,
    }
}
