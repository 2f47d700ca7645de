use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::task;
use tracing::{debug, info};

use super::{merge_json, DocumentKey, DocumentStore, StoreError, StoreResult, Subscribers, Subscription};

/// SQLite-backed document store.
///
/// Each document is one JSON body keyed by its path. Every committed write
/// is pushed to the listeners of that path.
#[derive(Clone)]
pub struct SqliteDocumentStore {
    conn: Arc<Mutex<Connection>>,
    subscribers: Arc<Subscribers>,
    db_path: Option<PathBuf>,
}

impl SqliteDocumentStore {
    /// Open (or create) the store at `db_path`
    pub fn open(db_path: &Path) -> StoreResult<Self> {
        // Ensure the parent directory exists
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path)?;
        info!("📁 Document store opened at: {}", db_path.display());

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            subscribers: Subscribers::new(),
            db_path: Some(db_path.to_path_buf()),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store for testing
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            subscribers: Subscribers::new(),
            db_path: None,
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS documents (
                path            TEXT PRIMARY KEY,
                body            TEXT NOT NULL,
                updated_at      INTEGER NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    /// Path of the database file, `None` for in-memory stores
    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Read a document directly, bypassing subscriptions
    pub fn get(&self, key: &DocumentKey) -> StoreResult<Option<Value>> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        read_document(&conn, key)
    }

    /// Number of listeners currently attached to `key`
    pub fn listener_count(&self, key: &DocumentKey) -> usize {
        self.subscribers.count(key)
    }

    /// Apply a write on a blocking thread and fan the new body out.
    ///
    /// Listeners are notified while the connection is still held, so they
    /// see bodies in commit order.
    fn commit(
        &self,
        key: &DocumentKey,
        apply: impl FnOnce(Option<Value>) -> StoreResult<Value> + Send + 'static,
    ) -> impl Future<Output = StoreResult<()>> + Send {
        let conn = Arc::clone(&self.conn);
        let subscribers = Arc::clone(&self.subscribers);
        let key = key.clone();

        async move {
            task::spawn_blocking({
                let key = key.clone();
                move || -> StoreResult<()> {
                    let conn = conn.lock().map_err(|_| StoreError::Poisoned)?;
                    let current = read_document(&conn, &key)?;
                    let next = apply(current)?;
                    conn.execute(
                        "INSERT INTO documents (path, body, updated_at) VALUES (?1, ?2, ?3)
                         ON CONFLICT(path) DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at",
                        params![key.as_str(), serde_json::to_string(&next)?, Utc::now().timestamp_millis()],
                    )?;
                    subscribers.notify(&key, &Some(next));
                    drop(conn);
                    Ok(())
                }
            })
            .await
            .map_err(|e| StoreError::Task(e.to_string()))??;

            debug!("Committed write to {}", key.as_str());
            Ok(())
        }
    }
}

impl DocumentStore for SqliteDocumentStore {
    fn subscribe(&self, key: &DocumentKey) -> StoreResult<Subscription> {
        // Hold the connection while registering so no write slips in between
        // the initial read and the listener becoming visible.
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let current = read_document(&conn, key)?;
        let subscription = self.subscribers.register(key, current)?;
        drop(conn);

        info!("👂 Listening to {}", key.as_str());
        Ok(subscription)
    }

    fn write_merge(
        &self,
        key: &DocumentKey,
        partial: Value,
    ) -> impl Future<Output = StoreResult<()>> + Send {
        self.commit(key, move |current| {
            if !partial.is_object() {
                return Err(StoreError::NotAnObject);
            }
            let mut document = current.unwrap_or_else(|| Value::Object(Default::default()));
            merge_json(&mut document, partial);
            Ok(document)
        })
    }

    fn write_replace(
        &self,
        key: &DocumentKey,
        document: Value,
    ) -> impl Future<Output = StoreResult<()>> + Send {
        self.commit(key, move |_| {
            if !document.is_object() {
                return Err(StoreError::NotAnObject);
            }
            Ok(document)
        })
    }
}

fn read_document(conn: &Connection, key: &DocumentKey) -> StoreResult<Option<Value>> {
    let body: Option<String> = conn
        .query_row(
            "SELECT body FROM documents WHERE path = ?1",
            params![key.as_str()],
            |row| row.get(0),
        )
        .optional()?;

    match body {
        Some(body) => Ok(Some(serde_json::from_str(&body)?)),
        None => Ok(None),
    }
}

// Implement Debug for better error messages
impl std::fmt::Debug for SqliteDocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteDocumentStore")
            .field("db_path", &self.db_path)
            .finish()
    }
}
