/// Identity session
///
/// Resolves the stable user id the gallery document is keyed by. The
/// `IdentityProvider` trait is the boundary with the identity service;
/// `LocalIdentity` is a SQLite-backed provider for single-machine use.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::future::Future;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::info;
use uuid::Uuid;

use crate::error::GalleryError;
use crate::state::data::UserId;

/// Sign-in primitives of an identity service
pub trait IdentityProvider: Send + Sync + 'static {
    /// User of an already established session, if any
    fn current_user(&self) -> impl Future<Output = Result<Option<UserId>, GalleryError>> + Send;

    /// Exchange an externally supplied bearer token for a session
    fn sign_in_with_token(&self, token: &str) -> impl Future<Output = Result<UserId, GalleryError>> + Send;

    fn sign_in_anonymous(&self) -> impl Future<Output = Result<UserId, GalleryError>> + Send;

    fn sign_out(&self) -> impl Future<Output = Result<(), GalleryError>> + Send;

    /// Session changes: the current user, or `None` when signed out
    fn watch(&self) -> watch::Receiver<Option<UserId>>;
}

/// Which branch of the bootstrap policy produced the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionSource {
    Existing,
    Token,
    Anonymous,
}

/// Produce the user id for this process.
///
/// Tries, in order: the session already present, the supplied token,
/// then anonymous sign-in. Any failure is returned as
/// `GalleryError::Initialization`; nothing is retried.
pub async fn bootstrap<I: IdentityProvider>(
    identity: &I,
    token: Option<&str>,
) -> Result<(UserId, SessionSource), GalleryError> {
    match resolve(identity, token).await {
        Ok(resolved) => Ok(resolved),
        Err(GalleryError::Initialization(msg)) => Err(GalleryError::Initialization(msg)),
        Err(e) => Err(GalleryError::Initialization(e.to_string())),
    }
}

async fn resolve<I: IdentityProvider>(
    identity: &I,
    token: Option<&str>,
) -> Result<(UserId, SessionSource), GalleryError> {
    if let Some(user) = identity.current_user().await? {
        return Ok((user, SessionSource::Existing));
    }

    if let Some(token) = token.map(str::trim).filter(|t| !t.is_empty()) {
        let user = identity.sign_in_with_token(token).await?;
        return Ok((user, SessionSource::Token));
    }

    let user = identity.sign_in_anonymous().await?;
    Ok((user, SessionSource::Anonymous))
}

/// SQLite-backed identity: one persisted session slot plus issued tokens
#[derive(Clone)]
pub struct LocalIdentity {
    conn: Arc<Mutex<Connection>>,
    changes: Arc<watch::Sender<Option<UserId>>>,
}

impl LocalIdentity {
    pub fn open(db_path: &Path) -> Result<Self, GalleryError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| GalleryError::Session(e.to_string()))?;
        }
        let conn = Connection::open(db_path).map_err(session_error)?;
        info!("🔐 Identity store opened at: {}", db_path.display());
        Self::with_connection(conn)
    }

    /// Create an in-memory identity for testing
    pub fn in_memory() -> Result<Self, GalleryError> {
        let conn = Connection::open_in_memory().map_err(session_error)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, GalleryError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                slot INTEGER PRIMARY KEY CHECK (slot = 0),
                user_id TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS auth_tokens (
                token TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );
            "#,
        )
        .map_err(session_error)?;

        let current = read_session(&conn)?;
        let (changes, _) = watch::channel(current);

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            changes: Arc::new(changes),
        })
    }

    /// Mint a token that `sign_in_with_token` will exchange for `user`
    pub fn issue_token(&self, user: &UserId) -> Result<String, GalleryError> {
        let token = format!("gst_{}", Uuid::new_v4().simple());
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO auth_tokens (token, user_id, created_at) VALUES (?1, ?2, ?3)",
            params![token, user.as_str(), Utc::now().timestamp()],
        )
        .map_err(session_error)?;
        Ok(token)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, GalleryError> {
        self.conn
            .lock()
            .map_err(|_| GalleryError::Session("identity store lock was poisoned".into()))
    }

    /// Persist `user` as the current session and announce it
    fn establish(&self, user: UserId) -> Result<UserId, GalleryError> {
        {
            let conn = self.lock()?;
            conn.execute(
                "INSERT INTO sessions (slot, user_id, created_at) VALUES (0, ?1, ?2)
                 ON CONFLICT(slot) DO UPDATE SET user_id = excluded.user_id, created_at = excluded.created_at",
                params![user.as_str(), Utc::now().timestamp()],
            )
            .map_err(session_error)?;
        }
        self.changes.send_replace(Some(user.clone()));
        Ok(user)
    }
}

impl IdentityProvider for LocalIdentity {
    fn current_user(&self) -> impl Future<Output = Result<Option<UserId>, GalleryError>> + Send {
        let result = self.lock().and_then(|conn| read_session(&conn));
        async move { result }
    }

    fn sign_in_with_token(&self, token: &str) -> impl Future<Output = Result<UserId, GalleryError>> + Send {
        let result = self
            .lock()
            .and_then(|conn| {
                conn.query_row(
                    "SELECT user_id FROM auth_tokens WHERE token = ?1",
                    params![token],
                    |row| row.get::<_, String>(0),
                )
                .optional()
                .map_err(session_error)
            })
            .and_then(|user| user.ok_or_else(|| GalleryError::Session("the sign-in token was not recognized".into())))
            .and_then(|user| self.establish(UserId::new(user)));
        async move { result }
    }

    fn sign_in_anonymous(&self) -> impl Future<Output = Result<UserId, GalleryError>> + Send {
        let result = self.establish(UserId::new(Uuid::new_v4().to_string()));
        async move { result }
    }

    fn sign_out(&self) -> impl Future<Output = Result<(), GalleryError>> + Send {
        let result = self
            .lock()
            .and_then(|conn| conn.execute("DELETE FROM sessions", []).map_err(session_error))
            .map(|_| {
                info!("👋 Signed out");
                self.changes.send_replace(None);
            });
        async move { result }
    }

    fn watch(&self) -> watch::Receiver<Option<UserId>> {
        self.changes.subscribe()
    }
}

fn read_session(conn: &Connection) -> Result<Option<UserId>, GalleryError> {
    conn.query_row("SELECT user_id FROM sessions WHERE slot = 0", [], |row| {
        row.get::<_, String>(0)
    })
    .optional()
    .map(|user| user.map(UserId::new))
    .map_err(session_error)
}

fn session_error(e: rusqlite::Error) -> GalleryError {
    GalleryError::Session(e.to_string())
}

impl std::fmt::Debug for LocalIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalIdentity")
            .field("current", &*self.changes.borrow())
            .finish()
    }
}
