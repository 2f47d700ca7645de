use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use super::commands::{self, DocumentWrite};
use super::state::{CommandFailure, CommandKind, CommandOutcome, Effect, Event, GalleryState, Intent};
use crate::config::Config;
use crate::error::GalleryError;
use crate::media;
use crate::session::{self, IdentityProvider};
use crate::state::data::{Folder, FolderId, GalleryDocument, UserId};
use crate::store::{DocumentKey, DocumentStore, Snapshot, Subscription};

/// Front door to a running gallery: send intents, watch state
#[derive(Debug, Clone)]
pub struct GalleryHandle {
    intents: mpsc::UnboundedSender<Intent>,
    state: watch::Receiver<GalleryState>,
}

impl GalleryHandle {
    /// Queue a user intent. Fails only once the runtime has stopped.
    pub fn send(&self, intent: Intent) -> Result<(), GalleryError> {
        self.intents
            .send(intent)
            .map_err(|_| GalleryError::Initialization("the gallery runtime has stopped".into()))
    }

    /// Receiver of every new state the reducer produces
    pub fn state(&self) -> watch::Receiver<GalleryState> {
        self.state.clone()
    }
}

/// Start the coordinating loop on the current tokio runtime.
///
/// The loop stops, releasing its subscription, once every handle is dropped.
pub fn spawn<S, I>(store: S, identity: I, config: Config) -> GalleryHandle
where
    S: DocumentStore,
    I: IdentityProvider,
{
    let (intents_tx, intents_rx) = mpsc::unbounded_channel();
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (state_tx, state_rx) = watch::channel(GalleryState::default());

    let runtime = GalleryRuntime {
        store: Arc::new(store),
        session: identity.watch(),
        identity: Arc::new(identity),
        config,
        state: GalleryState::default(),
        events_tx,
        events_rx,
        intents_rx,
        state_tx,
        subscription: None,
    };
    tokio::spawn(runtime.run());

    GalleryHandle {
        intents: intents_tx,
        state: state_rx,
    }
}

/// The one subscription held for the signed-in user
struct ActiveSubscription {
    user: UserId,
    subscription: Subscription,
}

impl Drop for ActiveSubscription {
    fn drop(&mut self) {
        info!("🔌 Released gallery subscription for {}", self.user);
    }
}

enum Step {
    Event(Event),
    SessionChanged(bool),
    Snapshot(UserId, Option<Snapshot>),
    Shutdown,
}

struct GalleryRuntime<S, I> {
    store: Arc<S>,
    identity: Arc<I>,
    session: watch::Receiver<Option<UserId>>,
    config: Config,
    state: GalleryState,
    /// Results of background work re-enter the loop here
    events_tx: mpsc::UnboundedSender<Event>,
    events_rx: mpsc::UnboundedReceiver<Event>,
    intents_rx: mpsc::UnboundedReceiver<Intent>,
    state_tx: watch::Sender<GalleryState>,
    subscription: Option<ActiveSubscription>,
}

impl<S, I> GalleryRuntime<S, I>
where
    S: DocumentStore,
    I: IdentityProvider,
{
    async fn run(mut self) {
        self.start_session();
        let mut session_open = true;

        loop {
            let step = tokio::select! {
                Some(event) = self.events_rx.recv() => Step::Event(event),
                intent = self.intents_rx.recv() => match intent {
                    Some(intent) => Step::Event(Event::Intent(intent)),
                    None => Step::Shutdown,
                },
                changed = self.session.changed(), if session_open => Step::SessionChanged(changed.is_ok()),
                (user, snapshot) = next_snapshot(&mut self.subscription) => Step::Snapshot(user, snapshot),
            };

            match step {
                Step::Event(event) => self.dispatch(event),
                Step::SessionChanged(true) => {
                    let current = self.session.borrow_and_update().clone();
                    match current {
                        Some(user) => self.dispatch(Event::SessionResolved(user)),
                        None => self.dispatch(Event::SessionEnded),
                    }
                }
                // Identity provider went away; keep the session we have
                Step::SessionChanged(false) => session_open = false,
                Step::Snapshot(user, Some(snapshot)) => {
                    let event = decode_snapshot(user, snapshot);
                    self.dispatch(event);
                }
                Step::Snapshot(user, None) => {
                    warn!("Document store closed the subscription for {}", user);
                    self.subscription = None;
                    self.dispatch(Event::SessionFailed("the document store closed the connection".into()));
                }
                Step::Shutdown => break,
            }
        }

        self.subscription = None;
        info!("Gallery runtime stopped");
    }

    /// Resolve the user in the background, reporting back through the queue
    fn start_session(&self) {
        let identity = Arc::clone(&self.identity);
        let token = self.config.auth_token.clone();
        let events = self.events_tx.clone();

        tokio::spawn(async move {
            let event = match session::bootstrap(&*identity, token.as_deref()).await {
                Ok((user, source)) => {
                    info!("🔑 Session resolved for {} ({:?})", user, source);
                    Event::SessionResolved(user)
                }
                Err(e) => {
                    error!("❌ {}", e);
                    Event::SessionFailed(match e {
                        GalleryError::Initialization(msg) => msg,
                        other => other.to_string(),
                    })
                }
            };
            let _ = events.send(event);
        });
    }

    fn dispatch(&mut self, event: Event) {
        let state = std::mem::take(&mut self.state);
        let (next, effects) = state.update(event);
        self.state = next;

        for effect in effects {
            self.execute(effect);
        }
        self.state_tx.send_replace(self.state.clone());
    }

    fn key_for(&self, user: &UserId) -> DocumentKey {
        DocumentKey::gallery(&self.config.app_id, user)
    }

    fn execute(&mut self, effect: Effect) {
        match effect {
            Effect::Subscribe(user) => {
                // Release the previous listener before acquiring the next
                self.subscription = None;
                match self.store.subscribe(&self.key_for(&user)) {
                    Ok(subscription) => {
                        info!("👂 Subscribed to gallery of {}", user);
                        self.subscription = Some(ActiveSubscription { user, subscription });
                    }
                    Err(e) => {
                        error!("❌ Could not subscribe to gallery of {}: {}", user, e);
                        self.dispatch(Event::SessionFailed(e.to_string()));
                    }
                }
            }
            Effect::Unsubscribe => {
                self.subscription = None;
            }
            Effect::InitializeDocument(user) => {
                info!("🆕 Creating empty gallery for {}", user);
                self.spawn_command(
                    user,
                    DocumentWrite::Replace(commands::empty_document()),
                    CommandOutcome::DocumentInitialized,
                    CommandKind::InitializeDocument,
                );
            }
            Effect::Write {
                user,
                write,
                on_success,
                command,
            } => self.spawn_command(user, write, on_success, command),
            Effect::EncodeAndUpload {
                user,
                folder_id,
                folder,
                files,
            } => {
                let store = Arc::clone(&self.store);
                let key = self.key_for(&user);
                let events = self.events_tx.clone();
                let max_bytes = self.config.max_media_bytes;

                tokio::spawn(async move {
                    let result = upload(&*store, &key, &folder_id, &folder, &files, max_bytes)
                        .await
                        .map_err(|e| failure(CommandKind::UploadMedia, e));
                    let _ = events.send(Event::CommandFinished(result));
                });
            }
        }
    }

    fn spawn_command(&self, user: UserId, write: DocumentWrite, on_success: CommandOutcome, command: CommandKind) {
        let store = Arc::clone(&self.store);
        let key = self.key_for(&user);
        let events = self.events_tx.clone();

        tokio::spawn(async move {
            let result = match apply_write(&*store, &key, write).await {
                Ok(()) => {
                    info!("✅ {:?} written to {}", command, key.as_str());
                    Ok(on_success)
                }
                Err(e) => Err(failure(command, e)),
            };
            let _ = events.send(Event::CommandFinished(result));
        });
    }
}

async fn next_snapshot(active: &mut Option<ActiveSubscription>) -> (UserId, Option<Snapshot>) {
    match active {
        Some(active) => {
            let snapshot = active.subscription.next().await;
            (active.user.clone(), snapshot)
        }
        None => std::future::pending().await,
    }
}

fn decode_snapshot(user: UserId, snapshot: Snapshot) -> Event {
    match snapshot.map(GalleryDocument::from_json).transpose() {
        Ok(document) => Event::Snapshot { user, document },
        Err(e) => {
            warn!("Rejected gallery snapshot for {}: {}", user, e);
            Event::SnapshotRejected {
                user,
                reason: e.to_string(),
            }
        }
    }
}

async fn apply_write<S: DocumentStore>(store: &S, key: &DocumentKey, write: DocumentWrite) -> Result<(), GalleryError> {
    let result = match write {
        DocumentWrite::Merge(partial) => store.write_merge(key, partial).await,
        DocumentWrite::Replace(document) => store.write_replace(key, document).await,
    };
    result.map_err(|e| GalleryError::Write(e.to_string()))
}

/// Encode the whole batch, then issue one merge write for it
async fn upload<S: DocumentStore>(
    store: &S,
    key: &DocumentKey,
    folder_id: &FolderId,
    folder: &Folder,
    files: &[std::path::PathBuf],
    max_bytes: u64,
) -> Result<CommandOutcome, GalleryError> {
    let batch = media::encode_batch(files, max_bytes).await?;
    let added = batch.media.len();

    let write = commands::upload_media(folder_id, folder, batch.media)?;
    apply_write(store, key, write).await?;

    info!("✅ Added {} item(s) to {}", added, folder_id);
    Ok(CommandOutcome::MediaUploaded {
        folder: folder_id.clone(),
        added,
        skipped_oversized: batch.skipped_oversized,
    })
}

fn failure(command: CommandKind, error: GalleryError) -> CommandFailure {
    if error.is_validation() {
        warn!("{:?} rejected: {}", command, error);
    } else {
        error!("❌ {:?} failed: {}", command, error);
    }
    CommandFailure::new(command, &error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;
    use crate::gallery::state::Phase;
    use crate::session::LocalIdentity;
    use crate::state::data::Folders;
    use crate::store::SqliteDocumentStore;
    use serde_json::Value;
    use std::future::Future;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Counts replace writes on top of a real store
    #[derive(Clone)]
    struct CountingStore {
        inner: SqliteDocumentStore,
        replaces: Arc<AtomicUsize>,
    }

    impl DocumentStore for CountingStore {
        fn subscribe(&self, key: &DocumentKey) -> crate::store::StoreResult<Subscription> {
            self.inner.subscribe(key)
        }

        fn write_merge(
            &self,
            key: &DocumentKey,
            partial: Value,
        ) -> impl Future<Output = crate::store::StoreResult<()>> + Send {
            self.inner.write_merge(key, partial)
        }

        fn write_replace(
            &self,
            key: &DocumentKey,
            document: Value,
        ) -> impl Future<Output = crate::store::StoreResult<()>> + Send {
            self.replaces.fetch_add(1, Ordering::SeqCst);
            self.inner.write_replace(key, document)
        }
    }

    fn config() -> Config {
        Config {
            db_path: PathBuf::new(),
            app_id: "test-app".to_string(),
            auth_token: None,
            max_media_bytes: 1024 * 1024,
        }
    }

    fn counting_store() -> CountingStore {
        CountingStore {
            inner: SqliteDocumentStore::in_memory().unwrap(),
            replaces: Arc::new(AtomicUsize::new(0)),
        }
    }

    async fn wait_for(handle: &GalleryHandle, mut ready: impl FnMut(&GalleryState) -> bool) -> GalleryState {
        let mut states = handle.state();
        let state = tokio::time::timeout(Duration::from_secs(5), states.wait_for(|s| ready(s)))
            .await
            .expect("timed out waiting for gallery state")
            .expect("gallery runtime stopped");
        state.clone()
    }

    async fn signed_in(store: CountingStore) -> (GalleryHandle, GalleryState) {
        let handle = spawn(store, LocalIdentity::in_memory().unwrap(), config());
        let state = wait_for(&handle, |s| s.is_synced()).await;
        (handle, state)
    }

    fn only_folder(state: &GalleryState) -> (&FolderId, &Folder) {
        assert_eq!(state.folders.len(), 1, "folders: {:?}", state.folders.keys().collect::<Vec<_>>());
        state.folders.first().unwrap()
    }

    #[tokio::test]
    async fn test_missing_document_is_initialized_exactly_once() {
        let store = counting_store();
        let (handle, state) = signed_in(store.clone()).await;
        let key = DocumentKey::gallery("test-app", state.user().unwrap());

        let mut probe = store.inner.subscribe(&key).unwrap();
        let first = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Some(Some(doc)) = probe.next().await {
                    return doc;
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(first, serde_json::json!({ "folders": {} }));

        // Later writes produce new snapshots of the existing document
        handle.send(Intent::CreateFolder("Trip".into())).unwrap();
        wait_for(&handle, |s| s.folders.len() == 1).await;

        assert_eq!(store.replaces.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_create_upload_and_reread() {
        let store = counting_store();
        let (handle, state) = signed_in(store.clone()).await;
        let user = state.user().unwrap().clone();

        handle.send(Intent::EditFolderName("  Beach Day  ".into())).unwrap();
        handle.send(Intent::CreateFolder("  Beach Day  ".into())).unwrap();
        let state = wait_for(&handle, |s| {
            s.folders.len() == 1 && s.active_folder.is_some() && s.folder_name_draft.is_empty()
        })
        .await;
        let (id, folder) = only_folder(&state);
        assert_eq!(folder.name, "Beach Day");
        assert!(id.as_str().starts_with("beach-day-"));
        assert!(id.as_str()["beach-day-".len()..].chars().all(|c| c.is_ascii_digit()));
        assert_eq!(state.active_folder.as_ref(), Some(id));

        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.png");
        let notes = dir.path().join("notes.txt");
        let second = dir.path().join("second.mp4");
        std::fs::write(&first, b"png").unwrap();
        std::fs::write(&notes, b"text").unwrap();
        std::fs::write(&second, b"mp4").unwrap();

        handle.send(Intent::UploadMedia(vec![first, notes])).unwrap();
        let state = wait_for(&handle, |s| s.folders.values().any(|f| f.images.len() == 1)).await;
        assert_eq!(only_folder(&state).1.images.len(), 1);

        handle.send(Intent::UploadMedia(vec![second])).unwrap();
        wait_for(&handle, |s| s.folders.values().any(|f| f.images.len() == 2)).await;

        // A fresh listener sees the same two items in insertion order
        let mut fresh = store.inner.subscribe(&DocumentKey::gallery("test-app", &user)).unwrap();
        let snapshot = fresh.next().await.unwrap().unwrap();
        let document = GalleryDocument::from_json(snapshot).unwrap();
        let folders: &Folders = &document.folders;
        let names: Vec<&str> = folders[0].images.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["first.png", "second.mp4"]);
        assert_eq!(folders[0].images[1].mime_type, "video/mp4");
    }

    #[tokio::test]
    async fn test_upload_of_only_unsupported_files_writes_nothing() {
        let (handle, _) = signed_in(counting_store()).await;
        handle.send(Intent::CreateFolder("Docs".into())).unwrap();
        wait_for(&handle, |s| s.active_folder.is_some()).await;

        let dir = tempfile::tempdir().unwrap();
        let notes = dir.path().join("notes.txt");
        std::fs::write(&notes, b"text").unwrap();
        handle.send(Intent::UploadMedia(vec![notes])).unwrap();

        let expected = ValidationError::NoSupportedFiles.to_string();
        let state = wait_for(&handle, |s| s.status.as_deref() == Some(expected.as_str())).await;
        assert!(only_folder(&state).1.images.is_empty());
    }

    #[tokio::test]
    async fn test_remove_after_confirmation() {
        let (handle, _) = signed_in(counting_store()).await;

        handle.send(Intent::CreateFolder("Keep".into())).unwrap();
        wait_for(&handle, |s| s.folders.len() == 1).await;
        handle.send(Intent::CreateFolder("Drop".into())).unwrap();
        let state = wait_for(&handle, |s| {
            s.folders.len() == 2 && s.active().map(|(_, f)| f.name.as_str()) == Some("Drop")
        })
        .await;
        let dropped = state.active_folder.clone().unwrap();

        handle.send(Intent::RequestRemoveFolder).unwrap();
        handle.send(Intent::ConfirmRemoveFolder).unwrap();

        let state = wait_for(&handle, |s| s.folders.len() == 1).await;
        assert!(!state.folders.contains_key(&dropped));
        assert_eq!(state.active().map(|(_, f)| f.name.as_str()), Some("Keep"));
    }

    #[tokio::test]
    async fn test_bad_token_degrades_without_user() {
        let mut config = config();
        config.auth_token = Some("not-issued".to_string());
        let handle = spawn(counting_store(), LocalIdentity::in_memory().unwrap(), config);

        let state = wait_for(&handle, |s| s.phase == Phase::Degraded).await;

        assert!(state.user().is_none());
        assert!(state.status.unwrap().starts_with("Initialization failed:"));
    }

    #[tokio::test]
    async fn test_sign_out_and_shutdown_release_the_subscription() {
        let store = counting_store();
        let identity = LocalIdentity::in_memory().unwrap();
        let handle = spawn(store.clone(), identity.clone(), config());
        let state = wait_for(&handle, |s| s.is_synced()).await;
        let key = DocumentKey::gallery("test-app", state.user().unwrap());
        assert_eq!(store.inner.listener_count(&key), 1);

        identity.sign_out().await.unwrap();
        wait_for(&handle, |s| s.user().is_none()).await;
        assert_eq!(store.inner.listener_count(&key), 0);

        let user = identity.sign_in_anonymous().await.unwrap();
        let key = DocumentKey::gallery("test-app", &user);
        wait_for(&handle, |s| s.user() == Some(&user) && s.is_synced()).await;
        assert_eq!(store.inner.listener_count(&key), 1);

        drop(handle);
        tokio::time::timeout(Duration::from_secs(5), async {
            while store.inner.listener_count(&key) > 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("subscription was not released on shutdown");
    }
}
