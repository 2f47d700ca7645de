/// Bridge between the gallery runtime and iced
///
/// Starts the runtime from the environment's configuration and forwards every
/// published state into the application as a message.

use iced::futures::channel::mpsc;
use iced::futures::{SinkExt, Stream};
use iced::stream;
use tracing::error;

use crate::config::Config;
use crate::error::GalleryError;
use crate::gallery::{runtime, GalleryHandle, GalleryState};
use crate::session::LocalIdentity;
use crate::store::SqliteDocumentStore;

#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    Connected(GalleryHandle),
    StateChanged(GalleryState),
    /// The runtime could not be started
    Failed(String),
}

pub fn connect() -> impl Stream<Item = RuntimeEvent> {
    stream::channel(100, |mut output: mpsc::Sender<RuntimeEvent>| async move {
        let handle = match start() {
            Ok(handle) => handle,
            Err(e) => {
                error!("❌ {}", e);
                let _ = output.send(RuntimeEvent::Failed(e.user_message())).await;
                return;
            }
        };

        let mut states = handle.state();
        if output.send(RuntimeEvent::Connected(handle)).await.is_err() {
            return;
        }

        loop {
            let state = states.borrow_and_update().clone();
            if output.send(RuntimeEvent::StateChanged(state)).await.is_err() {
                break;
            }
            if states.changed().await.is_err() {
                break;
            }
        }
    })
}

fn start() -> Result<GalleryHandle, GalleryError> {
    let config = Config::load()?;

    let store = SqliteDocumentStore::open(&config.db_path)
        .map_err(|e| GalleryError::Initialization(e.to_string()))?;
    let identity = LocalIdentity::open(&config.db_path)
        .map_err(|e| GalleryError::Initialization(e.to_string()))?;

    Ok(runtime::spawn(store, identity, config))
}
