/// Gallery state machine
///
/// `GalleryState::update` is the single reducer: it takes the current state
/// and one event and returns the next state plus the effects the runtime
/// must perform. It never touches the store itself.
///
/// The remote document is the source of truth. Every snapshot replaces the
/// local folders wholesale; the active folder is then repaired so that it
/// always names an existing folder.

use chrono::Utc;
use std::path::PathBuf;
use tracing::debug;

use super::commands::{self, DocumentWrite};
use crate::error::{GalleryError, ValidationError};
use crate::state::data::{Folder, FolderId, Folders, GalleryDocument, UserId};

/// Lifecycle of the gallery session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Phase {
    /// No user resolved yet
    #[default]
    Uninitialized,
    /// Listening to this user's document
    Subscribed(UserId),
    /// Session or store setup failed; no user will be produced
    Degraded,
}

/// Everything the presentation layer renders
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GalleryState {
    pub phase: Phase,
    /// Mirror of the remote document's folders, in document order
    pub folders: Folders,
    pub active_folder: Option<FolderId>,
    /// Contents of the "new folder" name input
    pub folder_name_draft: String,
    /// Destructive-action gate for folder removal
    pub removal_armed: bool,
    /// Single current status message, replaced on every new event
    pub status: Option<String>,
    /// An empty-document write is in flight
    initializing: bool,
    /// A snapshot of the existing document has been reconciled
    synced: bool,
}

/// User intents coming from the presentation layer
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    EditFolderName(String),
    SelectFolder(FolderId),
    CreateFolder(String),
    RequestRemoveFolder,
    ConfirmRemoveFolder,
    CancelRemoveFolder,
    UploadMedia(Vec<PathBuf>),
}

/// What a finished command accomplished
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    DocumentInitialized,
    FolderCreated { id: FolderId, name: String },
    FolderRemoved { id: FolderId, name: String },
    MediaUploaded {
        folder: FolderId,
        added: usize,
        skipped_oversized: usize,
    },
}

/// Which command a failure belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    InitializeDocument,
    CreateFolder,
    RemoveFolder,
    UploadMedia,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommandFailure {
    pub command: CommandKind,
    pub message: String,
}

impl CommandFailure {
    pub fn new(command: CommandKind, error: &GalleryError) -> Self {
        Self {
            command,
            message: error.user_message(),
        }
    }
}

/// Discrete inputs to the reducer
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    SessionResolved(UserId),
    /// Terminal setup failure (session or subscription)
    SessionFailed(String),
    SessionEnded,
    /// A decoded snapshot of `user`'s document (`None` = does not exist)
    Snapshot {
        user: UserId,
        document: Option<GalleryDocument>,
    },
    /// A snapshot arrived but could not be decoded
    SnapshotRejected { user: UserId, reason: String },
    Intent(Intent),
    CommandFinished(Result<CommandOutcome, CommandFailure>),
}

/// Work the runtime performs on behalf of the reducer
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Release any current subscription and listen to this user's document
    Subscribe(UserId),
    Unsubscribe,
    /// Write the empty document for a user whose document is missing
    InitializeDocument(UserId),
    Write {
        user: UserId,
        write: DocumentWrite,
        on_success: CommandOutcome,
        command: CommandKind,
    },
    /// Encode files, then merge them into `folder`
    EncodeAndUpload {
        user: UserId,
        folder_id: FolderId,
        folder: Folder,
        files: Vec<PathBuf>,
    },
}

impl GalleryState {
    pub fn user(&self) -> Option<&UserId> {
        match &self.phase {
            Phase::Subscribed(user) => Some(user),
            _ => None,
        }
    }

    /// Signed in and mirroring an existing document; writes are allowed
    pub fn is_synced(&self) -> bool {
        self.synced && self.user().is_some()
    }

    /// User to write for, once the document has been loaded
    fn writable_user(&self) -> Option<UserId> {
        if self.synced {
            self.user().cloned()
        } else {
            None
        }
    }

    pub fn active(&self) -> Option<(&FolderId, &Folder)> {
        let id = self.active_folder.as_ref()?;
        self.folders.get_key_value(id)
    }

    /// Apply one event, producing the next state and the effects to run
    pub fn update(mut self, event: Event) -> (Self, Vec<Effect>) {
        let mut effects = Vec::new();

        match event {
            Event::SessionResolved(user) => {
                // One subscription per distinct user id
                if self.user() != Some(&user) {
                    self = GalleryState {
                        phase: Phase::Subscribed(user.clone()),
                        folder_name_draft: self.folder_name_draft,
                        ..GalleryState::default()
                    };
                    effects.push(Effect::Subscribe(user));
                }
            }
            Event::SessionFailed(message) => {
                if self.user().is_some() {
                    effects.push(Effect::Unsubscribe);
                }
                self = GalleryState {
                    phase: Phase::Degraded,
                    status: Some(GalleryError::Initialization(message).user_message()),
                    ..GalleryState::default()
                };
            }
            Event::SessionEnded => {
                if self.user().is_some() {
                    effects.push(Effect::Unsubscribe);
                    self = GalleryState {
                        status: Some("Signed out.".to_string()),
                        ..GalleryState::default()
                    };
                }
            }
            Event::Snapshot { user, document } => {
                if self.user() == Some(&user) {
                    self.reconcile(user, document, &mut effects);
                }
            }
            Event::SnapshotRejected { user, reason } => {
                if self.user() == Some(&user) {
                    self.status = Some(format!("Could not read your gallery: {}", reason));
                }
            }
            Event::Intent(intent) => self.apply_intent(intent, &mut effects),
            Event::CommandFinished(result) => self.finish_command(result),
        }

        (self, effects)
    }

    fn reconcile(&mut self, user: UserId, document: Option<GalleryDocument>, effects: &mut Vec<Effect>) {
        let previous = self.active_folder.clone();

        match document {
            None => {
                if !self.initializing {
                    self.initializing = true;
                    effects.push(Effect::InitializeDocument(user));
                }
                self.synced = false;
                self.folders = Folders::new();
                self.active_folder = None;
            }
            Some(document) => {
                self.initializing = false;
                self.synced = true;
                self.folders = document.folders;
            }
        }

        self.active_folder = repair_selection(self.active_folder.take(), &self.folders);
        // An armed removal only ever applies to the folder it was armed for
        if self.active_folder != previous {
            self.removal_armed = false;
        }

        debug!(
            "Reconciled {} folder(s), active: {:?}",
            self.folders.len(),
            self.active_folder
        );
    }

    fn apply_intent(&mut self, intent: Intent, effects: &mut Vec<Effect>) {
        match intent {
            Intent::EditFolderName(name) => {
                self.folder_name_draft = name;
            }
            Intent::SelectFolder(id) => {
                if self.folders.contains_key(&id) {
                    self.active_folder = Some(id);
                    self.removal_armed = false;
                } else {
                    self.report(ValidationError::UnknownFolder);
                }
            }
            Intent::CreateFolder(name) => {
                let Some(user) = self.writable_user() else {
                    return self.report(ValidationError::NotSignedIn);
                };
                match commands::create_folder(&self.folders, &name, Utc::now().timestamp_millis()) {
                    Ok((id, write)) => {
                        effects.push(Effect::Write {
                            user,
                            write,
                            on_success: CommandOutcome::FolderCreated {
                                id,
                                name: name.trim().to_string(),
                            },
                            command: CommandKind::CreateFolder,
                        });
                    }
                    Err(e) => self.status = Some(e.user_message()),
                }
            }
            Intent::RequestRemoveFolder => match self.active().map(|(_, f)| f.name.clone()) {
                Some(name) => {
                    self.status = Some(format!(
                        "Delete \"{}\" and all of its media? Confirm to continue.",
                        name
                    ));
                    self.removal_armed = true;
                }
                None => self.report(ValidationError::NoFolderSelected),
            },
            Intent::CancelRemoveFolder => {
                if self.removal_armed {
                    self.removal_armed = false;
                    self.status = Some("Removal cancelled.".to_string());
                }
            }
            Intent::ConfirmRemoveFolder => {
                if !self.removal_armed {
                    return self.report(ValidationError::RemovalNotConfirmed);
                }
                self.removal_armed = false;

                let Some(user) = self.writable_user() else {
                    return self.report(ValidationError::NotSignedIn);
                };
                let Some((id, folder)) = self.active().map(|(id, f)| (id.clone(), f.name.clone())) else {
                    return self.report(ValidationError::NoFolderSelected);
                };
                match commands::remove_folder(&self.folders, Some(&id)) {
                    Ok(write) => effects.push(Effect::Write {
                        user,
                        write,
                        on_success: CommandOutcome::FolderRemoved { id, name: folder },
                        command: CommandKind::RemoveFolder,
                    }),
                    Err(e) => self.status = Some(e.user_message()),
                }
            }
            Intent::UploadMedia(files) => {
                let Some(user) = self.writable_user() else {
                    return self.report(ValidationError::NotSignedIn);
                };
                let Some((folder_id, folder)) = self.active().map(|(id, f)| (id.clone(), f.clone())) else {
                    return self.report(ValidationError::NoFolderSelected);
                };
                if files.is_empty() {
                    return self.report(ValidationError::NoFilesSupplied);
                }

                self.status = Some(format!("Uploading {} item(s)...", files.len()));
                effects.push(Effect::EncodeAndUpload {
                    user,
                    folder_id,
                    folder,
                    files,
                });
            }
        }
    }

    fn finish_command(&mut self, result: Result<CommandOutcome, CommandFailure>) {
        match result {
            Ok(CommandOutcome::DocumentInitialized) => {}
            Ok(CommandOutcome::FolderCreated { id, name }) => {
                self.active_folder = Some(id);
                self.folder_name_draft.clear();
                self.status = Some(format!("Folder \"{}\" created.", name));
            }
            Ok(CommandOutcome::FolderRemoved { name, .. }) => {
                self.status = Some(format!("Folder \"{}\" removed.", name));
            }
            Ok(CommandOutcome::MediaUploaded {
                added,
                skipped_oversized,
                ..
            }) => {
                let mut message = format!("Added {} item(s).", added);
                if skipped_oversized > 0 {
                    message.push_str(&format!(" Skipped {} file(s) that were too large.", skipped_oversized));
                }
                self.status = Some(message);
            }
            Err(failure) => {
                if failure.command == CommandKind::InitializeDocument {
                    self.initializing = false;
                }
                self.status = Some(failure.message);
            }
        }
    }

    fn report(&mut self, error: ValidationError) {
        self.status = Some(GalleryError::from(error).user_message());
    }
}

/// Keep the selection pointing at an existing folder.
///
/// A vanished selection falls back to the first folder in document order
/// (or nothing); an empty selection picks the first folder if there is one.
pub fn repair_selection(active: Option<FolderId>, folders: &Folders) -> Option<FolderId> {
    match active {
        Some(id) if folders.contains_key(&id) => Some(id),
        _ => folders.keys().next().cloned(),
    }
}
