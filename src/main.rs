use iced::widget::{column, container, row, text};
use iced::{Element, Length, Subscription, Task, Theme};
use rfd::FileDialog;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
mod error;
mod gallery;
mod media;
mod session;
mod state;
mod store;
mod ui;

use gallery::{GalleryHandle, GalleryState, Intent, Phase};
use state::data::FolderId;

/// Extensions offered in the file picker
const PICKER_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "webp", "bmp", "avif", "svg", "heic", "mp4", "m4v", "mov", "webm",
    "mkv",
];

/// Main application state
struct Gallery {
    /// Connection to the gallery runtime, once it has started
    handle: Option<GalleryHandle>,
    /// Latest state published by the runtime
    state: GalleryState,
    /// Local copy of the folder-name input so typing never waits on the runtime
    name_input: String,
    thumbnails: ui::thumbnails::Thumbnails,
    /// Set when the runtime could not be started or has stopped
    startup_error: Option<String>,
    /// Message for an action taken before the runtime connected
    notice: Option<String>,
}

/// Application messages (events)
#[derive(Debug, Clone)]
enum Message {
    Runtime(ui::bridge::RuntimeEvent),
    NameChanged(String),
    CreateFolder,
    SelectFolder(FolderId),
    RequestRemove,
    ConfirmRemove,
    CancelRemove,
    /// User clicked "Add Media"
    AddMedia,
    /// User clicked "Add Folder"
    AddDirectory,
}

impl Gallery {
    fn new() -> (Self, Task<Message>) {
        info!("🎨 Gallery starting");
        (
            Gallery {
                handle: None,
                state: GalleryState::default(),
                name_input: String::new(),
                thumbnails: ui::thumbnails::Thumbnails::default(),
                startup_error: None,
                notice: None,
            },
            Task::none(),
        )
    }

    /// Handle application messages and update state
    fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::Runtime(ui::bridge::RuntimeEvent::Connected(handle)) => {
                self.handle = Some(handle);
                self.notice = None;
            }
            Message::Runtime(ui::bridge::RuntimeEvent::StateChanged(state)) => {
                self.notice = None;
                // A created folder clears the draft in the runtime; mirror it
                if !self.state.folder_name_draft.is_empty() && state.folder_name_draft.is_empty() {
                    self.name_input.clear();
                }
                self.thumbnails.refresh(&state);
                self.state = state;
            }
            Message::Runtime(ui::bridge::RuntimeEvent::Failed(message)) => {
                self.startup_error = Some(message);
            }
            Message::NameChanged(name) => {
                self.name_input = name.clone();
                self.send(Intent::EditFolderName(name));
            }
            Message::CreateFolder => {
                self.send(Intent::CreateFolder(self.name_input.clone()));
            }
            Message::SelectFolder(id) => self.send(Intent::SelectFolder(id)),
            Message::RequestRemove => self.send(Intent::RequestRemoveFolder),
            Message::ConfirmRemove => self.send(Intent::ConfirmRemoveFolder),
            Message::CancelRemove => self.send(Intent::CancelRemoveFolder),
            Message::AddMedia => {
                // Show the native file picker dialog
                let files = FileDialog::new()
                    .set_title("Add Photos or Videos")
                    .add_filter("Photos and videos", PICKER_EXTENSIONS)
                    .pick_files();

                if let Some(files) = files {
                    self.send(Intent::UploadMedia(files));
                }
            }
            Message::AddDirectory => {
                let folder = FileDialog::new()
                    .set_title("Add Every Photo and Video in a Folder")
                    .pick_folder();

                if let Some(folder) = folder {
                    self.send(Intent::UploadMedia(vec![folder]));
                }
            }
        }

        Task::none()
    }

    fn send(&mut self, intent: Intent) {
        match &self.handle {
            Some(handle) => {
                if let Err(e) = handle.send(intent) {
                    self.startup_error = Some(e.user_message());
                }
            }
            None => {
                self.notice = Some(error::ValidationError::NotSignedIn.to_string());
            }
        }
    }

    /// Build the user interface
    fn view(&self) -> Element<Message> {
        let body = row![
            ui::sidebar(&self.state, &self.name_input),
            ui::folder_view(&self.state, &self.thumbnails),
        ]
        .spacing(24)
        .height(Length::Fill);

        let content = column![body, text(self.status_line()).size(16)]
            .spacing(12)
            .padding(20);

        container(content)
            .width(Length::Fill)
            .height(Length::Fill)
            .into()
    }

    /// The single status line: startup errors first, then the latest message
    fn status_line(&self) -> String {
        if let Some(error) = &self.startup_error {
            return error.clone();
        }
        if let Some(notice) = &self.notice {
            return notice.clone();
        }
        if let Some(status) = &self.state.status {
            return status.clone();
        }
        match self.state.phase {
            Phase::Uninitialized => "Connecting...".to_string(),
            Phase::Subscribed(_) if !self.state.is_synced() => "Loading your gallery...".to_string(),
            Phase::Subscribed(_) => format!("Ready. {} folder(s).", self.state.folders.len()),
            Phase::Degraded => "Gallery unavailable.".to_string(),
        }
    }

    fn subscription(&self) -> Subscription<Message> {
        Subscription::run(ui::bridge::connect).map(Message::Runtime)
    }

    /// Set the application theme
    fn theme(&self) -> Theme {
        Theme::Dark
    }
}

fn main() -> iced::Result {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    iced::application("Gallery", Gallery::update, Gallery::view)
        .subscription(Gallery::subscription)
        .theme(Gallery::theme)
        .centered()
        .run_with(Gallery::new)
}
