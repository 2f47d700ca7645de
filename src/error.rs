/// Error taxonomy for the gallery
///
/// Every failure is caught at the command boundary and turned into one
/// human-readable status line via `GalleryError::user_message`.

use std::path::PathBuf;
use thiserror::Error;

use crate::store::StoreError;

/// Input rejected before anything is written
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Please enter a folder name.")]
    EmptyFolderName,
    #[error("Select a folder first.")]
    NoFolderSelected,
    #[error("Choose at least one file to upload.")]
    NoFilesSupplied,
    #[error("None of the selected files are images or videos.")]
    NoSupportedFiles,
    #[error("Confirm the removal before deleting a folder.")]
    RemovalNotConfirmed,
    #[error("That folder no longer exists.")]
    UnknownFolder,
    #[error("Still connecting to your gallery. Try again in a moment.")]
    NotSignedIn,
}

#[derive(Error, Debug)]
pub enum GalleryError {
    /// Session or store setup failed; the gallery stays unavailable
    #[error("Initialization failed: {0}")]
    Initialization(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A create/remove/upload write did not go through
    #[error("Write failed: {0}")]
    Write(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Could not read {}: {source}", path.display())]
    Encode {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Session error: {0}")]
    Session(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// A blocking worker panicked or was cancelled
    #[error("Background task failed: {0}")]
    Task(String),
}

impl GalleryError {
    /// Text shown in the status line
    pub fn user_message(&self) -> String {
        match self {
            GalleryError::Store(e) => format!("Could not reach your gallery: {}", e),
            other => other.to_string(),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, GalleryError::Validation(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message_is_plain_text() {
        let err = GalleryError::from(ValidationError::EmptyFolderName);

        assert!(err.is_validation());
        assert_eq!(err.user_message(), "Please enter a folder name.");
    }

    #[test]
    fn test_encode_error_names_the_file() {
        let err = GalleryError::Encode {
            path: PathBuf::from("/tmp/missing.jpg"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        };

        assert_eq!(err.user_message(), "Could not read /tmp/missing.jpg: gone");
    }
}
