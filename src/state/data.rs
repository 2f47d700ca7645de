/// Shared data structures for the gallery
///
/// These structs represent the data model that flows between
/// the document store, the reducer and the UI layer. Field names
/// are serialized in the document's camelCase form.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a folder inside a gallery document (e.g. "beach-day-1700000000000")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FolderId(String);

impl FolderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FolderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stable identifier of an authenticated user
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single image or video, inline-encoded
///
/// Immutable once appended to a folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Media {
    /// `data:<mime>;base64,<payload>`
    pub data_url: String,
    /// Original filename (e.g. "IMG_0001.jpg")
    pub name: String,
    /// MIME type, always `image/*` or `video/*`
    pub mime_type: String,
}

impl Media {
    pub fn is_video(&self) -> bool {
        self.mime_type.starts_with("video/")
    }
}

/// A named container of media, in insertion order
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Folder {
    pub name: String,
    #[serde(default)]
    pub images: Vec<Media>,
}

impl Folder {
    /// Create an empty folder with the given display name
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            images: Vec::new(),
        }
    }
}

/// Folders keyed by id. Enumeration order is insertion order.
pub type Folders = IndexMap<FolderId, Folder>;

/// The single per-user persisted record holding all folders
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GalleryDocument {
    #[serde(default)]
    pub folders: Folders,
}

impl GalleryDocument {
    /// Decode a raw store snapshot into a typed document
    pub fn from_json(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }
}
