/// Folder and media commands
///
/// Each command validates its input against the current local folders and
/// produces the document write that carries it out. Nothing here touches the
/// store; the runtime executes the returned `DocumentWrite`.

use serde_json::{json, Value};

use crate::error::{GalleryError, ValidationError};
use crate::state::data::{Folder, FolderId, Folders, Media};
use crate::state::folder_id::derive_folder_id;

/// A mutation of the gallery document
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentWrite {
    /// Deep-merge into the existing document
    Merge(Value),
    /// Overwrite the whole document
    Replace(Value),
}

/// Build the write for CreateFolder.
///
/// The payload carries every existing folder plus the new one, merged into
/// the document.
pub fn create_folder(
    folders: &Folders,
    name: &str,
    timestamp_millis: i64,
) -> Result<(FolderId, DocumentWrite), GalleryError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ValidationError::EmptyFolderName.into());
    }

    let id = derive_folder_id(name, timestamp_millis, folders);

    let mut payload = folders.clone();
    payload.insert(id.clone(), Folder::named(name));

    Ok((id, DocumentWrite::Merge(folders_document(&payload)?)))
}

/// Build the write for RemoveFolder.
///
/// The remaining folders replace the whole mapping. A folder another session
/// created after `folders` was last refreshed is dropped by this write.
pub fn remove_folder(folders: &Folders, active: Option<&FolderId>) -> Result<DocumentWrite, GalleryError> {
    let active = active.ok_or(ValidationError::NoFolderSelected)?;

    let mut remaining = folders.clone();
    remaining.shift_remove(active);

    Ok(DocumentWrite::Replace(folders_document(&remaining)?))
}

/// Build the write for UploadMedia once the batch has been encoded.
///
/// Only the target folder's key is merged: its previous fields plus `images`
/// extended with `added`. Sibling folders are left alone.
pub fn upload_media(folder_id: &FolderId, folder: &Folder, added: Vec<Media>) -> Result<DocumentWrite, GalleryError> {
    if added.is_empty() {
        return Err(ValidationError::NoSupportedFiles.into());
    }

    let mut updated = folder.clone();
    updated.images.extend(added);

    let entry = serde_json::to_value(&updated).map_err(|e| GalleryError::Write(e.to_string()))?;
    let mut target = serde_json::Map::new();
    target.insert(folder_id.to_string(), entry);
    Ok(DocumentWrite::Merge(json!({ "folders": target })))
}

/// The document written on first access
pub fn empty_document() -> Value {
    json!({ "folders": {} })
}

fn folders_document(folders: &Folders) -> Result<Value, GalleryError> {
    let folders = serde_json::to_value(folders).map_err(|e| GalleryError::Write(e.to_string()))?;
    Ok(json!({ "folders": folders }))
}
