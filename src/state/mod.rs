/// Gallery data model
///
/// This module holds the data shapes persisted in the per-user gallery document:
/// - Folders, media items and the document itself (data.rs)
/// - Folder-id derivation from a display name (folder_id.rs)

pub mod data;
pub mod folder_id;
