/// Media encoding for uploads
///
/// Turns user-picked files into inline `Media` items:
/// - Directories are expanded recursively (walkdir, sorted by file name)
/// - Only image/* and video/* files are kept; the rest are skipped
/// - Each file is read and base64-encoded into a data URL, one at a time in input order

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::ImageFormat;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::error::GalleryError;
use crate::state::data::Media;

/// Video containers accepted for upload (extension, MIME type)
const VIDEO_TYPES: &[(&str, &str)] = &[
    ("mp4", "video/mp4"),
    ("m4v", "video/x-m4v"),
    ("mov", "video/quicktime"),
    ("webm", "video/webm"),
    ("mkv", "video/x-matroska"),
    ("avi", "video/x-msvideo"),
    ("ogv", "video/ogg"),
];

/// Image types browsers display that the `image` crate does not decode
const EXTRA_IMAGE_TYPES: &[(&str, &str)] = &[
    ("svg", "image/svg+xml"),
    ("heic", "image/heic"),
    ("heif", "image/heif"),
];

/// Result of encoding one upload batch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EncodedBatch {
    /// Encoded items, in submission order
    pub media: Vec<Media>,
    /// Files that were neither images nor videos
    pub skipped_unsupported: usize,
    /// Files larger than the inline size limit
    pub skipped_oversized: usize,
}

/// MIME type of a file judged by its extension, if it is an image or a video
pub fn media_type_for(path: &Path) -> Option<String> {
    let ext = path.extension()?.to_string_lossy().to_lowercase();

    if let Some(format) = ImageFormat::from_extension(&ext) {
        let mime = format.to_mime_type();
        if mime.starts_with("image/") {
            return Some(mime.to_string());
        }
    }

    EXTRA_IMAGE_TYPES
        .iter()
        .chain(VIDEO_TYPES)
        .find(|(known, _)| *known == ext)
        .map(|(_, mime)| mime.to_string())
}

/// Expand directories into the files beneath them, keeping plain files as-is
pub fn expand_inputs(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for path in paths {
        if path.is_dir() {
            files.extend(
                WalkDir::new(path)
                    .follow_links(true)
                    .sort_by_file_name()
                    .into_iter()
                    .filter_map(|e| e.ok())
                    .filter(|e| e.file_type().is_file())
                    .map(|e| e.into_path()),
            );
        } else {
            files.push(path.clone());
        }
    }

    files
}

/// Encode a batch of files into media items.
///
/// A read failure aborts the whole batch so no partial batch is ever written.
pub async fn encode_batch(paths: &[PathBuf], max_bytes: u64) -> Result<EncodedBatch, GalleryError> {
    let mut batch = EncodedBatch::default();

    // Directory walks are blocking filesystem work
    let inputs = paths.to_vec();
    let files = tokio::task::spawn_blocking(move || expand_inputs(&inputs))
        .await
        .map_err(|e| GalleryError::Task(e.to_string()))?;

    for path in files {
        let Some(mime_type) = media_type_for(&path) else {
            warn!("⏭️  Skipping unsupported file: {}", path.display());
            batch.skipped_unsupported += 1;
            continue;
        };

        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|source| GalleryError::Encode { path: path.clone(), source })?;
        if metadata.len() > max_bytes {
            warn!(
                "⏭️  Skipping {} ({} bytes, limit {})",
                path.display(),
                metadata.len(),
                max_bytes
            );
            batch.skipped_oversized += 1;
            continue;
        }

        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|source| GalleryError::Encode { path: path.clone(), source })?;

        let name = path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();

        batch.media.push(Media {
            data_url: to_data_url(&mime_type, &bytes),
            name,
            mime_type,
        });
    }

    info!(
        "📦 Encoded {} media item(s), skipped {} unsupported and {} oversized",
        batch.media.len(),
        batch.skipped_unsupported,
        batch.skipped_oversized
    );
    Ok(batch)
}

pub fn to_data_url(mime_type: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime_type, STANDARD.encode(bytes))
}

/// Split a base64 data URL back into its MIME type and bytes
pub fn decode_data_url(data_url: &str) -> Option<(&str, Vec<u8>)> {
    let rest = data_url.strip_prefix("data:")?;
    let (mime_type, payload) = rest.split_once(";base64,")?;
    let bytes = STANDARD.decode(payload).ok()?;
    Some((mime_type, bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_media_type_detection() {
        assert_eq!(media_type_for(Path::new("a.JPG")).as_deref(), Some("image/jpeg"));
        assert_eq!(media_type_for(Path::new("a.png")).as_deref(), Some("image/png"));
        assert_eq!(media_type_for(Path::new("clip.mov")).as_deref(), Some("video/quicktime"));
        assert_eq!(media_type_for(Path::new("logo.svg")).as_deref(), Some("image/svg+xml"));
        assert_eq!(media_type_for(Path::new("notes.txt")), None);
        assert_eq!(media_type_for(Path::new("README")), None);
    }

    #[test]
    fn test_data_url_round_trip() {
        let url = to_data_url("image/png", &[1, 2, 3]);
        assert_eq!(url, "data:image/png;base64,AQID");

        let (mime, bytes) = decode_data_url(&url).unwrap();
        assert_eq!(mime, "image/png");
        assert_eq!(bytes, vec![1, 2, 3]);
        assert!(decode_data_url("https://example.com/a.png").is_none());
    }

    #[tokio::test]
    async fn test_unsupported_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let photo = dir.path().join("photo.png");
        let notes = dir.path().join("notes.txt");
        fs::write(&photo, b"png-bytes").unwrap();
        fs::write(&notes, b"hello").unwrap();

        let batch = encode_batch(&[photo, notes], 1024).await.unwrap();

        assert_eq!(batch.media.len(), 1);
        assert_eq!(batch.media[0].name, "photo.png");
        assert_eq!(batch.media[0].mime_type, "image/png");
        assert_eq!(batch.media[0].data_url, to_data_url("image/png", b"png-bytes"));
        assert_eq!(batch.skipped_unsupported, 1);
    }

    #[tokio::test]
    async fn test_batch_keeps_submission_order_and_size_limit() {
        let dir = tempfile::tempdir().unwrap();
        let second = dir.path().join("b.jpg");
        let first = dir.path().join("a.webm");
        let big = dir.path().join("big.gif");
        fs::write(&second, b"jpg").unwrap();
        fs::write(&first, b"webm").unwrap();
        fs::write(&big, vec![0u8; 64]).unwrap();

        let batch = encode_batch(&[second, first, big], 16).await.unwrap();

        let names: Vec<&str> = batch.media.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["b.jpg", "a.webm"]);
        assert!(batch.media[1].is_video());
        assert_eq!(batch.skipped_oversized, 1);
    }

    #[tokio::test]
    async fn test_directories_are_expanded_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("trip");
        fs::create_dir_all(nested.join("day2")).unwrap();
        fs::write(nested.join("b.png"), b"b").unwrap();
        fs::write(nested.join("a.png"), b"a").unwrap();
        fs::write(nested.join("day2").join("c.png"), b"c").unwrap();

        let batch = encode_batch(&[nested], 1024).await.unwrap();

        let names: Vec<&str> = batch.media.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["a.png", "b.png", "c.png"]);
    }

    #[tokio::test]
    async fn test_missing_file_aborts_batch() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("a.png");
        fs::write(&present, b"a").unwrap();

        let result = encode_batch(&[present, dir.path().join("gone.png")], 1024).await;

        assert!(matches!(result, Err(GalleryError::Encode { .. })));
    }
}
