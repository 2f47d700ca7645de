use iced::widget::image::Handle;
use image::imageops::FilterType;

use crate::gallery::GalleryState;
use crate::media;
use crate::state::data::{FolderId, Media};

/// Size of generated thumbnails (square)
const THUMBNAIL_SIZE: u32 = 256;

/// Decoded thumbnails for the active folder's media, in display order.
///
/// Media lists only grow, so a refresh for the same folder decodes just the
/// new tail. Entries are `None` for videos and anything that fails to decode.
#[derive(Debug, Default)]
pub struct Thumbnails {
    folder: Option<FolderId>,
    handles: Vec<Option<Handle>>,
}

impl Thumbnails {
    pub fn refresh(&mut self, state: &GalleryState) {
        let Some((id, folder)) = state.active() else {
            *self = Self::default();
            return;
        };

        if self.folder.as_ref() != Some(id) || self.handles.len() > folder.images.len() {
            self.folder = Some(id.clone());
            self.handles.clear();
        }

        for item in &folder.images[self.handles.len()..] {
            self.handles.push(generate_thumbnail(item));
        }
    }

    pub fn get(&self, index: usize) -> Option<&Handle> {
        self.handles.get(index).and_then(Option::as_ref)
    }
}

fn generate_thumbnail(item: &Media) -> Option<Handle> {
    if item.is_video() {
        return None;
    }

    let (_, bytes) = media::decode_data_url(&item.data_url)?;
    let img = image::load_from_memory(&bytes).ok()?;

    // Resize to thumbnail size
    let thumbnail = img.resize(THUMBNAIL_SIZE, THUMBNAIL_SIZE, FilterType::Triangle).to_rgba8();
    let (width, height) = thumbnail.dimensions();

    Some(Handle::from_rgba(width, height, thumbnail.into_raw()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gallery::state::Event;
    use crate::state::data::{Folder, GalleryDocument, UserId};
    use image::{ImageFormat, RgbaImage};
    use std::io::Cursor;

    fn png_media(name: &str) -> Media {
        let mut buf = Cursor::new(Vec::new());
        RgbaImage::new(4, 4).write_to(&mut buf, ImageFormat::Png).unwrap();
        Media {
            data_url: media::to_data_url("image/png", &buf.into_inner()),
            name: name.to_string(),
            mime_type: "image/png".to_string(),
        }
    }

    fn video_media(name: &str) -> Media {
        Media {
            data_url: media::to_data_url("video/mp4", b"not really a movie"),
            name: name.to_string(),
            mime_type: "video/mp4".to_string(),
        }
    }

    fn state_with(folders: Vec<(&str, Vec<Media>)>) -> GalleryState {
        let mut document = GalleryDocument::default();
        for (id, images) in folders {
            let mut folder = Folder::named(id);
            folder.images = images;
            document.folders.insert(FolderId::new(id), folder);
        }
        let user = UserId::new("u1");
        let (state, _) = GalleryState::default().update(Event::SessionResolved(user.clone()));
        let (state, _) = state.update(Event::Snapshot { user, document: Some(document) });
        state
    }

    #[test]
    fn test_videos_and_images_are_cached_in_order() {
        let state = state_with(vec![("trip", vec![png_media("a.png"), video_media("b.mp4")])]);
        let mut thumbnails = Thumbnails::default();
        thumbnails.refresh(&state);

        assert!(thumbnails.get(0).is_some());
        assert!(thumbnails.get(1).is_none());
        assert_eq!(thumbnails.handles.len(), 2);
    }

    #[test]
    fn test_refresh_decodes_only_new_items() {
        let mut thumbnails = Thumbnails::default();
        thumbnails.refresh(&state_with(vec![("trip", vec![png_media("a.png")])]));
        let first = thumbnails.get(0).cloned();

        thumbnails.refresh(&state_with(vec![("trip", vec![png_media("a.png"), png_media("b.png")])]));

        assert_eq!(thumbnails.handles.len(), 2);
        // Same handle id means the first image was not decoded again
        assert_eq!(thumbnails.get(0).map(Handle::id), first.as_ref().map(Handle::id));
    }

    #[test]
    fn test_no_active_folder_clears_cache() {
        let mut thumbnails = Thumbnails::default();
        thumbnails.refresh(&state_with(vec![("trip", vec![png_media("a.png")])]));
        thumbnails.refresh(&state_with(vec![]));

        assert!(thumbnails.folder.is_none());
        assert!(thumbnails.handles.is_empty());
    }

    #[test]
    fn test_undecodable_image_has_no_thumbnail() {
        let broken = Media {
            data_url: media::to_data_url("image/png", b"garbage"),
            name: "broken.png".to_string(),
            mime_type: "image/png".to_string(),
        };
        let mut thumbnails = Thumbnails::default();
        thumbnails.refresh(&state_with(vec![("trip", vec![broken])]));

        assert!(thumbnails.get(0).is_none());
    }
}
