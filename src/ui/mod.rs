/// Gallery views
///
/// - Runtime bridge feeding published state into iced (bridge.rs)
/// - Decoded thumbnails for the active folder (thumbnails.rs)
/// - Sidebar with the folder list and the create form
/// - Folder view with the media grid and removal controls

pub mod bridge;
pub mod thumbnails;

use iced::widget::{
    button, column, container, horizontal_space, image, row, scrollable, text, text_input, Column,
};
use iced::{Alignment, Element, Length};
use iced_aw::Wrap;

use crate::gallery::GalleryState;
use crate::Message;
use thumbnails::Thumbnails;

const TILE_SIZE: f32 = 160.0;

pub fn sidebar<'a>(state: &'a GalleryState, name_input: &'a str) -> Element<'a, Message> {
    let folders = state
        .folders
        .iter()
        .fold(Column::new().spacing(4), |list, (id, folder)| {
            let selected = state.active_folder.as_ref() == Some(id);
            let label = format!("{} ({})", folder.name, folder.images.len());

            list.push(
                button(text(label))
                    .width(Length::Fill)
                    .style(if selected { button::primary } else { button::secondary })
                    .on_press(Message::SelectFolder(id.clone())),
            )
        });

    let create = row![
        text_input("New folder name", name_input)
            .on_input(Message::NameChanged)
            .on_submit(Message::CreateFolder),
        button("Create").on_press(Message::CreateFolder),
    ]
    .spacing(8);

    column![
        text("Folders").size(24),
        create,
        scrollable(folders).height(Length::Fill),
    ]
    .spacing(12)
    .width(Length::Fixed(280.0))
    .into()
}

pub fn folder_view<'a>(state: &'a GalleryState, thumbnails: &'a Thumbnails) -> Element<'a, Message> {
    let Some((_, folder)) = state.active() else {
        let hint = if state.folders.is_empty() {
            "Create a folder to start your gallery."
        } else {
            "Select a folder."
        };
        return container(text(hint).size(18))
            .center_x(Length::Fill)
            .center_y(Length::Fill)
            .into();
    };

    let removal: Element<'a, Message> = if state.removal_armed {
        row![
            text(format!("Delete \"{}\"?", folder.name)),
            button("Delete").style(button::danger).on_press(Message::ConfirmRemove),
            button("Cancel").style(button::secondary).on_press(Message::CancelRemove),
        ]
        .spacing(8)
        .align_y(Alignment::Center)
        .into()
    } else {
        button("Remove Folder")
            .style(button::danger)
            .on_press(Message::RequestRemove)
            .into()
    };

    let header = row![
        text(&folder.name).size(28),
        horizontal_space(),
        button("Add Media").on_press(Message::AddMedia),
        button("Add Folder").style(button::secondary).on_press(Message::AddDirectory),
        removal,
    ]
    .spacing(8)
    .align_y(Alignment::Center);

    let body: Element<'a, Message> = if folder.images.is_empty() {
        container(text("No photos or videos yet."))
            .center_x(Length::Fill)
            .center_y(Length::Fill)
            .into()
    } else {
        let tiles = folder
            .images
            .iter()
            .enumerate()
            .map(|(index, item)| {
                let preview: Element<'a, Message> = match thumbnails.get(index) {
                    Some(handle) => image(handle.clone())
                        .width(Length::Fixed(TILE_SIZE))
                        .height(Length::Fixed(TILE_SIZE))
                        .into(),
                    None => container(text(if item.is_video() { "🎬" } else { "🖼" }).size(40))
                        .center_x(Length::Fixed(TILE_SIZE))
                        .center_y(Length::Fixed(TILE_SIZE))
                        .into(),
                };

                column![preview, text(&item.name).size(12)]
                    .spacing(4)
                    .width(Length::Fixed(TILE_SIZE))
                    .into()
            })
            .collect();

        scrollable(Wrap::with_elements(tiles).spacing(12.0).line_spacing(12.0))
            .height(Length::Fill)
            .into()
    };

    column![header, body].spacing(16).width(Length::Fill).into()
}
