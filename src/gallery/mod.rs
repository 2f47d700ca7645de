/// Gallery synchronization
///
/// This module holds the folder/media workflow:
/// - The reducer and its events/effects (state.rs)
/// - Command validation and write payloads (commands.rs)
/// - The coordinating loop that runs effects against the store (runtime.rs)

pub mod commands;
pub mod runtime;
pub mod state;

pub use runtime::GalleryHandle;
pub use state::{GalleryState, Intent, Phase};
