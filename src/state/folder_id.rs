/// Folder-id derivation
///
/// A folder id is the trimmed display name, lowercased, with whitespace
/// runs collapsed to a single hyphen, followed by a millisecond timestamp.

use super::data::{FolderId, Folders};

/// Normalize a display name into its id prefix ("  Beach  Day " -> "beach-day")
pub fn slugify(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
}

/// Derive a folder id that is not already a key in `existing`.
///
/// Starts from `timestamp_millis` and bumps it until the id is free, so two
/// folders with the same name created in the same millisecond still differ.
pub fn derive_folder_id(name: &str, timestamp_millis: i64, existing: &Folders) -> FolderId {
    let slug = slugify(name);
    let mut stamp = timestamp_millis;

    loop {
        let candidate = FolderId::new(format!("{}-{}", slug, stamp));
        if !existing.contains_key(&candidate) {
            return candidate;
        }
        stamp += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::data::Folder;

    #[test]
    fn test_slugify_collapses_whitespace() {
        assert_eq!(slugify("  Beach Day  "), "beach-day");
        assert_eq!(slugify("Summer\t\t2024   Trip"), "summer-2024-trip");
        assert_eq!(slugify("ONE"), "one");
    }

    #[test]
    fn test_derived_id_has_slug_and_digits() {
        let id = derive_folder_id("  Beach Day  ", 1_700_000_000_123, &Folders::new());
        assert_eq!(id.as_str(), "beach-day-1700000000123");
    }

    #[test]
    fn test_same_name_same_millisecond_does_not_collide() {
        let mut existing = Folders::new();
        existing.insert(FolderId::new("beach-day-42"), Folder::named("Beach Day"));

        let id = derive_folder_id("Beach Day", 42, &existing);

        assert_eq!(id.as_str(), "beach-day-43");
    }
}
