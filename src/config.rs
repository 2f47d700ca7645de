use std::{env, path::PathBuf};

use tracing::{info, warn};

use crate::error::GalleryError;

/// Largest file accepted for inline encoding (one document field)
pub const DEFAULT_MAX_MEDIA_BYTES: u64 = 1024 * 1024;

const DEFAULT_APP_ID: &str = "default-app-id";

/// Deployment configuration, supplied through the environment
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// SQLite file backing the document store and the local identity
    pub db_path: PathBuf,
    /// Namespace prefix of every document key
    pub app_id: String,
    /// Optional bearer token exchanged for a session at startup
    pub auth_token: Option<String>,
    pub max_media_bytes: u64,
}

impl Config {
    pub fn load() -> Result<Self, GalleryError> {
        let db_path = match var("GALLERY_DB_PATH") {
            Some(path) => PathBuf::from(path),
            None => default_db_path()?,
        };

        let app_id = var("GALLERY_APP_ID").unwrap_or_else(|| {
            info!("GALLERY_APP_ID not set, using default: {DEFAULT_APP_ID}");
            DEFAULT_APP_ID.to_string()
        });

        let max_media_bytes = match var("GALLERY_MAX_MEDIA_BYTES") {
            Some(raw) => raw.parse().map_err(|e| {
                GalleryError::Config(format!("Invalid GALLERY_MAX_MEDIA_BYTES value {raw:?}: {e}"))
            })?,
            None => DEFAULT_MAX_MEDIA_BYTES,
        };

        Ok(Self {
            db_path,
            app_id,
            auth_token: var("GALLERY_AUTH_TOKEN"),
            max_media_bytes,
        })
    }
}

/// Non-empty environment variable, trimmed
fn var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Default database location:
/// - Linux: ~/.local/share/gallery-sync/gallery.db
/// - macOS: ~/Library/Application Support/gallery-sync/gallery.db
/// - Windows: %APPDATA%\gallery-sync\gallery.db
fn default_db_path() -> Result<PathBuf, GalleryError> {
    let mut path = dirs::data_dir()
        .or_else(dirs::home_dir)
        .ok_or_else(|| GalleryError::Config("Could not determine user data directory".into()))?;

    path.push("gallery-sync");
    path.push("gallery.db");
    warn!("GALLERY_DB_PATH not set, using default: {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Environment variables are process-wide, so every case runs in one test
    #[test]
    fn test_load_from_environment() {
        env::set_var("GALLERY_DB_PATH", "/tmp/gallery-test.db");
        env::set_var("GALLERY_APP_ID", "  my-app ");
        env::set_var("GALLERY_AUTH_TOKEN", "");
        env::set_var("GALLERY_MAX_MEDIA_BYTES", "2048");

        let config = Config::load().unwrap();
        assert_eq!(config.db_path, PathBuf::from("/tmp/gallery-test.db"));
        assert_eq!(config.app_id, "my-app");
        assert_eq!(config.auth_token, None);
        assert_eq!(config.max_media_bytes, 2048);

        env::set_var("GALLERY_MAX_MEDIA_BYTES", "lots");
        assert!(matches!(Config::load(), Err(GalleryError::Config(_))));

        env::remove_var("GALLERY_APP_ID");
        env::remove_var("GALLERY_MAX_MEDIA_BYTES");
        env::set_var("GALLERY_AUTH_TOKEN", "tok-123");
        let config = Config::load().unwrap();
        assert_eq!(config.app_id, DEFAULT_APP_ID);
        assert_eq!(config.auth_token.as_deref(), Some("tok-123"));
        assert_eq!(config.max_media_bytes, DEFAULT_MAX_MEDIA_BYTES);

        env::remove_var("GALLERY_DB_PATH");
        env::remove_var("GALLERY_AUTH_TOKEN");
    }
}
