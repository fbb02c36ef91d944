//! Profile picture commands.
//!
//! # Usage
//!
//! ```bash
//! izaj avatar upload ./me.png
//! izaj avatar remove
//! ```

use std::path::Path;

use izaj_storefront::config::ClientConfig;
use izaj_storefront::gateway::ProfilePictureUpload;
use izaj_storefront::services::auth::content_type_for_path;

use super::session::print_line;
use super::{CommandError, connect_authenticated};

/// Upload an image file as the profile picture.
pub async fn upload(config: &ClientConfig, path: &Path) -> Result<(), CommandError> {
    let content_type = content_type_for_path(path)
        .ok_or_else(|| CommandError::UnsupportedFile(path.display().to_string()))?;
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| CommandError::Io {
            path: path.display().to_string(),
            source,
        })?;
    let file_name = path
        .file_name()
        .map_or_else(|| "avatar".to_string(), |n| n.to_string_lossy().into_owned());

    let client = connect_authenticated(config).await?;
    let url = client
        .auth()
        .upload_profile_picture(&ProfilePictureUpload {
            file_name,
            content_type: content_type.to_string(),
            bytes,
        })
        .await?;
    print_line(&format!("Profile picture updated: {url}"));
    Ok(())
}

/// Remove the profile picture.
pub async fn remove(config: &ClientConfig) -> Result<(), CommandError> {
    let client = connect_authenticated(config).await?;
    client.auth().remove_profile_picture().await?;
    print_line("Profile picture removed");
    Ok(())
}
