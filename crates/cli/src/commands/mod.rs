//! Command implementations.
//!
//! Every command builds a fresh [`StorefrontClient`] from the environment
//! configuration and hydrates the identity before doing its work.

pub mod avatar;
pub mod notifications;
pub mod session;
pub mod watch;

use std::sync::Arc;

use izaj_storefront::config::ClientConfig;
use izaj_storefront::gateway::GatewayError;
use izaj_storefront::services::{NoopObserver, NotificationObserver};
use izaj_storefront::{StorefrontClient, SyncError};
use thiserror::Error;

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The client could not be built.
    #[error("Client setup failed: {0}")]
    Setup(#[from] GatewayError),

    /// A session or notification operation failed.
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// Reading a local file failed.
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The command needs a logged-in user.
    #[error("Not logged in. Run `izaj login` first")]
    NotLoggedIn,

    /// The file is not an accepted image.
    #[error("Unsupported file {0}: use a .jpg, .png or .webp image")]
    UnsupportedFile(String),
}

/// Build a client and hydrate the identity.
pub async fn connect(config: &ClientConfig) -> Result<StorefrontClient, CommandError> {
    connect_with(config, Arc::new(NoopObserver)).await
}

/// Build a client with a custom observer and hydrate the identity.
pub async fn connect_with(
    config: &ClientConfig,
    observer: Arc<dyn NotificationObserver>,
) -> Result<StorefrontClient, CommandError> {
    let client = StorefrontClient::from_config(config, observer)?;
    client.auth().hydrate().await;
    Ok(client)
}

/// Build a client and require a hydrated identity.
pub async fn connect_authenticated(config: &ClientConfig) -> Result<StorefrontClient, CommandError> {
    let client = connect(config).await?;
    if !client.auth().is_authenticated() {
        return Err(CommandError::NotLoggedIn);
    }
    Ok(client)
}
