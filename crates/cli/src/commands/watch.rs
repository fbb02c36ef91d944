//! Follow the notification feed.
//!
//! Starts the client the way an interactive frontend would: hydrate, then
//! poll while logged in. Every state change that alters what is shown is
//! printed until Ctrl+C.

use std::sync::{Arc, Mutex, PoisonError};

use izaj_storefront::StorefrontClient;
use izaj_storefront::config::ClientConfig;
use izaj_storefront::services::{NotificationObserver, NotificationSnapshot};

use super::CommandError;
use super::notifications::{print_feed, unread_label};
use super::session::print_line;

/// Prints a snapshot whenever the visible feed changes.
#[derive(Default)]
struct PrintObserver {
    last: Mutex<Option<NotificationSnapshot>>,
}

impl NotificationObserver for PrintObserver {
    fn on_change(&self, snapshot: &NotificationSnapshot) {
        let visible = NotificationSnapshot {
            is_loading: false,
            ..snapshot.clone()
        };
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        if last.as_ref() == Some(&visible) {
            return;
        }
        print_line(&format!("--- {} ---", unread_label(&visible)));
        print_feed(&visible);
        *last = Some(visible);
    }
}

/// Run until Ctrl+C.
pub async fn run(config: &ClientConfig) -> Result<(), CommandError> {
    let client = StorefrontClient::from_config(config, Arc::new(PrintObserver::default()))?;
    client.init().await;

    if !client.auth().is_authenticated() {
        client.dispose();
        return Err(CommandError::NotLoggedIn);
    }

    tracing::info!(
        interval_secs = config.poll_interval.as_secs(),
        "Watching notifications, press Ctrl+C to stop"
    );
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for Ctrl+C");
    }

    client.dispose();
    Ok(())
}
