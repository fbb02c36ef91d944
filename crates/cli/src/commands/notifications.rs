//! Notification commands.
//!
//! # Usage
//!
//! ```bash
//! izaj notifications list --unread-only --kind order
//! izaj notifications stats
//! izaj notifications read <id>
//! izaj notifications read-all
//! izaj notifications delete <id>
//! ```

use izaj_core::{NotificationId, NotificationKind, NotificationStats};
use izaj_storefront::config::ClientConfig;
use izaj_storefront::gateway::NotificationFilter;
use izaj_storefront::services::NotificationSnapshot;

use super::session::print_line;
use super::{CommandError, connect_authenticated};

/// Fetch and print one page of notifications.
pub async fn list(
    config: &ClientConfig,
    unread_only: bool,
    kind: Option<NotificationKind>,
    limit: Option<u32>,
    offset: u32,
) -> Result<(), CommandError> {
    let client = connect_authenticated(config).await?;
    let filter = NotificationFilter {
        limit: limit.unwrap_or(config.notification_page_size),
        offset,
        kind,
        unread_only,
    };
    client.notifications().fetch_notifications(Some(filter)).await?;
    print_feed(&client.notifications().snapshot());
    Ok(())
}

/// Print aggregate counts.
pub async fn stats(config: &ClientConfig) -> Result<(), CommandError> {
    let client = connect_authenticated(config).await?;
    client.notifications().refresh_stats().await?;
    if let Some(stats) = client.notifications().snapshot().stats {
        print_stats(&stats);
    }
    Ok(())
}

/// Mark one notification as read.
pub async fn read(config: &ClientConfig, id: &str) -> Result<(), CommandError> {
    let client = connect_authenticated(config).await?;
    client
        .notifications()
        .mark_as_read(&NotificationId::new(id))
        .await?;
    print_unread(&client.notifications().snapshot());
    Ok(())
}

/// Mark every notification as read.
pub async fn read_all(config: &ClientConfig) -> Result<(), CommandError> {
    let client = connect_authenticated(config).await?;
    client.notifications().mark_all_as_read().await?;
    print_unread(&client.notifications().snapshot());
    Ok(())
}

/// Delete one notification.
pub async fn delete(config: &ClientConfig, id: &str) -> Result<(), CommandError> {
    let client = connect_authenticated(config).await?;
    client
        .notifications()
        .delete_notification(&NotificationId::new(id))
        .await?;
    print_line(&format!("Deleted {id}"));
    Ok(())
}

#[allow(clippy::print_stdout)]
pub fn print_feed(snapshot: &NotificationSnapshot) {
    if snapshot.notifications.is_empty() {
        println!("No notifications");
    }
    for n in &snapshot.notifications {
        let marker = if n.is_read { ' ' } else { '*' };
        println!(
            "{marker} {}  [{}] {}  ({})",
            n.id,
            n.kind,
            n.title,
            n.created_at.format("%Y-%m-%d %H:%M")
        );
        println!("    {}", n.message);
        if let Some(link) = &n.link {
            println!("    {link}");
        }
    }
    if let Some(error) = &snapshot.last_error {
        println!("! {error}");
    }
}

#[allow(clippy::print_stdout)]
fn print_stats(stats: &NotificationStats) {
    println!("total:  {}", stats.total);
    println!("unread: {}", stats.unread);
    for kind in NotificationKind::ALL {
        println!("  {:<9} {}", kind.as_str(), stats.count(kind));
    }
}

#[allow(clippy::print_stdout)]
fn print_unread(snapshot: &NotificationSnapshot) {
    println!("{}", unread_label(snapshot));
}

/// Unread count from the server stats, or a placeholder until they arrive.
pub fn unread_label(snapshot: &NotificationSnapshot) -> String {
    snapshot.unread_count().map_or_else(
        || "unread count unavailable".to_string(),
        |unread| format!("{unread} unread"),
    )
}
