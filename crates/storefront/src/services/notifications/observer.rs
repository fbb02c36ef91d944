//! Read-only view of the notification store and change callbacks.

use izaj_core::{Notification, NotificationStats};

/// Point-in-time copy of the notification store state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotificationSnapshot {
    /// Notifications in server order.
    pub notifications: Vec<Notification>,
    /// Server aggregate counts; `None` until first fetched.
    pub stats: Option<NotificationStats>,
    /// Whether a fetch is in flight.
    pub is_loading: bool,
    /// Message of the last failed operation.
    pub last_error: Option<String>,
}

impl NotificationSnapshot {
    /// Unread notifications among those loaded locally.
    ///
    /// This only counts the loaded page; use [`Self::unread_count`] for the
    /// account-wide number.
    #[must_use]
    pub fn unread_local(&self) -> usize {
        self.notifications.iter().filter(|n| !n.is_read).count()
    }

    /// Account-wide unread count from the server stats; `None` until they
    /// have been fetched.
    #[must_use]
    pub fn unread_count(&self) -> Option<u64> {
        self.stats.as_ref().map(|stats| stats.unread)
    }
}

/// Receives a snapshot after every state change.
pub trait NotificationObserver: Send + Sync {
    fn on_change(&self, snapshot: &NotificationSnapshot);
}

/// Observer that ignores every change.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl NotificationObserver for NoopObserver {
    fn on_change(&self, _snapshot: &NotificationSnapshot) {}
}

#[cfg(test)]
mod tests {
    use chrono::DateTime;
    use izaj_core::{NotificationId, NotificationKind, UserId};

    use super::*;

    fn notification(id: &str, is_read: bool) -> Notification {
        Notification {
            id: NotificationId::new(id),
            user_id: UserId::new("u-1"),
            kind: NotificationKind::Order,
            title: "Order update".to_string(),
            message: "Your order is being packed.".to_string(),
            is_read,
            link: None,
            metadata: None,
            created_at: DateTime::UNIX_EPOCH,
            updated_at: DateTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn test_unread_count_comes_only_from_stats() {
        let mut snapshot = NotificationSnapshot {
            notifications: vec![
                notification("a", false),
                notification("b", false),
                notification("c", true),
            ],
            ..NotificationSnapshot::default()
        };
        assert_eq!(snapshot.unread_local(), 2);
        assert_eq!(snapshot.unread_count(), None);

        snapshot.stats = Some(NotificationStats {
            total: 40,
            unread: 12,
            ..NotificationStats::default()
        });
        assert_eq!(snapshot.unread_local(), 2);
        assert_eq!(snapshot.unread_count(), Some(12));
    }
}
