//! Notification feed types.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{NotificationId, UserId};

/// Category of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Order,
    Promo,
    Review,
    System,
    Favorite,
    Payment,
}

impl NotificationKind {
    /// Every kind, in the order the stats endpoint reports them.
    pub const ALL: [Self; 6] = [
        Self::Order,
        Self::Promo,
        Self::Review,
        Self::System,
        Self::Favorite,
        Self::Payment,
    ];

    /// Wire name of the kind (also used as the `type` query parameter).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Order => "order",
            Self::Promo => "promo",
            Self::Review => "review",
            Self::System => "system",
            Self::Favorite => "favorite",
            Self::Payment => "payment",
        }
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown notification kind.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown notification type: {0}")]
pub struct UnknownKind(pub String);

impl std::str::FromStr for NotificationKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownKind(s.to_string()))
    }
}

/// A user-facing message carrying a read/unread state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub id: NotificationId,
    pub user_id: UserId,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub is_read: bool,
    /// Storefront path the notification points at (e.g. an order page).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Server-computed aggregate counts.
///
/// This is the authority for totals. It is never recomputed from a local
/// (possibly paginated) list; the only local adjustment is
/// [`NotificationStats::record_added`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationStats {
    pub total: u64,
    pub unread: u64,
    #[serde(default)]
    pub by_type: BTreeMap<NotificationKind, u64>,
}

impl NotificationStats {
    /// Fill in a zero count for every kind the server omitted.
    #[must_use]
    pub fn with_all_kinds(mut self) -> Self {
        for kind in NotificationKind::ALL {
            self.by_type.entry(kind).or_insert(0);
        }
        self
    }

    /// Count for a single kind.
    #[must_use]
    pub fn count(&self, kind: NotificationKind) -> u64 {
        self.by_type.get(&kind).copied().unwrap_or(0)
    }

    /// Apply one externally delivered notification to the counts.
    pub fn record_added(&mut self, notification: &Notification) {
        self.total += 1;
        if !notification.is_read {
            self.unread += 1;
        }
        *self.by_type.entry(notification.kind).or_insert(0) += 1;
    }
}
