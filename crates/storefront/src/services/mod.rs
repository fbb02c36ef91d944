//! Client-side services.
//!
//! - `auth` - identity lifecycle (hydrate, login, logout, profile)
//! - `notifications` - notification feed, stats and polling

pub mod auth;
pub mod notifications;

pub use auth::AuthSessionManager;
pub use notifications::{
    NoopObserver, NotificationObserver, NotificationSettings, NotificationSnapshot,
    NotificationStore,
};
