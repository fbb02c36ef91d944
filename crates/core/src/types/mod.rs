//! Core types for the IZAJ storefront client.
//!
//! This module provides type-safe wrappers for the domain concepts shared by
//! the session and notification layers.

pub mod email;
pub mod id;
pub mod identity;
pub mod notification;

pub use email::{Email, EmailError};
pub use id::*;
pub use identity::{Identity, Principal, UserMetadata, split_full_name};
pub use notification::{Notification, NotificationKind, NotificationStats, UnknownKind};
