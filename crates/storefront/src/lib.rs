//! IZAJ storefront client library.
//!
//! Keeps the authenticated identity and the notification feed consistent
//! across the local persistence tiers, the remote API and a background
//! poll. Consumers hold a [`state::StorefrontClient`] and issue commands
//! through it; they never mutate store state directly.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod error;
pub mod gateway;
pub mod models;
pub mod scheduler;
pub mod services;
pub mod session;
pub mod state;

pub use error::{Result, SyncError};
pub use state::{ClientParts, StorefrontClient};
