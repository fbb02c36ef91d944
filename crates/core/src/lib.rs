//! IZAJ Core - Shared types library.
//!
//! This crate provides the domain types used across the IZAJ storefront
//! client components:
//! - `storefront` - Session and notification synchronization layer
//! - `cli` - Command-line consumer of the storefront layer
//!
//! # Architecture
//!
//! The core crate contains only types and pure helpers - no I/O, no HTTP
//! clients, no persistence. Wire shapes (`Principal`, `Notification`,
//! `NotificationStats`) live here so both the gateways and the test fakes
//! agree on one definition.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, emails, identities and notifications

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
