//! Client-side models for the storefront session layer.
//!
//! Domain types shared with other crates live in `izaj-core`; this module
//! holds the types that only make sense on the client (persistence tiers,
//! storage keys).

pub mod session;

pub use session::SessionPersistenceTier;
