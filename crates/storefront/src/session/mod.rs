//! Local session persistence.
//!
//! # Architecture
//!
//! Two mutually exclusive tiers can cache the identity snapshot:
//!
//! - **Remembered** - [`FileStorage`], survives restarts, gated by the
//!   `rememberMe` flag
//! - **Ephemeral** - [`MemoryStorage`], gone when the process exits
//!
//! [`SessionStore`] keeps the backends in a priority-ordered list. Lookup
//! walks the list and stops at the first hit; persisting into one tier purges
//! every other tier so no ambiguous state survives a login.
//!
//! A remembered login also keeps the remote session credential next to the
//! snapshot, so the server still recognises the identity after a restart.

mod backend;
mod storage;

pub use backend::{EphemeralBackend, RememberedBackend, SessionBackend};
pub use storage::{FileStorage, KeyValueStorage, MemoryStorage, StorageError};

use std::sync::Arc;

use izaj_core::Identity;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, warn};

use crate::models::SessionPersistenceTier;
use crate::models::session::keys;

/// Priority-ordered set of local session backends.
#[derive(Clone)]
pub struct SessionStore {
    backends: Vec<Arc<dyn SessionBackend>>,
    /// Storage holding dependent state: the cart and the remote session
    /// credential.
    dependents: Arc<dyn KeyValueStorage>,
}

impl SessionStore {
    /// Build the standard two-tier store.
    ///
    /// The cart lives next to the remembered snapshot, so it is purged from
    /// there on logout.
    #[must_use]
    pub fn new(remembered: Arc<dyn KeyValueStorage>, ephemeral: Arc<dyn KeyValueStorage>) -> Self {
        let backends: Vec<Arc<dyn SessionBackend>> = vec![
            Arc::new(RememberedBackend::new(Arc::clone(&remembered))),
            Arc::new(EphemeralBackend::new(ephemeral)),
        ];
        Self::with_backends(backends, remembered)
    }

    /// Build a store from an explicit priority list.
    #[must_use]
    pub fn with_backends(
        backends: Vec<Arc<dyn SessionBackend>>,
        dependents: Arc<dyn KeyValueStorage>,
    ) -> Self {
        Self {
            backends,
            dependents,
        }
    }

    /// Tiers in lookup order.
    pub fn priority(&self) -> impl Iterator<Item = SessionPersistenceTier> + '_ {
        self.backends.iter().map(|b| b.tier())
    }

    /// Find the highest-priority snapshot.
    ///
    /// Storage failures and malformed snapshots fall through to the next tier.
    #[must_use]
    pub fn lookup(&self) -> Option<(SessionPersistenceTier, Identity)> {
        for backend in &self.backends {
            match backend.load() {
                Ok(Some(identity)) => {
                    debug!(tier = %backend.tier(), user_id = %identity.id, "Session snapshot found");
                    return Some((backend.tier(), identity));
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(tier = %backend.tier(), error = %e, "Failed to read session tier");
                }
            }
        }
        None
    }

    /// Tier currently holding the canonical snapshot.
    #[must_use]
    pub fn active_tier(&self) -> SessionPersistenceTier {
        self.lookup()
            .map_or(SessionPersistenceTier::None, |(tier, _)| tier)
    }

    /// Write `identity` into `tier` and purge every other tier.
    ///
    /// Persisting into [`SessionPersistenceTier::None`] purges everything.
    /// Any saved remote session credential is dropped unless `tier` is
    /// [`SessionPersistenceTier::Remembered`].
    ///
    /// # Errors
    ///
    /// Returns the first `StorageError` encountered. Other tiers are still
    /// purged when the write fails.
    pub fn persist(
        &self,
        tier: SessionPersistenceTier,
        identity: &Identity,
    ) -> Result<(), StorageError> {
        let mut first_error = None;

        for backend in &self.backends {
            let result = if backend.tier() == tier {
                backend.save(identity)
            } else {
                backend.clear()
            };
            if let Err(e) = result {
                warn!(tier = %backend.tier(), error = %e, "Session tier update failed");
                first_error.get_or_insert(e);
            }
        }
        if tier != SessionPersistenceTier::Remembered {
            if let Err(e) = self.dependents.remove(keys::REMOTE_SESSION) {
                warn!(error = %e, "Failed to drop saved remote session");
                first_error.get_or_insert(e);
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    /// Keep the remote session credential next to the remembered snapshot.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the storage cannot be written.
    pub fn save_remote_session(&self, token: &SecretString) -> Result<(), StorageError> {
        self.dependents
            .set(keys::REMOTE_SESSION, token.expose_secret())
    }

    /// Remote session credential saved by a remembered login, if any.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the storage cannot be read.
    pub fn remote_session(&self) -> Result<Option<SecretString>, StorageError> {
        Ok(self
            .dependents
            .get(keys::REMOTE_SESSION)?
            .filter(|token| !token.is_empty())
            .map(SecretString::from))
    }

    /// Re-save `identity` into whichever tier is canonical.
    ///
    /// Returns the tier written, or [`SessionPersistenceTier::None`] when no
    /// tier holds a snapshot (nothing is written in that case).
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the canonical tier cannot be written.
    pub fn rewrite(&self, identity: &Identity) -> Result<SessionPersistenceTier, StorageError> {
        let tier = self.active_tier();
        if tier != SessionPersistenceTier::None {
            self.persist(tier, identity)?;
        }
        Ok(tier)
    }

    /// Purge every tier plus dependent state.
    ///
    /// # Errors
    ///
    /// Returns the first `StorageError` encountered; every tier is attempted.
    pub fn clear_all(&self) -> Result<(), StorageError> {
        let mut first_error = None;

        for backend in &self.backends {
            if let Err(e) = backend.clear() {
                warn!(tier = %backend.tier(), error = %e, "Failed to clear session tier");
                first_error.get_or_insert(e);
            }
        }
        for key in [keys::CART, keys::REMOTE_SESSION] {
            if let Err(e) = self.dependents.remove(key) {
                warn!(key, error = %e, "Failed to clear dependent state");
                first_error.get_or_insert(e);
            }
        }

        first_error.map_or(Ok(()), Err)
    }
}
