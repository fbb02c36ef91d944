//! Session backends: one per local persistence tier.

use std::sync::Arc;

use izaj_core::Identity;

use super::storage::{KeyValueStorage, StorageError};
use crate::models::SessionPersistenceTier;
use crate::models::session::keys;

/// A local tier that can hold one identity snapshot.
pub trait SessionBackend: Send + Sync {
    /// Which tier this backend represents.
    fn tier(&self) -> SessionPersistenceTier;

    /// Load the snapshot if this tier currently holds one.
    ///
    /// A snapshot that fails to decode is reported as a miss.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the underlying storage cannot be read.
    fn load(&self) -> Result<Option<Identity>, StorageError>;

    /// Store a snapshot, making this tier canonical.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the underlying storage cannot be written.
    fn save(&self, identity: &Identity) -> Result<(), StorageError>;

    /// Remove the snapshot and any tier markers.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the underlying storage cannot be written.
    fn clear(&self) -> Result<(), StorageError>;
}

/// Remembered tier: snapshot plus the `rememberMe` flag.
///
/// The snapshot only counts while the flag is set; a stray `user` entry
/// without the flag is ignored.
pub struct RememberedBackend {
    storage: Arc<dyn KeyValueStorage>,
}

impl RememberedBackend {
    #[must_use]
    pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        Self { storage }
    }
}

impl SessionBackend for RememberedBackend {
    fn tier(&self) -> SessionPersistenceTier {
        SessionPersistenceTier::Remembered
    }

    fn load(&self) -> Result<Option<Identity>, StorageError> {
        let flag = self.storage.get(keys::REMEMBER_ME)?;
        if flag.as_deref() != Some(keys::REMEMBER_ME_SET) {
            return Ok(None);
        }
        Ok(decode_snapshot(self.tier(), self.storage.get(keys::USER)?))
    }

    fn save(&self, identity: &Identity) -> Result<(), StorageError> {
        self.storage.set(keys::USER, &encode_snapshot(identity)?)?;
        self.storage.set(keys::REMEMBER_ME, keys::REMEMBER_ME_SET)
    }

    fn clear(&self) -> Result<(), StorageError> {
        self.storage.remove(keys::USER)?;
        self.storage.remove(keys::REMEMBER_ME)
    }
}

/// Ephemeral tier: a bare snapshot with no flag.
pub struct EphemeralBackend {
    storage: Arc<dyn KeyValueStorage>,
}

impl EphemeralBackend {
    #[must_use]
    pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        Self { storage }
    }
}

impl SessionBackend for EphemeralBackend {
    fn tier(&self) -> SessionPersistenceTier {
        SessionPersistenceTier::Ephemeral
    }

    fn load(&self) -> Result<Option<Identity>, StorageError> {
        Ok(decode_snapshot(self.tier(), self.storage.get(keys::USER)?))
    }

    fn save(&self, identity: &Identity) -> Result<(), StorageError> {
        self.storage.set(keys::USER, &encode_snapshot(identity)?)
    }

    fn clear(&self) -> Result<(), StorageError> {
        self.storage.remove(keys::USER)
    }
}

fn encode_snapshot(identity: &Identity) -> Result<String, StorageError> {
    Ok(serde_json::to_string(identity)?)
}

fn decode_snapshot(tier: SessionPersistenceTier, raw: Option<String>) -> Option<Identity> {
    let raw = raw?;
    match serde_json::from_str::<Identity>(&raw) {
        Ok(identity) => Some(identity),
        Err(e) => {
            tracing::warn!(%tier, error = %e, "Ignoring malformed session snapshot");
            None
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{DateTime, Utc};
    use izaj_core::{Email, UserId};

    use super::*;
    use crate::session::storage::MemoryStorage;

    fn identity() -> Identity {
        Identity {
            id: UserId::new("u-1"),
            email: Some(Email::parse("maria@izaj.ph").unwrap()),
            first_name: "Maria".to_string(),
            last_name: "Santos".to_string(),
            phone: String::new(),
            email_verified: true,
            created_at: DateTime::<Utc>::UNIX_EPOCH,
            updated_at: DateTime::<Utc>::UNIX_EPOCH,
            profile_picture: None,
        }
    }

    #[test]
    fn test_remembered_requires_flag() {
        let storage: Arc<dyn KeyValueStorage> = Arc::new(MemoryStorage::new());
        let backend = RememberedBackend::new(Arc::clone(&storage));

        storage
            .set(keys::USER, &serde_json::to_string(&identity()).unwrap())
            .unwrap();
        assert!(backend.load().unwrap().is_none());

        storage.set(keys::REMEMBER_ME, "true").unwrap();
        assert_eq!(backend.load().unwrap(), Some(identity()));
    }

    #[test]
    fn test_remembered_save_sets_flag_and_clear_removes_it() {
        let storage: Arc<dyn KeyValueStorage> = Arc::new(MemoryStorage::new());
        let backend = RememberedBackend::new(Arc::clone(&storage));

        backend.save(&identity()).unwrap();
        assert_eq!(storage.get(keys::REMEMBER_ME).unwrap().as_deref(), Some("true"));

        backend.clear().unwrap();
        assert!(storage.get(keys::REMEMBER_ME).unwrap().is_none());
        assert!(storage.get(keys::USER).unwrap().is_none());
    }

    #[test]
    fn test_malformed_snapshot_is_a_miss() {
        let storage: Arc<dyn KeyValueStorage> = Arc::new(MemoryStorage::new());
        let backend = EphemeralBackend::new(Arc::clone(&storage));

        storage.set(keys::USER, "{\"id\": ").unwrap();
        assert!(backend.load().unwrap().is_none());
    }
}
