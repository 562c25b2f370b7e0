//! Keyring-based session storage.

use super::{SessionStore, StoreKey};
use crate::error::SessionError;
use tracing::instrument;

/// Keyring-based session storage.
///
/// Uses the system's native credential store. Each [`StoreKey`] becomes
/// a separate credential under the service name, with values stored
/// verbatim.
///
/// Feature-gated behind `system-keyring`.
#[cfg(feature = "system-keyring")]
#[derive(Debug, Clone)]
pub struct KeyringSessionStore {
    /// Service name for keyring entries.
    service: String,
}

#[cfg(feature = "system-keyring")]
impl Default for KeyringSessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "system-keyring")]
impl KeyringSessionStore {
    /// Service name prefix for keyring entries.
    const SERVICE_NAME: &str = "servex-auth";

    /// Create a new KeyringSessionStore with the default service name.
    pub fn new() -> Self {
        Self {
            service: Self::SERVICE_NAME.to_string(),
        }
    }

    /// Create a KeyringSessionStore with a custom service name.
    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    /// Check if the system keyring is available.
    pub fn is_available() -> bool {
        match keyring::Entry::new("servex-auth-test", "availability-check") {
            Ok(entry) => match entry.get_password() {
                Ok(_) => true,
                Err(keyring::Error::NoEntry) => true,
                Err(keyring::Error::NoStorageAccess(_)) => false,
                Err(keyring::Error::PlatformFailure(_)) => false,
                Err(_) => true,
            },
            Err(_) => false,
        }
    }

    /// Get the keyring entry for a key.
    fn entry(&self, key: StoreKey) -> Result<keyring::Entry, SessionError> {
        keyring::Entry::new(&self.service, key.name())
            .map_err(|e| SessionError::Storage(format!("Failed to create keyring entry: {}", e)))
    }
}

#[cfg(feature = "system-keyring")]
impl SessionStore for KeyringSessionStore {
    #[instrument(skip(self))]
    fn get(&self, key: StoreKey) -> Result<Option<String>, SessionError> {
        let entry = self.entry(key)?;
        match entry.get_password() {
            Ok(password) => Ok(Some(password)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(SessionError::Storage(format!("Keyring error: {}", e))),
        }
    }

    #[instrument(skip(self, value))]
    fn put(&self, key: StoreKey, value: &str) -> Result<(), SessionError> {
        let entry = self.entry(key)?;
        entry
            .set_password(value)
            .map_err(|e| SessionError::Storage(format!("Keyring error: {}", e)))?;
        Ok(())
    }

    #[instrument(skip(self))]
    fn remove(&self, key: StoreKey) -> Result<(), SessionError> {
        let entry = self.entry(key)?;
        match entry.delete_credential() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(SessionError::Storage(format!("Keyring error: {}", e))),
        }
    }

    fn name(&self) -> &str {
        "keyring"
    }
}

#[cfg(all(test, feature = "system-keyring"))]
mod tests {
    use super::*;

    #[test]
    fn test_keyring_name() {
        let store = KeyringSessionStore::new();
        assert_eq!(store.name(), "keyring");
    }

    #[test]
    fn test_keyring_availability_check_does_not_panic() {
        // Result depends on the host; only the check itself is under test.
        let _available = KeyringSessionStore::is_available();
    }
}
