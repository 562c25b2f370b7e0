//! Session storage implementations.

pub mod file;
pub mod memory;
pub mod trait_def;
pub mod keyring;

// Re-exports
pub use file::FileSessionStore;
pub use memory::MemorySessionStore;
pub use trait_def::{SessionStore, StoreKey};

#[cfg(feature = "system-keyring")]
pub use keyring::KeyringSessionStore;

use crate::config::{StorageBackend, StorageConfig};
use std::sync::Arc;

/// Build the storage backend selected by config.
pub fn from_config(config: &StorageConfig) -> Arc<dyn SessionStore> {
    match config.backend {
        StorageBackend::File => Arc::new(FileSessionStore::new(&config.dir)),
        #[cfg(feature = "system-keyring")]
        StorageBackend::Keyring => Arc::new(KeyringSessionStore::new()),
        #[cfg(not(feature = "system-keyring"))]
        StorageBackend::Keyring => {
            tracing::warn!(
                "Keyring storage requested but system-keyring feature not enabled, falling back to file storage"
            );
            Arc::new(FileSessionStore::new(&config.dir))
        }
        StorageBackend::Memory => Arc::new(MemorySessionStore::new()),
    }
}
