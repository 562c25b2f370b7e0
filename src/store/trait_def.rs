//! Session storage trait.

use crate::error::SessionError;
use std::sync::Arc;

/// The named slots a session occupies in storage.
///
/// Every persisted artifact of the auth flow lives under one of these
/// keys, so a backend can enumerate and clear them without knowing what
/// the values mean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKey {
    /// Serialized token set for the current session.
    Tokens,
    /// PKCE code verifier held between redirect and callback.
    Verifier,
    /// CSRF state token held between redirect and callback.
    State,
    /// Application path to return to after the callback.
    RedirectPath,
}

impl StoreKey {
    /// Every key a session can occupy.
    pub const ALL: [StoreKey; 4] = [
        StoreKey::Tokens,
        StoreKey::Verifier,
        StoreKey::State,
        StoreKey::RedirectPath,
    ];

    /// Stable storage name for this key.
    pub fn name(self) -> &'static str {
        match self {
            StoreKey::Tokens => "tokens",
            StoreKey::Verifier => "pkce_verifier",
            StoreKey::State => "oauth_state",
            StoreKey::RedirectPath => "redirect_path",
        }
    }
}

/// Trait for session storage backends.
///
/// All storage implementations must be thread-safe (`Send + Sync`).
/// Values are opaque strings; interpretation (JSON or plain) belongs to
/// the session manager, so a corrupt entry surfaces there rather than as
/// a storage error.
pub trait SessionStore: Send + Sync {
    /// Load the value stored under a key, if any.
    fn get(&self, key: StoreKey) -> Result<Option<String>, SessionError>;

    /// Store a value under a key, replacing any previous value.
    fn put(&self, key: StoreKey, value: &str) -> Result<(), SessionError>;

    /// Remove the value stored under a key. Removing an absent key is not
    /// an error.
    fn remove(&self, key: StoreKey) -> Result<(), SessionError>;

    /// Load and remove in one step.
    ///
    /// The default implementation is a get followed by a remove, not an
    /// atomic swap; callers that need single-use semantics under
    /// concurrency must serialize their takes.
    fn take(&self, key: StoreKey) -> Result<Option<String>, SessionError> {
        let value = self.get(key)?;
        if value.is_some() {
            self.remove(key)?;
        }
        Ok(value)
    }

    /// Get the name of this storage backend.
    fn name(&self) -> &str;
}

// Blanket implementation for Arc<T>
impl<T: SessionStore + ?Sized> SessionStore for Arc<T> {
    fn get(&self, key: StoreKey) -> Result<Option<String>, SessionError> {
        (**self).get(key)
    }
    fn put(&self, key: StoreKey, value: &str) -> Result<(), SessionError> {
        (**self).put(key, value)
    }
    fn remove(&self, key: StoreKey) -> Result<(), SessionError> {
        (**self).remove(key)
    }
    fn take(&self, key: StoreKey) -> Result<Option<String>, SessionError> {
        (**self).take(key)
    }
    fn name(&self) -> &str {
        (**self).name()
    }
}

// Blanket implementation for Box<T>
impl<T: SessionStore + ?Sized> SessionStore for Box<T> {
    fn get(&self, key: StoreKey) -> Result<Option<String>, SessionError> {
        (**self).get(key)
    }
    fn put(&self, key: StoreKey, value: &str) -> Result<(), SessionError> {
        (**self).put(key, value)
    }
    fn remove(&self, key: StoreKey) -> Result<(), SessionError> {
        (**self).remove(key)
    }
    fn take(&self, key: StoreKey) -> Result<Option<String>, SessionError> {
        (**self).take(key)
    }
    fn name(&self) -> &str {
        (**self).name()
    }
}
