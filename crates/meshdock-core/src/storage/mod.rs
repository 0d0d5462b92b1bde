// ── Persisted key/value storage ──
//
// The stack persists its identity state into a flat key/value namespace.
// This layer reads profiles out of it and owns exactly one write: clearing
// the current-profile pointer on logout.

pub mod codec;
mod file;
mod memory;
pub mod profiles;

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tracing::warn;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use profiles::{clear_current_profile, load_profiles, set_current_profile};

/// Prefix of every key the stack writes.
pub const STATE_PREFIX: &str = "ipn-state-";

/// Stack-side id of the current-profile pointer.
pub const CURRENT_PROFILE_ID: &str = "_current-profile";

/// Stack-side id prefix shared by all stored profiles.
pub const PROFILE_ID_PREFIX: &str = "profile-";

/// Full storage key for a stack-side state id.
pub fn state_key(id: &str) -> String {
    format!("{STATE_PREFIX}{id}")
}

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to access state file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("state file {path} is corrupt: {message}")]
    Corrupt { path: PathBuf, message: String },

    #[error("state store lock poisoned")]
    Lock,
}

// ── KeyValueStore ───────────────────────────────────────────────────

/// Flat string key/value store shared by the stack and the console.
///
/// Implementations must not cache reads: another writer (the stack) may
/// change entries at any time.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    /// Remove a key. Returns whether it existed.
    fn remove(&self, key: &str) -> Result<bool, StorageError>;
    fn keys(&self) -> Result<Vec<String>, StorageError>;
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for Arc<T> {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<bool, StorageError> {
        (**self).remove(key)
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        (**self).keys()
    }
}

// ── Stack-facing view ───────────────────────────────────────────────

/// Adapts a [`KeyValueStore`] to the stack's `getState`/`setState`
/// interface, prefixing every id with [`STATE_PREFIX`].
#[derive(Clone)]
pub struct StackStateStorage {
    store: Arc<dyn KeyValueStore>,
}

impl StackStateStorage {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }
}

impl meshdock_api::StateStorage for StackStateStorage {
    fn get_state(&self, id: &str) -> String {
        match self.store.get(&state_key(id)) {
            Ok(value) => value.unwrap_or_default(),
            Err(e) => {
                warn!(id, error = %e, "stack state read failed");
                String::new()
            }
        }
    }

    fn set_state(&self, id: &str, value: &str) {
        if let Err(e) = self.store.set(&state_key(id), value) {
            warn!(id, error = %e, "stack state write failed");
        }
    }
}
