//! Secret storage for extracted Slack credentials
//!
//! The broker persists one entry for the session cookie and one entry per
//! workspace token. The default backend is the OS keychain (macOS Keychain,
//! Windows Credential Manager, Secret Service), accessed via the keyring crate.

use std::collections::BTreeMap;
use std::sync::Mutex;

use keyring::Entry;
use thiserror::Error;
use tracing::{debug, warn};

/// Default service name for stored credentials
pub const DEFAULT_SERVICE: &str = "slack-session";

/// Entry holding the list of keys written by this store
const INDEX_KEY: &str = "__keys__";

/// Errors that can occur during secure storage operations
#[derive(Debug, Error)]
pub enum SecureStoreError {
    /// Keyring operation failed
    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    /// Invalid data format
    #[error("Invalid data format: {0}")]
    InvalidFormat(String),
}

/// Logical key-value namespace for secrets
///
/// Writes are whole-value replacements.
#[cfg_attr(test, mockall::automock)]
pub trait SecretStore: Send + Sync {
    /// Stores a value under a key, replacing any previous value
    fn set(&self, key: &str, value: &str) -> Result<(), SecureStoreError>;

    /// Retrieves a value, `None` if the key is not stored
    fn get(&self, key: &str) -> Result<Option<String>, SecureStoreError>;

    /// Lists every key currently stored in this namespace
    fn list_keys(&self) -> Result<Vec<String>, SecureStoreError>;

    /// Deletes a key, returning whether it existed
    fn delete(&self, key: &str) -> Result<bool, SecureStoreError>;

    /// Deletes every key in this namespace
    fn clear(&self) -> Result<(), SecureStoreError> {
        for key in self.list_keys()? {
            self.delete(&key)?;
        }
        Ok(())
    }
}

/// Keychain-backed secret store
///
/// Keychains cannot enumerate entries by service on every platform, so the
/// store keeps its own key index in a reserved entry.
///
/// # Example
///
/// ```no_run
/// use slack_session_lib::auth::{KeyringStore, SecretStore};
///
/// let store = KeyringStore::new();
/// store.set("cookie", "xoxd-...").unwrap();
/// assert_eq!(store.get("cookie").unwrap(), Some("xoxd-...".to_string()));
/// store.clear().unwrap();
/// ```
pub struct KeyringStore {
    service: String,
}

impl KeyringStore {
    /// Creates a new KeyringStore with the default service name
    pub fn new() -> Self {
        Self::with_service(DEFAULT_SERVICE)
    }

    /// Creates a new KeyringStore with a custom service name
    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    /// Returns the service name used for this store
    pub fn service(&self) -> &str {
        &self.service
    }

    fn entry(&self, key: &str) -> Result<Entry, SecureStoreError> {
        Ok(Entry::new(&self.service, key)?)
    }

    fn read(&self, key: &str) -> Result<Option<String>, SecureStoreError> {
        match self.entry(key)?.get_password() {
            Ok(password) => Ok(Some(password)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(SecureStoreError::Keyring(e)),
        }
    }

    fn remove(&self, key: &str) -> Result<bool, SecureStoreError> {
        match self.entry(key)?.delete_credential() {
            Ok(()) => Ok(true),
            Err(keyring::Error::NoEntry) => Ok(false),
            Err(e) => Err(SecureStoreError::Keyring(e)),
        }
    }

    fn read_index(&self) -> Result<Vec<String>, SecureStoreError> {
        match self.read(INDEX_KEY)? {
            Some(raw) => serde_json::from_str(&raw).map_err(|e| {
                SecureStoreError::InvalidFormat(format!("key index is not a JSON list: {}", e))
            }),
            None => Ok(Vec::new()),
        }
    }

    fn write_index(&self, keys: &[String]) -> Result<(), SecureStoreError> {
        if keys.is_empty() {
            self.remove(INDEX_KEY)?;
            return Ok(());
        }
        let raw = serde_json::to_string(keys)
            .map_err(|e| SecureStoreError::InvalidFormat(e.to_string()))?;
        self.entry(INDEX_KEY)?.set_password(&raw)?;
        Ok(())
    }
}

impl Default for KeyringStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretStore for KeyringStore {
    fn set(&self, key: &str, value: &str) -> Result<(), SecureStoreError> {
        if key == INDEX_KEY {
            return Err(SecureStoreError::InvalidFormat(format!(
                "'{}' is a reserved key",
                INDEX_KEY
            )));
        }

        self.entry(key)?.set_password(value).map_err(|e| {
            warn!("Failed to store credential for key '{}': {}", key, e);
            SecureStoreError::Keyring(e)
        })?;

        let mut keys = self.read_index()?;
        if !keys.iter().any(|k| k == key) {
            keys.push(key.to_string());
            self.write_index(&keys)?;
        }
        debug!("Stored credential for key '{}' in '{}'", key, self.service);
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>, SecureStoreError> {
        self.read(key)
    }

    fn list_keys(&self) -> Result<Vec<String>, SecureStoreError> {
        self.read_index()
    }

    fn delete(&self, key: &str) -> Result<bool, SecureStoreError> {
        let existed = self.remove(key)?;

        let mut keys = self.read_index()?;
        let before = keys.len();
        keys.retain(|k| k != key);
        if keys.len() != before {
            self.write_index(&keys)?;
        }
        debug!("Deleted credential for key '{}' (existed: {})", key, existed);
        Ok(existed)
    }
}

/// In-process secret store
///
/// Holds nothing across runs; used by tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    /// Creates an empty MemoryStore
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, String>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SecretStore for MemoryStore {
    fn set(&self, key: &str, value: &str) -> Result<(), SecureStoreError> {
        self.entries().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>, SecureStoreError> {
        Ok(self.entries().get(key).cloned())
    }

    fn list_keys(&self) -> Result<Vec<String>, SecureStoreError> {
        Ok(self.entries().keys().cloned().collect())
    }

    fn delete(&self, key: &str) -> Result<bool, SecureStoreError> {
        Ok(self.entries().remove(key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_creation() {
        let store = KeyringStore::new();
        assert_eq!(store.service(), "slack-session");

        let custom = KeyringStore::with_service("Custom");
        assert_eq!(custom.service(), "Custom");
    }

    #[test]
    fn test_reserved_key_rejected() {
        let store = KeyringStore::with_service("slack-session-test");
        assert!(matches!(
            store.set(INDEX_KEY, "x"),
            Err(SecureStoreError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert_eq!(store.get("cookie").unwrap(), None);

        store.set("cookie", "xoxd-1").unwrap();
        store.set("cookie", "xoxd-2").unwrap();
        assert_eq!(store.get("cookie").unwrap(), Some("xoxd-2".to_string()));
        assert_eq!(store.list_keys().unwrap(), vec!["cookie".to_string()]);

        assert!(store.delete("cookie").unwrap());
        assert!(!store.delete("cookie").unwrap());
    }

    #[test]
    fn test_clear_removes_every_key() {
        let store = MemoryStore::new();
        store.set("cookie", "xoxd-1").unwrap();
        store.set("https://acme.slack.com/", "{}").unwrap();

        store.clear().unwrap();
        assert!(store.list_keys().unwrap().is_empty());
    }

    #[test]
    #[ignore = "touches the OS keychain"]
    fn test_keyring_store_and_list() {
        let store = KeyringStore::with_service("slack-session-test");
        let _ = store.clear();

        store.set("cookie", "xoxd-test").unwrap();
        store.set("https://acme.slack.com/", "{}").unwrap();
        assert_eq!(store.get("cookie").unwrap(), Some("xoxd-test".to_string()));
        assert_eq!(store.list_keys().unwrap().len(), 2);

        store.clear().unwrap();
        assert!(store.list_keys().unwrap().is_empty());
        assert_eq!(store.get("cookie").unwrap(), None);
    }
}
