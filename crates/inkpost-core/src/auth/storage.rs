use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};
use keyring::Entry;
use tracing::{debug, warn};

use crate::config::{Config, StorageBackend, APP_NAME};

/// Key the login token is stored under
pub const TOKEN_STORAGE_KEY: &str = "jwt_token";

/// Storage file name in cache directory
const STORAGE_FILE: &str = "storage.json";

/// Persistent string key-value storage.
pub trait TokenStorage: Send + Sync {
    /// Whether this backend can be used in the current environment.
    fn is_available(&self) -> bool {
        true
    }

    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove `key`. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<()>;
}

/// Build the storage backend selected in `config`, or `None` when the token
/// should live in memory only.
pub fn open_storage(config: &Config) -> Option<Arc<dyn TokenStorage>> {
    let cache_dir = match config.storage {
        StorageBackend::File => match config.cache_dir() {
            Ok(dir) => Some(dir),
            Err(e) => {
                warn!(error = %e, "No cache directory, keeping login in memory only");
                None
            }
        },
        _ => None,
    };
    select_storage(config.storage, cache_dir)
}

fn select_storage(
    backend: StorageBackend,
    cache_dir: Option<PathBuf>,
) -> Option<Arc<dyn TokenStorage>> {
    let storage: Option<Arc<dyn TokenStorage>> = match (backend, cache_dir) {
        (StorageBackend::File, Some(dir)) => Some(Arc::new(FileStorage::new(dir))),
        (StorageBackend::File, None) => None,
        (StorageBackend::Keyring, _) => Some(Arc::new(KeyringStorage::new(APP_NAME))),
        (StorageBackend::None, _) => None,
    };
    debug!(backend = ?backend, persistent = storage.is_some(), "Token storage selected");
    storage
}

// ============================================================================
// File
// ============================================================================

/// JSON object on disk, one string value per key.
pub struct FileStorage {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process
    lock: Mutex<()>,
}

impl FileStorage {
    /// Storage file inside `dir`
    pub fn new(dir: PathBuf) -> Self {
        Self::at(dir.join(STORAGE_FILE))
    }

    pub fn at(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let contents =
            std::fs::read_to_string(&self.path).context("Failed to read storage file")?;
        if contents.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&contents).context("Failed to parse storage file")
    }

    fn write_all(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        if entries.is_empty() {
            if self.path.exists() {
                std::fs::remove_file(&self.path).context("Failed to remove storage file")?;
            }
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(entries)?;
        std::fs::write(&self.path, contents).context("Failed to write storage file")?;
        Ok(())
    }
}

impl TokenStorage for FileStorage {
    fn is_available(&self) -> bool {
        match self.path.parent() {
            Some(parent) => std::fs::create_dir_all(parent).is_ok(),
            None => false,
        }
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries = self.read_all()?;
        entries.insert(key.to_string(), value.to_string());
        self.write_all(&entries)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries = self.read_all()?;
        if entries.remove(key).is_some() {
            self.write_all(&entries)?;
        }
        Ok(())
    }
}

// ============================================================================
// OS keychain
// ============================================================================

/// Key written and removed again by `KeyringStorage::is_available`
const KEYRING_CHECK_KEY: &str = "availability_check";
const KEYRING_CHECK_VALUE: &str = "inkpost";

/// One keychain entry per key under a fixed service name.
pub struct KeyringStorage {
    service: String,
}

impl KeyringStorage {
    pub fn new(service: &str) -> Self {
        Self {
            service: service.to_string(),
        }
    }

    fn entry(&self, key: &str) -> Result<Entry> {
        Entry::new(&self.service, key).context("Failed to create keyring entry")
    }
}

impl TokenStorage for KeyringStorage {
    /// Writes a throwaway entry and reads it back. Platforms without a
    /// keychain, or with one that does not retain values, report false.
    fn is_available(&self) -> bool {
        let check = || -> Result<bool> {
            let stored = format!("{}-{}", KEYRING_CHECK_VALUE, std::process::id());
            self.set(KEYRING_CHECK_KEY, &stored)?;
            let read_back = self.get(KEYRING_CHECK_KEY)?;
            self.remove(KEYRING_CHECK_KEY)?;
            Ok(read_back.as_deref() == Some(stored.as_str()))
        };
        match check() {
            Ok(available) => available,
            Err(e) => {
                debug!(error = %e, "Keychain unavailable");
                false
            }
        }
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("Failed to retrieve value from keychain"),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entry(key)?
            .set_password(value)
            .context("Failed to store value in keychain")
    }

    fn remove(&self, key: &str) -> Result<()> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete value from keychain"),
        }
    }
}

// ============================================================================
// Memory
// ============================================================================

/// Process-local storage. Shared through an `Arc`, it survives store
/// re-initialization the way a browser's storage survives a page reload.
#[derive(Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TokenStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries().remove(key);
        Ok(())
    }
}
