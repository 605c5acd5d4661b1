use std::{
    collections::HashMap,
    fs,
    path::PathBuf,
    sync::{Arc, Mutex, PoisonError},
};

/// Key holding the raw session token.
pub const TOKEN_KEY: &str = "token";
/// Key holding the role tag stored alongside the token.
pub const ROLE_KEY: &str = "role";

/// StorageError
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("credential file I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("credential file is not valid JSON: {0}")]
    Corrupt(#[from] serde_json::Error),
    /// Only produced by `MemoryCredentialStore::new_failing`.
    #[error("credential store rejected the write")]
    Rejected,
}

// 1. CredentialStore Contract
/// CredentialStore
///
/// The client-local key/value store the session is hydrated from. It is read once during
/// `SessionStore::initialize` and written on login and logout. Implementations are
/// synchronous, like browser local storage.
pub trait CredentialStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// CredentialState
///
/// The shared handle injected into a `SessionStore`.
pub type CredentialState = Arc<dyn CredentialStore>;

// 2. File-backed implementation
/// FileCredentialStore
///
/// Persists entries as a flat JSON object. The whole file is rewritten on every change; the
/// store only ever holds a couple of short strings.
pub struct FileCredentialStore {
    path: PathBuf,
    // Serializes read-modify-write cycles.
    lock: Mutex<()>,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    fn load(&self) -> Result<HashMap<String, String>, StorageError> {
        match fs::read_to_string(&self.path) {
            Ok(raw) if raw.trim().is_empty() => Ok(HashMap::new()),
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Current entries for a read-modify-write, plus whether the file was damaged and must be
    /// rewritten. Damaged content is logged and dropped so a fresh sign-in can still be
    /// persisted; I/O failures are returned.
    fn load_for_write(&self) -> Result<(HashMap<String, String>, bool), StorageError> {
        match self.load() {
            Ok(entries) => Ok((entries, false)),
            Err(StorageError::Corrupt(e)) => {
                tracing::warn!(path = %self.path.display(), error = %e, "discarding corrupt credential file");
                Ok((HashMap::new(), true))
            }
            Err(e) => Err(e),
        }
    }

    fn save(&self, entries: &HashMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.path, serde_json::to_string_pretty(entries)?)?;
        Ok(())
    }
}

impl CredentialStore for FileCredentialStore {
    fn get(&self, key: &str) -> Option<String> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        match self.load() {
            Ok(mut entries) => entries.remove(key),
            Err(e) => {
                // An unreadable file is treated as empty so hydration resolves unauthenticated.
                tracing::warn!(path = %self.path.display(), error = %e, "credential file unreadable");
                None
            }
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let (mut entries, _) = self.load_for_write()?;
        entries.insert(key.to_string(), value.to_string());
        self.save(&entries)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let (mut entries, damaged) = self.load_for_write()?;
        if entries.remove(key).is_some() || damaged {
            self.save(&entries)?;
        }
        Ok(())
    }
}

// 3. In-memory implementation (tests, ephemeral sessions)
/// MemoryCredentialStore
#[derive(Default)]
pub struct MemoryCredentialStore {
    entries: Mutex<HashMap<String, String>>,
    /// When true, all writes fail with `StorageError::Rejected`.
    pub should_fail: bool,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    /// Builds a store that already holds the given entries.
    pub fn with_entries<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let entries = entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self {
            entries: Mutex::new(entries),
            should_fail: false,
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        if self.should_fail {
            return Err(StorageError::Rejected);
        }
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        if self.should_fail {
            return Err(StorageError::Rejected);
        }
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}
