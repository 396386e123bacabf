use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, RwLock};
use thiserror::Error;

pub const MAX_KEY_LENGTH: usize = 512;
pub const MAX_VALUE_SIZE: usize = 5 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KvKey {
    namespace: KeyNamespace,
    key: String,
}

impl KvKey {
    pub fn new(namespace: KeyNamespace, key: impl Into<String>) -> Result<Self, KvError> {
        let key = key.into();
        Self::validate_key(&key)?;
        Ok(Self { namespace, key })
    }

    pub fn raw(&self) -> String {
        format!("{}:{}", self.namespace.prefix(), self.key)
    }

    pub fn namespace(&self) -> &KeyNamespace {
        &self.namespace
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    fn validate_key(key: &str) -> Result<(), KvError> {
        if key.is_empty() {
            return Err(KvError::InvalidKey {
                key: key.to_string(),
                reason: "key cannot be empty".to_string(),
            });
        }

        if key.len() > MAX_KEY_LENGTH {
            return Err(KvError::InvalidKey {
                key: key.chars().take(50).collect::<String>() + "...",
                reason: format!("key exceeds maximum length of {} bytes", MAX_KEY_LENGTH),
            });
        }

        if key.trim().is_empty() {
            return Err(KvError::InvalidKey {
                key: key.to_string(),
                reason: "key cannot be only whitespace".to_string(),
            });
        }

        if key.contains('\0') {
            return Err(KvError::InvalidKey {
                key: key.replace('\0', "\\0"),
                reason: "key cannot contain null bytes".to_string(),
            });
        }

        for c in key.chars() {
            if c.is_control() && c != '\t' {
                return Err(KvError::InvalidKey {
                    key: key.to_string(),
                    reason: "key contains invalid control characters".to_string(),
                });
            }
        }

        Ok(())
    }
}

/// Storage scope of a key. `Local` survives restarts, `Session` lives as long
/// as the current app session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyNamespace {
    Local,
    Session,
}

impl KeyNamespace {
    pub fn prefix(&self) -> &str {
        match self {
            KeyNamespace::Local => "local",
            KeyNamespace::Session => "session",
        }
    }
}

#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum KvError {
    #[error("invalid key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("value too large: {size} bytes exceeds maximum of {max} bytes")]
    ValueTooLarge { size: usize, max: usize },

    #[error("storage error: {message} (code: {code:?}, retryable: {retryable})")]
    Storage {
        code: StorageErrorCode,
        message: String,
        retryable: bool,
    },

    #[error("serialization error: {message}")]
    Serialization { message: String, key: Option<String> },
}

impl KvError {
    pub fn is_retryable(&self) -> bool {
        match self {
            KvError::Storage { retryable, .. } => *retryable,
            _ => false,
        }
    }

    pub fn storage(code: StorageErrorCode, message: impl Into<String>) -> Self {
        let retryable = code.is_retryable();
        Self::Storage {
            code,
            message: message.into(),
            retryable,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageErrorCode {
    Unknown,
    ConnectionFailed,
    Corrupted,
    DiskFull,
    PermissionDenied,
    Busy,
    Locked,
    IoError,
}

impl StorageErrorCode {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StorageErrorCode::Busy | StorageErrorCode::Locked)
    }
}

/// String key-value storage provided by the shell (browser storage, a file,
/// SQLite). Values are JSON text.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &KvKey) -> Result<Option<String>, KvError>;
    fn set(&self, key: &KvKey, value: String) -> Result<(), KvError>;
    /// Returns whether the key existed.
    fn remove(&self, key: &KvKey) -> Result<bool, KvError>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn poisoned() -> KvError {
        KvError::storage(StorageErrorCode::Locked, "memory store lock poisoned")
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &KvKey) -> Result<Option<String>, KvError> {
        let entries = self.entries.read().map_err(|_| Self::poisoned())?;
        Ok(entries.get(&key.raw()).cloned())
    }

    fn set(&self, key: &KvKey, value: String) -> Result<(), KvError> {
        if value.len() > MAX_VALUE_SIZE {
            return Err(KvError::ValueTooLarge {
                size: value.len(),
                max: MAX_VALUE_SIZE,
            });
        }
        let mut entries = self.entries.write().map_err(|_| Self::poisoned())?;
        entries.insert(key.raw(), value);
        Ok(())
    }

    fn remove(&self, key: &KvKey) -> Result<bool, KvError> {
        let mut entries = self.entries.write().map_err(|_| Self::poisoned())?;
        Ok(entries.remove(&key.raw()).is_some())
    }
}

/// A single key holding a JSON-encoded `T`.
pub struct TypedKvStore<T> {
    store: Arc<dyn KeyValueStore>,
    key: KvKey,
    _phantom: PhantomData<fn() -> T>,
}

impl<T: Serialize + DeserializeOwned> TypedKvStore<T> {
    pub fn new(store: Arc<dyn KeyValueStore>, key: KvKey) -> Self {
        Self {
            store,
            key,
            _phantom: PhantomData,
        }
    }

    pub fn key(&self) -> &KvKey {
        &self.key
    }

    pub fn get(&self) -> Result<Option<T>, KvError> {
        match self.store.get(&self.key)? {
            Some(text) => serde_json::from_str(&text)
                .map(Some)
                .map_err(|e| KvError::Serialization {
                    message: e.to_string(),
                    key: Some(self.key.raw()),
                }),
            None => Ok(None),
        }
    }

    pub fn set(&self, value: &T) -> Result<(), KvError> {
        let text = serde_json::to_string(value).map_err(|e| KvError::Serialization {
            message: e.to_string(),
            key: Some(self.key.raw()),
        })?;
        self.store.set(&self.key, text)
    }

    pub fn remove(&self) -> Result<bool, KvError> {
        self.store.remove(&self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_validation_empty() {
        let result = KvKey::new(KeyNamespace::Local, "");
        assert!(matches!(result, Err(KvError::InvalidKey { .. })));
    }

    #[test]
    fn test_key_validation_whitespace() {
        assert!(KvKey::new(KeyNamespace::Local, "   ").is_err());
    }

    #[test]
    fn test_key_validation_null_byte() {
        assert!(KvKey::new(KeyNamespace::Local, "key\0value").is_err());
    }

    #[test]
    fn test_key_validation_too_long() {
        let long_key = "a".repeat(MAX_KEY_LENGTH + 1);
        assert!(KvKey::new(KeyNamespace::Local, long_key).is_err());
    }

    #[test]
    fn test_key_validation_control_chars() {
        assert!(KvKey::new(KeyNamespace::Local, "key\x01value").is_err());
    }

    #[test]
    fn test_key_namespace_prefix() {
        let key = KvKey::new(KeyNamespace::Session, "currentChatId").unwrap();
        assert_eq!(key.raw(), "session:currentChatId");
    }

    #[test]
    fn test_namespaces_do_not_collide() {
        let store = MemoryStore::new();
        let local = KvKey::new(KeyNamespace::Local, "byRecipe").unwrap();
        let session = KvKey::new(KeyNamespace::Session, "byRecipe").unwrap();

        store.set(&local, "true".into()).unwrap();
        assert_eq!(store.get(&local).unwrap().as_deref(), Some("true"));
        assert_eq!(store.get(&session).unwrap(), None);
    }

    #[test]
    fn test_memory_store_remove() {
        let store = MemoryStore::new();
        let key = KvKey::new(KeyNamespace::Local, "k").unwrap();
        store.set(&key, "1".into()).unwrap();
        assert!(store.remove(&key).unwrap());
        assert!(!store.remove(&key).unwrap());
        assert!(store.is_empty());
    }

    #[test]
    fn test_value_size_limit() {
        let store = MemoryStore::new();
        let key = KvKey::new(KeyNamespace::Local, "big").unwrap();
        let result = store.set(&key, "x".repeat(MAX_VALUE_SIZE + 1));
        assert!(matches!(result, Err(KvError::ValueTooLarge { .. })));
    }

    #[test]
    fn test_typed_store_json_text() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let key = KvKey::new(KeyNamespace::Local, "byRecipe").unwrap();
        let typed: TypedKvStore<bool> = TypedKvStore::new(store.clone(), key.clone());

        assert_eq!(typed.get().unwrap(), None);
        typed.set(&true).unwrap();
        assert_eq!(store.get(&key).unwrap().as_deref(), Some("true"));
        assert_eq!(typed.get().unwrap(), Some(true));
    }

    #[test]
    fn test_typed_store_reports_garbage() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let key = KvKey::new(KeyNamespace::Local, "byRecipe").unwrap();
        store.set(&key, "not json".into()).unwrap();

        let typed: TypedKvStore<bool> = TypedKvStore::new(store, key);
        assert!(matches!(typed.get(), Err(KvError::Serialization { .. })));
    }

    #[test]
    fn test_error_retryable() {
        assert!(KvError::storage(StorageErrorCode::Busy, "busy").is_retryable());
        assert!(!KvError::storage(StorageErrorCode::Corrupted, "bad").is_retryable());
    }
}
