//! Keyed local storage for serialized carts.

use std::{
    collections::HashMap,
    fmt, fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use thiserror::Error;
use tracing::warn;

use super::CartState;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to serialize cart: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to write cart to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cart storage lock poisoned")]
    Poisoned,
}

/// Synchronous key-value storage holding one serialized [`CartState`] per key.
pub trait CartStorage: Send + Sync + fmt::Debug {
    /// Returns `None` for missing keys and for documents that fail to decode.
    fn load(&self, key: &str) -> Option<CartState>;

    fn save(&self, key: &str, state: &CartState) -> Result<(), StorageError>;
}

/// Process-local storage. Clones share the same documents.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    documents: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raw(&self, key: &str) -> Option<String> {
        self.documents.lock().ok()?.get(key).cloned()
    }
}

impl CartStorage for MemoryStorage {
    fn load(&self, key: &str) -> Option<CartState> {
        let raw = self.raw(key)?;
        decode(key, &raw)
    }

    fn save(&self, key: &str, state: &CartState) -> Result<(), StorageError> {
        let raw = serde_json::to_string(state)?;
        self.documents
            .lock()
            .map_err(|_| StorageError::Poisoned)?
            .insert(key.to_string(), raw);
        Ok(())
    }
}

/// One `<key>.json` document per cart under `root`.
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    /// Creates `root` if it does not exist yet.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, StorageError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|source| StorageError::Io {
            path: root.clone(),
            source,
        })?;
        Ok(Self { root })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.json"))
    }
}

impl CartStorage for FileStorage {
    fn load(&self, key: &str) -> Option<CartState> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(raw) => decode(key, &raw),
            Err(err) if err.kind() == ErrorKind::NotFound => None,
            Err(err) => {
                warn!("Failed to read cart {}: {}", path.display(), err);
                None
            }
        }
    }

    fn save(&self, key: &str, state: &CartState) -> Result<(), StorageError> {
        let path = self.path_for(key);
        let raw = serde_json::to_vec(state)?;

        // Write-then-rename so a reader never sees half a document.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, raw)
            .and_then(|_| fs::rename(&tmp, &path))
            .map_err(|source| StorageError::Io { path, source })
    }
}

fn decode(key: &str, raw: &str) -> Option<CartState> {
    match serde_json::from_str(raw) {
        Ok(state) => Some(state),
        Err(err) => {
            warn!("Discarding unreadable cart {}: {}", key, err);
            None
        }
    }
}
