//! Session Store - Injected persistence for per-user navigation state
//!
//! Recent activity and "last visited" pointers live behind this trait
//! instead of in ambient global storage, so the core can be exercised with a
//! plain in-memory map.

use crate::error::TrackerResult;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// Key/value store for session state
pub trait SessionStore: Send + Sync {
    /// Read a value
    fn get(&self, key: &str) -> Option<Value>;

    /// Write a value, replacing any previous one
    fn set(&self, key: &str, value: Value) -> TrackerResult<()>;

    /// Remove a single key
    fn remove(&self, key: &str) -> TrackerResult<()>;

    /// Remove every key
    fn clear(&self) -> TrackerResult<()>;
}

/// In-memory session store (for testing and short-lived sessions)
pub struct InMemorySessionStore {
    entries: RwLock<Map<String, Value>>,
}

impl InMemorySessionStore {
    /// Empty store
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Map::new()),
        }
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// True when nothing is stored
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore for InMemorySessionStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.entries.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) -> TrackerResult<()> {
        self.entries.write().insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> TrackerResult<()> {
        self.entries.write().remove(key);
        Ok(())
    }

    fn clear(&self) -> TrackerResult<()> {
        self.entries.write().clear();
        Ok(())
    }
}

/// Session store persisted as a single JSON object on disk
///
/// The whole object is rewritten on every mutation through a temporary file
/// and a rename.
pub struct JsonFileSessionStore {
    path: PathBuf,
    entries: RwLock<Map<String, Value>>,
}

impl JsonFileSessionStore {
    /// Open the store, starting empty when the file does not exist yet
    pub fn open(path: impl AsRef<Path>) -> TrackerResult<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                Map::new()
            } else {
                serde_json::from_str(&content)?
            }
        } else {
            Map::new()
        };
        tracing::debug!(path = %path.display(), keys = entries.len(), "opened session store");

        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    /// Backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply `f` to a copy, persist it, then swap it in
    ///
    /// Memory is left untouched when the write fails. `f` returns whether
    /// anything changed.
    fn update(&self, f: impl FnOnce(&mut Map<String, Value>) -> bool) -> TrackerResult<()> {
        let mut entries = self.entries.write();
        let mut next = entries.clone();
        if !f(&mut next) {
            return Ok(());
        }
        self.persist(&next)?;
        *entries = next;
        Ok(())
    }

    fn persist(&self, entries: &Map<String, Value>) -> TrackerResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(entries)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl SessionStore for JsonFileSessionStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.entries.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) -> TrackerResult<()> {
        self.update(|next| {
            next.insert(key.to_string(), value);
            true
        })
    }

    fn remove(&self, key: &str) -> TrackerResult<()> {
        self.update(|next| next.remove(key).is_some())
    }

    fn clear(&self) -> TrackerResult<()> {
        self.update(|next| {
            next.clear();
            true
        })
    }
}
