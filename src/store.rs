//! Document store and the listing ledger.
//!
//! The store is a plain key→JSON-document surface with whole-document
//! overwrite semantics: callers read, mutate in memory, and write back the
//! full document. The ledger keeps one record per user holding both the
//! active thread id and the cooldown stamp, written together in a single
//! `put` so the two facts cannot diverge.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StoreError;

/// Key→document persistence surface.
pub trait DocumentStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;
    fn put(&self, key: &str, value: &Value) -> Result<(), StoreError>;
}

impl<T: DocumentStore + ?Sized> DocumentStore for std::sync::Arc<T> {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        (**self).get(key)
    }

    fn put(&self, key: &str, value: &Value) -> Result<(), StoreError> {
        (**self).put(key, value)
    }
}

/// One JSON file per document under a data directory.
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl DocumentStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let path = self.path(key);
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&path).map_err(|e| StoreError::Read {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        let value = serde_json::from_str(&raw).map_err(|e| StoreError::Corrupt {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Some(value))
    }

    fn put(&self, key: &str, value: &Value) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| StoreError::Write {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        let rendered =
            serde_json::to_string_pretty(value).map_err(|e| StoreError::Write {
                key: key.to_string(),
                reason: e.to_string(),
            })?;
        std::fs::write(self.path(key), rendered).map_err(|e| StoreError::Write {
            key: key.to_string(),
            reason: e.to_string(),
        })
    }
}

/// In-memory store for tests.
#[derive(Default)]
pub struct MemoryStore {
    docs: std::sync::Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DocumentStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self
            .docs
            .lock()
            .expect("store mutex poisoned")
            .get(key)
            .cloned())
    }

    fn put(&self, key: &str, value: &Value) -> Result<(), StoreError> {
        self.docs
            .lock()
            .expect("store mutex poisoned")
            .insert(key.to_string(), value.clone());
        Ok(())
    }
}

const LISTINGS_KEY: &str = "listings";

/// Per-user listing record: the active thread and the cooldown stamp as
/// one fact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingRecord {
    pub thread_id: String,
    pub posted_at: DateTime<Utc>,
}

/// Typed access to the `listings` document.
pub struct ListingLedger<S: DocumentStore> {
    store: S,
}

impl<S: DocumentStore> ListingLedger<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    fn load(&self) -> Result<HashMap<String, ListingRecord>, StoreError> {
        match self.store.get(LISTINGS_KEY)? {
            None => Ok(HashMap::new()),
            Some(value) => {
                serde_json::from_value(value).map_err(|e| StoreError::Corrupt {
                    key: LISTINGS_KEY.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// The active record for a user, if any.
    pub fn record(&self, user_id: &str) -> Result<Option<ListingRecord>, StoreError> {
        Ok(self.load()?.remove(user_id))
    }

    /// Record a successful publish: new thread id and cooldown stamp in
    /// one write.
    pub fn stamp(
        &self,
        user_id: &str,
        thread_id: &str,
        posted_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut records = self.load()?;
        records.insert(
            user_id.to_string(),
            ListingRecord {
                thread_id: thread_id.to_string(),
                posted_at,
            },
        );
        let value = serde_json::to_value(&records).map_err(|e| StoreError::Write {
            key: LISTINGS_KEY.to_string(),
            reason: e.to_string(),
        })?;
        self.store.put(LISTINGS_KEY, &value)
    }
}
