//! Key-value persistence boundary.
//!
//! Hosts provide a small synced area with a per-item quota and a larger
//! local area. [`SmartStorage`] prefers the synced one and falls back to
//! local storage when a payload would not fit.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{Result, StorageError};
use crate::library::PromptLibrary;

pub type Items = Map<String, Value>;

/// Per-item byte quota of the synced area.
pub const SYNC_QUOTA_BYTES_PER_ITEM: usize = 8192;
const SYNC_HEADROOM: f64 = 0.8;

const PROMPTS_KEY: &str = "prompts";
const FOLDERS_KEY: &str = "folders";
const TRASH_KEY: &str = "trash";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageArea {
    Sync,
    Local,
}

pub trait KeyValueStore {
    /// Values for whichever of `keys` are present.
    fn get(&self, keys: &[&str]) -> std::result::Result<Items, StorageError>;

    /// Write all items or none of them.
    fn set(&mut self, items: Items) -> std::result::Result<(), StorageError>;

    /// Drop `keys`; absent keys are ignored.
    fn remove(&mut self, keys: &[&str]) -> std::result::Result<(), StorageError>;
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    area: &'static str,
    data: BTreeMap<String, Value>,
    quota_per_item: Option<usize>,
}

impl MemoryStore {
    pub fn new(area: &'static str) -> Self {
        Self {
            area,
            ..Self::default()
        }
    }

    /// A store that rejects any item whose key plus JSON value exceeds
    /// `bytes`.
    pub fn with_quota(area: &'static str, bytes: usize) -> Self {
        Self {
            area,
            data: BTreeMap::new(),
            quota_per_item: Some(bytes),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, keys: &[&str]) -> std::result::Result<Items, StorageError> {
        Ok(keys
            .iter()
            .filter_map(|k| self.data.get(*k).map(|v| (k.to_string(), v.clone())))
            .collect())
    }

    fn set(&mut self, items: Items) -> std::result::Result<(), StorageError> {
        if let Some(quota) = self.quota_per_item {
            for (key, value) in &items {
                let bytes = key.len() + value.to_string().len();
                if bytes > quota {
                    return Err(StorageError::QuotaExceeded {
                        area: self.area,
                        bytes,
                    });
                }
            }
        }
        self.data.extend(items);
        Ok(())
    }

    fn remove(&mut self, keys: &[&str]) -> std::result::Result<(), StorageError> {
        for key in keys {
            self.data.remove(*key);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Sync-first storage with local fallback
// ---------------------------------------------------------------------------

/// Where a payload of `bytes` serialized bytes should go first.
pub fn choose_area(bytes: usize) -> StorageArea {
    if bytes as f64 > SYNC_QUOTA_BYTES_PER_ITEM as f64 * SYNC_HEADROOM {
        StorageArea::Local
    } else {
        StorageArea::Sync
    }
}

#[derive(Debug, Clone)]
pub struct SmartStorage<S, L> {
    sync: S,
    local: L,
}

impl<S: KeyValueStore, L: KeyValueStore> SmartStorage<S, L> {
    pub fn new(sync: S, local: L) -> Self {
        Self { sync, local }
    }

    pub fn sync_area(&self) -> &S {
        &self.sync
    }

    pub fn local_area(&self) -> &L {
        &self.local
    }

    /// Direct access for data that always lives locally.
    pub fn local_area_mut(&mut self) -> &mut L {
        &mut self.local
    }

    /// Read from the synced area, falling back to local storage when it has
    /// none of the keys or cannot be read.
    pub fn get(&self, keys: &[&str]) -> Result<Items> {
        match self.sync.get(keys) {
            Ok(items) if !items.is_empty() => return Ok(items),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "sync storage unavailable, using local"),
        }
        Ok(self.local.get(keys)?)
    }

    /// Write `items`, returning the area that took them. Quota failures in
    /// the synced area fall back to local; other errors propagate.
    ///
    /// The written keys are removed from the other area so that `get` never
    /// sees an older copy.
    pub fn set(&mut self, items: Items) -> Result<StorageArea> {
        let keys: Vec<String> = items.keys().cloned().collect();
        let keys: Vec<&str> = keys.iter().map(String::as_str).collect();

        let bytes = serde_json::to_string(&items)?.len();
        if choose_area(bytes) == StorageArea::Local {
            warn!(bytes, "payload exceeds sync quota, using local storage");
            self.local.set(items)?;
            self.sync.remove(&keys)?;
            return Ok(StorageArea::Local);
        }

        match self.sync.set(items.clone()) {
            Ok(()) => {
                self.local.remove(&keys)?;
                Ok(StorageArea::Sync)
            }
            Err(e @ StorageError::QuotaExceeded { .. }) => {
                warn!(error = %e, "falling back to local storage");
                self.local.set(items)?;
                self.sync.remove(&keys)?;
                Ok(StorageArea::Local)
            }
            Err(e) => Err(e.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Library persistence
// ---------------------------------------------------------------------------

pub fn save_library<S: KeyValueStore, L: KeyValueStore>(
    storage: &mut SmartStorage<S, L>,
    library: &PromptLibrary,
) -> Result<StorageArea> {
    let mut items = Items::new();
    items.insert(PROMPTS_KEY.to_string(), serde_json::to_value(library.prompts())?);
    items.insert(FOLDERS_KEY.to_string(), serde_json::to_value(library.folders())?);
    items.insert(TRASH_KEY.to_string(), serde_json::to_value(library.trash())?);
    storage.set(items)
}

fn take<T: DeserializeOwned + Default>(items: &mut Items, key: &str) -> Result<T> {
    match items.remove(key) {
        Some(value) => Ok(serde_json::from_value(value)?),
        None => Ok(T::default()),
    }
}

/// Store one serialisable value under `key`.
pub fn save_value<K: KeyValueStore, T: Serialize + ?Sized>(
    store: &mut K,
    key: &str,
    value: &T,
) -> Result<()> {
    let mut items = Items::new();
    items.insert(key.to_string(), serde_json::to_value(value)?);
    Ok(store.set(items)?)
}

/// Read the value under `key`, or its default when absent.
pub fn load_value<K: KeyValueStore, T: DeserializeOwned + Default>(store: &K, key: &str) -> Result<T> {
    let mut items = store.get(&[key])?;
    take(&mut items, key)
}

/// Load the library. Missing keys read as empty and the default folder is
/// recreated if needed.
pub fn load_library<S: KeyValueStore, L: KeyValueStore>(
    storage: &SmartStorage<S, L>,
) -> Result<PromptLibrary> {
    let mut items = storage.get(&[PROMPTS_KEY, FOLDERS_KEY, TRASH_KEY])?;
    Ok(PromptLibrary::from_parts(
        take(&mut items, PROMPTS_KEY)?,
        take(&mut items, FOLDERS_KEY)?,
        take(&mut items, TRASH_KEY)?,
    ))
}
