//! Signals persisted to a string key-value store.
//!
//! A persisted signal is seeded from the store and written back, as JSON, on
//! creation and after every change. Writes are synchronous and never
//! coalesced.

use crate::effect::Effect;
use crate::signal::Signal;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("storage is unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// A synchronous string key-value store.
pub trait KeyValueStore {
    fn get_item(&self, key: &str) -> Result<Option<String>, StoreError>;

    fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// An in-memory store. The default store of every thread.
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: RefCell<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get_item(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.items.borrow().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.items.borrow_mut().insert(key.to_owned(), value.to_owned());
        Ok(())
    }
}

/// A store backed by one JSON object file.
///
/// The file is read once when the store is opened and rewritten on every
/// `set_item`.
pub struct FileStore {
    path: PathBuf,
    items: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    /// Open the store at `path`. A missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let items = match std::fs::read_to_string(&path) {
            Ok(contents) if contents.trim().is_empty() => BTreeMap::new(),
            Ok(contents) => serde_json::from_str(&contents)?,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(error) => return Err(error.into()),
        };
        tracing::debug!(path = %path.display(), items = items.len(), "opened file store");
        Ok(Self {
            path,
            items: Mutex::new(items),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KeyValueStore for FileStore {
    fn get_item(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.items.lock().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut items = self.items.lock();
        items.insert(key.to_owned(), value.to_owned());
        let contents = serde_json::to_string_pretty(&*items)?;
        std::fs::write(&self.path, contents)?;
        Ok(())
    }
}

impl fmt::Debug for FileStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileStore").field("path", &self.path).finish()
    }
}

thread_local! {
    static DEFAULT_STORE: RefCell<Rc<dyn KeyValueStore>> = RefCell::new(Rc::new(MemoryStore::new()));
}

/// Replace the store used by [`create_signal_storage`] on this thread.
pub fn set_default_store(store: Rc<dyn KeyValueStore>) {
    DEFAULT_STORE.with(|default| *default.borrow_mut() = store);
}

/// The store used by [`create_signal_storage`] on this thread.
pub fn default_store() -> Rc<dyn KeyValueStore> {
    DEFAULT_STORE.with(|default| default.borrow().clone())
}

/// Create a signal persisted under `key` in the thread's default store.
///
/// # Example
///
/// ```rust,no_run
/// use gpui_signal_bridge::prelude::*;
///
/// let volume = create_signal_storage("volume", 5);
/// volume.set(9);
/// assert_eq!(default_store().get_item("volume").unwrap().as_deref(), Some("9"));
/// ```
pub fn create_signal_storage<T>(key: impl Into<String>, default: T) -> Signal<T>
where
    T: Serialize + DeserializeOwned + Clone + PartialEq + 'static,
{
    create_signal_storage_in(default_store(), key, default)
}

/// Create a signal persisted under `key` in `store`.
///
/// A missing or unparseable stored value falls back to `default`; the
/// failure is logged, never returned. Write failures are logged as well.
pub fn create_signal_storage_in<T>(store: Rc<dyn KeyValueStore>, key: impl Into<String>, default: T) -> Signal<T>
where
    T: Serialize + DeserializeOwned + Clone + PartialEq + 'static,
{
    let key = key.into();
    let initial = match store.get_item(&key) {
        Ok(Some(stored)) => match serde_json::from_str(&stored) {
            Ok(value) => value,
            Err(error) => {
                tracing::error!(%key, %error, "failed to parse stored signal value; using default");
                default
            }
        },
        Ok(None) => default,
        Err(error) => {
            tracing::error!(%key, %error, "failed to read stored signal value; using default");
            default
        }
    };

    let signal = Signal::new(initial);
    Effect::new(move || {
        let serialized = signal.with(serde_json::to_string);
        let written = serialized
            .map_err(StoreError::from)
            .and_then(|serialized| store.set_item(&key, &serialized));
        if let Err(error) = written {
            tracing::error!(%key, %error, "failed to persist signal value");
        }
    });
    signal
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
    struct Point {
        x: i32,
    }

    fn temp_path() -> PathBuf {
        let suffix: u64 = rand::thread_rng().gen();
        std::env::temp_dir().join(format!("signal-store-{suffix}.json"))
    }

    #[test]
    fn test_missing_key_uses_default_and_round_trips() {
        let store = Rc::new(MemoryStore::new());
        let count = create_signal_storage_in(store.clone(), "k", 5);
        assert_eq!(count.get(), 5);
        assert_eq!(store.get_item("k").unwrap().as_deref(), Some("5"));

        count.set(9);
        let stored = store.get_item("k").unwrap().unwrap();
        assert_eq!(serde_json::from_str::<i32>(&stored).unwrap(), 9);
    }

    #[test]
    fn test_existing_value_seeds_signal() {
        let store = Rc::new(MemoryStore::new());
        store.set_item("point", r#"{"x":3}"#).unwrap();
        let point = create_signal_storage_in(store, "point", Point { x: 0 });
        assert_eq!(point.get(), Point { x: 3 });
    }

    #[test]
    fn test_corrupted_value_falls_back_to_default() {
        let store = Rc::new(MemoryStore::new());
        store.set_item("k2", "{not json").unwrap();
        let point = create_signal_storage_in(store.clone(), "k2", Point { x: 1 });
        assert_eq!(point.get(), Point { x: 1 });
        // The default overwrites the corrupted entry.
        assert_eq!(store.get_item("k2").unwrap().as_deref(), Some(r#"{"x":1}"#));
    }

    #[test]
    fn test_default_store_is_per_thread() {
        let store = Rc::new(MemoryStore::new());
        set_default_store(store.clone());
        let name = create_signal_storage("name", String::from("ada"));
        name.set(String::from("grace"));
        assert_eq!(store.get_item("name").unwrap().as_deref(), Some("\"grace\""));
    }

    #[test]
    fn test_file_store_persists_across_opens() {
        let path = temp_path();
        {
            let store = Rc::new(FileStore::open(&path).unwrap());
            let count = create_signal_storage_in(store, "count", 1);
            count.set(4);
        }

        let store = Rc::new(FileStore::open(&path).unwrap());
        let count = create_signal_storage_in(store, "count", 1);
        assert_eq!(count.get(), 4);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_file_store_rejects_corrupted_file() {
        let path = temp_path();
        std::fs::write(&path, "[1, 2").unwrap();
        assert!(matches!(FileStore::open(&path), Err(StoreError::Json(_))));
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_write_failure_is_logged_not_raised() {
        let path = temp_path().join("missing-dir").join("store.json");
        let store = Rc::new(FileStore::open(&path).unwrap());
        let count = create_signal_storage_in(store.clone(), "count", 1);
        count.set(2);
        assert_eq!(count.get(), 2);
        assert_eq!(store.get_item("count").unwrap().as_deref(), Some("2"));
        assert!(!path.exists());
    }
}
