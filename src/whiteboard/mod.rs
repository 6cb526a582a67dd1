//! Run-scoped key/value and key/object store shared between tasks.
//!
//! Scalars are strings and survive across runs through [`Whiteboard::export_flat`]
//! and [`Whiteboard::import_flat`]. Objects are typed values (resource
//! descriptors) that only live for the current run. Child views share the
//! same storage and prefix every key with `<prefix>/`.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

const SEPARATOR: char = '/';

#[derive(Default)]
struct Inner {
    scalars: BTreeMap<String, String>,
    objects: HashMap<String, Box<dyn Any + Send + Sync>>,
}

/// Handle on a shared whiteboard or one of its child scopes.
///
/// Cloning the handle shares the underlying storage.
#[derive(Clone, Default)]
pub struct Whiteboard {
    inner: Arc<Mutex<Inner>>,
    prefix: String,
}

impl std::fmt::Debug for Whiteboard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let guard = self.lock();
        f.debug_struct("Whiteboard")
            .field("prefix", &self.prefix)
            .field("scalars", &guard.scalars)
            .field("objects", &guard.objects.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Whiteboard {
    /// Creates an empty whiteboard.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a whiteboard holding the scalars of a previous run.
    #[must_use]
    pub fn from_flat(values: &BTreeMap<String, String>) -> Self {
        let board = Self::new();
        board.import_flat(values);
        board
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn key(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_owned()
        } else {
            format!("{}{SEPARATOR}{key}", self.prefix)
        }
    }

    /// Returns a view scoped to `prefix` that shares this whiteboard's storage.
    #[must_use]
    pub fn child(&self, prefix: &str) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            prefix: self.key(prefix),
        }
    }

    /// Stores a scalar, replacing any object under the same key.
    pub fn set(&self, key: &str, value: impl Into<String>) {
        let full = self.key(key);
        let mut guard = self.lock();
        guard.objects.remove(&full);
        guard.scalars.insert(full, value.into());
    }

    /// Returns a scalar.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        self.lock().scalars.get(&self.key(key)).cloned()
    }

    /// Removes a scalar.
    pub fn delete(&self, key: &str) {
        self.lock().scalars.remove(&self.key(key));
    }

    /// Stores a copy of `value`, replacing any scalar under the same key.
    pub fn set_object<T: Any + Send + Sync>(&self, key: &str, value: T) {
        let full = self.key(key);
        let mut guard = self.lock();
        guard.scalars.remove(&full);
        guard.objects.insert(full, Box::new(value));
    }

    /// Returns a copy of the object stored under `key`.
    ///
    /// # Panics
    ///
    /// Panics when the stored object is not a `T`. Keys have one owner per
    /// graph, so a mismatch is a programming error.
    #[must_use]
    pub fn get_object<T: Any + Clone>(&self, key: &str) -> Option<T> {
        let full = self.key(key);
        let guard = self.lock();
        let stored = guard.objects.get(&full)?;
        match stored.downcast_ref::<T>() {
            Some(value) => Some(value.clone()),
            None => panic!(
                "whiteboard object {full} is not a {}",
                std::any::type_name::<T>()
            ),
        }
    }

    /// Returns `true` when an object is stored under `key`.
    #[must_use]
    pub fn has_object(&self, key: &str) -> bool {
        self.lock().objects.contains_key(&self.key(key))
    }

    /// Removes an object.
    pub fn delete_object(&self, key: &str) {
        self.lock().objects.remove(&self.key(key));
    }

    /// Exports every scalar in this scope, keyed relative to the scope.
    ///
    /// Objects are not exported.
    #[must_use]
    pub fn export_flat(&self) -> BTreeMap<String, String> {
        let guard = self.lock();
        if self.prefix.is_empty() {
            return guard.scalars.clone();
        }
        let scope = format!("{}{SEPARATOR}", self.prefix);
        guard
            .scalars
            .iter()
            .filter_map(|(key, value)| {
                key.strip_prefix(&scope)
                    .map(|relative| (relative.to_owned(), value.clone()))
            })
            .collect()
    }

    /// Imports scalars keyed relative to this scope. Existing keys are
    /// overwritten; keys this engine does not know are kept verbatim.
    pub fn import_flat(&self, values: &BTreeMap<String, String>) {
        let entries: Vec<_> = values
            .iter()
            .map(|(key, value)| (self.key(key), value.clone()))
            .collect();
        let mut guard = self.lock();
        for (key, value) in entries {
            guard.objects.remove(&key);
            guard.scalars.insert(key, value);
        }
    }
}
