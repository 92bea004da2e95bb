//! Versioned key/value store shared between agents.
//!
//! A [`SharedContext`] is the communication channel between agents that run
//! concurrently. Every mutation bumps a monotonically increasing version and
//! is announced to the registered change listeners. Listeners are invoked
//! after the write lock has been released, so a listener may read from or
//! write to the same context without deadlocking.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Callback invoked for every change of a [`SharedContext`].
pub type ChangeListener = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

/// Visibility of a shared context.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextScope {
    /// Visible to every agent created without a group.
    Global,
    /// Visible to agents created with the same group name.
    Group(String),
}

impl std::fmt::Display for ContextScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContextScope::Global => write!(f, "global"),
            ContextScope::Group(name) => write!(f, "group:{name}"),
        }
    }
}

/// Kind of mutation described by a [`ChangeEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    /// A key was written.
    Set,
    /// A key was removed.
    Delete,
}

/// A single mutation of a [`SharedContext`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Key that changed.
    pub key: String,
    /// Value before the mutation, `None` if the key was absent.
    pub old_value: Option<Value>,
    /// Value after the mutation, `None` for deletions.
    pub new_value: Option<Value>,
    /// Context version after the mutation.
    pub version: u64,
    /// Whether the key was written or removed.
    pub change_type: ChangeType,
}

#[derive(Default)]
struct Entries {
    values: HashMap<String, Value>,
    version: u64,
}

/// Thread-safe, versioned key/value store with change notification.
pub struct SharedContext {
    scope: ContextScope,
    entries: RwLock<Entries>,
    listeners: RwLock<Vec<ChangeListener>>,
}

impl SharedContext {
    /// Create an empty context with the given scope.
    pub fn new(scope: ContextScope) -> Self {
        Self {
            scope,
            entries: RwLock::new(Entries::default()),
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Create an empty global-scoped context.
    pub fn global() -> Self {
        Self::new(ContextScope::Global)
    }

    /// Create an empty context scoped to the named group.
    pub fn group(name: impl Into<String>) -> Self {
        Self::new(ContextScope::Group(name.into()))
    }

    /// Visibility of this context.
    pub fn scope(&self) -> &ContextScope {
        &self.scope
    }

    /// Store a value under `key`, bump the version and notify listeners.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();

        let event = {
            let mut entries = self.entries.write();
            let old_value = entries.values.insert(key.clone(), value.clone());
            entries.version += 1;
            ChangeEvent {
                key,
                old_value,
                new_value: Some(value),
                version: entries.version,
                change_type: ChangeType::Set,
            }
        };

        self.notify(&event);
    }

    /// Point-in-time read of a single key.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries.read().values.get(key).cloned()
    }

    /// Read a key as text.
    ///
    /// Absent keys yield an empty string; non-string values are rendered
    /// with their JSON representation.
    pub fn get_string(&self, key: &str) -> String {
        match self.get(key) {
            Some(Value::String(s)) => s,
            Some(other) => other.to_string(),
            None => String::new(),
        }
    }

    /// Remove `key`. Removing an absent key changes nothing and notifies no one.
    pub fn delete(&self, key: &str) {
        let event = {
            let mut entries = self.entries.write();
            let Some(old_value) = entries.values.remove(key) else {
                return;
            };
            entries.version += 1;
            ChangeEvent {
                key: key.to_string(),
                old_value: Some(old_value),
                new_value: None,
                version: entries.version,
                change_type: ChangeType::Delete,
            }
        };

        self.notify(&event);
    }

    /// Independent copy of all entries, paired with the version it was taken at.
    pub fn snapshot(&self) -> (HashMap<String, Value>, u64) {
        let entries = self.entries.read();
        (entries.values.clone(), entries.version)
    }

    /// Copy every entry of `other` into this context.
    ///
    /// Each key is written with [`SharedContext::set`], so a merge of N keys
    /// bumps the version N times and emits N events. Keys are applied in
    /// lexicographic order.
    pub fn merge(&self, other: &SharedContext) {
        let (values, _) = other.snapshot();
        let mut values: Vec<(String, Value)> = values.into_iter().collect();
        values.sort_by(|a, b| a.0.cmp(&b.0));
        for (key, value) in values {
            self.set(key, value);
        }
    }

    /// Register a listener for every future change.
    pub fn on_change<F>(&self, listener: F)
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        self.listeners.write().push(Arc::new(listener));
    }

    /// Current keys, in no particular order.
    pub fn keys(&self) -> Vec<String> {
        self.entries.read().values.keys().cloned().collect()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.read().values.len()
    }

    /// Whether the context holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current version; bumped on every set and every effective delete.
    pub fn version(&self) -> u64 {
        self.entries.read().version
    }

    fn notify(&self, event: &ChangeEvent) {
        // Clone the list so listeners run without any lock held.
        let listeners: Vec<ChangeListener> = self.listeners.read().clone();
        for listener in &listeners {
            listener(event);
        }
    }
}

impl Default for SharedContext {
    fn default() -> Self {
        Self::global()
    }
}

impl std::fmt::Debug for SharedContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let entries = self.entries.read();
        f.debug_struct("SharedContext")
            .field("scope", &self.scope)
            .field("len", &entries.values.len())
            .field("version", &entries.version)
            .finish()
    }
}
