//! Registry of live snapshot subscriptions.
//!
//! Each store registers its listeners under a logical name. Registering a
//! name that is already present cancels the previous listener, which is how
//! page navigation swaps the live task query. Session end calls
//! [`SubscriptionRegistry::cancel_all`] so nothing outlives the user.

use crate::gateway::Subscription;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

/// Logical subscription names.
pub mod keys {
    /// Live query backing the current task page.
    pub const TASK_PAGE: &str = "tasks.page";
    /// Every task owned by the signed-in user.
    pub const TASKS: &str = "tasks.all";
    pub const PROJECTS: &str = "projects";
    pub const NOTIFICATIONS: &str = "notifications";
    pub const REMINDER_SETTINGS: &str = "settings.reminders";

    /// Name for a mirrored reference collection.
    pub fn reference(collection: &str) -> String {
        format!("reference.{}", collection)
    }
}

/// Holds subscriptions by name.
///
/// Thread-safe: uses an internal `Mutex` so it can be shared across async
/// tasks without requiring `&mut self`.
pub struct SubscriptionRegistry {
    active: Mutex<HashMap<String, Subscription>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self {
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Store `subscription` under `name`. Returns `true` if it replaced
    /// (and thereby cancelled) an earlier one.
    pub fn replace(&self, name: &str, subscription: Subscription) -> bool {
        let previous = match self.active.lock() {
            Ok(mut map) => map.insert(name.to_string(), subscription),
            Err(_) => return false,
        };
        // Drop outside the lock: cancelling touches the gateway's listener table.
        let replaced = previous.is_some();
        drop(previous);
        if replaced {
            debug!(name = %name, "Replaced live subscription");
        }
        replaced
    }

    /// Cancel the subscription under `name`. Returns `true` if it was present.
    pub fn cancel(&self, name: &str) -> bool {
        let removed = match self.active.lock() {
            Ok(mut map) => map.remove(name),
            Err(_) => None,
        };
        removed.is_some()
    }

    /// Cancel every subscription. Returns how many were cancelled.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<Subscription> = match self.active.lock() {
            Ok(mut map) => map.drain().map(|(_, sub)| sub).collect(),
            Err(_) => Vec::new(),
        };
        let count = drained.len();
        drop(drained);
        if count > 0 {
            debug!(count, "Cancelled all live subscriptions");
        }
        count
    }

    pub fn is_active(&self, name: &str) -> bool {
        self.active
            .lock()
            .map(|map| map.contains_key(name))
            .unwrap_or(false)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .active
            .lock()
            .map(|map| map.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.active.lock().map(|map| map.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
