//! Remote data gateway.
//!
//! Thin wrapper over the document store: every write goes through here so
//! live snapshot listeners on the written collection are re-evaluated and
//! handed a fresh result. Listeners are delivered synchronously on the
//! writing thread, after all locks are released.

use crate::db::{Database, Document, Query};
use anyhow::Result;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use tracing::{debug, warn};

/// Result set delivered to a snapshot listener.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub collection: String,
    pub documents: Vec<Document>,
}

impl Snapshot {
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Decode every document, skipping (and logging) ones that fail.
    pub fn decode_all<T: serde::de::DeserializeOwned>(&self) -> Vec<T> {
        self.documents
            .iter()
            .filter_map(|doc| match doc.decode::<T>() {
                Ok(item) => Some(item),
                Err(e) => {
                    warn!(collection = %self.collection, doc_id = %doc.id, error = %e, "Skipping undecodable document");
                    None
                }
            })
            .collect()
    }
}

type SnapshotHandler = Arc<dyn Fn(Snapshot) + Send + Sync>;

struct Listener {
    query: Query,
    handler: SnapshotHandler,
}

#[derive(Default)]
struct ListenerTable {
    next_id: u64,
    entries: HashMap<u64, Listener>,
}

/// Cancellation handle for a snapshot listener.
///
/// Dropping the handle unsubscribes, so a handle stored in the
/// [`SubscriptionRegistry`](crate::subscriptions::SubscriptionRegistry) lives
/// exactly as long as its registry entry.
pub struct Subscription {
    id: u64,
    collection: String,
    table: Weak<Mutex<ListenerTable>>,
}

impl Subscription {
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Whether the listener is still registered.
    pub fn is_active(&self) -> bool {
        self.table
            .upgrade()
            .and_then(|table| table.lock().ok().map(|t| t.entries.contains_key(&self.id)))
            .unwrap_or(false)
    }

    /// Stop receiving snapshots.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(table) = self.table.upgrade() {
            if let Ok(mut table) = table.lock() {
                if table.entries.remove(&self.id).is_some() {
                    debug!(collection = %self.collection, listener = self.id, "Snapshot listener removed");
                }
            }
        }
    }
}

/// Gateway over the document store with live snapshot listeners.
#[derive(Clone)]
pub struct Gateway {
    db: Database,
    listeners: Arc<Mutex<ListenerTable>>,
}

impl Gateway {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            listeners: Arc::new(Mutex::new(ListenerTable::default())),
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn add(&self, collection: &str, data: Value) -> Result<Document> {
        let doc = self.db.add_document(collection, data)?;
        self.notify(collection);
        Ok(doc)
    }

    pub fn set(&self, collection: &str, id: &str, data: Value) -> Result<Document> {
        let doc = self.db.set_document(collection, id, data)?;
        self.notify(collection);
        Ok(doc)
    }

    pub fn update(&self, collection: &str, id: &str, patch: Value) -> Result<Option<Document>> {
        let doc = self.db.update_document(collection, id, patch)?;
        if doc.is_some() {
            self.notify(collection);
        }
        Ok(doc)
    }

    pub fn delete(&self, collection: &str, id: &str) -> Result<bool> {
        let removed = self.db.delete_document(collection, id)?;
        if removed {
            self.notify(collection);
        }
        Ok(removed)
    }

    pub fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        self.db.get_document(collection, id)
    }

    pub fn query(&self, query: &Query) -> Result<Vec<Document>> {
        self.db.run_query(query)
    }

    pub fn count(&self, query: &Query) -> Result<i64> {
        self.db.count_query(query)
    }

    /// Register a live listener. The handler receives the current result
    /// immediately and again after every write to the query's collection.
    pub fn on_snapshot<F>(&self, query: Query, handler: F) -> Result<Subscription>
    where
        F: Fn(Snapshot) + Send + Sync + 'static,
    {
        let initial = self.db.run_query(&query)?;
        let handler: SnapshotHandler = Arc::new(handler);
        let collection = query.collection.clone();

        let id = {
            let mut table = self
                .listeners
                .lock()
                .map_err(|_| anyhow::anyhow!("listener table lock poisoned"))?;
            table.next_id += 1;
            let id = table.next_id;
            table.entries.insert(
                id,
                Listener {
                    query,
                    handler: Arc::clone(&handler),
                },
            );
            id
        };
        debug!(collection = %collection, listener = id, "Snapshot listener registered");

        handler(Snapshot {
            collection: collection.clone(),
            documents: initial,
        });

        Ok(Subscription {
            id,
            collection,
            table: Arc::downgrade(&self.listeners),
        })
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().map(|t| t.entries.len()).unwrap_or(0)
    }

    fn notify(&self, collection: &str) {
        let targets: Vec<(u64, Query, SnapshotHandler)> = match self.listeners.lock() {
            Ok(table) => table
                .entries
                .iter()
                .filter(|(_, l)| l.query.collection == collection)
                .map(|(id, l)| (*id, l.query.clone(), Arc::clone(&l.handler)))
                .collect(),
            Err(_) => return,
        };

        for (id, query, handler) in targets {
            // A handler earlier in this loop may have cancelled this listener.
            let still_registered = self
                .listeners
                .lock()
                .map(|t| t.entries.contains_key(&id))
                .unwrap_or(false);
            if !still_registered {
                continue;
            }
            match self.db.run_query(&query) {
                Ok(documents) => handler(Snapshot {
                    collection: collection.to_string(),
                    documents,
                }),
                Err(e) => {
                    warn!(collection = %collection, listener = id, error = %e, "Snapshot query failed")
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn setup() -> Gateway {
        Gateway::new(Database::open_in_memory().unwrap())
    }

    #[test]
    fn listener_receives_initial_and_subsequent_snapshots() {
        let gw = setup();
        gw.set("labels", "a", json!({ "title": "A" })).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let sub = gw
            .on_snapshot(Query::collection("labels"), move |snap| {
                sink.lock().unwrap().push(snap.documents.len());
            })
            .unwrap();

        gw.set("labels", "b", json!({ "title": "B" })).unwrap();
        gw.delete("labels", "a").unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 1]);
        assert!(sub.is_active());
    }

    #[test]
    fn writes_to_other_collections_are_not_delivered() {
        let gw = setup();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let _sub = gw
            .on_snapshot(Query::collection("labels"), move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        gw.add("tasks", json!({ "title": "x" })).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropping_subscription_stops_delivery() {
        let gw = setup();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let sub = gw
            .on_snapshot(Query::collection("labels"), move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        assert_eq!(gw.listener_count(), 1);

        sub.unsubscribe();
        gw.add("labels", json!({ "title": "x" })).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(gw.listener_count(), 0);
    }

    #[test]
    fn update_of_missing_document_does_not_notify() {
        let gw = setup();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let _sub = gw
            .on_snapshot(Query::collection("tasks"), move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        assert!(gw.update("tasks", "missing", json!({ "a": 1 })).unwrap().is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
