//! Document CRUD on named collections.

use super::{Database, now_ms};
use anyhow::{Result, anyhow};
use rusqlite::{OptionalExtension, Row, params};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// A stored document. `data` is always a JSON object without an `id` key;
/// the id lives beside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub collection: String,
    pub data: Value,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Document {
    /// Decode the body into a typed record, injecting the document id as `id`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        let mut body = self.data.clone();
        if let Value::Object(ref mut map) = body {
            map.insert("id".to_string(), Value::String(self.id.clone()));
        }
        serde_json::from_value(body)
            .map_err(|e| anyhow!("failed to decode {}/{}: {}", self.collection, self.id, e))
    }

    /// Look up a dotted field path such as `end_date.seconds`.
    pub fn field(&self, path: &str) -> Option<&Value> {
        path.split('.')
            .try_fold(&self.data, |value, segment| value.get(segment))
    }
}

pub fn parse_document_row(row: &Row) -> rusqlite::Result<Document> {
    let collection: String = row.get("collection")?;
    let id: String = row.get("id")?;
    let data: String = row.get("data")?;
    let created_at: i64 = row.get("created_at")?;
    let updated_at: i64 = row.get("updated_at")?;

    Ok(Document {
        id,
        collection,
        data: serde_json::from_str(&data).unwrap_or_else(|_| Value::Object(Map::new())),
        created_at,
        updated_at,
    })
}

/// Normalize a body for storage: must be an object, and `id` is stripped.
fn into_body(data: Value) -> Result<Map<String, Value>> {
    match data {
        Value::Object(mut map) => {
            map.remove("id");
            Ok(map)
        }
        other => Err(anyhow!("document body must be a JSON object, got {}", other)),
    }
}

fn get_document_internal(
    conn: &rusqlite::Connection,
    collection: &str,
    id: &str,
) -> Result<Option<Document>> {
    let doc = conn
        .query_row(
            "SELECT collection, id, data, created_at, updated_at
             FROM documents WHERE collection = ?1 AND id = ?2",
            params![collection, id],
            parse_document_row,
        )
        .optional()?;
    Ok(doc)
}

impl Database {
    /// Create a document with a generated UUID7 id.
    pub fn add_document(&self, collection: &str, data: Value) -> Result<Document> {
        let id = Uuid::now_v7().to_string();
        self.set_document(collection, &id, data)
    }

    /// Create or fully replace a document. `created_at` survives replacement.
    pub fn set_document(&self, collection: &str, id: &str, data: Value) -> Result<Document> {
        if id.trim().is_empty() {
            return Err(anyhow!("document id must not be empty"));
        }
        let body = Value::Object(into_body(data)?);
        let body_json = serde_json::to_string(&body)?;
        let now = now_ms();

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO documents (collection, id, data, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)
                 ON CONFLICT(collection, id) DO UPDATE SET
                    data = excluded.data,
                    updated_at = excluded.updated_at",
                params![collection, id, body_json, now],
            )?;
            get_document_internal(conn, collection, id)?
                .ok_or_else(|| anyhow!("document {}/{} vanished after write", collection, id))
        })
    }

    /// Merge top-level fields into an existing document.
    ///
    /// Returns `None` when the document does not exist; nothing is created.
    pub fn update_document(
        &self,
        collection: &str,
        id: &str,
        patch: Value,
    ) -> Result<Option<Document>> {
        let patch = into_body(patch)?;

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let Some(existing) = get_document_internal(&tx, collection, id)? else {
                return Ok(None);
            };

            let mut body = match existing.data {
                Value::Object(map) => map,
                _ => Map::new(),
            };
            for (key, value) in patch {
                body.insert(key, value);
            }

            let body_json = serde_json::to_string(&Value::Object(body))?;
            tx.execute(
                "UPDATE documents SET data = ?3, updated_at = ?4
                 WHERE collection = ?1 AND id = ?2",
                params![collection, id, body_json, now_ms()],
            )?;

            let updated = get_document_internal(&tx, collection, id)?;
            tx.commit()?;
            Ok(updated)
        })
    }

    /// Fetch a single document.
    pub fn get_document(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        self.with_conn(|conn| get_document_internal(conn, collection, id))
    }

    /// Delete a document. Returns `true` if it existed.
    pub fn delete_document(&self, collection: &str, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM documents WHERE collection = ?1 AND id = ?2",
                params![collection, id],
            )?;
            Ok(removed > 0)
        })
    }

    /// All documents of a collection in creation order.
    pub fn list_documents(&self, collection: &str) -> Result<Vec<Document>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT collection, id, data, created_at, updated_at
                 FROM documents WHERE collection = ?1
                 ORDER BY created_at ASC, id ASC",
            )?;
            let docs = stmt
                .query_map(params![collection], parse_document_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(docs)
        })
    }

    /// Number of documents in a collection.
    pub fn count_documents(&self, collection: &str) -> Result<i64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM documents WHERE collection = ?1",
                params![collection],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn setup_db() -> Database {
        Database::open_in_memory().expect("Failed to create in-memory database")
    }

    #[test]
    fn add_document_generates_id_and_strips_id_field() {
        let db = setup_db();
        let doc = db
            .add_document("labels", json!({ "id": "ignored", "title": "Work" }))
            .unwrap();

        assert_ne!(doc.id, "ignored");
        assert!(doc.data.get("id").is_none());
        assert_eq!(doc.data["title"], "Work");
    }

    #[test]
    fn set_document_preserves_created_at() {
        let db = setup_db();
        let first = db.set_document("projects", "p1", json!({ "title": "A" })).unwrap();
        let second = db.set_document("projects", "p1", json!({ "title": "B" })).unwrap();

        assert_eq!(first.created_at, second.created_at);
        assert_eq!(second.data["title"], "B");
        assert_eq!(db.count_documents("projects").unwrap(), 1);
    }

    #[test]
    fn update_document_merges_fields() {
        let db = setup_db();
        db.set_document("tasks", "t1", json!({ "title": "Write", "completed": false }))
            .unwrap();

        let updated = db
            .update_document("tasks", "t1", json!({ "completed": true }))
            .unwrap()
            .unwrap();

        assert_eq!(updated.data["title"], "Write");
        assert_eq!(updated.data["completed"], true);
    }

    #[test]
    fn update_missing_document_returns_none() {
        let db = setup_db();
        let result = db.update_document("tasks", "nope", json!({ "a": 1 })).unwrap();
        assert!(result.is_none());
        assert_eq!(db.count_documents("tasks").unwrap(), 0);
    }

    #[test]
    fn non_object_body_is_rejected() {
        let db = setup_db();
        assert!(db.add_document("tasks", json!([1, 2, 3])).is_err());
    }

    #[test]
    fn delete_document_reports_presence() {
        let db = setup_db();
        db.set_document("tasks", "t1", json!({})).unwrap();
        assert!(db.delete_document("tasks", "t1").unwrap());
        assert!(!db.delete_document("tasks", "t1").unwrap());
    }

    #[test]
    fn field_reads_dotted_paths() {
        let db = setup_db();
        let doc = db
            .add_document("tasks", json!({ "end_date": { "seconds": 10, "nanos": 0 } }))
            .unwrap();
        assert_eq!(doc.field("end_date.seconds"), Some(&json!(10)));
        assert_eq!(doc.field("end_date.missing"), None);
    }

    #[test]
    fn collections_are_isolated() {
        let db = setup_db();
        db.set_document("users/a/notifications", "n1", json!({})).unwrap();
        db.set_document("users/b/notifications", "n1", json!({})).unwrap();

        assert_eq!(db.list_documents("users/a/notifications").unwrap().len(), 1);
        assert_eq!(db.list_documents("users/b/notifications").unwrap().len(), 1);
    }
}
