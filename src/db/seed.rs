//! Default reference collections.
//!
//! Reference data is read-only from the client's point of view; this is how a
//! fresh database gets its labels, priorities, statuses, colors, icons and
//! project templates. Seeding uses fixed ids, so running it twice is harmless.

use super::Database;
use anyhow::Result;
use serde_json::{Value, json};
use tracing::info;

pub const LABELS: &str = "labels";
pub const PRIORITIES: &str = "priorities";
pub const STATUSES: &str = "statuses";
pub const COLORS: &str = "colors";
pub const ICONS: &str = "icons";
pub const PROJECT_TEMPLATES: &str = "project_templates";

/// Every reference collection, in the order they are mirrored.
pub const REFERENCE_COLLECTIONS: [&str; 6] =
    [LABELS, PRIORITIES, STATUSES, COLORS, ICONS, PROJECT_TEMPLATES];

fn default_documents(collection: &str) -> Vec<(&'static str, Value)> {
    match collection {
        LABELS => vec![
            ("work", json!({ "title": "Work", "color": "#1976d2", "order": 1 })),
            ("personal", json!({ "title": "Personal", "color": "#388e3c", "order": 2 })),
            ("errand", json!({ "title": "Errand", "color": "#f57c00", "order": 3 })),
            ("study", json!({ "title": "Study", "color": "#7b1fa2", "order": 4 })),
        ],
        PRIORITIES => vec![
            ("high", json!({ "title": "High", "color": "#d32f2f", "icon": "flag", "order": 1 })),
            ("medium", json!({ "title": "Medium", "color": "#fbc02d", "icon": "flag", "order": 2 })),
            ("low", json!({ "title": "Low", "color": "#43a047", "icon": "flag", "order": 3 })),
        ],
        STATUSES => vec![
            ("todo", json!({ "title": "To do", "icon": "radio_button_unchecked", "order": 1 })),
            ("in_progress", json!({ "title": "In progress", "icon": "timelapse", "order": 2 })),
            ("done", json!({ "title": "Done", "icon": "check_circle", "order": 3 })),
        ],
        COLORS => vec![
            ("red", json!({ "title": "Red", "color": "#e53935", "order": 1 })),
            ("blue", json!({ "title": "Blue", "color": "#1e88e5", "order": 2 })),
            ("green", json!({ "title": "Green", "color": "#43a047", "order": 3 })),
            ("amber", json!({ "title": "Amber", "color": "#ffb300", "order": 4 })),
            ("grey", json!({ "title": "Grey", "color": "#757575", "order": 5 })),
        ],
        ICONS => vec![
            ("inbox", json!({ "title": "Inbox", "icon": "inbox", "order": 1 })),
            ("home", json!({ "title": "Home", "icon": "home", "order": 2 })),
            ("briefcase", json!({ "title": "Work", "icon": "work", "order": 3 })),
            ("book", json!({ "title": "Study", "icon": "menu_book", "order": 4 })),
        ],
        PROJECT_TEMPLATES => vec![
            (
                "inbox",
                json!({ "title": "Inbox", "icon": "inbox", "color": "#757575", "order": 1 }),
            ),
            (
                "personal",
                json!({ "title": "Personal", "icon": "home", "color": "#43a047", "order": 2 }),
            ),
            (
                "work",
                json!({ "title": "Work", "icon": "work", "color": "#1e88e5", "order": 3 }),
            ),
        ],
        _ => Vec::new(),
    }
}

impl Database {
    /// Write the default reference documents. Returns how many were written.
    pub fn seed_reference_data(&self) -> Result<usize> {
        let mut written = 0;
        for collection in REFERENCE_COLLECTIONS {
            for (id, body) in default_documents(collection) {
                self.set_document(collection, id, body)?;
                written += 1;
            }
        }
        info!(documents = written, "Seeded reference collections");
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeding_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let first = db.seed_reference_data().unwrap();
        let second = db.seed_reference_data().unwrap();

        assert_eq!(first, second);
        assert_eq!(db.count_documents(PRIORITIES).unwrap(), 3);
        assert_eq!(db.count_documents(STATUSES).unwrap(), 3);
    }

    #[test]
    fn every_reference_collection_has_defaults() {
        for collection in REFERENCE_COLLECTIONS {
            assert!(!default_documents(collection).is_empty(), "{}", collection);
        }
    }
}
