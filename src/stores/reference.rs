//! Reference data: labels, priorities, statuses, colors, icons and project
//! templates, mirrored live and exposed as picker options.

use super::{SessionAware, lock};
use crate::db::seed::{
    COLORS, ICONS, LABELS, PRIORITIES, PROJECT_TEMPLATES, REFERENCE_COLLECTIONS, STATUSES,
};
use crate::db::Query;
use crate::error::AppResult;
use crate::gateway::{Gateway, Snapshot};
use crate::subscriptions::{SubscriptionRegistry, keys};
use crate::types::{AuthUser, ReferenceItem};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// One entry of a picker list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PickerOption {
    pub value: String,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

impl From<&ReferenceItem> for PickerOption {
    fn from(item: &ReferenceItem) -> Self {
        Self {
            value: item.id.clone(),
            label: item.title.clone(),
            color: item.color.clone(),
            icon: item.icon.clone(),
        }
    }
}

pub struct ReferenceStore {
    gateway: Gateway,
    registry: Arc<SubscriptionRegistry>,
    items: Arc<Mutex<HashMap<String, Vec<ReferenceItem>>>>,
}

impl ReferenceStore {
    pub fn new(gateway: Gateway, registry: Arc<SubscriptionRegistry>) -> Self {
        Self {
            gateway,
            registry,
            items: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Start mirroring every reference collection.
    pub fn subscribe(&self) -> AppResult<()> {
        for collection in REFERENCE_COLLECTIONS {
            let items = Arc::clone(&self.items);
            let name = collection.to_string();
            let sub = self
                .gateway
                .on_snapshot(Query::collection(collection), move |snap: Snapshot| {
                    let mut decoded = snap.decode_all::<ReferenceItem>();
                    decoded.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.title.cmp(&b.title)));
                    lock(&items).insert(name.clone(), decoded);
                })?;
            self.registry.replace(&keys::reference(collection), sub);
        }
        debug!(collections = REFERENCE_COLLECTIONS.len(), "Reference data subscribed");
        Ok(())
    }

    pub fn items(&self, collection: &str) -> Vec<ReferenceItem> {
        lock(&self.items).get(collection).cloned().unwrap_or_default()
    }

    pub fn find(&self, collection: &str, id: &str) -> Option<ReferenceItem> {
        lock(&self.items)
            .get(collection)
            .and_then(|items| items.iter().find(|i| i.id == id).cloned())
    }

    pub fn options(&self, collection: &str) -> Vec<PickerOption> {
        lock(&self.items)
            .get(collection)
            .map(|items| items.iter().map(PickerOption::from).collect())
            .unwrap_or_default()
    }

    pub fn labels(&self) -> Vec<PickerOption> {
        self.options(LABELS)
    }

    pub fn priorities(&self) -> Vec<PickerOption> {
        self.options(PRIORITIES)
    }

    pub fn statuses(&self) -> Vec<PickerOption> {
        self.options(STATUSES)
    }

    pub fn colors(&self) -> Vec<PickerOption> {
        self.options(COLORS)
    }

    pub fn icons(&self) -> Vec<PickerOption> {
        self.options(ICONS)
    }

    pub fn project_templates(&self) -> Vec<PickerOption> {
        self.options(PROJECT_TEMPLATES)
    }

    /// Whether any collection is mirrored.
    pub fn is_loaded(&self) -> bool {
        !lock(&self.items).is_empty()
    }

    pub fn clear(&self) {
        lock(&self.items).clear();
    }
}

impl SessionAware for ReferenceStore {
    fn name(&self) -> &'static str {
        "reference"
    }

    fn signed_in(&self, _user: &AuthUser) -> AppResult<()> {
        self.subscribe()
    }

    fn signed_out(&self) {
        self.clear();
    }
}
