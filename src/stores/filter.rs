//! Task filters.
//!
//! A filter is a set of optional criteria combined by intersection. The same
//! filter runs client-side as a predicate over mirrored tasks and
//! server-side as query clauses, and both must agree.

use crate::dates::{date_to_timestamp, normalize_date};
use crate::db::Query;
use crate::types::Task;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Field path of the due date's ordering key in stored tasks.
pub const DUE_FIELD: &str = "end_date.seconds";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFilter {
    /// Case-insensitive title substring.
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub projects: Vec<String>,
    #[serde(default)]
    pub priorities: Vec<String>,
    #[serde(default)]
    pub statuses: Vec<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    /// Single due date, any accepted date format.
    #[serde(default)]
    pub due_date: Option<String>,
}

impl TaskFilter {
    pub fn title(needle: impl Into<String>) -> Self {
        Self {
            title: Some(needle.into()),
            ..Self::default()
        }
    }

    fn title_needle(&self) -> Option<String> {
        self.title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
    }

    fn due_needle(&self) -> Option<&str> {
        self.due_date
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
    }

    /// No criterion is active. An empty filter selects nothing.
    pub fn is_empty(&self) -> bool {
        self.title_needle().is_none()
            && self.projects.is_empty()
            && self.priorities.is_empty()
            && self.statuses.is_empty()
            && self.labels.is_empty()
            && self.due_needle().is_none()
    }

    /// Whether `task` satisfies every active criterion.
    pub fn matches(&self, task: &Task) -> bool {
        if self.is_empty() {
            return false;
        }
        if let Some(needle) = self.title_needle() {
            if !task.title.to_lowercase().contains(&needle) {
                return false;
            }
        }
        if !self.projects.is_empty() && !self.projects.contains(&task.project_id) {
            return false;
        }
        if !member(&self.priorities, task.priority.as_deref()) {
            return false;
        }
        if !self.statuses.is_empty() && !self.statuses.contains(&task.status) {
            return false;
        }
        if !member(&self.labels, task.label.as_deref()) {
            return false;
        }
        if let Some(due) = self.due_needle() {
            match normalize_date(due) {
                Some(due) => {
                    if task.end_date.as_deref() != Some(due.as_str()) {
                        return false;
                    }
                }
                None => return false,
            }
        }
        true
    }

    /// Add this filter's clauses to `query`.
    pub fn apply(&self, mut query: Query) -> Query {
        if let Some(needle) = self.title_needle() {
            query = query.where_contains("title", needle);
        }
        if !self.projects.is_empty() {
            query = query.where_in("project_id", strings(&self.projects));
        }
        if !self.priorities.is_empty() {
            query = query.where_in("priority", strings(&self.priorities));
        }
        if !self.statuses.is_empty() {
            query = query.where_in("status", strings(&self.statuses));
        }
        if !self.labels.is_empty() {
            query = query.where_in("label", strings(&self.labels));
        }
        if let Some(due) = self.due_needle() {
            query = match date_to_timestamp(due) {
                Some(ts) => query.where_eq(DUE_FIELD, ts.seconds),
                // An unparseable date matches nothing, same as the predicate.
                None => query.where_in(DUE_FIELD, Vec::new()),
            };
        }
        query
    }
}

fn member(selected: &[String], value: Option<&str>) -> bool {
    if selected.is_empty() {
        return true;
    }
    value.is_some_and(|v| selected.iter().any(|s| s == v))
}

fn strings(values: &[String]) -> Vec<Value> {
    values.iter().map(|v| Value::String(v.clone())).collect()
}

/// Tasks matching `filter`, in working-set order.
pub fn filter_tasks(tasks: &[Task], filter: &TaskFilter) -> Vec<Task> {
    if filter.is_empty() {
        return Vec::new();
    }
    tasks.iter().filter(|t| filter.matches(t)).cloned().collect()
}
