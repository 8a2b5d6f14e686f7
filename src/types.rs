//! Core record types mirrored from the document store.

use crate::dates::timestamp_date;
use serde::{Deserialize, Serialize};

/// Collection names.
pub const TASKS: &str = "tasks";
pub const PROJECTS: &str = "projects";
pub const USERS: &str = "users";

/// Per-user notifications subcollection.
pub fn notifications_collection(uid: &str) -> String {
    format!("{}/{}/notifications", USERS, uid)
}

/// Per-user settings subcollection.
pub fn settings_collection(uid: &str) -> String {
    format!("{}/{}/settings", USERS, uid)
}

/// Document id of the reminder settings inside [`settings_collection`].
pub const REMINDER_SETTINGS_ID: &str = "reminders";

/// A task. Dates are `YYYY-MM-DD` here and timestamps in storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    #[serde(default)]
    pub id: String,
    pub project_id: String,
    /// Path of the owning project document (`projects/{id}`).
    #[serde(default)]
    pub project_ref: Option<String>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default, with = "timestamp_date")]
    pub start_date: Option<String>,
    #[serde(default, with = "timestamp_date")]
    pub end_date: Option<String>,
    #[serde(default)]
    pub start_hour: Option<String>,
    #[serde(default)]
    pub end_hour: Option<String>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
}

pub fn project_ref(project_id: &str) -> String {
    format!("{}/{}", PROJECTS, project_id)
}

/// Input for creating a task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskForm {
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub start_hour: Option<String>,
    #[serde(default)]
    pub end_hour: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

/// Partial task edit; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskPatch {
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub start_hour: Option<String>,
    #[serde(default)]
    pub end_hour: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    #[serde(default)]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectForm {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    /// Reference template to take icon and color from when unset.
    #[serde(default)]
    pub template_id: Option<String>,
}

/// Item of a reference collection (label, priority, status, color, icon, template).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceItem {
    #[serde(default)]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub order: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(default)]
    pub id: String,
    pub message: String,
    /// Milliseconds since the epoch.
    pub timestamp: i64,
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
}

/// Principal returned by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub uid: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub photo_url: Option<String>,
}

/// Stored profile document under `users/{uid}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default, rename = "id")]
    pub uid: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub login_count: u32,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub last_login_at: i64,
}

/// User reminder preferences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Hours before the due instant at which to remind.
    #[serde(default)]
    pub lead_hours: Vec<u32>,
    /// Also raise a system notification when permission allows.
    #[serde(default = "default_true")]
    pub system_notifications: bool,
}

fn default_true() -> bool {
    true
}

impl ReminderSettings {
    pub fn with_lead_hours(lead_hours: Vec<u32>) -> Self {
        Self {
            enabled: true,
            lead_hours,
            system_notifications: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn task_dates_are_stored_as_timestamps() {
        let task = Task {
            id: "t1".to_string(),
            project_id: "p1".to_string(),
            project_ref: Some(project_ref("p1")),
            title: "Pay rent".to_string(),
            description: String::new(),
            label: None,
            priority: Some("high".to_string()),
            status: "todo".to_string(),
            start_date: Some("2024/05/01".to_string()),
            end_date: Some("2024-05-03".to_string()),
            start_hour: None,
            end_hour: Some("18:00".to_string()),
            completed: false,
            color: None,
            owner: Some("u1".to_string()),
        };

        let stored = serde_json::to_value(&task).unwrap();
        assert!(stored["end_date"]["seconds"].is_i64());

        let back: Task = serde_json::from_value(stored).unwrap();
        assert_eq!(back.start_date.as_deref(), Some("2024-05-01"));
        assert_eq!(back.end_date.as_deref(), Some("2024-05-03"));
    }

    #[test]
    fn profile_uid_reads_document_id() {
        let profile: UserProfile =
            serde_json::from_value(json!({ "id": "u1", "login_count": 3 })).unwrap();
        assert_eq!(profile.uid, "u1");
        assert_eq!(profile.login_count, 3);
    }

    #[test]
    fn reminder_settings_defaults() {
        let settings: ReminderSettings = serde_json::from_value(json!({})).unwrap();
        assert!(settings.enabled);
        assert!(settings.system_notifications);
        assert!(settings.lead_hours.is_empty());
    }

    #[test]
    fn notification_paths_are_per_user() {
        assert_eq!(notifications_collection("u1"), "users/u1/notifications");
        assert_eq!(settings_collection("u1"), "users/u1/settings");
    }
}
