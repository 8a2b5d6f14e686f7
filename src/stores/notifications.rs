//! Notification store: reminder settings, reminder timers, the user's
//! notification feed and system notifications.

use super::reminders::{PlannedReminder, ReminderTimers, plan_reminders};
use super::{SessionAware, lock, require_uid};
use crate::config::RemindersConfig;
use crate::db::{Direction, Query, now_ms};
use crate::error::{AppError, AppResult, Severity};
use crate::gateway::{Gateway, Snapshot};
use crate::subscriptions::{SubscriptionRegistry, keys};
use crate::toast::ToastCenter;
use crate::types::{
    AuthUser, Notification, REMINDER_SETTINGS_ID, ReminderSettings, Task,
    notifications_collection, settings_collection,
};
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

/// Longest accepted lead time: thirty days.
pub const MAX_LEAD_HOURS: u32 = 24 * 30;

const REMINDER_ICON: &str = "alarm";
const TEST_ICON: &str = "notifications";

/// System notification permission, as granted by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Default,
    Granted,
    Denied,
}

/// Host-level notifications outside the app surface.
#[async_trait]
pub trait SystemNotifier: Send + Sync {
    fn permission(&self) -> Permission;

    /// Ask the host for permission. Only meaningful from `Default`.
    async fn request_permission(&self) -> Permission;

    fn show(&self, title: &str, body: &str);
}

/// Notifier that writes system notifications to the log.
pub struct LogNotifier {
    permission: Mutex<Permission>,
}

impl LogNotifier {
    pub fn new(permission: Permission) -> Self {
        Self {
            permission: Mutex::new(permission),
        }
    }
}

#[async_trait]
impl SystemNotifier for LogNotifier {
    fn permission(&self) -> Permission {
        *lock(&self.permission)
    }

    async fn request_permission(&self) -> Permission {
        let mut permission = lock(&self.permission);
        if *permission == Permission::Default {
            *permission = Permission::Granted;
        }
        *permission
    }

    fn show(&self, title: &str, body: &str) {
        info!(target: "system_notification", title = %title, "{}", body);
    }
}

/// Show a system notification, asking for permission the first time.
async fn show_system(notifier: &dyn SystemNotifier, title: &str, body: &str) -> bool {
    let permission = match notifier.permission() {
        Permission::Default => notifier.request_permission().await,
        other => other,
    };
    if permission == Permission::Granted {
        notifier.show(title, body);
        true
    } else {
        debug!(?permission, "System notification suppressed");
        false
    }
}

#[derive(Default)]
struct NotificationState {
    uid: Option<String>,
    settings: Option<ReminderSettings>,
    notifications: Vec<Notification>,
    tasks: Vec<Task>,
}

/// Everything a fired reminder needs, detached from the store.
#[derive(Clone)]
struct Delivery {
    gateway: Gateway,
    toasts: Arc<ToastCenter>,
    notifier: Arc<dyn SystemNotifier>,
}

impl Delivery {
    /// Record a notification remotely, toast it and raise a system notification.
    async fn deliver(
        &self,
        uid: &str,
        message: String,
        task_id: Option<String>,
        icon: &str,
        system: bool,
    ) -> AppResult<Notification> {
        let data = json!({
            "message": message,
            "timestamp": now_ms(),
            "read": false,
            "task_id": task_id,
            "icon": icon,
        });
        let doc = self.gateway.add(&notifications_collection(uid), data)?;
        let notification: Notification = doc.decode()?;

        self.toasts.push(Severity::Info, icon, notification.message.clone());
        if system {
            show_system(self.notifier.as_ref(), "todo-board", &notification.message).await;
        }
        Ok(notification)
    }
}

/// Rebuilds reminder timers from the current settings and task set.
#[derive(Clone)]
struct Scheduler {
    delivery: Delivery,
    config: RemindersConfig,
    state: Arc<Mutex<NotificationState>>,
    timers: Arc<ReminderTimers>,
    /// Serializes rebuilds so the last one to run sees the newest inputs.
    rebuilding: Arc<Mutex<()>>,
    runtime: Option<Handle>,
}

impl Scheduler {
    fn settings(&self, state: &NotificationState) -> ReminderSettings {
        state
            .settings
            .clone()
            .unwrap_or_else(|| ReminderSettings::with_lead_hours(self.config.default_lead_hours.clone()))
    }

    /// Cancel every timer and schedule the current plan. Returns how many
    /// timers were started.
    fn rebuild(&self) -> usize {
        let _rebuilding = lock(&self.rebuilding);
        let (uid, settings, tasks) = {
            let state = lock(&self.state);
            (state.uid.clone(), self.settings(&state), state.tasks.clone())
        };
        let Some(uid) = uid else {
            self.timers.cancel_all();
            return 0;
        };
        if !settings.enabled {
            let cancelled = self.timers.cancel_all();
            debug!(cancelled, "Reminders disabled");
            return 0;
        }
        let Some(ref runtime) = self.runtime else {
            self.timers.cancel_all();
            warn!("No async runtime available, reminders not scheduled");
            return 0;
        };

        let now = Utc::now();
        let planned = plan_reminders(&tasks, &settings.lead_hours, self.config.default_due_hour, now);
        let scheduled = planned.len();

        let delivery = self.delivery.clone();
        let system = settings.system_notifications;
        let cancelled = self.timers.replace_all(runtime, planned, now, move |reminder: PlannedReminder| {
            let delivery = delivery.clone();
            let uid = uid.clone();
            async move {
                let message = reminder.message();
                match delivery
                    .deliver(&uid, message, Some(reminder.task_id.clone()), REMINDER_ICON, system)
                    .await
                {
                    Ok(n) => info!(task_id = %reminder.task_id, notification_id = %n.id, "Reminder delivered"),
                    Err(e) => warn!(task_id = %reminder.task_id, error = %e, "Reminder delivery failed"),
                }
            }
        });
        debug!(cancelled, scheduled, "Reminder timers rebuilt");
        scheduled
    }
}

pub struct NotificationStore {
    gateway: Gateway,
    registry: Arc<SubscriptionRegistry>,
    toasts: Arc<ToastCenter>,
    scheduler: Scheduler,
}

impl NotificationStore {
    /// Timers run on the tokio runtime current at construction, if any.
    pub fn new(
        gateway: Gateway,
        registry: Arc<SubscriptionRegistry>,
        toasts: Arc<ToastCenter>,
        notifier: Arc<dyn SystemNotifier>,
        config: RemindersConfig,
    ) -> Self {
        let delivery = Delivery {
            gateway: gateway.clone(),
            toasts: Arc::clone(&toasts),
            notifier,
        };
        Self {
            gateway,
            registry,
            toasts,
            scheduler: Scheduler {
                delivery,
                config,
                state: Arc::new(Mutex::new(NotificationState::default())),
                timers: Arc::new(ReminderTimers::new()),
                rebuilding: Arc::new(Mutex::new(())),
                runtime: Handle::try_current().ok(),
            },
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, NotificationState> {
        lock(&self.scheduler.state)
    }

    fn uid(&self) -> AppResult<String> {
        require_uid(&self.state().uid)
    }

    fn reported<T>(&self, result: AppResult<T>) -> AppResult<T> {
        if let Err(ref err) = result {
            self.toasts.report(err);
        }
        result
    }

    // Settings

    /// Saved settings, or the configured defaults.
    pub fn settings(&self) -> ReminderSettings {
        let state = self.state();
        self.scheduler.settings(&state)
    }

    /// Persist reminder settings. Timers are rebuilt when the saved
    /// document comes back through the settings subscription.
    pub fn update_settings(&self, settings: ReminderSettings) -> AppResult<ReminderSettings> {
        let result = self.try_update_settings(settings);
        self.reported(result)
    }

    fn try_update_settings(&self, mut settings: ReminderSettings) -> AppResult<ReminderSettings> {
        let uid = self.uid()?;
        if let Some(bad) = settings.lead_hours.iter().find(|h| **h > MAX_LEAD_HOURS) {
            return Err(AppError::invalid_value(
                "lead_hours",
                &format!("Lead time of {} hours exceeds {} hours", bad, MAX_LEAD_HOURS),
            ));
        }
        settings.lead_hours.sort_unstable_by(|a, b| b.cmp(a));
        settings.lead_hours.dedup();

        let data = serde_json::to_value(&settings).map_err(AppError::internal)?;
        self.gateway
            .set(&settings_collection(&uid), REMINDER_SETTINGS_ID, data)?;
        info!(uid = %uid, lead_hours = ?settings.lead_hours, enabled = settings.enabled, "Reminder settings saved");
        self.toasts.success("Reminder settings saved");
        Ok(settings)
    }

    // Reminders

    /// Feed a new task set; timers are rebuilt from it.
    pub fn tasks_changed(&self, tasks: &[Task]) {
        self.state().tasks = tasks.to_vec();
        self.scheduler.rebuild();
    }

    /// Cancel and reschedule every reminder timer.
    pub fn rebuild(&self) -> usize {
        self.scheduler.rebuild()
    }

    pub fn pending_reminders(&self) -> Vec<PlannedReminder> {
        self.scheduler.timers.pending()
    }

    // Feed

    /// Notifications, newest first.
    pub fn notifications(&self) -> Vec<Notification> {
        self.state().notifications.clone()
    }

    pub fn unread_count(&self) -> usize {
        self.state().notifications.iter().filter(|n| !n.read).count()
    }

    /// Reading a notification removes it.
    pub fn mark_read(&self, id: &str) -> AppResult<()> {
        let result = self.try_mark_read(id);
        self.reported(result)
    }

    fn try_mark_read(&self, id: &str) -> AppResult<()> {
        let uid = self.uid()?;
        if !self.gateway.delete(&notifications_collection(&uid), id)? {
            return Err(AppError::notification_not_found(id));
        }
        debug!(notification_id = %id, "Notification read");
        Ok(())
    }

    pub fn mark_all_read(&self) -> AppResult<usize> {
        let result = self.try_mark_all_read();
        self.reported(result)
    }

    fn try_mark_all_read(&self) -> AppResult<usize> {
        let uid = self.uid()?;
        let collection = notifications_collection(&uid);
        let ids: Vec<String> = self.notifications().into_iter().map(|n| n.id).collect();
        let mut removed = 0;
        for id in ids {
            if self.gateway.delete(&collection, &id)? {
                removed += 1;
            }
        }
        info!(removed, "All notifications read");
        Ok(removed)
    }

    /// Deliver a notification right away, through every channel a reminder uses.
    pub async fn send_test_notification(&self) -> AppResult<Notification> {
        let result = match self.uid() {
            Ok(uid) => {
                let system = self.settings().system_notifications;
                self.scheduler
                    .delivery
                    .deliver(&uid, "This is a test notification".to_string(), None, TEST_ICON, system)
                    .await
            }
            Err(e) => Err(e),
        };
        self.reported(result)
    }

    // Permission

    pub fn permission(&self) -> Permission {
        self.scheduler.delivery.notifier.permission()
    }

    pub async fn request_permission(&self) -> Permission {
        self.scheduler.delivery.notifier.request_permission().await
    }

    pub fn clear(&self) {
        let _rebuilding = lock(&self.scheduler.rebuilding);
        *self.state() = NotificationState::default();
        self.scheduler.timers.cancel_all();
    }
}

impl SessionAware for NotificationStore {
    fn name(&self) -> &'static str {
        "notifications"
    }

    fn signed_in(&self, user: &AuthUser) -> AppResult<()> {
        self.state().uid = Some(user.uid.clone());

        let state = Arc::clone(&self.scheduler.state);
        let feed = Query::collection(notifications_collection(&user.uid))
            .order_by("timestamp", Direction::Desc);
        let sub = self.gateway.on_snapshot(feed, move |snap: Snapshot| {
            lock(&state).notifications = snap.decode_all::<Notification>();
        })?;
        self.registry.replace(keys::NOTIFICATIONS, sub);

        let scheduler = self.scheduler.clone();
        let settings_query = Query::collection(settings_collection(&user.uid))
            .where_eq("id", REMINDER_SETTINGS_ID);
        let sub = self.gateway.on_snapshot(settings_query, move |snap: Snapshot| {
            let saved = snap.decode_all::<ReminderSettings>().into_iter().next();
            lock(&scheduler.state).settings = saved;
            scheduler.rebuild();
        })?;
        self.registry.replace(keys::REMINDER_SETTINGS, sub);

        debug!(uid = %user.uid, "Notifications subscribed");
        Ok(())
    }

    fn signed_out(&self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::error::ErrorCode;

    fn user() -> AuthUser {
        AuthUser {
            uid: "u1".to_string(),
            display_name: None,
            email: None,
            photo_url: None,
        }
    }

    fn setup(permission: Permission) -> (NotificationStore, Arc<ToastCenter>, Gateway) {
        let gateway = Gateway::new(Database::open_in_memory().unwrap());
        let toasts = Arc::new(ToastCenter::new(60_000));
        let store = NotificationStore::new(
            gateway.clone(),
            Arc::new(SubscriptionRegistry::new()),
            Arc::clone(&toasts),
            Arc::new(LogNotifier::new(permission)),
            RemindersConfig::default(),
        );
        (store, toasts, gateway)
    }

    #[test]
    fn user_scoped_calls_need_a_session() {
        let (store, _, gateway) = setup(Permission::Granted);
        assert_eq!(store.mark_read("x").unwrap_err().code, ErrorCode::NotAuthenticated);
        assert_eq!(
            store
                .update_settings(ReminderSettings::with_lead_hours(vec![1]))
                .unwrap_err()
                .code,
            ErrorCode::NotAuthenticated
        );
        assert_eq!(gateway.database().count_documents(&settings_collection("u1")).unwrap(), 0);
    }

    #[test]
    fn defaults_apply_until_settings_are_saved() {
        let (store, _, _) = setup(Permission::Granted);
        store.signed_in(&user()).unwrap();
        assert_eq!(store.settings().lead_hours, vec![24, 1]);

        let saved = store
            .update_settings(ReminderSettings::with_lead_hours(vec![1, 48, 1, 2]))
            .unwrap();
        assert_eq!(saved.lead_hours, vec![48, 2, 1]);
        assert_eq!(store.settings(), saved);
    }

    #[test]
    fn rejects_excessive_lead_time() {
        let (store, _, _) = setup(Permission::Granted);
        store.signed_in(&user()).unwrap();
        let err = store
            .update_settings(ReminderSettings::with_lead_hours(vec![MAX_LEAD_HOURS + 1]))
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidFieldValue);
    }

    #[tokio::test]
    async fn test_notification_reaches_feed_and_toasts() {
        let (store, toasts, _) = setup(Permission::Default);
        store.signed_in(&user()).unwrap();

        let sent = store.send_test_notification().await.unwrap();
        assert_eq!(store.notifications(), vec![sent.clone()]);
        assert_eq!(store.unread_count(), 1);
        assert!(toasts.active().iter().any(|t| t.message == sent.message));
        // Permission was requested lazily.
        assert_eq!(store.permission(), Permission::Granted);

        store.mark_read(&sent.id).unwrap();
        assert!(store.notifications().is_empty());
        assert_eq!(
            store.mark_read(&sent.id).unwrap_err().code,
            ErrorCode::NotificationNotFound
        );
    }

    #[tokio::test]
    async fn denied_permission_is_never_requested_again() {
        let (store, _, _) = setup(Permission::Denied);
        store.signed_in(&user()).unwrap();
        store.send_test_notification().await.unwrap();
        assert_eq!(store.request_permission().await, Permission::Denied);
    }

    #[tokio::test]
    async fn mark_all_read_empties_the_feed() {
        let (store, _, _) = setup(Permission::Granted);
        store.signed_in(&user()).unwrap();
        for _ in 0..3 {
            store.send_test_notification().await.unwrap();
        }
        assert_eq!(store.mark_all_read().unwrap(), 3);
        assert_eq!(store.unread_count(), 0);
    }

    fn dated_task(i: usize) -> Task {
        let due = (Utc::now() + chrono::Duration::days(10)).format("%Y-%m-%d").to_string();
        Task {
            id: format!("t{}", i),
            project_id: "p".to_string(),
            project_ref: None,
            title: format!("Task {}", i),
            description: String::new(),
            label: None,
            priority: None,
            status: "todo".to_string(),
            start_date: None,
            end_date: Some(due),
            start_hour: None,
            end_hour: None,
            completed: false,
            color: None,
            owner: Some("u1".to_string()),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_rebuilds_keep_one_timer_per_reminder() {
        let (store, _, _) = setup(Permission::Granted);
        store.signed_in(&user()).unwrap();
        let tasks: Vec<Task> = (0..50).map(dated_task).collect();

        for _ in 0..50 {
            std::thread::scope(|scope| {
                for _ in 0..4 {
                    scope.spawn(|| store.tasks_changed(&tasks));
                }
            });
            // Two default lead times per task.
            assert_eq!(store.pending_reminders().len(), 100);
        }
    }

    #[test]
    fn signed_out_store_forgets_everything() {
        let (store, _, _) = setup(Permission::Granted);
        store.signed_in(&user()).unwrap();
        store.signed_out();
        assert!(store.notifications().is_empty());
        assert!(store.pending_reminders().is_empty());
        assert_eq!(store.mark_all_read().unwrap_err().code, ErrorCode::NotAuthenticated);
    }
}
