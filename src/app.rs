//! Application wiring: every service is built once here and shared by `Arc`.

use crate::config::Config;
use crate::db::Database;
use crate::gateway::Gateway;
use crate::stores::{
    IdentityProvider, NotificationStore, ProjectStore, ReferenceStore, SessionAware, SessionStore,
    SystemNotifier, TaskStore,
};
use crate::subscriptions::SubscriptionRegistry;
use crate::theme::ThemePreference;
use crate::toast::ToastCenter;
use std::sync::Arc;
use tracing::debug;

pub struct App {
    pub config: Config,
    pub gateway: Gateway,
    pub registry: Arc<SubscriptionRegistry>,
    pub toasts: Arc<ToastCenter>,
    pub theme: Arc<ThemePreference>,
    pub reference: Arc<ReferenceStore>,
    pub tasks: Arc<TaskStore>,
    pub projects: Arc<ProjectStore>,
    pub notifications: Arc<NotificationStore>,
    pub session: Arc<SessionStore>,
}

impl App {
    /// Build the service graph. Call from inside a tokio runtime so reminder
    /// timers have somewhere to run.
    pub fn build(
        config: Config,
        db: Database,
        provider: Arc<dyn IdentityProvider>,
        notifier: Arc<dyn SystemNotifier>,
        theme: ThemePreference,
    ) -> Arc<Self> {
        let gateway = Gateway::new(db);
        let registry = Arc::new(SubscriptionRegistry::new());
        let toasts = Arc::new(ToastCenter::new(config.reminders.toast_ttl_ms));

        let reference = Arc::new(ReferenceStore::new(gateway.clone(), Arc::clone(&registry)));
        let tasks = Arc::new(TaskStore::new(
            gateway.clone(),
            Arc::clone(&registry),
            Arc::clone(&toasts),
            config.tasks.clone(),
        ));
        let projects = Arc::new(ProjectStore::new(
            gateway.clone(),
            Arc::clone(&registry),
            Arc::clone(&toasts),
            Arc::clone(&tasks),
            Arc::clone(&reference),
        ));
        let notifications = Arc::new(NotificationStore::new(
            gateway.clone(),
            Arc::clone(&registry),
            Arc::clone(&toasts),
            notifier,
            config.reminders.clone(),
        ));

        let reminders = Arc::clone(&notifications);
        tasks.on_change(move |tasks| reminders.tasks_changed(tasks));

        // Sign-in order: reference data first, notifications last so the
        // task working set is in place when reminders are first planned.
        let dependents: Vec<Arc<dyn SessionAware>> = vec![
            reference.clone(),
            tasks.clone(),
            projects.clone(),
            notifications.clone(),
        ];
        let session = Arc::new(SessionStore::new(
            gateway.clone(),
            Arc::clone(&registry),
            Arc::clone(&toasts),
            provider,
            dependents,
        ));
        debug!("Application services built");

        Arc::new(Self {
            config,
            gateway,
            registry,
            toasts,
            theme: Arc::new(theme),
            reference,
            tasks,
            projects,
            notifications,
            session,
        })
    }
}
