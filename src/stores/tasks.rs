//! Task store: the signed-in user's working set, filtered pages and task actions.

use super::filter::{TaskFilter, filter_tasks};
use super::pagination::{PageCursor, PageMove, PageView, ordered, page_query, task_order, total_pages};
use super::{SessionAware, lock, non_blank, require_uid};
use crate::config::TasksConfig;
use crate::dates::{normalize_date, parse_hour};
use crate::db::{Cursor, Query};
use crate::error::{AppError, AppResult};
use crate::gateway::{Gateway, Snapshot};
use crate::subscriptions::{SubscriptionRegistry, keys};
use crate::toast::ToastCenter;
use crate::types::{AuthUser, TASKS, Task, TaskForm, TaskPatch, project_ref};
use serde_json::{Value, json};
use std::cmp::Ordering;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

type TaskObserver = Arc<dyn Fn(&[Task]) + Send + Sync>;

#[derive(Default)]
struct TaskState {
    uid: Option<String>,
    /// Every task owned by the user, in listing order.
    tasks: Vec<Task>,
    filter: TaskFilter,
    page: Vec<Task>,
    cursor: PageCursor,
}

pub struct TaskStore {
    gateway: Gateway,
    registry: Arc<SubscriptionRegistry>,
    toasts: Arc<ToastCenter>,
    config: TasksConfig,
    state: Arc<Mutex<TaskState>>,
    observers: Arc<Mutex<Vec<TaskObserver>>>,
}

/// Listing order for tasks held in memory. Undated tasks sort last.
fn compare_tasks(a: &Task, b: &Task) -> Ordering {
    match (&a.end_date, &b.end_date) {
        (Some(x), Some(y)) => x.cmp(y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| b.title.cmp(&a.title))
    .then_with(|| a.id.cmp(&b.id))
}

fn normalized_date(field: &str, value: &str) -> AppResult<String> {
    normalize_date(value).ok_or_else(|| {
        AppError::invalid_value(field, &format!("Invalid date: {}", value.trim()))
    })
}

fn optional_date(field: &str, value: Option<&str>) -> AppResult<Option<String>> {
    non_blank(value)
        .map(|v| normalized_date(field, &v))
        .transpose()
}

fn optional_hour(field: &str, value: Option<&str>) -> AppResult<Option<String>> {
    match non_blank(value) {
        None => Ok(None),
        Some(v) => parse_hour(&v)
            .map(|t| Some(t.format("%H:%M").to_string()))
            .ok_or_else(|| AppError::invalid_value(field, &format!("Invalid hour: {}", v))),
    }
}

fn check_date_range(task: &Task) -> AppResult<()> {
    if let (Some(start), Some(end)) = (&task.start_date, &task.end_date) {
        // Normalized dates compare correctly as strings.
        if start > end {
            return Err(AppError::invalid_value(
                "start_date",
                "Start date must not be after the end date",
            ));
        }
    }
    Ok(())
}

/// Stored form of a task: everything but the id.
fn task_data(task: &Task) -> AppResult<Value> {
    let mut data = serde_json::to_value(task).map_err(AppError::internal)?;
    if let Value::Object(ref mut map) = data {
        map.remove("id");
    }
    Ok(data)
}

impl TaskStore {
    pub fn new(
        gateway: Gateway,
        registry: Arc<SubscriptionRegistry>,
        toasts: Arc<ToastCenter>,
        config: TasksConfig,
    ) -> Self {
        Self {
            gateway,
            registry,
            toasts,
            config,
            state: Arc::new(Mutex::new(TaskState::default())),
            observers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn config(&self) -> &TasksConfig {
        &self.config
    }

    /// Call `observer` with the full working set after every change.
    pub fn on_change<F>(&self, observer: F)
    where
        F: Fn(&[Task]) + Send + Sync + 'static,
    {
        lock(&self.observers).push(Arc::new(observer));
    }

    fn uid(&self) -> AppResult<String> {
        require_uid(&lock(&self.state).uid)
    }

    fn owned(uid: &str) -> Query {
        Query::collection(TASKS).where_eq("owner", uid)
    }

    fn reported<T>(&self, result: AppResult<T>) -> AppResult<T> {
        if let Err(ref err) = result {
            self.toasts.report(err);
        }
        result
    }

    // Reads

    pub fn tasks(&self) -> Vec<Task> {
        lock(&self.state).tasks.clone()
    }

    pub fn tasks_for_project(&self, project_id: &str) -> Vec<Task> {
        lock(&self.state)
            .tasks
            .iter()
            .filter(|t| t.project_id == project_id)
            .cloned()
            .collect()
    }

    /// A task by id: from the working set, else straight from the store.
    pub fn task(&self, id: &str) -> AppResult<Task> {
        let uid = self.uid()?;
        if let Some(task) = lock(&self.state).tasks.iter().find(|t| t.id == id) {
            return Ok(task.clone());
        }
        self.load_owned(&uid, id)
    }

    fn load_owned(&self, uid: &str, id: &str) -> AppResult<Task> {
        let doc = self
            .gateway
            .get(TASKS, id)?
            .ok_or_else(|| AppError::task_not_found(id))?;
        let task: Task = doc.decode()?;
        if task.owner.as_deref() != Some(uid) {
            return Err(AppError::task_not_found(id));
        }
        Ok(task)
    }

    pub fn filter(&self) -> TaskFilter {
        lock(&self.state).filter.clone()
    }

    /// Working-set tasks matching the active filter.
    pub fn filtered(&self) -> Vec<Task> {
        let state = lock(&self.state);
        filter_tasks(&state.tasks, &state.filter)
    }

    /// Working-set tasks whose title contains `title`.
    pub fn search(&self, title: &str) -> Vec<Task> {
        filter_tasks(&lock(&self.state).tasks, &TaskFilter::title(title))
    }

    pub fn page(&self) -> PageView {
        let state = lock(&self.state);
        PageView {
            tasks: state.page.clone(),
            page: state.cursor.page,
            total_pages: total_pages(state.cursor.total, self.config.page_size),
            total: state.cursor.total,
            page_size: self.config.page_size,
        }
    }

    // Filtering and pagination

    /// Replace the active filter and fetch its first page.
    pub fn set_filter(&self, filter: TaskFilter) -> AppResult<PageView> {
        {
            let mut state = lock(&self.state);
            state.filter = filter;
            state.cursor.reset();
        }
        self.fetch_page(PageMove::First)
    }

    /// Move through the filtered, ordered task list one page at a time.
    ///
    /// The page stays live: its subscription replaces the previous page's.
    pub fn fetch_page(&self, mv: PageMove) -> AppResult<PageView> {
        let result = self.try_fetch_page(mv);
        self.reported(result)
    }

    fn try_fetch_page(&self, mv: PageMove) -> AppResult<PageView> {
        let uid = self.uid()?;
        let size = self.config.page_size;
        let (filter, mut cursor) = {
            let state = lock(&self.state);
            (state.filter.clone(), state.cursor.clone())
        };

        if filter.is_empty() {
            self.registry.cancel(keys::TASK_PAGE);
            let mut state = lock(&self.state);
            state.page.clear();
            state.cursor.reset();
            drop(state);
            return Ok(self.page());
        }

        let base = ordered(filter.apply(Self::owned(&uid)));
        cursor.total = self.gateway.count(&base)? as usize;
        let pages = total_pages(cursor.total, size);

        let at_edge = cursor.page > 0
            && match mv {
                PageMove::Next => cursor.page >= pages,
                PageMove::Prev => cursor.page <= 1,
                _ => false,
            };
        if at_edge {
            lock(&self.state).cursor.total = cursor.total;
            return Ok(self.page());
        }

        let (query, effective) = page_query(&base, &cursor, mv, size);
        let target = cursor.target_page(effective, pages);
        {
            let mut state = lock(&self.state);
            state.cursor.page = target;
            state.cursor.total = cursor.total;
        }
        debug!(page = target, pages, total = cursor.total, ?effective, "Fetching task page");

        let state = Arc::clone(&self.state);
        let gateway = self.gateway.clone();
        let count_query = base.clone();
        let order = task_order();
        let sub = self.gateway.on_snapshot(query, move |snap: Snapshot| {
            let tasks = snap.decode_all::<Task>();
            let first = snap.documents.first().map(|d| Cursor::from_document(d, &order));
            let last = snap.documents.last().map(|d| Cursor::from_document(d, &order));
            let total = gateway.count(&count_query).ok();

            let mut state = lock(&state);
            state.page = tasks;
            if first.is_some() {
                state.cursor.first = first;
                state.cursor.last = last;
            }
            if let Some(total) = total {
                state.cursor.total = total as usize;
            }
        })?;
        self.registry.replace(keys::TASK_PAGE, sub);

        Ok(self.page())
    }

    // Actions

    pub fn create_task(&self, form: TaskForm) -> AppResult<Task> {
        let result = self.try_create(form);
        self.reported(result)
    }

    fn try_create(&self, form: TaskForm) -> AppResult<Task> {
        let uid = self.uid()?;
        let title = non_blank(Some(&form.title)).ok_or_else(|| AppError::missing_field("title"))?;
        let project_id =
            non_blank(Some(&form.project_id)).ok_or_else(|| AppError::missing_field("project_id"))?;
        let end_date = non_blank(form.end_date.as_deref())
            .ok_or_else(|| AppError::missing_field("end_date"))?;
        let status = non_blank(form.status.as_deref()).unwrap_or_else(|| self.config.open_status.clone());

        let task = Task {
            id: String::new(),
            project_ref: Some(project_ref(&project_id)),
            project_id,
            title,
            description: form.description.trim().to_string(),
            label: non_blank(form.label.as_deref()),
            priority: non_blank(form.priority.as_deref()),
            completed: status == self.config.done_status,
            status,
            start_date: optional_date("start_date", form.start_date.as_deref())?,
            end_date: Some(normalized_date("end_date", &end_date)?),
            start_hour: optional_hour("start_hour", form.start_hour.as_deref())?,
            end_hour: optional_hour("end_hour", form.end_hour.as_deref())?,
            color: non_blank(form.color.as_deref()),
            owner: Some(uid),
        };
        check_date_range(&task)?;

        let doc = self.gateway.add(TASKS, task_data(&task)?)?;
        let created: Task = doc.decode()?;
        info!(task_id = %created.id, project_id = %created.project_id, "Task created");
        self.toasts.success("Task created");
        Ok(created)
    }

    pub fn update_task(&self, id: &str, patch: TaskPatch) -> AppResult<Task> {
        let result = self.try_update(id, patch);
        self.reported(result)
    }

    fn try_update(&self, id: &str, patch: TaskPatch) -> AppResult<Task> {
        let uid = self.uid()?;
        let mut task = self.load_owned(&uid, id)?;

        if let Some(title) = patch.title {
            task.title = non_blank(Some(&title)).ok_or_else(|| AppError::missing_field("title"))?;
        }
        if let Some(project_id) = patch.project_id {
            let project_id =
                non_blank(Some(&project_id)).ok_or_else(|| AppError::missing_field("project_id"))?;
            task.project_ref = Some(project_ref(&project_id));
            task.project_id = project_id;
        }
        if let Some(description) = patch.description {
            task.description = description.trim().to_string();
        }
        // Blank strings clear optional fields.
        if let Some(label) = patch.label {
            task.label = non_blank(Some(&label));
        }
        if let Some(priority) = patch.priority {
            task.priority = non_blank(Some(&priority));
        }
        if let Some(color) = patch.color {
            task.color = non_blank(Some(&color));
        }
        if let Some(status) = patch.status {
            let status = non_blank(Some(&status)).ok_or_else(|| AppError::missing_field("status"))?;
            task.completed = status == self.config.done_status;
            task.status = status;
        }
        if let Some(start) = patch.start_date {
            task.start_date = optional_date("start_date", Some(start.as_str()))?;
        }
        if let Some(end) = patch.end_date {
            let end = non_blank(Some(&end)).ok_or_else(|| AppError::missing_field("end_date"))?;
            task.end_date = Some(normalized_date("end_date", &end)?);
        }
        if let Some(hour) = patch.start_hour {
            task.start_hour = optional_hour("start_hour", Some(hour.as_str()))?;
        }
        if let Some(hour) = patch.end_hour {
            task.end_hour = optional_hour("end_hour", Some(hour.as_str()))?;
        }
        check_date_range(&task)?;

        self.gateway
            .update(TASKS, id, task_data(&task)?)?
            .ok_or_else(|| AppError::task_not_found(id))?;
        info!(task_id = %id, "Task updated");
        Ok(task)
    }

    /// Flip `completed`, moving status between the open and done statuses.
    pub fn toggle_completed(&self, id: &str) -> AppResult<Task> {
        let result = self.try_toggle(id);
        self.reported(result)
    }

    fn try_toggle(&self, id: &str) -> AppResult<Task> {
        let uid = self.uid()?;
        let mut task = self.load_owned(&uid, id)?;
        task.completed = !task.completed;
        task.status = if task.completed {
            self.config.done_status.clone()
        } else {
            self.config.open_status.clone()
        };

        self.gateway
            .update(
                TASKS,
                id,
                json!({ "completed": task.completed, "status": task.status }),
            )?
            .ok_or_else(|| AppError::task_not_found(id))?;
        info!(task_id = %id, completed = task.completed, "Task completion toggled");
        Ok(task)
    }

    /// Drop every cached task and reset paging.
    pub fn clear(&self) {
        *lock(&self.state) = TaskState::default();
    }
}

impl SessionAware for TaskStore {
    fn name(&self) -> &'static str {
        "tasks"
    }

    fn signed_in(&self, user: &AuthUser) -> AppResult<()> {
        {
            let mut state = lock(&self.state);
            state.uid = Some(user.uid.clone());
        }

        let state = Arc::clone(&self.state);
        let observers = Arc::clone(&self.observers);
        let sub = self
            .gateway
            .on_snapshot(Self::owned(&user.uid), move |snap: Snapshot| {
                let mut tasks = snap.decode_all::<Task>();
                tasks.sort_by(compare_tasks);
                lock(&state).tasks = tasks.clone();

                let observers: Vec<TaskObserver> = lock(&observers).clone();
                for observer in observers {
                    observer(&tasks);
                }
            })?;
        self.registry.replace(keys::TASKS, sub);
        debug!(uid = %user.uid, "Task working set subscribed");
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

    fn setup() -> (TaskStore, Gateway, Arc<SubscriptionRegistry>) {
        let gateway = Gateway::new(Database::open_in_memory().unwrap());
        let registry = Arc::new(SubscriptionRegistry::new());
        let store = TaskStore::new(
            gateway.clone(),
            Arc::clone(&registry),
            Arc::new(ToastCenter::new(5_000)),
            TasksConfig {
                page_size: 3,
                ..TasksConfig::default()
            },
        );
        (store, gateway, registry)
    }

    fn user(uid: &str) -> AuthUser {
        AuthUser {
            uid: uid.to_string(),
            display_name: None,
            email: None,
            photo_url: None,
        }
    }

    fn form(title: &str, end: &str) -> TaskForm {
        TaskForm {
            project_id: "p1".to_string(),
            title: title.to_string(),
            end_date: Some(end.to_string()),
            ..TaskForm::default()
        }
    }

    fn titles(tasks: &[Task]) -> Vec<&str> {
        tasks.iter().map(|t| t.title.as_str()).collect()
    }

    #[test]
    fn actions_require_a_session() {
        let (store, gateway, _) = setup();
        let err = store.create_task(form("Pay rent", "2024-05-01")).unwrap_err();
        assert_eq!(err.code, ErrorCode::NotAuthenticated);
        assert_eq!(gateway.database().count_documents(TASKS).unwrap(), 0);
    }

    #[test]
    fn blank_title_is_rejected_without_a_write() {
        let (store, gateway, _) = setup();
        store.signed_in(&user("u1")).unwrap();

        let err = store.create_task(form("   ", "2024-05-01")).unwrap_err();
        assert_eq!(err.code, ErrorCode::MissingRequiredField);
        assert_eq!(err.field.as_deref(), Some("title"));
        assert_eq!(gateway.database().count_documents(TASKS).unwrap(), 0);
    }

    #[test]
    fn create_normalizes_dates_and_defaults_status() {
        let (store, _, _) = setup();
        store.signed_in(&user("u1")).unwrap();

        let mut input = form("Pay rent", "2024/05/03");
        input.start_date = Some("01-05-2024".to_string());
        input.end_hour = Some("7:30".to_string());
        let task = store.create_task(input).unwrap();

        assert_eq!(task.start_date.as_deref(), Some("2024-05-01"));
        assert_eq!(task.end_date.as_deref(), Some("2024-05-03"));
        assert_eq!(task.end_hour.as_deref(), Some("07:30"));
        assert_eq!(task.status, "todo");
        assert_eq!(task.project_ref.as_deref(), Some("projects/p1"));
        assert!(!task.completed);
        assert_eq!(store.tasks().len(), 1);
    }

    #[test]
    fn start_after_end_is_rejected() {
        let (store, _, _) = setup();
        store.signed_in(&user("u1")).unwrap();
        let mut input = form("Backwards", "2024-05-01");
        input.start_date = Some("2024-05-02".to_string());
        let err = store.create_task(input).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidFieldValue);
    }

    #[test]
    fn toggle_flips_status_pair() {
        let (store, _, _) = setup();
        store.signed_in(&user("u1")).unwrap();
        let task = store.create_task(form("Pay rent", "2024-05-01")).unwrap();

        let done = store.toggle_completed(&task.id).unwrap();
        assert!(done.completed);
        assert_eq!(done.status, "done");
        assert_eq!(store.task(&task.id).unwrap().status, "done");

        let reopened = store.toggle_completed(&task.id).unwrap();
        assert!(!reopened.completed);
        assert_eq!(reopened.status, "todo");
    }

    #[test]
    fn other_users_tasks_are_not_found() {
        let (store, gateway, _) = setup();
        let foreign = gateway
            .add(TASKS, json!({ "title": "x", "project_id": "p", "owner": "u2" }))
            .unwrap();
        store.signed_in(&user("u1")).unwrap();

        let err = store.toggle_completed(&foreign.id).unwrap_err();
        assert_eq!(err.code, ErrorCode::TaskNotFound);
        assert!(store.tasks().is_empty());
    }

    #[test]
    fn update_applies_partial_patch() {
        let (store, _, _) = setup();
        store.signed_in(&user("u1")).unwrap();
        let task = store.create_task(form("Draft", "2024-05-01")).unwrap();

        let patch = TaskPatch {
            title: Some("Final".to_string()),
            end_date: Some("2024-06-01T10:00:00Z".to_string()),
            status: Some("done".to_string()),
            ..TaskPatch::default()
        };
        let updated = store.update_task(&task.id, patch).unwrap();
        assert_eq!(updated.title, "Final");
        assert_eq!(updated.end_date.as_deref(), Some("2024-06-01"));
        assert!(updated.completed);

        let cached = store.task(&task.id).unwrap();
        assert_eq!(cached, updated);
    }

    #[test]
    fn empty_filter_yields_no_page_and_no_subscription() {
        let (store, _, registry) = setup();
        store.signed_in(&user("u1")).unwrap();
        store.create_task(form("Pay rent", "2024-05-01")).unwrap();

        let view = store.set_filter(TaskFilter::default()).unwrap();
        assert!(view.tasks.is_empty());
        assert_eq!(view.total, 0);
        assert!(!registry.is_active(keys::TASK_PAGE));
    }

    #[test]
    fn pages_walk_forward_and_back() {
        let (store, _, registry) = setup();
        store.signed_in(&user("u1")).unwrap();
        for (title, due) in [
            ("a", "2024-05-01"),
            ("b", "2024-05-01"),
            ("c", "2024-05-02"),
            ("d", "2024-05-03"),
            ("e", "2024-05-04"),
            ("f", "2024-05-05"),
            ("g", "2024-05-06"),
        ] {
            store.create_task(form(&format!("task {}", title), due)).unwrap();
        }

        let first = store.set_filter(TaskFilter::title("task")).unwrap();
        assert_eq!(titles(&first.tasks), vec!["task b", "task a", "task c"]);
        assert_eq!((first.page, first.total_pages, first.total), (1, 3, 7));
        assert!(registry.is_active(keys::TASK_PAGE));

        let second = store.fetch_page(PageMove::Next).unwrap();
        assert_eq!(titles(&second.tasks), vec!["task d", "task e", "task f"]);
        assert_eq!(second.page, 2);

        let last = store.fetch_page(PageMove::Last).unwrap();
        assert_eq!(titles(&last.tasks), vec!["task g"]);
        assert_eq!(last.page, 3);

        // Already on the last page.
        let still_last = store.fetch_page(PageMove::Next).unwrap();
        assert_eq!(titles(&still_last.tasks), vec!["task g"]);

        let back = store.fetch_page(PageMove::Prev).unwrap();
        assert_eq!(titles(&back.tasks), vec!["task d", "task e", "task f"]);
        assert_eq!(back.page, 2);

        let start = store.fetch_page(PageMove::First).unwrap();
        assert_eq!(titles(&start.tasks), vec!["task b", "task a", "task c"]);
        assert!(!start.has_prev());
        assert!(start.has_next());
    }

    #[test]
    fn live_page_reflects_writes() {
        let (store, _, _) = setup();
        store.signed_in(&user("u1")).unwrap();
        store.create_task(form("report one", "2024-05-02")).unwrap();
        store.set_filter(TaskFilter::title("report")).unwrap();
        assert_eq!(store.page().tasks.len(), 1);

        store.create_task(form("report zero", "2024-05-01")).unwrap();
        let view = store.page();
        assert_eq!(titles(&view.tasks), vec!["report zero", "report one"]);
        assert_eq!(view.total, 2);
    }

    #[test]
    fn changing_filter_resets_to_first_page() {
        let (store, _, _) = setup();
        store.signed_in(&user("u1")).unwrap();
        for day in 1..=7 {
            store
                .create_task(form(&format!("item {}", day), &format!("2024-05-0{}", day)))
                .unwrap();
        }
        store.set_filter(TaskFilter::title("item")).unwrap();
        store.fetch_page(PageMove::Next).unwrap();
        assert_eq!(store.page().page, 2);

        let view = store.set_filter(TaskFilter::title("item 7")).unwrap();
        assert_eq!(view.page, 1);
        assert_eq!(titles(&view.tasks), vec!["item 7"]);
    }

    #[test]
    fn observers_see_the_working_set() {
        let (store, _, _) = setup();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        store.on_change(move |tasks| sink.lock().unwrap().push(tasks.len()));

        store.signed_in(&user("u1")).unwrap();
        store.create_task(form("one", "2024-05-01")).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![0, 1]);
    }

    #[test]
    fn clear_drops_everything() {
        let (store, _, _) = setup();
        store.signed_in(&user("u1")).unwrap();
        store.create_task(form("one", "2024-05-01")).unwrap();
        store.set_filter(TaskFilter::title("one")).unwrap();

        store.signed_out();
        assert!(store.tasks().is_empty());
        assert!(store.page().tasks.is_empty());
        assert!(store.filter().is_empty());
        assert_eq!(
            store.create_task(form("two", "2024-05-01")).unwrap_err().code,
            ErrorCode::NotAuthenticated
        );
    }
}
