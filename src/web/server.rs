//! HTTP server for the web surface.
//!
//! Serves the navigable pages and a JSON API over the application stores.

use axum::{
    Router,
    extract::{Form, Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json, Redirect, Response},
    routing::{delete, get, post},
};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::oneshot;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use super::templates::{self, html_escape};
use crate::app::App;
use crate::error::{AppError, ErrorCode};
use crate::routes::{Navigation, Route};
use crate::stores::{PageMove, TaskFilter};
use crate::types::{ProjectForm, ReminderSettings, TaskForm, TaskPatch};

/// Server state shared across handlers.
#[derive(Clone)]
pub struct WebServer {
    app: Arc<App>,
}

impl WebServer {
    pub fn new(app: Arc<App>) -> Self {
        Self { app }
    }

    pub fn app(&self) -> &App {
        &self.app
    }

    fn page(&self, title: &str, body: &str) -> Html<String> {
        let app = self.app();
        Html(templates::layout(
            title,
            app.theme.name(),
            app.session.is_signed_in(),
            app.notifications.unread_count(),
            &app.toasts.active(),
            body,
        ))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self.code {
            ErrorCode::MissingRequiredField | ErrorCode::InvalidFieldValue => StatusCode::BAD_REQUEST,
            ErrorCode::NotAuthenticated => StatusCode::UNAUTHORIZED,
            ErrorCode::TaskNotFound
            | ErrorCode::ProjectNotFound
            | ErrorCode::NotificationNotFound => StatusCode::NOT_FOUND,
            ErrorCode::AuthProvider => StatusCode::BAD_GATEWAY,
            ErrorCode::DatabaseError | ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, AppError>;

// Pages

async fn home(State(state): State<WebServer>) -> Html<String> {
    let app = state.app();
    if !app.session.is_signed_in() {
        return state.page("Welcome", templates::LOGIN_FORM);
    }
    let body = format!(
        "{}<h2>Projects</h2>{}<h2>All tasks</h2>{}",
        templates::notification_list(&app.notifications.notifications()),
        templates::project_list(&app.projects.summaries()),
        templates::task_rows(&app.tasks.tasks()),
    );
    state.page("Home", &body)
}

async fn task_page(State(state): State<WebServer>, Path(id): Path<String>) -> Response {
    match state.app().tasks.task(&id) {
        Ok(task) => state.page(&task.title, &templates::task_detail(&task)).into_response(),
        Err(err) => not_found(&state, &err.message).into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct TaskEditForm {
    title: Option<String>,
    end_date: Option<String>,
}

async fn task_edit(
    State(state): State<WebServer>,
    Path(id): Path<String>,
    Form(form): Form<TaskEditForm>,
) -> Redirect {
    let patch = TaskPatch {
        title: form.title,
        end_date: form.end_date,
        ..TaskPatch::default()
    };
    // Failures surface as toasts on the page redirected to.
    if let Err(err) = state.app().tasks.update_task(&id, patch) {
        debug!(task_id = %id, error = %err, "Task edit rejected");
    }
    Redirect::to(&Route::Task(id).path())
}

async fn task_toggle(State(state): State<WebServer>, Path(id): Path<String>) -> Redirect {
    if let Err(err) = state.app().tasks.toggle_completed(&id) {
        debug!(task_id = %id, error = %err, "Task toggle failed");
    }
    Redirect::to(&Route::Task(id).path())
}

async fn project_page(State(state): State<WebServer>, Path(id): Path<String>) -> Response {
    let app = state.app();
    match app.projects.summary(&id) {
        Ok(summary) => {
            let body = format!(
                r#"<p>{} of {} done</p>{}"#,
                summary.completed_count,
                summary.task_count,
                templates::task_rows(&app.projects.tasks_in(&id)),
            );
            state.page(&summary.project.title, &body).into_response()
        }
        Err(err) => not_found(&state, &err.message).into_response(),
    }
}

#[derive(Debug, Default, Deserialize)]
struct SearchParams {
    q: Option<String>,
    page: Option<String>,
}

async fn search_page(State(state): State<WebServer>, Query(params): Query<SearchParams>) -> Html<String> {
    let app = state.app();
    let term = params.q.unwrap_or_default();
    let form = format!(
        r#"<form method="get" action="/search"><input name="q" value="{}"><button>Search</button></form>"#,
        html_escape(&term)
    );
    if term.trim().is_empty() || !app.session.is_signed_in() {
        return state.page("Search", &form);
    }

    let moved = params.page.as_deref().and_then(|p| p.parse::<PageMove>().ok());
    let view = match moved {
        Some(mv) if app.tasks.filter() == TaskFilter::title(term.clone()) => app.tasks.fetch_page(mv),
        _ => app.tasks.set_filter(TaskFilter::title(term.clone())),
    };
    let results = match view {
        Ok(view) => format!(
            "<p>{} result(s)</p>{}{}",
            view.total,
            templates::task_rows(&view.tasks),
            templates::pager(&view, &format!("/search?q={}&", urlencoding::encode(&term))),
        ),
        Err(err) => format!("<p>{}</p>", html_escape(&err.message)),
    };
    state.page("Search", &format!("{}{}", form, results))
}

async fn filters_labels_page(State(state): State<WebServer>) -> Html<String> {
    let reference = &state.app().reference;
    let body = [
        templates::options_section("Labels", &reference.labels()),
        templates::options_section("Priorities", &reference.priorities()),
        templates::options_section("Statuses", &reference.statuses()),
        templates::options_section("Colors", &reference.colors()),
    ]
    .concat();
    state.page("Filters & labels", &body)
}

async fn login_page(State(state): State<WebServer>) -> Response {
    if state.app().session.is_signed_in() {
        return Redirect::to(&Route::Home.path()).into_response();
    }
    state.page("Log in", templates::LOGIN_FORM).into_response()
}

async fn login(State(state): State<WebServer>) -> Redirect {
    let session = &state.app().session;
    if session.sign_in().await.is_err() {
        return Redirect::to(&Route::Login.path());
    }
    match session.settled().await.user() {
        Some(_) => Redirect::to(&Route::Home.path()),
        None => Redirect::to(&Route::Login.path()),
    }
}

async fn logout(State(state): State<WebServer>) -> Redirect {
    match state.app().session.sign_out().await {
        Ok(route) => Redirect::to(&route.path()),
        Err(err) => {
            debug!(error = %err, "Sign-out failed");
            Redirect::to(&Route::Home.path())
        }
    }
}

async fn profile_page(State(state): State<WebServer>) -> Response {
    let app = state.app();
    match Route::Profile.guard(app.session.is_signed_in()) {
        Navigation::Redirect(to) => Redirect::to(&to.path()).into_response(),
        Navigation::Allow(_) => match app.session.profile() {
            Some(profile) => state.page("Profile", &templates::profile(&profile)).into_response(),
            None => Redirect::to(&Route::Login.path()).into_response(),
        },
    }
}

async fn theme_toggle(State(state): State<WebServer>) -> Redirect {
    if let Err(e) = state.app().theme.toggle() {
        warn!(error = %e, "Could not persist theme preference");
    }
    Redirect::to(&Route::Home.path())
}

async fn notification_read(State(state): State<WebServer>, Path(id): Path<String>) -> Redirect {
    if let Err(err) = state.app().notifications.mark_read(&id) {
        debug!(notification_id = %id, error = %err, "Mark read failed");
    }
    Redirect::to(&Route::Home.path())
}

fn not_found(state: &WebServer, message: &str) -> (StatusCode, Html<String>) {
    (
        StatusCode::NOT_FOUND,
        state.page("Not found", &format!("<p>{}</p>", html_escape(message))),
    )
}

async fn fallback(State(state): State<WebServer>, uri: axum::http::Uri) -> (StatusCode, Html<String>) {
    not_found(&state, &format!("Nothing at {}", uri.path()))
}

// JSON API

#[derive(serde::Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn api_session(State(state): State<WebServer>) -> impl IntoResponse {
    Json(state.app().session.state())
}

/// Comma-separated multi-select values.
fn split_list(value: Option<String>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

#[derive(Debug, Default, Deserialize)]
struct TaskListParams {
    title: Option<String>,
    project: Option<String>,
    priority: Option<String>,
    status: Option<String>,
    label: Option<String>,
    due: Option<String>,
    /// first | next | prev | last; without it any filter params replace the filter.
    page: Option<String>,
}

impl TaskListParams {
    fn filter(self) -> TaskFilter {
        TaskFilter {
            title: self.title,
            projects: split_list(self.project),
            priorities: split_list(self.priority),
            statuses: split_list(self.status),
            labels: split_list(self.label),
            due_date: self.due,
        }
    }
}

async fn api_tasks(
    State(state): State<WebServer>,
    Query(params): Query<TaskListParams>,
) -> Result<Response, AppError> {
    let tasks = &state.app().tasks;
    let moved = match params.page.as_deref() {
        Some(p) => Some(
            p.parse::<PageMove>()
                .map_err(|e| AppError::invalid_value("page", &e))?,
        ),
        None => None,
    };
    let view = match moved {
        Some(mv) => tasks.fetch_page(mv)?,
        None => tasks.set_filter(params.filter())?,
    };
    Ok(Json(view).into_response())
}

async fn api_create_task(
    State(state): State<WebServer>,
    Json(form): Json<TaskForm>,
) -> Result<Response, AppError> {
    let task = state.app().tasks.create_task(form)?;
    Ok((StatusCode::CREATED, Json(task)).into_response())
}

async fn api_get_task(State(state): State<WebServer>, Path(id): Path<String>) -> ApiResult<crate::types::Task> {
    Ok(Json(state.app().tasks.task(&id)?))
}

async fn api_update_task(
    State(state): State<WebServer>,
    Path(id): Path<String>,
    Json(patch): Json<TaskPatch>,
) -> ApiResult<crate::types::Task> {
    Ok(Json(state.app().tasks.update_task(&id, patch)?))
}

async fn api_toggle_task(State(state): State<WebServer>, Path(id): Path<String>) -> ApiResult<crate::types::Task> {
    Ok(Json(state.app().tasks.toggle_completed(&id)?))
}

async fn api_projects(State(state): State<WebServer>) -> impl IntoResponse {
    Json(state.app().projects.summaries())
}

async fn api_create_project(
    State(state): State<WebServer>,
    Json(form): Json<ProjectForm>,
) -> Result<Response, AppError> {
    let project = state.app().projects.create_project(form)?;
    Ok((StatusCode::CREATED, Json(project)).into_response())
}

async fn api_reference(State(state): State<WebServer>, Path(collection): Path<String>) -> impl IntoResponse {
    Json(state.app().reference.options(&collection))
}

async fn api_notifications(State(state): State<WebServer>) -> impl IntoResponse {
    Json(state.app().notifications.notifications())
}

async fn api_mark_read(State(state): State<WebServer>, Path(id): Path<String>) -> Result<StatusCode, AppError> {
    state.app().notifications.mark_read(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn api_mark_all_read(State(state): State<WebServer>) -> ApiResult<serde_json::Value> {
    let removed = state.app().notifications.mark_all_read()?;
    Ok(Json(serde_json::json!({ "removed": removed })))
}

async fn api_test_notification(State(state): State<WebServer>) -> ApiResult<crate::types::Notification> {
    Ok(Json(state.app().notifications.send_test_notification().await?))
}

async fn api_reminder_settings(State(state): State<WebServer>) -> impl IntoResponse {
    Json(state.app().notifications.settings())
}

async fn api_save_reminder_settings(
    State(state): State<WebServer>,
    Json(settings): Json<ReminderSettings>,
) -> ApiResult<ReminderSettings> {
    Ok(Json(state.app().notifications.update_settings(settings)?))
}

async fn api_pending_reminders(State(state): State<WebServer>) -> impl IntoResponse {
    Json(state.app().notifications.pending_reminders())
}

async fn api_toasts(State(state): State<WebServer>) -> impl IntoResponse {
    Json(state.app().toasts.active())
}

async fn api_dismiss_toast(State(state): State<WebServer>, Path(id): Path<u64>) -> StatusCode {
    if state.app().toasts.dismiss(id) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn api_theme(State(state): State<WebServer>) -> impl IntoResponse {
    Json(serde_json::json!({ "theme": state.app().theme.name() }))
}

async fn api_toggle_theme(State(state): State<WebServer>) -> Result<Response, AppError> {
    state.app().theme.toggle().map_err(AppError::internal)?;
    Ok(Json(serde_json::json!({ "theme": state.app().theme.name() })).into_response())
}

pub fn build_router(state: WebServer) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Pages
        .route("/", get(home))
        .route("/task/{id}", get(task_page).post(task_edit))
        .route("/task/{id}/toggle", post(task_toggle))
        .route("/project/{id}", get(project_page))
        .route("/search", get(search_page))
        .route("/filters-labels", get(filters_labels_page))
        .route("/login", get(login_page).post(login))
        .route("/logout", post(logout))
        .route("/profile", get(profile_page))
        .route("/theme", post(theme_toggle))
        .route("/notifications/{id}/read", post(notification_read))
        // JSON API
        .route("/api/health", get(health))
        .route("/api/session", get(api_session))
        .route("/api/tasks", get(api_tasks).post(api_create_task))
        .route("/api/tasks/{id}", get(api_get_task).patch(api_update_task))
        .route("/api/tasks/{id}/toggle", post(api_toggle_task))
        .route("/api/projects", get(api_projects).post(api_create_project))
        .route("/api/reference/{collection}", get(api_reference))
        .route("/api/notifications", get(api_notifications))
        .route("/api/notifications/{id}", delete(api_mark_read))
        .route("/api/notifications/read-all", post(api_mark_all_read))
        .route("/api/notifications/test", post(api_test_notification))
        .route(
            "/api/reminders/settings",
            get(api_reminder_settings).put(api_save_reminder_settings),
        )
        .route("/api/reminders/pending", get(api_pending_reminders))
        .route("/api/toasts", get(api_toasts))
        .route("/api/toasts/{id}", delete(api_dismiss_toast))
        .route("/api/theme", get(api_theme).post(api_toggle_theme))
        .fallback(fallback)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server on the given port.
///
/// Returns a oneshot sender that signals shutdown and the bound address.
pub async fn start_server(app: Arc<App>, port: u16) -> anyhow::Result<(oneshot::Sender<()>, SocketAddr)> {
    let router = build_router(WebServer::new(app));

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    info!("Web server listening on http://{}", bound_addr);

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                info!("Web server shutting down");
            })
            .await
        {
            tracing::error!("Web server error: {}", e);
        }
    });

    Ok((shutdown_tx, bound_addr))
}
