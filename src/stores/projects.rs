//! Project store: the user's projects plus per-project task aggregates.

use super::reference::ReferenceStore;
use super::tasks::TaskStore;
use super::{SessionAware, lock, non_blank, require_uid};
use crate::db::Query;
use crate::db::seed::PROJECT_TEMPLATES;
use crate::error::{AppError, AppResult};
use crate::gateway::{Gateway, Snapshot};
use crate::subscriptions::{SubscriptionRegistry, keys};
use crate::toast::ToastCenter;
use crate::types::{AuthUser, PROJECTS, Project, ProjectForm, Task};
use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// A project with counts derived from the task working set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectSummary {
    pub project: Project,
    pub task_count: usize,
    pub completed_count: usize,
}

impl ProjectSummary {
    pub fn open_count(&self) -> usize {
        self.task_count - self.completed_count
    }
}

#[derive(Default)]
struct ProjectState {
    uid: Option<String>,
    projects: Vec<Project>,
}

pub struct ProjectStore {
    gateway: Gateway,
    registry: Arc<SubscriptionRegistry>,
    toasts: Arc<ToastCenter>,
    tasks: Arc<TaskStore>,
    reference: Arc<ReferenceStore>,
    state: Arc<Mutex<ProjectState>>,
}

impl ProjectStore {
    pub fn new(
        gateway: Gateway,
        registry: Arc<SubscriptionRegistry>,
        toasts: Arc<ToastCenter>,
        tasks: Arc<TaskStore>,
        reference: Arc<ReferenceStore>,
    ) -> Self {
        Self {
            gateway,
            registry,
            toasts,
            tasks,
            reference,
            state: Arc::new(Mutex::new(ProjectState::default())),
        }
    }

    pub fn projects(&self) -> Vec<Project> {
        lock(&self.state).projects.clone()
    }

    pub fn project(&self, id: &str) -> AppResult<Project> {
        lock(&self.state)
            .projects
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or_else(|| AppError::project_not_found(id))
    }

    pub fn tasks_in(&self, project_id: &str) -> Vec<Task> {
        self.tasks.tasks_for_project(project_id)
    }

    pub fn summary(&self, project_id: &str) -> AppResult<ProjectSummary> {
        let project = self.project(project_id)?;
        Ok(Self::summarize(project, &self.tasks.tasks()))
    }

    /// Every project with its task counts, in listing order.
    pub fn summaries(&self) -> Vec<ProjectSummary> {
        let tasks = self.tasks.tasks();
        self.projects()
            .into_iter()
            .map(|p| Self::summarize(p, &tasks))
            .collect()
    }

    fn summarize(project: Project, tasks: &[Task]) -> ProjectSummary {
        let owned: Vec<&Task> = tasks.iter().filter(|t| t.project_id == project.id).collect();
        ProjectSummary {
            task_count: owned.len(),
            completed_count: owned.iter().filter(|t| t.completed).count(),
            project,
        }
    }

    pub fn create_project(&self, form: ProjectForm) -> AppResult<Project> {
        let result = self.try_create(form);
        if let Err(ref err) = result {
            self.toasts.report(err);
        }
        result
    }

    fn try_create(&self, form: ProjectForm) -> AppResult<Project> {
        let uid = require_uid(&lock(&self.state).uid)?;
        let title = non_blank(Some(&form.title)).ok_or_else(|| AppError::missing_field("title"))?;

        let template = match non_blank(form.template_id.as_deref()) {
            Some(id) => Some(self.reference.find(PROJECT_TEMPLATES, &id).ok_or_else(|| {
                AppError::invalid_value("template_id", &format!("Unknown project template: {}", id))
            })?),
            None => None,
        };

        let project = Project {
            id: String::new(),
            title,
            icon: non_blank(form.icon.as_deref())
                .or_else(|| template.as_ref().and_then(|t| t.icon.clone())),
            color: non_blank(form.color.as_deref())
                .or_else(|| template.as_ref().and_then(|t| t.color.clone())),
            owner: Some(uid),
        };

        let mut data = serde_json::to_value(&project).map_err(AppError::internal)?;
        if let Value::Object(ref mut map) = data {
            map.remove("id");
        }
        let doc = self.gateway.add(PROJECTS, data)?;
        let created: Project = doc.decode()?;
        info!(project_id = %created.id, title = %created.title, "Project created");
        self.toasts.success(format!("Project \"{}\" created", created.title));
        Ok(created)
    }

    pub fn clear(&self) {
        *lock(&self.state) = ProjectState::default();
    }
}

impl SessionAware for ProjectStore {
    fn name(&self) -> &'static str {
        "projects"
    }

    fn signed_in(&self, user: &AuthUser) -> AppResult<()> {
        lock(&self.state).uid = Some(user.uid.clone());

        let state = Arc::clone(&self.state);
        let query = Query::collection(PROJECTS).where_eq("owner", user.uid.as_str());
        let sub = self.gateway.on_snapshot(query, move |snap: Snapshot| {
            let mut projects = snap.decode_all::<Project>();
            projects.sort_by(|a, b| a.title.to_lowercase().cmp(&b.title.to_lowercase()));
            lock(&state).projects = projects;
        })?;
        self.registry.replace(keys::PROJECTS, sub);
        debug!(uid = %user.uid, "Projects subscribed");
        Ok(())
    }

    fn signed_out(&self) {
        self.clear();
    }
}
