//! HTML rendering for the web surface.
//!
//! Pages are small server-rendered documents sharing one layout; every
//! user-provided string goes through [`html_escape`].

use crate::stores::{PageView, PickerOption, ProjectSummary};
use crate::toast::Toast;
use crate::types::{Notification, Task, UserProfile};

const STYLE: &str = r#"
body { font-family: system-ui, sans-serif; margin: 0; }
body.light { background: #fafafa; color: #212121; }
body.dark { background: #121212; color: #e0e0e0; }
nav { display: flex; gap: 1rem; padding: 0.75rem 1rem; border-bottom: 1px solid #8884; }
main { padding: 1rem; max-width: 960px; }
table { border-collapse: collapse; width: 100%; }
td, th { padding: 0.35rem 0.5rem; border-bottom: 1px solid #8883; text-align: left; }
.toast { padding: 0.5rem 0.75rem; margin: 0.25rem 0; border-radius: 4px; }
.toast.info { background: #1e88e533; } .toast.success { background: #43a04733; }
.toast.warning { background: #ffb30033; } .toast.error { background: #e5393533; }
.done { text-decoration: line-through; opacity: 0.7; }
.chip { display: inline-block; padding: 0 0.5rem; border-radius: 1rem; border: 1px solid #8886; }
"#;

pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Shared page chrome: navigation, toasts and the theme class.
pub fn layout(title: &str, theme: &str, signed_in: bool, unread: usize, toasts: &[Toast], body: &str) -> String {
    let account = if signed_in {
        format!(
            r#"<a href="/profile">Profile</a><span class="chip">{} unread</span><form method="post" action="/logout"><button>Log out</button></form>"#,
            unread
        )
    } else {
        r#"<a href="/login">Log in</a>"#.to_string()
    };
    let toasts: String = toasts
        .iter()
        .map(|t| {
            format!(
                r#"<div class="toast {}" data-icon="{}">{}</div>"#,
                t.severity.as_str(),
                html_escape(&t.icon),
                html_escape(&t.message)
            )
        })
        .collect();

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head><meta charset="utf-8"><title>{title} - todo-board</title><style>{STYLE}</style></head>
<body class="{theme}">
<nav><a href="/">Home</a><a href="/search">Search</a><a href="/filters-labels">Filters &amp; labels</a>{account}
<form method="post" action="/theme"><button>Toggle theme</button></form></nav>
<main><div id="toasts">{toasts}</div><h1>{title}</h1>{body}</main>
</body>
</html>"#,
        title = html_escape(title),
    )
}

pub fn task_rows(tasks: &[Task]) -> String {
    if tasks.is_empty() {
        return r#"<div class="empty-state">No tasks</div>"#.to_string();
    }
    let mut html = String::from(
        "<table><thead><tr><th>Task</th><th>Due</th><th>Priority</th><th>Status</th></tr></thead><tbody>",
    );
    for task in tasks {
        html.push_str(&format!(
            r#"<tr class="{}"><td><a href="/task/{}">{}</a></td><td>{}</td><td>{}</td><td>{}</td></tr>"#,
            if task.completed { "done" } else { "" },
            urlencoding::encode(&task.id),
            html_escape(&task.title),
            html_escape(task.end_date.as_deref().unwrap_or("")),
            html_escape(task.priority.as_deref().unwrap_or("")),
            html_escape(&task.status),
        ));
    }
    html.push_str("</tbody></table>");
    html
}

pub fn pager(view: &PageView, base: &str) -> String {
    if view.total_pages <= 1 {
        return String::new();
    }
    let link = |mv: &str, label: &str, enabled: bool| {
        if enabled {
            format!(r#"<a href="{}page={}">{}</a>"#, base, mv, label)
        } else {
            format!("<span>{}</span>", label)
        }
    };
    format!(
        r#"<div class="pager">{} {} <span>Page {} of {}</span> {} {}</div>"#,
        link("first", "First", view.has_prev()),
        link("prev", "Previous", view.has_prev()),
        view.page,
        view.total_pages,
        link("next", "Next", view.has_next()),
        link("last", "Last", view.has_next()),
    )
}

pub fn project_list(projects: &[ProjectSummary]) -> String {
    if projects.is_empty() {
        return r#"<div class="empty-state">No projects yet</div>"#.to_string();
    }
    let mut html = String::from("<ul>");
    for summary in projects {
        html.push_str(&format!(
            r#"<li><a href="/project/{}">{}</a> <span class="chip">{}/{} done</span></li>"#,
            urlencoding::encode(&summary.project.id),
            html_escape(&summary.project.title),
            summary.completed_count,
            summary.task_count,
        ));
    }
    html.push_str("</ul>");
    html
}

pub fn notification_list(notifications: &[Notification]) -> String {
    if notifications.is_empty() {
        return String::new();
    }
    let mut html = String::from("<h2>Notifications</h2><ul>");
    for n in notifications {
        html.push_str(&format!(
            r#"<li>{} <form method="post" action="/notifications/{}/read"><button>Dismiss</button></form></li>"#,
            html_escape(&n.message),
            urlencoding::encode(&n.id),
        ));
    }
    html.push_str("</ul>");
    html
}

pub fn task_detail(task: &Task) -> String {
    let field = |label: &str, value: Option<&str>| {
        format!(
            "<tr><th>{}</th><td>{}</td></tr>",
            label,
            html_escape(value.unwrap_or("-"))
        )
    };
    let id = urlencoding::encode(&task.id);
    format!(
        r#"<table>{}{}{}{}{}{}{}</table>
<form method="post" action="/task/{id}/toggle"><button>{}</button></form>
<form method="post" action="/task/{id}">
<input name="title" value="{}"><input name="end_date" value="{}"><button>Save</button>
</form>"#,
        field("Project", Some(task.project_id.as_str())),
        field("Description", Some(&task.description).filter(|d| !d.is_empty()).map(|d| d.as_str())),
        field("Label", task.label.as_deref()),
        field("Priority", task.priority.as_deref()),
        field("Status", Some(task.status.as_str())),
        field("Start", task.start_date.as_deref()),
        field("Due", task.end_date.as_deref()),
        if task.completed { "Reopen" } else { "Complete" },
        html_escape(&task.title),
        html_escape(task.end_date.as_deref().unwrap_or("")),
    )
}

pub fn options_section(title: &str, options: &[PickerOption]) -> String {
    let items: String = options
        .iter()
        .map(|o| {
            format!(
                r#"<span class="chip" style="border-color:{}">{}</span> "#,
                html_escape(o.color.as_deref().unwrap_or("inherit")),
                html_escape(&o.label)
            )
        })
        .collect();
    format!("<h2>{}</h2><div>{}</div>", html_escape(title), items)
}

pub fn profile(profile: &UserProfile) -> String {
    format!(
        "<table><tr><th>Name</th><td>{}</td></tr><tr><th>Email</th><td>{}</td></tr><tr><th>Logins</th><td>{}</td></tr></table>",
        html_escape(profile.display_name.as_deref().unwrap_or("-")),
        html_escape(profile.email.as_deref().unwrap_or("-")),
        profile.login_count,
    )
}

pub const LOGIN_FORM: &str =
    r#"<form method="post" action="/login"><button>Sign in</button></form>"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup() {
        assert_eq!(
            html_escape(r#"<b>"Tom" & 'Jerry'</b>"#),
            "&lt;b&gt;&quot;Tom&quot; &amp; &#39;Jerry&#39;&lt;/b&gt;"
        );
    }

    #[test]
    fn pager_hides_for_single_page() {
        let view = PageView {
            page: 1,
            total_pages: 1,
            ..PageView::default()
        };
        assert!(pager(&view, "/search?").is_empty());

        let view = PageView {
            page: 1,
            total_pages: 3,
            ..PageView::default()
        };
        let html = pager(&view, "/search?q=x&");
        assert!(html.contains("page=next"));
        assert!(!html.contains("page=prev"));
    }
}
