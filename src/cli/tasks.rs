//! Tasks subcommand: run a filtered, paginated task query from the shell.

use crate::stores::{PageMove, TaskFilter};
use clap::Args;

/// Arguments for the tasks subcommand
#[derive(Args, Debug, Default)]
pub struct TasksArgs {
    /// Title must contain this text
    #[arg(long)]
    pub title: Option<String>,

    /// Comma-separated project ids
    #[arg(long, value_name = "LIST", value_delimiter = ',')]
    pub project: Vec<String>,

    /// Comma-separated priorities
    #[arg(long, value_name = "LIST", value_delimiter = ',')]
    pub priority: Vec<String>,

    /// Comma-separated statuses
    #[arg(long, value_name = "LIST", value_delimiter = ',')]
    pub status: Vec<String>,

    /// Comma-separated labels
    #[arg(long, value_name = "LIST", value_delimiter = ',')]
    pub label: Vec<String>,

    /// Due on this day (YYYY-MM-DD)
    #[arg(long, value_name = "DATE")]
    pub due: Option<String>,

    /// Page to show, 1-based; reached by walking forward from the first page
    #[arg(long, default_value_t = 1)]
    pub page: usize,

    /// Show the last page instead
    #[arg(long, conflicts_with = "page")]
    pub last: bool,
}

impl TasksArgs {
    pub fn filter(&self) -> TaskFilter {
        TaskFilter {
            title: self.title.clone(),
            projects: self.project.clone(),
            priorities: self.priority.clone(),
            statuses: self.status.clone(),
            labels: self.label.clone(),
            due_date: self.due.clone(),
        }
    }

    /// Page moves to apply after the filter lands on the first page.
    pub fn moves(&self) -> Vec<PageMove> {
        if self.last {
            vec![PageMove::Last]
        } else {
            vec![PageMove::Next; self.page.saturating_sub(1)]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Command};
    use clap::Parser;

    fn parse(args: &[&str]) -> TasksArgs {
        let mut argv = vec!["todo-board", "tasks"];
        argv.extend_from_slice(args);
        match Cli::parse_from(argv).command {
            Some(Command::Tasks(args)) => args,
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn builds_filter_from_lists() {
        let args = parse(&["--status", "open,done", "--label", "home", "--title", "rent"]);
        let filter = args.filter();
        assert_eq!(filter.statuses, vec!["open", "done"]);
        assert_eq!(filter.labels, vec!["home"]);
        assert_eq!(filter.title.as_deref(), Some("rent"));
        assert!(filter.projects.is_empty());
    }

    #[test]
    fn page_walks_forward() {
        assert!(parse(&[]).moves().is_empty());
        assert_eq!(parse(&["--page", "3"]).moves(), vec![PageMove::Next, PageMove::Next]);
        assert_eq!(parse(&["--last"]).moves(), vec![PageMove::Last]);
    }
}
